//! Search collaborators consumed by tools.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ServiceError;

/// One hit from the vector knowledge base.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeHit {
    pub text: String,
    pub source_id: String,
    pub score: f32,
}

/// One hit from the web-search provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebHit {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub snippet: String,
}

#[async_trait]
pub trait KnowledgeBase: Send + Sync {
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<KnowledgeHit>, ServiceError>;
}

#[async_trait]
pub trait WebSearch: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<WebHit>, ServiceError>;
}
