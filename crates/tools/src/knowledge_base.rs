//! Knowledge-base query tool: vector search over uploaded documents.

use std::sync::Arc;

use async_trait::async_trait;
use chorus_core::{KnowledgeBase, Tool, ToolArgs, ToolContext, ToolError, ToolKind};

/// Upper bound on `top_k` a model may ask for.
const MAX_TOP_K: usize = 20;

pub struct KnowledgeBaseQueryTool {
    service: Arc<dyn KnowledgeBase>,
    default_top_k: usize,
}

impl KnowledgeBaseQueryTool {
    pub fn new(service: Arc<dyn KnowledgeBase>, default_top_k: usize) -> Self {
        Self {
            service,
            default_top_k: default_top_k.clamp(1, MAX_TOP_K),
        }
    }
}

#[async_trait]
impl Tool for KnowledgeBaseQueryTool {
    fn kind(&self) -> ToolKind {
        ToolKind::KnowledgeBaseQuery
    }

    fn description(&self) -> &str {
        "Query the knowledge base for relevant information. Returns document chunks sorted by relevance."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query to find relevant knowledge"
                },
                "top_k": {
                    "type": "integer",
                    "description": "Maximum number of results to return",
                    "default": self.default_top_k
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: &ToolArgs, _ctx: &ToolContext) -> Result<String, ToolError> {
        let query = args
            .primary("query")
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'query' argument".into()))?;
        let top_k = args
            .integer("top_k")
            .map(|k| (k as usize).clamp(1, MAX_TOP_K))
            .unwrap_or(self.default_top_k);

        let mut hits = self.service.search(query, top_k).await?;
        if hits.is_empty() {
            return Ok(format!("The knowledge base has nothing on \"{query}\"."));
        }

        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        Ok(hits
            .iter()
            .take(top_k)
            .map(|h| format!("[{} score={:.2}] {}", h.source_id, h.score, h.text))
            .collect::<Vec<_>>()
            .join("\n"))
    }
}
