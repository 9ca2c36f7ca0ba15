//! HTTP clients for the knowledge-base and web-search services.
//!
//! ```text
//! POST {kb}/search      {"query": "...", "top_k": 5}  -> {"results": [{text, source_id, score}]}
//! GET  {web}/search?q=...                             -> {"results": [{title, url, snippet}]}
//! ```
//!
//! Both also accept a bare JSON array as the response body.

use std::time::Duration;

use async_trait::async_trait;
use chorus_core::{KnowledgeBase, KnowledgeHit, ServiceError, WebHit, WebSearch};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

const KNOWLEDGE_BASE: &str = "knowledge base";
const WEB_SEARCH: &str = "web search";

#[derive(Deserialize)]
#[serde(untagged)]
enum Hits<T> {
    Wrapped { results: Vec<T> },
    Bare(Vec<T>),
}

impl<T> Hits<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            Self::Wrapped { results } => results,
            Self::Bare(results) => results,
        }
    }
}

/// Shared plumbing: base URL, optional bearer credential, timeout.
struct ServiceClient {
    service: &'static str,
    base_url: Option<String>,
    credential: Option<String>,
    client: reqwest::Client,
}

impl ServiceClient {
    fn new(service: &'static str, base_url: Option<String>, credential: Option<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            service,
            base_url: base_url.map(|u| u.trim_end_matches('/').to_string()),
            credential,
            client,
        }
    }

    fn endpoint(&self, path: &str) -> Result<String, ServiceError> {
        match &self.base_url {
            Some(base) => Ok(format!("{base}{path}")),
            None => Err(ServiceError::NotConfigured(self.service.to_string())),
        }
    }

    async fn fetch<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<Vec<T>, ServiceError> {
        let request = match &self.credential {
            Some(token) => request.bearer_auth(token),
            None => request,
        };
        let response = request.send().await.map_err(|e| ServiceError::Connection {
            service: self.service.to_string(),
            reason: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ServiceError::Status {
                service: self.service.to_string(),
                status_code: status.as_u16(),
            });
        }

        let hits: Hits<T> = response.json().await.map_err(|e| ServiceError::MalformedPayload {
            service: self.service.to_string(),
            reason: e.to_string(),
        })?;
        Ok(hits.into_vec())
    }
}

pub struct HttpKnowledgeBase {
    inner: ServiceClient,
}

impl HttpKnowledgeBase {
    /// A client for `base_url`; with no URL every search fails as not configured.
    pub fn new(base_url: Option<String>, credential: Option<String>, timeout: Duration) -> Self {
        Self {
            inner: ServiceClient::new(KNOWLEDGE_BASE, base_url, credential, timeout),
        }
    }
}

#[async_trait]
impl KnowledgeBase for HttpKnowledgeBase {
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<KnowledgeHit>, ServiceError> {
        let url = self.inner.endpoint("/search")?;
        debug!(query, top_k, "Knowledge base search");
        let request = self
            .inner
            .client
            .post(url)
            .json(&serde_json::json!({ "query": query, "top_k": top_k }));
        self.inner.fetch(request).await
    }
}

pub struct HttpWebSearch {
    inner: ServiceClient,
}

impl HttpWebSearch {
    pub fn new(base_url: Option<String>, credential: Option<String>, timeout: Duration) -> Self {
        Self {
            inner: ServiceClient::new(WEB_SEARCH, base_url, credential, timeout),
        }
    }
}

#[async_trait]
impl WebSearch for HttpWebSearch {
    async fn search(&self, query: &str) -> Result<Vec<WebHit>, ServiceError> {
        let url = self.inner.endpoint("/search")?;
        debug!(query, "Web search");
        let request = self.inner.client.get(url).query(&[("q", query)]);
        self.inner.fetch(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_wrapped_and_bare_results() {
        let wrapped: Hits<WebHit> =
            serde_json::from_str(r#"{"results":[{"title":"t","url":"u"}]}"#).unwrap();
        let bare: Hits<KnowledgeHit> =
            serde_json::from_str(r#"[{"text":"x","source_id":"s","score":0.5}]"#).unwrap();
        assert_eq!(wrapped.into_vec()[0].snippet, "");
        assert_eq!(bare.into_vec()[0].source_id, "s");
    }

    #[tokio::test]
    async fn unconfigured_service_fails_without_network() {
        let kb = HttpKnowledgeBase::new(None, None, Duration::from_secs(1));
        assert!(matches!(
            kb.search("q", 3).await,
            Err(ServiceError::NotConfigured(name)) if name == KNOWLEDGE_BASE
        ));
        let web = HttpWebSearch::new(None, None, Duration::from_secs(1));
        assert!(matches!(web.search("q").await, Err(ServiceError::NotConfigured(_))));
    }
}
