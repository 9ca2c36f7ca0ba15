//! Web search tool backed by the external search service.

use std::sync::Arc;

use async_trait::async_trait;
use chorus_core::{Tool, ToolArgs, ToolContext, ToolError, ToolKind, WebSearch};

pub struct WebSearchTool {
    service: Arc<dyn WebSearch>,
    max_results: usize,
}

impl WebSearchTool {
    pub fn new(service: Arc<dyn WebSearch>, max_results: usize) -> Self {
        Self {
            service,
            max_results: max_results.max(1),
        }
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn kind(&self) -> ToolKind {
        ToolKind::WebSearch
    }

    fn description(&self) -> &str {
        "Search the web. Returns titles, URLs and snippets of the top results."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: &ToolArgs, _ctx: &ToolContext) -> Result<String, ToolError> {
        let query = args
            .primary("query")
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'query' argument".into()))?;

        let hits = self.service.search(query).await?;
        if hits.is_empty() {
            return Ok(format!("No web results for \"{query}\"."));
        }

        let mut out = String::new();
        for (i, hit) in hits.iter().take(self.max_results).enumerate() {
            out.push_str(&format!("{}. {} - {}\n", i + 1, hit.title, hit.url));
            if !hit.snippet.is_empty() {
                out.push_str(&format!("   {}\n", hit.snippet));
            }
        }
        Ok(out.trim_end().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chorus_core::{ConversationId, ServiceError, WebHit};

    struct Fixed(Vec<WebHit>);

    #[async_trait]
    impl WebSearch for Fixed {
        async fn search(&self, _query: &str) -> Result<Vec<WebHit>, ServiceError> {
            Ok(self.0.clone())
        }
    }

    struct Down;

    #[async_trait]
    impl WebSearch for Down {
        async fn search(&self, _query: &str) -> Result<Vec<WebHit>, ServiceError> {
            Err(ServiceError::Status {
                service: "web search".into(),
                status_code: 502,
            })
        }
    }

    fn ctx() -> ToolContext {
        ToolContext {
            agent_id: "scout".into(),
            participant_id: "p-scout".into(),
            conversation_id: ConversationId::from("general"),
            trigger_message_id: "m-1".into(),
        }
    }

    fn hit(n: usize) -> WebHit {
        WebHit {
            title: format!("Result {n}"),
            url: format!("https://example.org/{n}"),
            snippet: if n == 1 { "first snippet".into() } else { String::new() },
        }
    }

    #[tokio::test]
    async fn bracket_argument_is_the_query() {
        let tool = WebSearchTool::new(Arc::new(Fixed(vec![hit(1), hit(2), hit(3)])), 2);
        let out = tool.execute(&ToolArgs::parse("openai gpt"), &ctx()).await.unwrap();
        assert_eq!(
            out,
            "1. Result 1 - https://example.org/1\n   first snippet\n2. Result 2 - https://example.org/2"
        );
    }

    #[tokio::test]
    async fn empty_query_is_rejected() {
        let tool = WebSearchTool::new(Arc::new(Fixed(vec![])), 3);
        let err = tool.execute(&ToolArgs::parse("   "), &ctx()).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
        let out = tool.execute(&ToolArgs::parse(r#"{"query":"rust"}"#), &ctx()).await.unwrap();
        assert_eq!(out, "No web results for \"rust\".");
    }

    #[tokio::test]
    async fn service_failure_propagates() {
        let tool = WebSearchTool::new(Arc::new(Down), 3);
        let err = tool.execute(&ToolArgs::parse("x"), &ctx()).await.unwrap_err();
        assert!(err.to_string().contains("502"));
    }
}
