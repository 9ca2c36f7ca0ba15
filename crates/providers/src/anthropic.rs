//! Anthropic Messages API client.
//!
//! - `x-api-key` header authentication (not Bearer)
//! - `anthropic-version` header
//! - System messages lifted into the top-level `system` field
//! - `tool_use` blocks rendered into channel-tagged text
//! - Streaming via SSE with `content_block_delta` events

use async_trait::async_trait;
use chorus_core::{
    ChatMessage, Completion, InferenceClient, InferenceError, InferenceRequest, Role, StreamEvent,
    ToolDefinition, Usage,
};
use chorus_protocol::{Marker, render_tool_call};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::sse::{SseDecoder, SseFrame};
use crate::{http_client, map_status};

const ANTHROPIC_VERSION: &str = "2023-06-01";
pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
const DEFAULT_MAX_TOKENS: u32 = 1024;

pub struct AnthropicClient {
    name: String,
    base_url: String,
    api_key: String,
    default_model: String,
    client: reqwest::Client,
}

impl AnthropicClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            name: "anthropic".into(),
            base_url: DEFAULT_BASE_URL.into(),
            api_key: api_key.into(),
            default_model: DEFAULT_MODEL.into(),
            client: http_client(Duration::from_secs(300)),
        }
    }

    /// Custom base URL (e.g., for testing or proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = http_client(timeout);
        self
    }

    /// Split system messages out of the conversation; Anthropic takes the
    /// system prompt as a top-level field.
    fn extract_system(messages: &[ChatMessage]) -> (Option<String>, Vec<AnthropicMessage>) {
        let mut system_parts: Vec<&str> = Vec::new();
        let mut rest: Vec<AnthropicMessage> = Vec::new();

        for msg in messages {
            let role = match msg.role {
                Role::System => {
                    system_parts.push(&msg.content);
                    continue;
                }
                Role::User => "user",
                Role::Assistant => "assistant",
            };
            // Consecutive turns of one role are merged; the API requires alternation
            match rest.last_mut() {
                Some(prev) if prev.role == role => {
                    prev.content.push_str("\n\n");
                    prev.content.push_str(&msg.content);
                }
                _ => rest.push(AnthropicMessage {
                    role: role.into(),
                    content: msg.content.clone(),
                }),
            }
        }

        let system = (!system_parts.is_empty()).then(|| system_parts.join("\n\n"));
        (system, rest)
    }

    fn to_api_tools(tools: &[ToolDefinition]) -> Vec<AnthropicTool> {
        tools
            .iter()
            .map(|t| AnthropicTool {
                name: t.name.clone(),
                description: t.description.clone(),
                input_schema: t.parameters.clone(),
            })
            .collect()
    }

    fn body(&self, request: &InferenceRequest, stream: bool) -> serde_json::Value {
        let (system, messages) = Self::extract_system(&request.messages);
        let model = match request.params.model.as_str() {
            "" | "default" => self.default_model.as_str(),
            other => other,
        };

        let mut body = serde_json::json!({
            "model": model,
            "messages": messages,
            "max_tokens": request.params.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            "temperature": request.params.temperature,
        });
        if stream {
            body["stream"] = serde_json::json!(true);
        }
        if let Some(sys) = system {
            body["system"] = serde_json::json!(sys);
        }
        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(&request.tools));
        }
        body
    }

    async fn send(&self, body: &serde_json::Value) -> Result<reqwest::Response, InferenceError> {
        let url = format!("{}/v1/messages", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(body)
            .send()
            .await
            .map_err(|e| InferenceError::Connection(e.to_string()))?;
        map_status(&self.name, response).await
    }

    /// Render content blocks as channel-tagged text.
    fn render_blocks(blocks: Vec<ContentBlock>) -> String {
        let mut text = String::new();
        for block in blocks {
            match block {
                ContentBlock::Text { text: t } => text.push_str(&t),
                ContentBlock::Thinking { thinking } => text.push_str(&reasoning_segment(&thinking)),
                ContentBlock::ToolUse { name, input } => {
                    let args = match input {
                        serde_json::Value::String(s) => s,
                        other => other.to_string(),
                    };
                    text.push_str(&render_tool_call(&name, &args));
                }
                ContentBlock::Other => {}
            }
        }
        text
    }
}

fn reasoning_segment(thinking: &str) -> String {
    format!(
        "{}analysis{}{thinking}{}",
        Marker::Channel.as_str(),
        Marker::Message.as_str(),
        Marker::End.as_str()
    )
}

#[async_trait]
impl InferenceClient for AnthropicClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: InferenceRequest) -> Result<Completion, InferenceError> {
        let body = self.body(&request, false);
        debug!(provider = %self.name, model = %body["model"], "Sending completion request");

        let response = self.send(&body).await?;
        let api_resp: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| InferenceError::MalformedPayload(e.to_string()))?;

        let text = Self::render_blocks(api_resp.content);
        if chorus_protocol::strip(&text).trim().is_empty() {
            return Err(InferenceError::EmptyCompletion);
        }

        Ok(Completion {
            text,
            model: api_resp.model,
            usage: api_resp.usage.map(|u| Usage {
                prompt_tokens: u.input_tokens,
                completion_tokens: u.output_tokens,
                total_tokens: u.input_tokens + u.output_tokens,
            }),
        })
    }

    async fn stream(
        &self,
        request: InferenceRequest,
    ) -> Result<mpsc::Receiver<StreamEvent>, InferenceError> {
        let body = self.body(&request, true);
        debug!(provider = %self.name, model = %body["model"], "Sending streaming request");

        let response = self.send(&body).await?;
        let (tx, rx) = mpsc::channel(64);
        let provider_name = self.name.clone();

        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut decoder = SseDecoder::new();
            let mut tool: Option<(String, String)> = None;

            'read: while let Some(chunk) = byte_stream.next().await {
                let bytes = match chunk {
                    Ok(b) => b,
                    Err(e) => {
                        warn!(provider = %provider_name, error = %e, "Stream interrupted");
                        break;
                    }
                };

                for frame in decoder.push(&bytes) {
                    let data = match frame {
                        SseFrame::Done => break 'read,
                        SseFrame::Event(event) if event == "message_stop" => break 'read,
                        SseFrame::Event(_) => continue,
                        SseFrame::Data(data) => data,
                    };

                    let event: serde_json::Value = match serde_json::from_str(&data) {
                        Ok(v) => v,
                        Err(e) => {
                            trace!(error = %e, "Malformed Anthropic SSE frame, ending stream");
                            break 'read;
                        }
                    };

                    let out = match event["type"].as_str().unwrap_or("") {
                        "content_block_start" => {
                            let block = &event["content_block"];
                            if block["type"].as_str() == Some("tool_use") {
                                let name = block["name"].as_str().unwrap_or("").to_string();
                                tool = Some((name, String::new()));
                            }
                            None
                        }
                        "content_block_delta" => {
                            let delta = &event["delta"];
                            match delta["type"].as_str().unwrap_or("") {
                                "text_delta" => delta["text"].as_str().map(|t| StreamEvent::Chunk(t.into())),
                                "thinking_delta" => {
                                    delta["thinking"].as_str().map(|t| StreamEvent::Reasoning(t.into()))
                                }
                                "input_json_delta" => {
                                    if let (Some((_, args)), Some(partial)) =
                                        (tool.as_mut(), delta["partial_json"].as_str())
                                    {
                                        args.push_str(partial);
                                    }
                                    None
                                }
                                _ => None,
                            }
                        }
                        "content_block_stop" => tool
                            .take()
                            .map(|(name, args)| StreamEvent::Chunk(render_tool_call(&name, &args))),
                        "message_stop" => break 'read,
                        _ => None,
                    };

                    if let Some(event) = out {
                        if tx.send(event).await.is_err() {
                            return;
                        }
                    }
                }
            }

            // Stream ended mid tool block
            if let Some((name, args)) = tool.take() {
                let _ = tx.send(StreamEvent::Chunk(render_tool_call(&name, &args))).await;
            }
        });

        Ok(rx)
    }
}

// --- Anthropic API types (internal) ---

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct AnthropicTool {
    name: String,
    description: String,
    input_schema: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    model: String,
    #[serde(default)]
    content: Vec<ContentBlock>,
    usage: Option<AnthropicUsage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    Thinking {
        thinking: String,
    },
    ToolUse {
        name: String,
        #[serde(default)]
        input: serde_json::Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}
