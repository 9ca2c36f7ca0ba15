//! OpenAI-compatible inference client.
//!
//! Works with: OpenAI, OpenRouter, Ollama, vLLM, llama.cpp, and any
//! endpoint exposing `/chat/completions`.
//!
//! Native `tool_calls` in a response are rendered into the channel-tagged
//! text form so the protocol codec stays the only parser.

use async_trait::async_trait;
use chorus_core::{
    ChatMessage, Completion, InferenceClient, InferenceError, InferenceRequest, Role, StreamEvent,
    ToolDefinition, Usage,
};
use chorus_protocol::render_tool_call;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::sse::{SseDecoder, SseFrame, event_record};
use crate::{http_client, map_status};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

pub struct OpenAiCompatClient {
    name: String,
    base_url: String,
    api_key: Option<String>,
    default_model: String,
    client: reqwest::Client,
}

impl OpenAiCompatClient {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            default_model: "gpt-4o-mini".into(),
            client: http_client(Duration::from_secs(120)),
        }
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = http_client(timeout);
        self
    }

    fn model<'a>(&'a self, requested: &'a str) -> &'a str {
        if requested.is_empty() || requested == "default" {
            &self.default_model
        } else {
            requested
        }
    }

    fn to_api_messages(messages: &[ChatMessage]) -> Vec<ApiMessage> {
        messages
            .iter()
            .map(|m| ApiMessage {
                role: match m.role {
                    Role::System => "system".into(),
                    Role::User => "user".into(),
                    Role::Assistant => "assistant".into(),
                },
                content: Some(m.content.clone()),
                tool_calls: None,
            })
            .collect()
    }

    fn to_api_tools(tools: &[ToolDefinition]) -> Vec<ApiToolDefinition> {
        tools
            .iter()
            .map(|t| ApiToolDefinition {
                r#type: "function".into(),
                function: ApiToolFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                },
            })
            .collect()
    }

    fn body(&self, request: &InferenceRequest, stream: bool) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.model(&request.params.model),
            "messages": Self::to_api_messages(&request.messages),
            "temperature": request.params.temperature,
            "stream": stream,
        });
        if let Some(max_tokens) = request.params.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }
        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(&request.tools));
        }
        body
    }

    async fn send(&self, body: &serde_json::Value) -> Result<reqwest::Response, InferenceError> {
        let url = format!("{}/chat/completions", self.base_url);
        let mut req = self.client.post(&url).json(body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        let response = req
            .send()
            .await
            .map_err(|e| InferenceError::Connection(e.to_string()))?;
        map_status(&self.name, response).await
    }

    /// Visible content plus any native tool calls in channel form.
    fn render_message(message: ApiMessage) -> String {
        let mut text = message.content.unwrap_or_default();
        for call in message.tool_calls.unwrap_or_default() {
            text.push_str(&render_tool_call(&call.function.name, &call.function.arguments));
        }
        text
    }
}

#[async_trait]
impl InferenceClient for OpenAiCompatClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: InferenceRequest) -> Result<Completion, InferenceError> {
        let body = self.body(&request, false);
        debug!(provider = %self.name, model = %body["model"], "Sending completion request");

        let response = self.send(&body).await?;
        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| InferenceError::MalformedPayload(e.to_string()))?;

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| InferenceError::MalformedPayload("no choices in response".into()))?;

        let text = Self::render_message(choice.message);
        if text.trim().is_empty() {
            return Err(InferenceError::EmptyCompletion);
        }

        Ok(Completion {
            text,
            model: api_response.model,
            usage: api_response.usage.map(|u| Usage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
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

        // Spawn task to read the SSE byte stream and forward events
        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut decoder = SseDecoder::new();
            let mut tool_calls: BTreeMap<u32, ToolCallAccumulator> = BTreeMap::new();

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
                        SseFrame::Event(_) => continue,
                        SseFrame::Data(data) => data,
                    };

                    if let Some(event) = event_record(&data) {
                        if tx.send(event).await.is_err() {
                            return;
                        }
                        continue;
                    }

                    let chunk: StreamResponse = match serde_json::from_str(&data) {
                        Ok(chunk) => chunk,
                        Err(e) => {
                            trace!(provider = %provider_name, error = %e, "Malformed SSE chunk, ending stream");
                            break 'read;
                        }
                    };

                    for event in chunk.into_events(&mut tool_calls) {
                        if tx.send(event).await.is_err() {
                            return;
                        }
                    }
                }
            }

            for acc in tool_calls.into_values() {
                let rendered = render_tool_call(&acc.name, &acc.arguments);
                if tx.send(StreamEvent::Chunk(rendered)).await.is_err() {
                    return;
                }
            }
        });

        Ok(rx)
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    function: ApiFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Serialize)]
struct ApiToolDefinition {
    r#type: String,
    function: ApiToolFunction,
}

#[derive(Debug, Serialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    model: String,
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

// --- Streaming SSE types ---

#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

impl StreamResponse {
    fn into_events(self, tool_calls: &mut BTreeMap<u32, ToolCallAccumulator>) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        for choice in self.choices {
            let delta = choice.delta;
            if let Some(reasoning) = delta.reasoning.or(delta.reasoning_content).filter(|r| !r.is_empty()) {
                events.push(StreamEvent::Reasoning(reasoning));
            }
            if let Some(content) = delta.content.filter(|c| !c.is_empty()) {
                events.push(StreamEvent::Chunk(content));
            }
            for tc in delta.tool_calls.unwrap_or_default() {
                let acc = tool_calls.entry(tc.index).or_default();
                if let Some(func) = tc.function {
                    if let Some(name) = func.name {
                        acc.name = name;
                    }
                    if let Some(args) = func.arguments {
                        acc.arguments.push_str(&args);
                    }
                }
            }
        }
        events
    }
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reasoning: Option<String>,
    #[serde(default)]
    reasoning_content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<StreamToolCallDelta>>,
}

/// A tool call delta; arrives incrementally across chunks.
#[derive(Debug, Deserialize)]
struct StreamToolCallDelta {
    index: u32,
    #[serde(default)]
    function: Option<StreamFunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct StreamFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Debug, Default)]
struct ToolCallAccumulator {
    name: String,
    arguments: String,
}
