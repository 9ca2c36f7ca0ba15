//! Inference client trait: the abstraction over model endpoints.
//!
//! An inference client knows how to send a chat-style conversation to a
//! model endpoint and get text back, either complete or as a stream of
//! channel-tagged events.
//!
//! Implementations: OpenAI-compatible, Anthropic.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::InferenceError;

/// The role of a chat message sent to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single chat turn in an inference request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// A tool definition sent to the model so it knows what it can call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The function name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

/// Sampling parameters for one inference call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceParams {
    /// The model to use; `"default"` or empty selects the provider default
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

fn default_temperature() -> f32 {
    0.7
}

impl Default for InferenceParams {
    fn default() -> Self {
        Self {
            model: "default".into(),
            temperature: default_temperature(),
            max_tokens: None,
        }
    }
}

/// Configuration for an inference request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceRequest {
    pub messages: Vec<ChatMessage>,

    pub params: InferenceParams,

    /// Tools offered natively, for providers that support tool use
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
}

/// A complete (non-streaming) response from an inference endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    /// Raw model text, possibly channel-tagged
    pub text: String,

    /// Which model actually responded
    pub model: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

/// Token usage information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// An incremental event record in a streamed response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "content", rename_all = "kebab-case")]
pub enum StreamEvent {
    /// The model switched to the named channel
    ChannelSwitch(String),
    /// Private reasoning text
    Reasoning(String),
    /// User-visible text on the final channel
    Final(String),
    /// Text on whatever channel is current
    Chunk(String),
}

/// The core inference client trait.
///
/// The agent runtime calls `complete()` or `stream()` without knowing which
/// provider is behind it.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    /// A human-readable name for this client (e.g., "openai", "anthropic").
    fn name(&self) -> &str;

    /// Send a request and get the complete response.
    async fn complete(&self, request: InferenceRequest) -> Result<Completion, InferenceError>;

    /// Send a request and get a stream of events. The stream ends when the
    /// sender is dropped.
    ///
    /// Default implementation calls `complete()` and wraps the text as a
    /// single chunk.
    async fn stream(
        &self,
        request: InferenceRequest,
    ) -> Result<mpsc::Receiver<StreamEvent>, InferenceError> {
        let completion = self.complete(request).await?;
        let (tx, rx) = mpsc::channel(1);
        let _ = tx.send(StreamEvent::Chunk(completion.text)).await;
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl InferenceClient for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        async fn complete(&self, request: InferenceRequest) -> Result<Completion, InferenceError> {
            let last = request.messages.last().map(|m| m.content.clone()).unwrap_or_default();
            Ok(Completion { text: last, model: request.params.model, usage: None })
        }
    }

    #[test]
    fn stream_event_wire_shape() {
        let json = serde_json::to_value(StreamEvent::ChannelSwitch("final".into())).unwrap();
        assert_eq!(json, serde_json::json!({"type": "channel-switch", "content": "final"}));

        let event: StreamEvent =
            serde_json::from_str(r#"{"type":"reasoning","content":"hmm"}"#).unwrap();
        assert_eq!(event, StreamEvent::Reasoning("hmm".into()));
    }

    #[test]
    fn params_default_to_provider_model() {
        let params = InferenceParams::default();
        assert_eq!(params.model, "default");
        assert!((params.temperature - 0.7).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn default_stream_wraps_completion() {
        let request = InferenceRequest {
            messages: vec![ChatMessage::user("ping")],
            params: InferenceParams::default(),
            tools: vec![],
        };
        let mut rx = Echo.stream(request).await.unwrap();
        assert_eq!(rx.recv().await, Some(StreamEvent::Chunk("ping".into())));
        assert_eq!(rx.recv().await, None);
    }
}
