//! Error types for the chorus domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each collaborator boundary has its own error enum so callers can
//! inspect the failure kind instead of matching on strings.

use thiserror::Error;

/// The top-level error type for chorus operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Inference error: {0}")]
    Inference(#[from] InferenceError),

    #[error("Feed error: {0}")]
    Feed(#[from] FeedError),

    #[error("Service error: {0}")]
    Service(#[from] ServiceError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Context error: {0}")]
    Context(#[from] ContextError),

    #[error("Runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Collaborator errors ---

/// Failures surfaced by an inference endpoint.
///
/// None of these are process-fatal; the agent runtime retries once and
/// then abandons the trigger.
#[derive(Debug, Clone, Error)]
pub enum InferenceError {
    #[error("Connection to inference endpoint failed: {0}")]
    Connection(String),

    #[error("Inference endpoint returned status {status_code}: {body}")]
    Status { status_code: u16, body: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Malformed inference payload: {0}")]
    MalformedPayload(String),

    #[error("Inference endpoint returned an empty completion")]
    EmptyCompletion,
}

impl InferenceError {
    /// Whether a retry has a reasonable chance of succeeding.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Connection(_) | Self::RateLimited { .. } | Self::EmptyCompletion => true,
            Self::Status { status_code, .. } => *status_code >= 500 || *status_code == 408,
            Self::MalformedPayload(_) => false,
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum FeedError {
    #[error("Feed request failed: {0}")]
    Connection(String),

    #[error("Feed returned status {status_code}: {body}")]
    Status { status_code: u16, body: String },

    #[error("Feed rejected the agent credential")]
    Unauthorized,

    #[error("Malformed feed payload: {0}")]
    MalformedPayload(String),

    #[error("Message not found: {0}")]
    NotFound(String),
}

/// Failures from the knowledge-base and web-search services.
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    #[error("{service} request failed: {reason}")]
    Connection { service: String, reason: String },

    #[error("{service} returned status {status_code}")]
    Status { service: String, status_code: u16 },

    #[error("{service} returned a malformed payload: {reason}")]
    MalformedPayload { service: String, reason: String },

    #[error("{0} is not configured")]
    NotConfigured(String),
}

#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Unsupported tool: {0}")]
    Unsupported(String),

    #[error("Tool {tool_name} failed: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error(transparent)]
    Feed(#[from] FeedError),

    #[error(transparent)]
    Context(#[from] ContextError),
}

#[derive(Debug, Clone, Error)]
pub enum ContextError {
    #[error("Trigger message {0} is not in the conversation history")]
    MessageNotFound(String),

    #[error("Could not fetch conversation history: {0}")]
    History(#[from] FeedError),
}

/// Errors that end or prevent an agent runtime.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Agent {agent_id} cannot start: {reason}")]
    Config { agent_id: String, reason: String },

    #[error("Agent {agent_id} could not build context: {source}")]
    Context {
        agent_id: String,
        #[source]
        source: ContextError,
    },

    #[error("Agent {agent_id} lost its message feed: {source}")]
    Feed {
        agent_id: String,
        #[source]
        source: FeedError,
    },

    #[error("Agent {0} was stopped")]
    Stopped(String),
}
