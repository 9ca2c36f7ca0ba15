//! # chorus core
//!
//! Domain types, collaborator traits, and error definitions for the chorus
//! agent orchestration engine. Every external collaborator (message feed,
//! inference endpoint, knowledge base, web search) is a trait here;
//! implementations live in their own crates and all crates depend inward
//! on this one.

pub mod agent;
pub mod context;
pub mod error;
pub mod event;
pub mod feed;
pub mod inference;
pub mod message;
pub mod services;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use agent::{AgentConfig, AgentRuntimeState, Capabilities, ModelSettings, RuntimePhase, RuntimeSettings, ToolSettings};
pub use context::ContextSource;
pub use error::{
    ContextError, Error, FeedError, InferenceError, Result, RuntimeError, ServiceError, ToolError,
};
pub use event::{DomainEvent, EventBus, TriggerKind};
pub use feed::MessageFeed;
pub use inference::{
    ChatMessage, Completion, InferenceClient, InferenceParams, InferenceRequest, Role, StreamEvent,
    ToolDefinition, Usage,
};
pub use message::{ConversationId, Message, MessageCursor};
pub use services::{KnowledgeBase, KnowledgeHit, WebHit, WebSearch};
pub use tool::{Tool, ToolArgs, ToolCall, ToolContext, ToolKind, ToolName, ToolResult};
