//! Tool executor and the built-in tools agents can call.
//!
//! Five tools exist, one per [`ToolKind`](chorus_core::ToolKind):
//! conversation context (short and full), web search, knowledge-base
//! query and emoji reaction. Each wraps an external collaborator; the
//! [`ToolExecutor`] dispatches parsed calls to them.

pub mod context_lookup;
pub mod executor;
pub mod knowledge_base;
pub mod react;
pub mod services;
pub mod web_search;

use std::sync::Arc;

use chorus_core::{ContextSource, KnowledgeBase, MessageFeed, Tool, WebSearch};

pub use context_lookup::{ContextLookupTool, LongContextLookupTool};
pub use executor::ToolExecutor;
pub use knowledge_base::KnowledgeBaseQueryTool;
pub use react::ReactTool;
pub use services::{HttpKnowledgeBase, HttpWebSearch};
pub use web_search::WebSearchTool;

/// The collaborators the built-in tools talk to.
#[derive(Clone)]
pub struct Collaborators {
    pub feed: Arc<dyn MessageFeed>,
    pub context: Arc<dyn ContextSource>,
    pub knowledge_base: Arc<dyn KnowledgeBase>,
    pub web_search: Arc<dyn WebSearch>,
}

/// Limits applied when building the tools for one agent.
#[derive(Debug, Clone, Copy)]
pub struct ToolLimits {
    pub context_window: usize,
    pub full_context_cap: usize,
    pub top_k: usize,
}

/// Build all five tools.
pub fn builtin_tools(collaborators: &Collaborators, limits: ToolLimits) -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(ContextLookupTool::new(collaborators.context.clone(), limits.context_window)),
        Arc::new(LongContextLookupTool::new(collaborators.context.clone(), limits.full_context_cap)),
        Arc::new(WebSearchTool::new(collaborators.web_search.clone(), limits.top_k)),
        Arc::new(KnowledgeBaseQueryTool::new(collaborators.knowledge_base.clone(), limits.top_k)),
        Arc::new(ReactTool::new(collaborators.feed.clone())),
    ]
}
