//! Agent runtimes and their supervisor.
//!
//! Each configured agent runs as one [`AgentRuntime`]: it polls the shared
//! conversation, decides whether a new batch of messages calls for a
//! response, and then works through a bounded loop of inference and tool
//! calls before posting.
//!
//! 1. **Poll** the feed for messages after the cursor
//! 2. **Detect** a trigger: addressed, proactive or summarize
//! 3. **Build context** (short window, compressed to a token budget)
//! 4. **Infer**; if the reply carries tool calls, execute them, feed the
//!    results back and infer again, up to `max_rounds`
//! 5. **Reply** to the trigger message, or stay silent
//!
//! The [`Supervisor`] keeps one runtime per enabled config alive, restarts
//! crashed runtimes with backoff and follows config changes.

pub mod context;
pub mod factory;
pub mod runtime;
pub mod supervisor;

#[cfg(test)]
pub(crate) mod test_support;

pub use context::{ContextBuilder, ConversationContext, PendingAcks};
pub use factory::DefaultRuntimeFactory;
pub use runtime::{AgentRuntime, RuntimeParts, UNABLE_TO_COMPLETE};
pub use supervisor::{AgentStatus, RuntimeFactory, Supervisor};
