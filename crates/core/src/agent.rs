//! Agent configuration and runtime state types.
//!
//! An [`AgentConfig`] is an immutable snapshot: the supervisor replaces it
//! wholesale on reload and compares old and new values with `PartialEq` to
//! decide whether a runtime must be restarted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::message::{ConversationId, MessageCursor};
use crate::tool::ToolKind;

/// Configuration for one autonomous participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Unique agent id
    pub id: String,

    /// The conversation participant this agent speaks as
    pub participant_id: String,

    #[serde(default)]
    pub display_name: String,

    /// Extra names that count as addressing this agent (`@name`)
    #[serde(default)]
    pub mention_names: Vec<String>,

    #[serde(default)]
    pub system_prompt: String,

    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub capabilities: Capabilities,

    pub model: ModelSettings,

    #[serde(default)]
    pub tools: ToolSettings,

    #[serde(default)]
    pub runtime: RuntimeSettings,
}

impl AgentConfig {
    /// The name shown to the model and in logs.
    pub fn name(&self) -> &str {
        if self.display_name.is_empty() {
            &self.id
        } else {
            &self.display_name
        }
    }

    /// Tools this agent may actually call: the configured set, minus
    /// reactions when the agent cannot react.
    pub fn enabled_tools(&self) -> Vec<ToolKind> {
        let mut tools: Vec<ToolKind> = Vec::new();
        for kind in &self.tools.enabled {
            if *kind == ToolKind::React && !self.capabilities.can_react {
                continue;
            }
            if !tools.contains(kind) {
                tools.push(*kind);
            }
        }
        tools
    }
}

fn default_true() -> bool {
    true
}

/// What kinds of triggers the agent responds to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    #[serde(default = "default_true")]
    pub responds_when_addressed: bool,

    #[serde(default)]
    pub responds_proactively: bool,

    #[serde(default = "default_true")]
    pub can_react: bool,

    #[serde(default)]
    pub can_summarize: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            responds_when_addressed: true,
            responds_proactively: false,
            can_react: true,
            can_summarize: false,
        }
    }
}

/// Which provider and model to call, and how.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSettings {
    /// Provider name, a key of the `[providers]` table
    pub provider: String,

    /// Model name; `"default"` selects the provider default
    #[serde(default = "default_model")]
    pub name: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Use the streamed response mode
    #[serde(default)]
    pub stream: bool,
}

fn default_model() -> String {
    "default".into()
}

fn default_temperature() -> f32 {
    0.7
}

/// The agent's tool set and how calls within one round are executed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSettings {
    #[serde(default = "default_enabled_tools")]
    pub enabled: Vec<ToolKind>,

    /// Execute calls of one round strictly in order
    #[serde(default)]
    pub sequential: bool,

    /// Per-call timeout in seconds
    #[serde(default = "default_tool_timeout")]
    pub timeout_secs: u64,
}

impl ToolSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            enabled: default_enabled_tools(),
            sequential: false,
            timeout_secs: default_tool_timeout(),
        }
    }
}

fn default_enabled_tools() -> Vec<ToolKind> {
    ToolKind::ALL.to_vec()
}

fn default_tool_timeout() -> u64 {
    20
}

/// Scheduling and resource bounds for the agent runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeSettings {
    #[serde(default = "default_conversation")]
    pub conversation_id: ConversationId,

    /// Override for the provider endpoint URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Credential used for inference calls
    #[serde(default)]
    pub credential_alias: String,

    /// Credential used against the message feed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feed_credential_alias: Option<String>,

    #[serde(default = "default_cooldown")]
    pub proactive_cooldown_secs: u64,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,

    /// Maximum inference rounds per trigger
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,

    /// Messages in the short context window
    #[serde(default = "default_context_window")]
    pub context_window: usize,

    /// Hard cap for the full-history lookup
    #[serde(default = "default_full_context_cap")]
    pub full_context_cap: usize,

    /// Token budget before older messages are compressed
    #[serde(default = "default_token_budget")]
    pub context_token_budget: usize,

    /// Messages kept verbatim when compressing
    #[serde(default = "default_keep_recent")]
    pub keep_recent: usize,

    /// Summarize after this many new messages; 0 disables
    #[serde(default)]
    pub summarize_every: u32,

    #[serde(default = "default_retry_backoff")]
    pub inference_retry_backoff_ms: u64,
}

impl RuntimeSettings {
    pub fn proactive_cooldown(&self) -> Duration {
        Duration::from_secs(self.proactive_cooldown_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn inference_retry_backoff(&self) -> Duration {
        Duration::from_millis(self.inference_retry_backoff_ms)
    }
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            conversation_id: default_conversation(),
            endpoint: None,
            credential_alias: String::new(),
            feed_credential_alias: None,
            proactive_cooldown_secs: default_cooldown(),
            poll_interval_ms: default_poll_interval(),
            heartbeat_interval_secs: default_heartbeat_interval(),
            max_rounds: default_max_rounds(),
            context_window: default_context_window(),
            full_context_cap: default_full_context_cap(),
            context_token_budget: default_token_budget(),
            keep_recent: default_keep_recent(),
            summarize_every: 0,
            inference_retry_backoff_ms: default_retry_backoff(),
        }
    }
}

fn default_conversation() -> ConversationId {
    ConversationId::from("general")
}
fn default_cooldown() -> u64 {
    300
}
fn default_poll_interval() -> u64 {
    2_000
}
fn default_heartbeat_interval() -> u64 {
    30
}
fn default_max_rounds() -> u32 {
    3
}
fn default_context_window() -> usize {
    20
}
fn default_full_context_cap() -> usize {
    200
}
fn default_token_budget() -> usize {
    4_000
}
fn default_keep_recent() -> usize {
    8
}
fn default_retry_backoff() -> u64 {
    1_000
}

/// Where a runtime is in its trigger cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimePhase {
    #[default]
    Idle,
    Polling,
    Triggered,
    BuildingContext,
    Inferring,
    ExecutingTools,
    Replying,
    CoolingDown,
    Stopped,
}

impl std::fmt::Display for RuntimePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Polling => "polling",
            Self::Triggered => "triggered",
            Self::BuildingContext => "building_context",
            Self::Inferring => "inferring",
            Self::ExecutingTools => "executing_tools",
            Self::Replying => "replying",
            Self::CoolingDown => "cooling_down",
            Self::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Read-only snapshot of a runtime's mutable state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentRuntimeState {
    pub agent_id: String,

    pub phase: RuntimePhase,

    /// Last message the runtime has fully processed
    pub cursor: Option<MessageCursor>,

    pub last_proactive_at: Option<DateTime<Utc>>,

    /// Round of the trigger currently in flight (0 when idle)
    pub round: u32,

    pub last_heartbeat_at: Option<DateTime<Utc>>,

    pub running: bool,

    pub triggers_handled: u64,

    pub replies_posted: u64,

    pub last_error: Option<String>,
}

impl AgentRuntimeState {
    pub fn new(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            ..Self::default()
        }
    }
}
