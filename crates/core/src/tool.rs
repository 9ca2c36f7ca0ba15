//! Tool types: the closed set of capabilities an agent may invoke.
//!
//! The model names tools in two vocabularies (bracket tags such as
//! `[WEB_SEARCH:...]` and channel recipients such as `functions.web_search`).
//! Both resolve through [`ToolName::resolve`] to one [`ToolKind`], or to
//! [`ToolName::Unsupported`] when the name is outside the closed set.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ToolError;
use crate::inference::ToolDefinition;
use crate::message::ConversationId;

/// Supported tool kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ToolKind {
    /// Messages around a given message
    ContextLookup,
    /// Full conversation history (expensive)
    LongContextLookup,
    /// External web search
    WebSearch,
    /// Vector knowledge-base search
    KnowledgeBaseQuery,
    /// Emoji reaction on a message
    React,
}

impl ToolKind {
    pub const ALL: [ToolKind; 5] = [
        ToolKind::ContextLookup,
        ToolKind::LongContextLookup,
        ToolKind::WebSearch,
        ToolKind::KnowledgeBaseQuery,
        ToolKind::React,
    ];

    /// Canonical name, e.g. `web-search`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ContextLookup => "context-lookup",
            Self::LongContextLookup => "long-context-lookup",
            Self::WebSearch => "web-search",
            Self::KnowledgeBaseQuery => "knowledge-base-query",
            Self::React => "react",
        }
    }

    /// Function name used on the tool channel, e.g. `web_search`.
    pub fn function_name(&self) -> &'static str {
        match self {
            Self::ContextLookup => "context_lookup",
            Self::LongContextLookup => "long_context_lookup",
            Self::WebSearch => "web_search",
            Self::KnowledgeBaseQuery => "knowledge_base_query",
            Self::React => "react",
        }
    }

    /// Legacy inline tag, e.g. `WEB_SEARCH` in `[WEB_SEARCH:query]`.
    pub fn bracket_tag(&self) -> &'static str {
        match self {
            Self::ContextLookup => "CONTEXT",
            Self::LongContextLookup => "LONG_CONTEXT",
            Self::WebSearch => "WEB_SEARCH",
            Self::KnowledgeBaseQuery => "KB_QUERY",
            Self::React => "REACT",
        }
    }

    /// Exact inverse of [`bracket_tag`](Self::bracket_tag). Case matters.
    pub fn from_bracket_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.bracket_tag() == tag)
    }

    /// Resolve any of the known spellings of a tool name.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        let name = name.strip_prefix("functions.").unwrap_or(name);
        let normalized = name.to_ascii_lowercase().replace('-', "_");
        match normalized.as_str() {
            "context_lookup" | "context" => Some(Self::ContextLookup),
            "long_context_lookup" | "long_context" => Some(Self::LongContextLookup),
            "web_search" | "search" => Some(Self::WebSearch),
            "knowledge_base_query" | "kb_query" | "knowledge_base" | "kb" => {
                Some(Self::KnowledgeBaseQuery)
            }
            "react" | "reaction" => Some(Self::React),
            _ => None,
        }
    }
}

impl std::fmt::Display for ToolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tool name as requested by the model: either one of the closed set or
/// an explicit unsupported name that is answered without side effects.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum ToolName {
    Known(ToolKind),
    Unsupported(String),
}

impl ToolName {
    pub fn resolve(name: &str) -> Self {
        match ToolKind::from_name(name) {
            Some(kind) => Self::Known(kind),
            None => Self::Unsupported(name.trim().to_string()),
        }
    }

    pub fn kind(&self) -> Option<ToolKind> {
        match self {
            Self::Known(kind) => Some(*kind),
            Self::Unsupported(_) => None,
        }
    }
}

impl std::fmt::Display for ToolName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Known(kind) => f.write_str(kind.as_str()),
            Self::Unsupported(name) => f.write_str(name),
        }
    }
}

/// A request to execute a tool, parsed from model output.
///
/// Not `Clone`; the executor consumes each call.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Call id, unique within one trigger cycle
    pub id: String,

    /// Which tool the model asked for
    pub tool: ToolName,

    /// The raw argument payload exactly as the model wrote it
    pub arguments: String,

    /// The round in which the model issued the call
    pub round: u32,
}

impl ToolCall {
    pub fn new(tool: ToolName, arguments: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            tool,
            arguments: arguments.into(),
            round: 0,
        }
    }

    /// Stamp the call with its originating round and position.
    pub fn in_round(mut self, round: u32, index: usize) -> Self {
        self.round = round;
        self.id = format!("r{round}c{index}");
        self
    }

    pub fn args(&self) -> ToolArgs {
        ToolArgs::parse(&self.arguments)
    }
}

/// The normalized outcome of one tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// The call this result answers
    pub call_id: String,

    pub tool: ToolName,

    pub success: bool,

    /// Normalized payload on success
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub payload: String,

    /// Error description on failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Wall-clock execution time
    #[serde(with = "duration_ms")]
    pub latency: Duration,
}

impl ToolResult {
    pub fn ok(call: &ToolCall, payload: impl Into<String>, latency: Duration) -> Self {
        Self {
            call_id: call.id.clone(),
            tool: call.tool.clone(),
            success: true,
            payload: payload.into(),
            error: None,
            latency,
        }
    }

    pub fn failure(call: &ToolCall, error: impl Into<String>, latency: Duration) -> Self {
        Self {
            call_id: call.id.clone(),
            tool: call.tool.clone(),
            success: false,
            payload: String::new(),
            error: Some(error.into()),
            latency,
        }
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

/// Tool arguments: either a JSON object (channel format) or a bare string
/// (bracket format).
#[derive(Debug, Clone, PartialEq)]
pub struct ToolArgs {
    raw: String,
    object: Option<serde_json::Map<String, serde_json::Value>>,
}

impl ToolArgs {
    pub fn parse(raw: &str) -> Self {
        let object = match serde_json::from_str::<serde_json::Value>(raw.trim()) {
            Ok(serde_json::Value::Object(map)) => Some(map),
            _ => None,
        };
        Self {
            raw: raw.to_string(),
            object,
        }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// A named string field from a JSON payload.
    pub fn field(&self, key: &str) -> Option<&str> {
        self.object.as_ref()?.get(key)?.as_str()
    }

    /// A named integer field from a JSON payload.
    pub fn integer(&self, key: &str) -> Option<u64> {
        self.object.as_ref()?.get(key)?.as_u64()
    }

    /// The primary argument: the named JSON field, or the whole raw payload
    /// when the arguments are not a JSON object. Empty values are `None`.
    pub fn primary(&self, key: &str) -> Option<&str> {
        let value = match &self.object {
            Some(_) => self.field(key)?,
            None => self.raw.as_str(),
        };
        let value = value.trim();
        (!value.is_empty()).then_some(value)
    }
}

/// Where a tool call is being executed from.
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub agent_id: String,
    pub participant_id: String,
    pub conversation_id: ConversationId,
    /// The message that triggered the current cycle
    pub trigger_message_id: String,
}

/// The core Tool trait.
///
/// One implementation exists per [`ToolKind`]; the executor holds them in a
/// fixed dispatch table.
#[async_trait]
pub trait Tool: Send + Sync {
    fn kind(&self) -> ToolKind;

    /// A description of what this tool does (sent to the model).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool and return the normalized payload.
    async fn execute(&self, args: &ToolArgs, ctx: &ToolContext) -> std::result::Result<String, ToolError>;

    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.kind().function_name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}
