//! Configuration loading, validation, and management for chorus.
//!
//! Loads configuration from `~/.chorus/config.toml` (or an explicit path).
//! Global sections are validated at load; each agent is validated on its
//! own when its runtime is built, so one bad agent never blocks the others.

mod source;

pub use source::{AgentConfigSource, FileConfigSource, StaticConfigSource};

use chorus_core::AgentConfig;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The root configuration structure.
///
/// Maps directly to `~/.chorus/config.toml`.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub supervisor: SupervisorConfig,

    #[serde(default)]
    pub feed: FeedConfig,

    #[serde(default)]
    pub knowledge_base: ServiceConfig,

    #[serde(default)]
    pub web_search: ServiceConfig,

    /// Inference providers by name
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    /// Credential alias → secret
    #[serde(default)]
    pub credentials: HashMap<String, String>,

    #[serde(default)]
    pub agents: Vec<AgentConfig>,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let aliases: Vec<&String> = self.credentials.keys().collect();
        let credentials = format!("[REDACTED: {aliases:?}]");
        f.debug_struct("AppConfig")
            .field("supervisor", &self.supervisor)
            .field("feed", &self.feed)
            .field("knowledge_base", &self.knowledge_base)
            .field("web_search", &self.web_search)
            .field("providers", &self.providers)
            .field("credentials", &credentials)
            .field("agents", &self.agents)
            .finish()
    }
}

fn default_true() -> bool {
    true
}

/// Supervisor scheduling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// How often the agent list is re-read
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,

    #[serde(default = "default_restart_initial_backoff")]
    pub restart_initial_backoff_ms: u64,

    #[serde(default = "default_restart_max_backoff")]
    pub restart_max_backoff_secs: u64,
}

impl SupervisorConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn restart_initial_backoff(&self) -> Duration {
        Duration::from_millis(self.restart_initial_backoff_ms)
    }

    pub fn restart_max_backoff(&self) -> Duration {
        Duration::from_secs(self.restart_max_backoff_secs)
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: default_refresh_interval(),
            restart_initial_backoff_ms: default_restart_initial_backoff(),
            restart_max_backoff_secs: default_restart_max_backoff(),
        }
    }
}

fn default_refresh_interval() -> u64 {
    30
}
fn default_restart_initial_backoff() -> u64 {
    1_000
}
fn default_restart_max_backoff() -> u64 {
    300
}

/// The external message feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    #[serde(default = "default_feed_url")]
    pub base_url: String,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl FeedConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            base_url: default_feed_url(),
            timeout_secs: default_timeout(),
        }
    }
}

fn default_feed_url() -> String {
    "http://127.0.0.1:8000".into()
}
fn default_timeout() -> u64 {
    15
}

/// A search collaborator (knowledge base or web search).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Unset means the service is not available
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_alias: Option<String>,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Hits returned when the caller does not ask for a number
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl ServiceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            credential_alias: None,
            timeout_secs: default_timeout(),
            top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    5
}

/// Wire protocol spoken by a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// `/chat/completions` (OpenAI, OpenRouter, Ollama, vLLM, ...)
    OpenAi,
    /// `/v1/messages`
    Anthropic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub kind: ProviderKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    /// Model used when an agent asks for `"default"`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,

    /// Concurrent requests allowed per credential
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    #[serde(default = "default_inference_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_max_concurrent() -> usize {
    1
}
fn default_inference_timeout() -> u64 {
    120
}

/// Everything needed to build an inference client for one agent.
#[derive(Clone)]
pub struct ResolvedProvider {
    pub name: String,
    pub kind: ProviderKind,
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub credential_alias: String,
    pub default_model: Option<String>,
    pub max_concurrent: usize,
    pub timeout: Duration,
}

impl std::fmt::Debug for ResolvedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedProvider")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("api_url", &self.api_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("credential_alias", &self.credential_alias)
            .field("default_model", &self.default_model)
            .field("max_concurrent", &self.max_concurrent)
            .finish()
    }
}

impl AppConfig {
    /// Load configuration from the default path (`~/.chorus/config.toml`).
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::default_path())
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    pub fn config_dir() -> PathBuf {
        dirs_home().join(".chorus")
    }

    pub fn default_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Validate the global sections and the uniqueness of agent ids.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.supervisor.refresh_interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "supervisor.refresh_interval_secs must be > 0".into(),
            ));
        }
        if self.supervisor.restart_initial_backoff_ms == 0 {
            return Err(ConfigError::ValidationError(
                "supervisor.restart_initial_backoff_ms must be > 0".into(),
            ));
        }
        for (name, provider) in &self.providers {
            if provider.max_concurrent == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "providers.{name}.max_concurrent must be >= 1"
                )));
            }
        }

        let mut seen = HashSet::new();
        for agent in &self.agents {
            if agent.id.trim().is_empty() {
                return Err(ConfigError::ValidationError("agent id must not be empty".into()));
            }
            if !seen.insert(agent.id.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate agent id '{}'",
                    agent.id
                )));
            }
        }
        Ok(())
    }

    /// Check one agent's settings and that its provider and credentials
    /// resolve.
    pub fn validate_agent(&self, agent: &AgentConfig) -> Result<ResolvedProvider, ConfigError> {
        validate_agent_settings(agent)?;
        if let Some(alias) = &agent.runtime.feed_credential_alias {
            self.credential(alias)?;
        }
        self.resolve_provider(agent)
    }

    /// Look up the provider an agent uses, with its credential.
    pub fn resolve_provider(&self, agent: &AgentConfig) -> Result<ResolvedProvider, ConfigError> {
        let name = agent.model.provider.as_str();
        let provider = self
            .providers
            .get(name)
            .filter(|p| p.enabled)
            .ok_or_else(|| ConfigError::UnknownProvider {
                agent_id: agent.id.clone(),
                provider: name.to_string(),
            })?;

        let alias = agent.runtime.credential_alias.as_str();
        let api_key = if alias.is_empty() {
            None
        } else {
            Some(self.credential(alias)?)
        };

        Ok(ResolvedProvider {
            name: name.to_string(),
            kind: provider.kind,
            api_url: agent.runtime.endpoint.clone().or_else(|| provider.api_url.clone()),
            api_key,
            credential_alias: alias.to_string(),
            default_model: provider.default_model.clone(),
            max_concurrent: provider.max_concurrent,
            timeout: Duration::from_secs(provider.timeout_secs),
        })
    }

    /// Resolve a credential alias from `[credentials]`, falling back to the
    /// `CHORUS_CREDENTIAL_<ALIAS>` environment variable.
    pub fn credential(&self, alias: &str) -> Result<String, ConfigError> {
        if let Some(secret) = self.credentials.get(alias).filter(|s| !s.is_empty()) {
            return Ok(secret.clone());
        }
        std::env::var(credential_env_var(alias))
            .ok()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ConfigError::MissingCredential(alias.to_string()))
    }

    /// The `[[agents]]` entries that are enabled.
    pub fn active_agents(&self) -> impl Iterator<Item = &AgentConfig> {
        self.agents.iter().filter(|a| a.enabled)
    }
}

/// Environment variable consulted for a credential alias.
pub fn credential_env_var(alias: &str) -> String {
    let suffix: String = alias
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect();
    format!("CHORUS_CREDENTIAL_{suffix}")
}

fn validate_agent_settings(agent: &AgentConfig) -> Result<(), ConfigError> {
    let invalid = |reason: &str| ConfigError::ValidationError(format!("agent '{}': {reason}", agent.id));

    if agent.participant_id.trim().is_empty() {
        return Err(invalid("participant_id must not be empty"));
    }
    if !(0.0..=2.0).contains(&agent.model.temperature) {
        return Err(invalid("temperature must be between 0.0 and 2.0"));
    }
    let rt = &agent.runtime;
    if rt.max_rounds == 0 {
        return Err(invalid("max_rounds must be >= 1"));
    }
    if rt.poll_interval_ms == 0 || rt.heartbeat_interval_secs == 0 {
        return Err(invalid("poll and heartbeat intervals must be > 0"));
    }
    if rt.context_window == 0 || rt.full_context_cap == 0 {
        return Err(invalid("context sizes must be > 0"));
    }
    if agent.tools.timeout_secs == 0 {
        return Err(invalid("tool timeout must be > 0"));
    }
    Ok(())
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),

    #[error("Agent '{agent_id}' uses unknown provider '{provider}'")]
    UnknownProvider { agent_id: String, provider: String },

    #[error("No credential found for alias '{0}'")]
    MissingCredential(String),
}
