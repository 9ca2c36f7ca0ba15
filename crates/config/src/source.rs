//! Refreshable sources of agent configuration.
//!
//! The supervisor polls a source on an interval and diffs the returned list
//! against the running set, so every call must return a complete snapshot.

use async_trait::async_trait;
use chorus_core::AgentConfig;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use crate::{AppConfig, ConfigError};

#[async_trait]
pub trait AgentConfigSource: Send + Sync {
    /// The current full list of agent configs, disabled ones included.
    async fn load(&self) -> Result<Vec<AgentConfig>, ConfigError>;
}

/// Re-reads the `[[agents]]` table of a TOML file on every refresh.
#[derive(Debug, Clone)]
pub struct FileConfigSource {
    path: PathBuf,
}

impl FileConfigSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl AgentConfigSource for FileConfigSource {
    async fn load(&self) -> Result<Vec<AgentConfig>, ConfigError> {
        let config = AppConfig::load_from(&self.path)?;
        tracing::debug!(path = %self.path.display(), agents = config.agents.len(), "Reloaded agent configs");
        Ok(config.agents)
    }
}

/// An in-process source whose contents can be replaced, for tests and for
/// embedding the supervisor in another program.
#[derive(Debug, Clone, Default)]
pub struct StaticConfigSource {
    agents: Arc<RwLock<Vec<AgentConfig>>>,
}

impl StaticConfigSource {
    pub fn new(agents: Vec<AgentConfig>) -> Self {
        Self {
            agents: Arc::new(RwLock::new(agents)),
        }
    }

    /// Replace the whole list; picked up on the next refresh.
    pub fn set(&self, agents: Vec<AgentConfig>) {
        match self.agents.write() {
            Ok(mut guard) => *guard = agents,
            Err(poisoned) => *poisoned.into_inner() = agents,
        }
    }
}

#[async_trait]
impl AgentConfigSource for StaticConfigSource {
    async fn load(&self) -> Result<Vec<AgentConfig>, ConfigError> {
        let agents = match self.agents.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        Ok(agents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent_toml(id: &str) -> String {
        format!(
            "[[agents]]\nid = \"{id}\"\nparticipant_id = \"p-{id}\"\n[agents.model]\nprovider = \"local\"\n"
        )
    }

    #[tokio::test]
    async fn file_source_rereads_on_every_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, agent_toml("a")).unwrap();

        let source = FileConfigSource::new(&path);
        let first = source.load().await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].id, "a");

        std::fs::write(&path, format!("{}{}", agent_toml("a"), agent_toml("b"))).unwrap();
        let second = source.load().await.unwrap();
        assert_eq!(second.len(), 2);
        assert_eq!(second[1].id, "b");
    }

    #[tokio::test]
    async fn file_source_surfaces_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[[agents]]\nid = 5\n").unwrap();
        let err = FileConfigSource::new(&path).load().await.unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[tokio::test]
    async fn static_source_can_be_replaced() {
        let source = StaticConfigSource::default();
        assert!(source.load().await.unwrap().is_empty());

        let config: AppConfig = toml::from_str(&agent_toml("x")).unwrap();
        source.set(config.agents);
        assert_eq!(source.load().await.unwrap()[0].id, "x");
    }
}
