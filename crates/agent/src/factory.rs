//! Turns config snapshots into runnable agents.

use std::sync::Arc;

use chorus_config::{AppConfig, ConfigError, ServiceConfig};
use chorus_core::{AgentConfig, EventBus, KnowledgeBase, MessageFeed, RuntimeError, WebSearch};
use chorus_feed::HttpMessageFeed;
use chorus_providers::ProviderRouter;
use chorus_tools::{Collaborators, HttpKnowledgeBase, HttpWebSearch, ToolExecutor, ToolLimits, builtin_tools};
use tracing::debug;

use crate::context::ContextBuilder;
use crate::runtime::{AgentRuntime, RuntimeParts};
use crate::supervisor::RuntimeFactory;

/// Builds runtimes against the real feed, providers and services.
///
/// Providers, credentials and service endpoints are read once from the
/// [`AppConfig`] given at construction; only agent configs are reloaded.
pub struct DefaultRuntimeFactory {
    app: AppConfig,
    router: ProviderRouter,
    knowledge_base: Arc<dyn KnowledgeBase>,
    web_search: Arc<dyn WebSearch>,
    events: EventBus,
}

impl DefaultRuntimeFactory {
    pub fn new(app: AppConfig, events: EventBus) -> Result<Self, ConfigError> {
        let kb_key = service_credential(&app, &app.knowledge_base)?;
        let web_key = service_credential(&app, &app.web_search)?;
        let knowledge_base = Arc::new(HttpKnowledgeBase::new(
            app.knowledge_base.base_url.clone(),
            kb_key,
            app.knowledge_base.timeout(),
        ));
        let web_search = Arc::new(HttpWebSearch::new(
            app.web_search.base_url.clone(),
            web_key,
            app.web_search.timeout(),
        ));

        Ok(Self {
            app,
            router: ProviderRouter::new(),
            knowledge_base,
            web_search,
            events,
        })
    }

    pub fn router(&self) -> &ProviderRouter {
        &self.router
    }
}

fn service_credential(app: &AppConfig, service: &ServiceConfig) -> Result<Option<String>, ConfigError> {
    service
        .credential_alias
        .as_deref()
        .map(|alias| app.credential(alias))
        .transpose()
}

impl RuntimeFactory for DefaultRuntimeFactory {
    fn build(&self, config: &Arc<AgentConfig>) -> Result<AgentRuntime, RuntimeError> {
        let config_error = |e: ConfigError| RuntimeError::Config {
            agent_id: config.id.clone(),
            reason: e.to_string(),
        };

        let resolved = self.app.validate_agent(config).map_err(config_error)?;
        let inference = self.router.client_for(&resolved);

        let feed_key = config
            .runtime
            .feed_credential_alias
            .as_deref()
            .map(|alias| self.app.credential(alias))
            .transpose()
            .map_err(config_error)?;
        let feed: Arc<dyn MessageFeed> = Arc::new(HttpMessageFeed::new(
            self.app.feed.base_url.clone(),
            feed_key,
            self.app.feed.timeout(),
        ));

        let context = Arc::new(ContextBuilder::new(feed.clone(), config.participant_id.clone()));
        let collaborators = Collaborators {
            feed: feed.clone(),
            context: context.clone(),
            knowledge_base: self.knowledge_base.clone(),
            web_search: self.web_search.clone(),
        };
        let limits = ToolLimits {
            context_window: config.runtime.context_window,
            full_context_cap: config.runtime.full_context_cap,
            top_k: self.app.knowledge_base.top_k,
        };
        let executor = ToolExecutor::new(builtin_tools(&collaborators, limits))
            .with_enabled(config.enabled_tools())
            .sequential(config.tools.sequential)
            .with_timeout(config.tools.timeout())
            .with_events(self.events.clone());

        debug!(
            agent_id = %config.id,
            provider = %resolved.name,
            tools = ?config.enabled_tools(),
            "Built agent runtime"
        );

        Ok(AgentRuntime::new(
            config.clone(),
            RuntimeParts {
                feed,
                inference,
                executor,
                context,
                events: self.events.clone(),
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::agent_config;

    fn app() -> AppConfig {
        serde_json::from_value(serde_json::json!({
            "feed": { "base_url": "http://feed.local" },
            "providers": {
                "local": { "kind": "openai", "api_url": "http://localhost:11434/v1", "max_concurrent": 2 },
                "claude": { "kind": "anthropic" }
            },
            "credentials": { "team": "sk-test" }
        }))
        .unwrap()
    }

    fn agent(id: &str, provider: &str, alias: &str) -> Arc<AgentConfig> {
        let mut config = agent_config(id);
        config.model.provider = provider.into();
        config.runtime.credential_alias = alias.into();
        Arc::new(config)
    }

    #[test]
    fn builds_runtime_for_valid_config() {
        let factory = DefaultRuntimeFactory::new(app(), EventBus::new(16)).unwrap();
        let runtime = factory.build(&agent("scout", "local", "")).unwrap();
        assert_eq!(runtime.config().id, "scout");
        assert_eq!(factory.router().len(), 1);
    }

    #[test]
    fn agents_sharing_a_provider_share_a_client() {
        let factory = DefaultRuntimeFactory::new(app(), EventBus::new(16)).unwrap();
        factory.build(&agent("a", "claude", "team")).unwrap();
        factory.build(&agent("b", "claude", "team")).unwrap();
        factory.build(&agent("c", "local", "")).unwrap();
        assert_eq!(factory.router().len(), 2);
    }

    #[test]
    fn unknown_provider_is_a_config_error() {
        let factory = DefaultRuntimeFactory::new(app(), EventBus::new(16)).unwrap();
        let err = factory.build(&agent("scout", "nowhere", "")).err().unwrap();
        assert!(matches!(err, RuntimeError::Config { ref agent_id, .. } if agent_id == "scout"));
        assert!(err.to_string().contains("nowhere"));
    }

    #[test]
    fn missing_credential_is_a_config_error() {
        let factory = DefaultRuntimeFactory::new(app(), EventBus::new(16)).unwrap();
        let err = factory.build(&agent("scout", "claude", "absent-alias")).err().unwrap();
        assert!(err.to_string().contains("absent-alias"));
    }
}
