//! Provider router: builds and caches the inference client for each
//! resolved provider, wrapped in its credential's concurrency gate.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chorus_config::{ProviderKind, ResolvedProvider};
use chorus_core::InferenceClient;
use tracing::debug;

use crate::anthropic::{self, AnthropicClient};
use crate::limiter::{CredentialPool, GatedClient};
use crate::openai_compat::{self, OpenAiCompatClient};

/// Hands out one shared client per (provider, credential, endpoint).
#[derive(Default)]
pub struct ProviderRouter {
    pool: CredentialPool,
    clients: Mutex<HashMap<ClientKey, Arc<dyn InferenceClient>>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ClientKey {
    provider: String,
    alias: String,
    endpoint: String,
}

impl ProviderRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// The client for `resolved`, building it on first use.
    pub fn client_for(&self, resolved: &ResolvedProvider) -> Arc<dyn InferenceClient> {
        let endpoint = resolved
            .api_url
            .clone()
            .unwrap_or_else(|| default_base_url(resolved.kind).to_string());
        let key = ClientKey {
            provider: resolved.name.clone(),
            alias: resolved.credential_alias.clone(),
            endpoint: endpoint.clone(),
        };

        let mut clients = self.clients.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(client) = clients.get(&key) {
            return client.clone();
        }

        debug!(provider = %resolved.name, endpoint = %endpoint, "Building inference client");
        let inner = build_client(resolved, &endpoint);

        // Agents without a credential are limited per provider
        let gate_key = if resolved.credential_alias.is_empty() {
            format!("provider:{}", resolved.name)
        } else {
            resolved.credential_alias.clone()
        };
        let semaphore = self.pool.semaphore(&gate_key, resolved.max_concurrent);
        let client: Arc<dyn InferenceClient> = Arc::new(GatedClient::new(inner, gate_key, semaphore));

        clients.insert(key, client.clone());
        client
    }

    /// Number of distinct clients built so far.
    pub fn len(&self) -> usize {
        self.clients.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn build_client(resolved: &ResolvedProvider, endpoint: &str) -> Arc<dyn InferenceClient> {
    match resolved.kind {
        ProviderKind::Anthropic => {
            let mut client = AnthropicClient::new(resolved.api_key.clone().unwrap_or_default())
                .with_name(&resolved.name)
                .with_base_url(endpoint)
                .with_timeout(resolved.timeout);
            if let Some(model) = &resolved.default_model {
                client = client.with_default_model(model);
            }
            Arc::new(client)
        }
        ProviderKind::OpenAi => {
            let mut client = OpenAiCompatClient::new(&resolved.name, endpoint, resolved.api_key.clone())
                .with_timeout(resolved.timeout);
            if let Some(model) = &resolved.default_model {
                client = client.with_default_model(model);
            }
            Arc::new(client)
        }
    }
}

/// Base URL used when neither the provider nor the agent names one.
pub fn default_base_url(kind: ProviderKind) -> &'static str {
    match kind {
        ProviderKind::OpenAi => openai_compat::DEFAULT_BASE_URL,
        ProviderKind::Anthropic => anthropic::DEFAULT_BASE_URL,
    }
}
