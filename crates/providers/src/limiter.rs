//! Per-credential concurrency limiting.
//!
//! Every agent that shares a credential alias shares one semaphore, so an
//! inference endpoint never sees more in-flight requests for a key than
//! its provider allows.

use async_trait::async_trait;
use chorus_core::{Completion, InferenceClient, InferenceError, InferenceRequest, StreamEvent};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, mpsc};
use tracing::trace;

/// Semaphores keyed by credential alias.
#[derive(Debug, Default)]
pub struct CredentialPool {
    semaphores: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl CredentialPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// The semaphore for `alias`, created with `permits` slots on first use.
    /// Later calls keep the original size.
    pub fn semaphore(&self, alias: &str, permits: usize) -> Arc<Semaphore> {
        let mut semaphores = self.semaphores.lock().unwrap_or_else(|e| e.into_inner());
        semaphores
            .entry(alias.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(permits.max(1))))
            .clone()
    }
}

/// An inference client that holds a credential permit for the duration of
/// every request, including the whole life of a stream.
pub struct GatedClient {
    inner: Arc<dyn InferenceClient>,
    alias: String,
    semaphore: Arc<Semaphore>,
}

impl GatedClient {
    pub fn new(inner: Arc<dyn InferenceClient>, alias: impl Into<String>, semaphore: Arc<Semaphore>) -> Self {
        Self {
            inner,
            alias: alias.into(),
            semaphore,
        }
    }

    async fn permit(&self) -> Result<OwnedSemaphorePermit, InferenceError> {
        trace!(alias = %self.alias, available = self.semaphore.available_permits(), "Waiting for credential permit");
        self.semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| InferenceError::Connection(format!("credential pool for '{}' closed", self.alias)))
    }
}

#[async_trait]
impl InferenceClient for GatedClient {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn complete(&self, request: InferenceRequest) -> Result<Completion, InferenceError> {
        let _permit = self.permit().await?;
        self.inner.complete(request).await
    }

    async fn stream(
        &self,
        request: InferenceRequest,
    ) -> Result<mpsc::Receiver<StreamEvent>, InferenceError> {
        let permit = self.permit().await?;
        let mut upstream = self.inner.stream(request).await?;
        let (tx, rx) = mpsc::channel(64);

        tokio::spawn(async move {
            let _permit = permit;
            while let Some(event) = upstream.recv().await {
                if tx.send(event).await.is_err() {
                    break;
                }
            }
        });

        Ok(rx)
    }
}
