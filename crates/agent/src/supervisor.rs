//! Keeps one runtime task alive per enabled agent config.
//!
//! The supervisor re-reads its [`AgentConfigSource`] on an interval and
//! reconciles the running set against it:
//!
//! - new or re-enabled configs are started
//! - removed or disabled configs are stopped
//! - changed configs are restarted with the new snapshot
//!
//! A runtime that returns an error or panics is restarted with exponential
//! backoff. A config that cannot be built at all is reported once and left
//! alone until it changes.

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use chorus_config::{AgentConfigSource, SupervisorConfig};
use chorus_core::{AgentConfig, AgentRuntimeState, DomainEvent, EventBus, RuntimeError};
use chrono::Utc;
use futures::FutureExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::runtime::AgentRuntime;

/// How long a stopping runtime may take to finish its current cycle.
const STOP_GRACE: Duration = Duration::from_secs(30);

/// Builds a runtime from a config snapshot.
pub trait RuntimeFactory: Send + Sync {
    fn build(&self, config: &Arc<AgentConfig>) -> Result<AgentRuntime, RuntimeError>;
}

/// A point-in-time view of one supervised agent.
#[derive(Debug, Clone)]
pub struct AgentStatus {
    pub agent_id: String,
    pub state: AgentRuntimeState,
    pub restarts: u32,
    /// Set when the config could not be turned into a runtime
    pub failed_to_start: Option<String>,
}

struct Handle {
    config: Arc<AgentConfig>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
    status: watch::Receiver<AgentRuntimeState>,
    restarts: Arc<AtomicU32>,
}

pub struct Supervisor {
    factory: Arc<dyn RuntimeFactory>,
    source: Arc<dyn AgentConfigSource>,
    settings: SupervisorConfig,
    events: EventBus,
    running: HashMap<String, Handle>,
    failed: HashMap<String, (Arc<AgentConfig>, String)>,
}

impl Supervisor {
    pub fn new(
        factory: Arc<dyn RuntimeFactory>,
        source: Arc<dyn AgentConfigSource>,
        settings: SupervisorConfig,
        events: EventBus,
    ) -> Self {
        Self {
            factory,
            source,
            settings,
            events,
            running: HashMap::new(),
            failed: HashMap::new(),
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Refresh immediately, then on every refresh interval, until
    /// `shutdown` turns true. All runtimes are stopped before returning.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            refresh_secs = self.settings.refresh_interval_secs,
            "Supervisor started"
        );
        let mut ticker = tokio::time::interval(self.settings.refresh_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = ticker.tick() => self.refresh().await,
            }
        }

        self.shutdown().await;
        info!("Supervisor stopped");
    }

    /// Load the current config list and reconcile. A failing source keeps
    /// the running set as it is.
    pub async fn refresh(&mut self) {
        match self.source.load().await {
            Ok(configs) => self.reconcile(configs).await,
            Err(e) => warn!(error = %e, "Could not reload agent configs, keeping current set"),
        }
    }

    pub async fn reconcile(&mut self, configs: Vec<AgentConfig>) {
        let desired: HashMap<String, Arc<AgentConfig>> = configs
            .into_iter()
            .filter(|c| c.enabled)
            .map(|c| (c.id.clone(), Arc::new(c)))
            .collect();

        let stale: Vec<String> = self
            .running
            .iter()
            .filter(|(id, handle)| desired.get(*id).is_none_or(|c| **c != *handle.config))
            .map(|(id, _)| id.clone())
            .collect();
        let mut stopping = Vec::with_capacity(stale.len());
        for id in stale {
            if let Some(handle) = self.running.remove(&id) {
                let reason = if desired.contains_key(&id) { "config changed" } else { "removed or disabled" };
                info!(agent_id = %id, reason, "Stopping agent");
                stopping.push(stop(handle));
            }
        }
        futures::future::join_all(stopping).await;

        self.failed
            .retain(|id, (config, _)| desired.get(id).is_some_and(|c| **c == **config));

        let mut ids: Vec<&String> = desired.keys().collect();
        ids.sort();
        for id in ids {
            if self.running.contains_key(id) || self.failed.contains_key(id) {
                continue;
            }
            if let Some(config) = desired.get(id) {
                self.start(config.clone());
            }
        }
    }

    fn start(&mut self, config: Arc<AgentConfig>) {
        let agent_id = config.id.clone();
        let runtime = match self.factory.build(&config) {
            Ok(runtime) => runtime,
            Err(e) => {
                let reason = e.to_string();
                error!(agent_id = %agent_id, reason = %reason, "Agent failed to start");
                self.events.publish(DomainEvent::AgentFailedToStart {
                    agent_id: agent_id.clone(),
                    reason: reason.clone(),
                    timestamp: Utc::now(),
                });
                self.failed.insert(agent_id, (config, reason));
                return;
            }
        };

        let (status_tx, status_rx) = watch::channel(AgentRuntimeState::new(agent_id.clone()));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let restarts = Arc::new(AtomicU32::new(0));

        let supervised = Supervised {
            factory: self.factory.clone(),
            config: config.clone(),
            status: Arc::new(status_tx),
            restarts: restarts.clone(),
            events: self.events.clone(),
            initial_backoff: self.settings.restart_initial_backoff(),
            max_backoff: self.settings.restart_max_backoff(),
        };
        let task = tokio::spawn(supervised.run(runtime, shutdown_rx));
        info!(agent_id = %agent_id, provider = %config.model.provider, "Agent started");

        self.running.insert(
            agent_id,
            Handle {
                config,
                shutdown: shutdown_tx,
                task,
                status: status_rx,
                restarts,
            },
        );
    }

    /// Stop every runtime.
    pub async fn shutdown(&mut self) {
        let handles: Vec<Handle> = self.running.drain().map(|(_, h)| h).collect();
        futures::future::join_all(handles.into_iter().map(stop)).await;
    }

    /// Running agents first, then the ones that failed to start; each
    /// group ordered by id.
    pub fn status(&self) -> Vec<AgentStatus> {
        let mut running: Vec<AgentStatus> = self
            .running
            .iter()
            .map(|(id, handle)| AgentStatus {
                agent_id: id.clone(),
                state: handle.status.borrow().clone(),
                restarts: handle.restarts.load(Ordering::Relaxed),
                failed_to_start: None,
            })
            .collect();
        running.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));

        let mut failed: Vec<AgentStatus> = self
            .failed
            .iter()
            .map(|(id, (_, reason))| AgentStatus {
                agent_id: id.clone(),
                state: AgentRuntimeState::new(id.clone()),
                restarts: 0,
                failed_to_start: Some(reason.clone()),
            })
            .collect();
        failed.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));

        running.extend(failed);
        running
    }

    pub fn running_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.running.keys().cloned().collect();
        ids.sort();
        ids
    }
}

async fn stop(mut handle: Handle) {
    let _ = handle.shutdown.send(true);
    if tokio::time::timeout(STOP_GRACE, &mut handle.task).await.is_err() {
        warn!(agent_id = %handle.config.id, "Agent did not stop in time, aborting");
        handle.task.abort();
    }
}

/// The restart loop around one agent's runtime.
struct Supervised {
    factory: Arc<dyn RuntimeFactory>,
    config: Arc<AgentConfig>,
    status: Arc<watch::Sender<AgentRuntimeState>>,
    restarts: Arc<AtomicU32>,
    events: EventBus,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl Supervised {
    async fn run(self, first: AgentRuntime, mut shutdown: watch::Receiver<bool>) {
        let agent_id = self.config.id.clone();
        let mut backoff = self.initial_backoff;
        let mut next = Some(first);

        loop {
            let started = Instant::now();
            let outcome = match next.take() {
                Some(runtime) => {
                    let runtime = runtime.report_to(self.status.clone());
                    AssertUnwindSafe(runtime.run(shutdown.clone())).catch_unwind().await
                }
                None => match self.factory.build(&self.config) {
                    Ok(runtime) => {
                        next = Some(runtime);
                        continue;
                    }
                    Err(e) => Ok(Err(e)),
                },
            };

            if *shutdown.borrow() {
                break;
            }
            let reason = match outcome {
                Ok(Ok(())) => break,
                Ok(Err(e)) => e.to_string(),
                Err(panic) => format!("panicked: {}", panic_message(panic.as_ref())),
            };

            // A run that outlived the longest backoff counts as healthy
            if started.elapsed() >= self.max_backoff {
                backoff = self.initial_backoff;
            }
            let restarts = self.restarts.fetch_add(1, Ordering::Relaxed) + 1;
            error!(
                agent_id = %agent_id,
                error = %reason,
                restarts,
                restart_in_ms = backoff.as_millis() as u64,
                "Agent runtime crashed"
            );
            self.status.send_modify(|state| {
                state.running = false;
                state.last_error = Some(reason.clone());
            });
            self.events.publish(DomainEvent::RuntimeCrashed {
                agent_id: agent_id.clone(),
                error_message: reason,
                restart_in_ms: backoff.as_millis() as u64,
                timestamp: Utc::now(),
            });

            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = tokio::time::sleep(backoff) => {}
            }
            backoff = (backoff * 2).min(self.max_backoff);
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{agent_config, parts};
    use async_trait::async_trait;
    use chorus_config::StaticConfigSource;
    use chorus_core::{Completion, InferenceClient, InferenceError, InferenceRequest, Message, ConversationId};
    use chorus_feed::InMemoryFeed;
    use chorus_providers::ScriptedClient;
    use std::sync::Mutex;

    /// Builds runtimes over one shared feed; configs whose provider is
    /// `"missing"` fail to build.
    struct TestFactory {
        feed: Arc<InMemoryFeed>,
        inference: Arc<dyn InferenceClient>,
        events: EventBus,
        builds: Mutex<Vec<String>>,
    }

    impl TestFactory {
        fn new(feed: Arc<InMemoryFeed>, inference: Arc<dyn InferenceClient>, events: EventBus) -> Self {
            Self { feed, inference, events, builds: Mutex::new(Vec::new()) }
        }

        fn builds(&self) -> Vec<String> {
            self.builds.lock().unwrap().clone()
        }
    }

    impl RuntimeFactory for TestFactory {
        fn build(&self, config: &Arc<AgentConfig>) -> Result<AgentRuntime, RuntimeError> {
            self.builds.lock().unwrap().push(config.id.clone());
            if config.model.provider == "missing" {
                return Err(RuntimeError::Config {
                    agent_id: config.id.clone(),
                    reason: "unknown provider 'missing'".into(),
                });
            }
            let parts = parts(config, &self.feed, self.inference.clone(), self.events.clone());
            Ok(AgentRuntime::new(config.clone(), parts))
        }
    }

    /// Panics on the first call, then answers normally.
    struct PanicOnce {
        panicked: std::sync::atomic::AtomicBool,
    }

    #[async_trait]
    impl InferenceClient for PanicOnce {
        fn name(&self) -> &str {
            "panic-once"
        }

        async fn complete(&self, _request: InferenceRequest) -> Result<Completion, InferenceError> {
            if !self.panicked.swap(true, Ordering::SeqCst) {
                panic!("model exploded");
            }
            Ok(Completion { text: "recovered".into(), model: "test".into(), usage: None })
        }
    }

    fn settings() -> SupervisorConfig {
        SupervisorConfig {
            refresh_interval_secs: 1,
            restart_initial_backoff_ms: 100,
            restart_max_backoff_secs: 2,
        }
    }

    fn supervisor(factory: Arc<TestFactory>, source: &StaticConfigSource, events: EventBus) -> Supervisor {
        Supervisor::new(factory, Arc::new(source.clone()), settings(), events)
    }

    #[tokio::test(start_paused = true)]
    async fn reconcile_starts_stops_and_restarts() {
        let feed = Arc::new(InMemoryFeed::new());
        let events = EventBus::new(64);
        let factory = Arc::new(TestFactory::new(feed, Arc::new(ScriptedClient::repeating("hi")), events.clone()));
        let source = StaticConfigSource::new(vec![agent_config("a"), agent_config("b")]);
        let mut sup = supervisor(factory.clone(), &source, events);

        sup.refresh().await;
        assert_eq!(sup.running_ids(), vec!["a", "b"]);

        // Unchanged configs are left running
        sup.refresh().await;
        assert_eq!(factory.builds(), vec!["a", "b"]);

        let mut changed = agent_config("b");
        changed.system_prompt = "new prompt".into();
        let mut disabled = agent_config("a");
        disabled.enabled = false;
        source.set(vec![disabled, changed, agent_config("c")]);
        sup.refresh().await;

        assert_eq!(sup.running_ids(), vec!["b", "c"]);
        assert_eq!(factory.builds(), vec!["a", "b", "b", "c"]);

        sup.shutdown().await;
        assert!(sup.running_ids().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_config_fails_alone_and_is_not_retried() {
        let feed = Arc::new(InMemoryFeed::new());
        let events = EventBus::new(64);
        let mut rx = events.subscribe();
        let factory = Arc::new(TestFactory::new(feed, Arc::new(ScriptedClient::repeating("hi")), events.clone()));
        let mut broken = agent_config("broken");
        broken.model.provider = "missing".into();
        let source = StaticConfigSource::new(vec![broken.clone(), agent_config("ok")]);
        let mut sup = supervisor(factory.clone(), &source, events);

        sup.refresh().await;
        sup.refresh().await;
        assert_eq!(sup.running_ids(), vec!["ok"]);
        assert_eq!(factory.builds().iter().filter(|id| *id == "broken").count(), 1);

        let status = sup.status();
        assert_eq!(status.len(), 2);
        assert_eq!(status[1].agent_id, "broken");
        assert!(status[1].failed_to_start.as_deref().unwrap().contains("missing"));

        let mut reported = false;
        while let Ok(event) = rx.try_recv() {
            reported |= matches!(event.as_ref(), DomainEvent::AgentFailedToStart { agent_id, .. } if agent_id == "broken");
        }
        assert!(reported);

        // A fixed config is picked up on the next refresh
        broken.model.provider = "scripted".into();
        source.set(vec![broken, agent_config("ok")]);
        sup.refresh().await;
        assert_eq!(sup.running_ids(), vec!["broken", "ok"]);
        sup.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_runtime_is_restarted() {
        let feed = Arc::new(InMemoryFeed::new());
        let events = EventBus::new(64);
        let mut rx = events.subscribe();
        let inference: Arc<dyn InferenceClient> = Arc::new(PanicOnce { panicked: Default::default() });
        let factory = Arc::new(TestFactory::new(feed.clone(), inference, events.clone()));
        let source = StaticConfigSource::new(vec![agent_config("a")]);
        let mut sup = supervisor(factory.clone(), &source, events);
        let conv = ConversationId::from("general");

        sup.refresh().await;
        tokio::time::sleep(Duration::from_millis(200)).await;
        feed.inject(&conv, Message::new("alice", "@a first"));
        tokio::time::sleep(Duration::from_millis(200)).await;

        let mut crashed = None;
        while let Ok(event) = rx.try_recv() {
            if let DomainEvent::RuntimeCrashed { error_message, .. } = event.as_ref() {
                crashed = Some(error_message.clone());
            }
        }
        assert!(crashed.unwrap().contains("model exploded"));
        assert_eq!(sup.status()[0].restarts, 1);

        // After the backoff a fresh runtime serves new messages
        tokio::time::sleep(Duration::from_millis(500)).await;
        feed.inject(&conv, Message::new("alice", "@a second"));
        tokio::time::sleep(Duration::from_millis(500)).await;
        let replies = feed.posts_by("p-a");
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].body, "recovered");
        assert_eq!(factory.builds(), vec!["a", "a"]);

        sup.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stale_agents_share_one_grace_period() {
        let feed = Arc::new(InMemoryFeed::new());
        let events = EventBus::new(64);
        let stuck = Arc::new(ScriptedClient::repeating("too late").with_delay(Duration::from_secs(600)));
        let factory = Arc::new(TestFactory::new(feed.clone(), stuck, events.clone()));
        let source = StaticConfigSource::new(vec![agent_config("a"), agent_config("b")]);
        let mut sup = supervisor(factory, &source, events);
        let conv = ConversationId::from("general");

        sup.refresh().await;
        tokio::time::sleep(Duration::from_millis(200)).await;
        feed.inject(&conv, Message::new("alice", "@a @b thoughts?"));
        tokio::time::sleep(Duration::from_secs(1)).await;

        // Both are stuck mid-inference, so each stop runs out its grace
        source.set(Vec::new());
        let started = Instant::now();
        sup.refresh().await;
        let elapsed = started.elapsed();
        assert!(elapsed >= STOP_GRACE);
        assert!(elapsed < STOP_GRACE * 2);
        assert!(sup.running_ids().is_empty());
        assert!(feed.posts_by("p-a").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn run_stops_everything_on_shutdown() {
        let feed = Arc::new(InMemoryFeed::new());
        let events = EventBus::new(64);
        let factory = Arc::new(TestFactory::new(feed, Arc::new(ScriptedClient::repeating("hi")), events.clone()));
        let source = StaticConfigSource::new(vec![agent_config("a")]);
        let mut sup = supervisor(factory, &source, events);

        let (stop_tx, stop_rx) = watch::channel(false);
        let stopper = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(3)).await;
            stop_tx.send(true).unwrap();
        });
        sup.run(stop_rx).await;
        stopper.await.unwrap();
        assert!(sup.running_ids().is_empty());
    }
}
