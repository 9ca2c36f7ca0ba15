//! The per-agent runtime: a polling state machine.
//!
//! ```text
//! Idle → Polling → Triggered → BuildingContext → Inferring ⇄ ExecutingTools
//!                                                    ↓
//!                                  Replying → (CoolingDown) → Idle
//! ```
//!
//! One runtime runs one trigger cycle at a time. The shutdown signal is
//! checked between polls, so an in-flight cycle always finishes.

use std::sync::Arc;
use std::time::Duration;

use chorus_core::{
    AgentConfig, AgentRuntimeState, ChatMessage, DomainEvent, EventBus, FeedError,
    InferenceClient, InferenceError, InferenceParams, InferenceRequest, Message, MessageFeed,
    RuntimeError, RuntimePhase, ToolCall, ToolContext, ToolDefinition, ToolKind, TriggerKind,
};
use chorus_protocol::{StreamAssembler, render_assistant_turn, render_results};
use chorus_tools::ToolExecutor;
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::context::{ContextBuilder, ConversationContext, build_preamble, compress};

/// Posted when the round limit is hit and the model never produced text.
pub const UNABLE_TO_COMPLETE: &str =
    "Sorry, I wasn't able to complete that. Could you rephrase or narrow it down?";

/// Everything a runtime talks to.
pub struct RuntimeParts {
    pub feed: Arc<dyn MessageFeed>,
    pub inference: Arc<dyn InferenceClient>,
    pub executor: ToolExecutor,
    pub context: Arc<ContextBuilder>,
    pub events: EventBus,
}

/// Aborts the wrapped task when dropped, so a panicking runtime takes its
/// heartbeat down with it.
struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

#[derive(Debug, Clone)]
struct Trigger {
    kind: TriggerKind,
    message: Message,
}

#[derive(Debug)]
enum Outcome {
    Reply { text: String, rounds: u32 },
    Reacted { rounds: u32 },
    Silent,
    Abandoned(String),
}

pub struct AgentRuntime {
    config: Arc<AgentConfig>,
    feed: Arc<dyn MessageFeed>,
    inference: Arc<dyn InferenceClient>,
    executor: ToolExecutor,
    context: Arc<ContextBuilder>,
    events: EventBus,

    state: AgentRuntimeState,
    status: Arc<watch::Sender<AgentRuntimeState>>,
    heartbeat: Option<watch::Receiver<Option<DateTime<Utc>>>>,

    /// Whether the startup backlog has been skipped
    primed: bool,
    last_proactive: Option<Instant>,
    /// Messages from others since the last summary
    unsummarized: u32,
}

impl AgentRuntime {
    pub fn new(config: Arc<AgentConfig>, parts: RuntimeParts) -> Self {
        let state = AgentRuntimeState::new(config.id.clone());
        let (status, _) = watch::channel(state.clone());
        Self {
            config,
            feed: parts.feed,
            inference: parts.inference,
            executor: parts.executor,
            context: parts.context,
            events: parts.events,
            state,
            status: Arc::new(status),
            heartbeat: None,
            primed: false,
            last_proactive: None,
            unsummarized: 0,
        }
    }

    /// Publish state snapshots on `status` instead of a private channel.
    pub fn report_to(mut self, status: Arc<watch::Sender<AgentRuntimeState>>) -> Self {
        self.status = status;
        self.publish_status();
        self
    }

    pub fn status(&self) -> watch::Receiver<AgentRuntimeState> {
        self.status.subscribe()
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Poll until `shutdown` turns true (or its sender goes away).
    ///
    /// Returns an error only when the runtime cannot continue at all, e.g.
    /// the feed rejects the agent's credential.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), RuntimeError> {
        let agent_id = self.config.id.clone();
        info!(
            agent_id = %agent_id,
            conversation_id = %self.config.runtime.conversation_id,
            "Agent runtime started"
        );
        self.state.running = true;
        self.set_phase(RuntimePhase::Idle);
        self.events.publish(DomainEvent::RuntimeStarted {
            agent_id: agent_id.clone(),
            timestamp: Utc::now(),
        });

        let (beat_tx, beat_rx) = watch::channel(None);
        self.heartbeat = Some(beat_rx);
        let heartbeat = AbortOnDrop(self.spawn_heartbeat(shutdown.clone(), beat_tx));

        let mut ticker = tokio::time::interval(self.config.runtime.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let result = loop {
            if *shutdown.borrow() {
                break Ok(());
            }
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break Ok(());
                    }
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.poll_once().await {
                        break Err(e);
                    }
                }
            }
        };

        drop(heartbeat);
        self.state.running = false;
        self.state.round = 0;
        if let Err(e) = &result {
            self.state.last_error = Some(e.to_string());
        }
        self.set_phase(RuntimePhase::Stopped);
        self.events.publish(DomainEvent::RuntimeStopped {
            agent_id: agent_id.clone(),
            timestamp: Utc::now(),
        });
        info!(agent_id = %agent_id, "Agent runtime stopped");
        result
    }

    fn spawn_heartbeat(
        &self,
        mut shutdown: watch::Receiver<bool>,
        beat: watch::Sender<Option<DateTime<Utc>>>,
    ) -> JoinHandle<()> {
        let feed = self.feed.clone();
        let agent_id = self.config.id.clone();
        let every = self.config.runtime.heartbeat_interval();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        match feed.post_heartbeat(&agent_id).await {
                            Ok(()) => {
                                beat.send_replace(Some(Utc::now()));
                            }
                            Err(e) => warn!(agent_id = %agent_id, error = %e, "Heartbeat failed"),
                        }
                    }
                }
            }
        })
    }

    /// One poll of the feed and, if a trigger qualifies, one full cycle.
    pub async fn poll_once(&mut self) -> Result<(), RuntimeError> {
        self.set_phase(RuntimePhase::Polling);
        let conversation_id = self.config.runtime.conversation_id.clone();
        let since = self.state.cursor.as_ref().map(|c| c.timestamp);

        let batch = match self.feed.list_messages(since, &conversation_id).await {
            Ok(batch) => batch,
            Err(FeedError::Unauthorized) => {
                return Err(RuntimeError::Feed {
                    agent_id: self.config.id.clone(),
                    source: FeedError::Unauthorized,
                });
            }
            Err(e) => {
                warn!(agent_id = %self.config.id, error = %e, "Polling failed");
                self.state.last_error = Some(e.to_string());
                self.set_phase(RuntimePhase::Idle);
                return Ok(());
            }
        };

        let cursor = self.state.cursor.clone();
        let mut fresh: Vec<Message> = batch
            .into_iter()
            .filter(|m| cursor.as_ref().is_none_or(|c| m.cursor() > *c))
            .collect();
        fresh.sort_by_key(Message::cursor);

        if !self.primed {
            self.primed = true;
            if let Some(last) = fresh.last() {
                self.state.cursor = Some(last.cursor());
            }
            debug!(agent_id = %self.config.id, backlog = fresh.len(), "Skipped backlog");
            self.set_phase(RuntimePhase::Idle);
            return Ok(());
        }
        if fresh.is_empty() {
            self.set_phase(RuntimePhase::Idle);
            return Ok(());
        }

        let participant_id = self.config.participant_id.clone();
        let mut others = Vec::with_capacity(fresh.len());
        for message in &fresh {
            if message.author_id == participant_id {
                self.context.pending().acknowledge(&message.id);
            } else {
                others.push(message.clone());
            }
        }
        self.unsummarized = self.unsummarized.saturating_add(others.len() as u32);

        if let Some(trigger) = self.detect_trigger(&others) {
            self.handle_trigger(trigger).await;
        }

        // The whole batch is consumed whatever the cycle's outcome
        self.state.cursor = fresh.last().map(Message::cursor);
        self.set_phase(RuntimePhase::Idle);
        Ok(())
    }

    /// Pick at most one trigger for a batch: addressed, then proactive,
    /// then summarize.
    fn detect_trigger(&self, others: &[Message]) -> Option<Trigger> {
        let config = &self.config;
        let caps = &config.capabilities;

        if caps.responds_when_addressed {
            if let Some(message) = others
                .iter()
                .rev()
                .find(|m| m.addresses(&config.participant_id, &config.mention_names))
            {
                return Some(Trigger {
                    kind: TriggerKind::Addressed,
                    message: message.clone(),
                });
            }
        }

        let newest = others.last()?;
        if caps.responds_proactively {
            if self.cooldown_elapsed() {
                return Some(Trigger {
                    kind: TriggerKind::Proactive,
                    message: newest.clone(),
                });
            }
            debug!(agent_id = %config.id, "Proactive trigger suppressed by cooldown");
        }

        let every = config.runtime.summarize_every;
        if caps.can_summarize && every > 0 && self.unsummarized >= every {
            return Some(Trigger {
                kind: TriggerKind::Summarize,
                message: newest.clone(),
            });
        }
        None
    }

    fn cooldown_elapsed(&self) -> bool {
        let cooldown = self.config.runtime.proactive_cooldown();
        self.last_proactive.is_none_or(|at| at.elapsed() >= cooldown)
    }

    async fn handle_trigger(&mut self, trigger: Trigger) {
        let agent_id = self.config.id.clone();
        info!(
            agent_id = %agent_id,
            kind = %trigger.kind,
            message_id = %trigger.message.id,
            "Trigger fired"
        );
        self.state.triggers_handled += 1;
        self.set_phase(RuntimePhase::Triggered);
        self.events.publish(DomainEvent::TriggerFired {
            agent_id: agent_id.clone(),
            kind: trigger.kind,
            message_id: trigger.message.id.clone(),
            timestamp: Utc::now(),
        });

        if trigger.kind == TriggerKind::Summarize {
            self.unsummarized = 0;
        }

        self.run_cycle(&trigger).await;

        // The cooldown window opens once the cycle is over, reply posted or not
        if trigger.kind == TriggerKind::Proactive {
            self.last_proactive = Some(Instant::now());
            self.state.last_proactive_at = Some(Utc::now());
            self.set_phase(RuntimePhase::CoolingDown);
        }
    }

    /// Context, inference rounds and reply for one trigger.
    async fn run_cycle(&mut self, trigger: &Trigger) {
        let agent_id = self.config.id.clone();
        self.set_phase(RuntimePhase::BuildingContext);
        let runtime = &self.config.runtime;
        let window = match trigger.kind {
            TriggerKind::Summarize => runtime.context_window.max(runtime.summarize_every as usize),
            _ => runtime.context_window,
        };
        let history = match self
            .context
            .build_short_context(&runtime.conversation_id, &trigger.message.id, window)
            .await
        {
            Ok(history) => history,
            Err(e) => {
                self.abandon(format!("context unavailable: {e}"));
                return;
            }
        };

        let definitions = self.executor.definitions();
        let context = ConversationContext::new(
            build_preamble(&self.config, &definitions, trigger.kind),
            history,
        );
        let context = compress(&context, runtime.context_token_budget, runtime.keep_recent);
        debug!(
            agent_id = %agent_id,
            messages = context.len(),
            tokens = context.estimated_tokens(),
            "Context built"
        );

        let mut chat = context.to_chat_messages(&self.config.participant_id);
        let outcome = self.run_rounds(&mut chat, trigger, &definitions).await;
        self.state.round = 0;

        match outcome {
            Outcome::Reply { text, rounds } => self.post_reply(trigger, &text, rounds).await,
            Outcome::Reacted { rounds } => {
                debug!(agent_id = %agent_id, rounds, "Replied with reactions only");
            }
            Outcome::Silent => debug!(agent_id = %agent_id, kind = %trigger.kind, "Nothing to say"),
            Outcome::Abandoned(reason) => self.abandon(reason),
        }
    }

    /// The inference/tool loop, bounded by `max_rounds` inference calls.
    async fn run_rounds(
        &mut self,
        chat: &mut Vec<ChatMessage>,
        trigger: &Trigger,
        definitions: &[ToolDefinition],
    ) -> Outcome {
        let max_rounds = self.config.runtime.max_rounds.max(1);
        let tool_ctx = ToolContext {
            agent_id: self.config.id.clone(),
            participant_id: self.config.participant_id.clone(),
            conversation_id: self.config.runtime.conversation_id.clone(),
            trigger_message_id: trigger.message.id.clone(),
        };
        let mut last_visible = String::new();
        let mut round = 0;

        loop {
            round += 1;
            self.state.round = round;
            self.set_phase(RuntimePhase::Inferring);

            let raw = match self.infer(chat, definitions).await {
                Ok(raw) => raw,
                Err(e) => return Outcome::Abandoned(format!("inference failed: {e}")),
            };

            self.set_phase(RuntimePhase::ExecutingTools);
            let parsed = chorus_protocol::parse(&raw);
            let visible = parsed.visible_text.trim().to_string();
            if !visible.is_empty() {
                last_visible = visible.clone();
            }

            if !parsed.has_tool_calls() {
                return if visible.is_empty() {
                    Outcome::Silent
                } else {
                    Outcome::Reply { text: visible, rounds: round }
                };
            }

            let calls: Vec<ToolCall> = parsed
                .tool_calls
                .into_iter()
                .enumerate()
                .map(|(i, call)| call.in_round(round, i))
                .collect();
            let reactions_only = calls.iter().all(|c| c.tool.kind() == Some(ToolKind::React));

            if round >= max_rounds && !reactions_only {
                return self.exhausted(round, last_visible);
            }

            debug!(agent_id = %self.config.id, round, calls = calls.len(), "Executing tool calls");
            let assistant_turn = render_assistant_turn(&visible, &calls);
            let results = self.executor.execute(calls, &tool_ctx).await;

            if reactions_only && results.iter().all(|r| r.success) {
                return if visible.is_empty() {
                    Outcome::Reacted { rounds: round }
                } else {
                    Outcome::Reply { text: visible, rounds: round }
                };
            }
            if round >= max_rounds {
                return self.exhausted(round, last_visible);
            }

            chat.push(ChatMessage::assistant(assistant_turn));
            chat.push(ChatMessage::user(render_results(&results)));
        }
    }

    fn exhausted(&self, round: u32, last_visible: String) -> Outcome {
        warn!(agent_id = %self.config.id, round, "Round limit reached with tool calls pending");
        let text = if last_visible.is_empty() {
            UNABLE_TO_COMPLETE.to_string()
        } else {
            last_visible
        };
        Outcome::Reply { text, rounds: round }
    }

    /// One inference call, retried once after a backoff.
    async fn infer(&self, chat: &[ChatMessage], tools: &[ToolDefinition]) -> Result<String, InferenceError> {
        let model = &self.config.model;
        let request = InferenceRequest {
            messages: chat.to_vec(),
            params: InferenceParams {
                model: model.name.clone(),
                temperature: model.temperature,
                max_tokens: model.max_tokens,
            },
            tools: tools.to_vec(),
        };

        match self.infer_once(request.clone()).await {
            Ok(text) => Ok(text),
            Err(first) => {
                let mut wait = self.config.runtime.inference_retry_backoff();
                if let InferenceError::RateLimited { retry_after_secs } = &first {
                    wait = wait.max(Duration::from_secs(*retry_after_secs));
                }
                warn!(
                    agent_id = %self.config.id,
                    provider = self.inference.name(),
                    error = %first,
                    transient = first.is_transient(),
                    retry_in_ms = wait.as_millis() as u64,
                    "Inference failed, retrying once"
                );
                tokio::time::sleep(wait).await;
                self.infer_once(request).await
            }
        }
    }

    async fn infer_once(&self, request: InferenceRequest) -> Result<String, InferenceError> {
        if !self.config.model.stream {
            return Ok(self.inference.complete(request).await?.text);
        }

        let mut events = self.inference.stream(request).await?;
        let mut assembler = StreamAssembler::new();
        while let Some(event) = events.recv().await {
            assembler.push(event);
        }
        let text = assembler.finish();
        if text.trim().is_empty() {
            return Err(InferenceError::EmptyCompletion);
        }
        Ok(text)
    }

    async fn post_reply(&mut self, trigger: &Trigger, text: &str, rounds: u32) {
        self.set_phase(RuntimePhase::Replying);
        let posted = self
            .feed
            .post_message(
                &self.config.participant_id,
                &self.config.runtime.conversation_id,
                text,
                Some(&trigger.message.id),
            )
            .await;

        match posted {
            Ok(message) => {
                self.context.pending().insert(message.id.clone());
                self.state.replies_posted += 1;
                info!(agent_id = %self.config.id, message_id = %message.id, rounds, "Reply posted");
                self.events.publish(DomainEvent::ReplyPosted {
                    agent_id: self.config.id.clone(),
                    message_id: message.id,
                    rounds,
                    timestamp: Utc::now(),
                });
            }
            Err(e) => self.abandon(format!("posting reply failed: {e}")),
        }
    }

    fn abandon(&mut self, reason: String) {
        warn!(agent_id = %self.config.id, reason = %reason, "Trigger abandoned");
        self.events.publish(DomainEvent::TriggerAbandoned {
            agent_id: self.config.id.clone(),
            reason: reason.clone(),
            timestamp: Utc::now(),
        });
        self.state.last_error = Some(reason);
    }

    fn set_phase(&mut self, phase: RuntimePhase) {
        self.state.phase = phase;
        self.publish_status();
    }

    fn publish_status(&mut self) {
        if let Some(beat) = &self.heartbeat {
            self.state.last_heartbeat_at = *beat.borrow();
        }
        self.status.send_replace(self.state.clone());
    }
}
