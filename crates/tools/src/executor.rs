//! Tool executor: a fixed dispatch table from [`ToolKind`] to tool.
//!
//! The executor consumes the calls of one round and returns exactly one
//! [`ToolResult`] per call, in call order. Failures never escape as errors:
//! an unknown tool, a disabled tool, a tool error and a timeout all become
//! `ToolResult { success: false, .. }` so the round can continue.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chorus_core::{
    DomainEvent, EventBus, Tool, ToolCall, ToolContext, ToolDefinition, ToolKind, ToolResult,
};
use chrono::Utc;
use futures::future::join_all;
use tracing::{debug, warn};

pub const UNSUPPORTED_TOOL: &str = "unsupported tool";
pub const TIMEOUT: &str = "timeout";

pub struct ToolExecutor {
    tools: HashMap<ToolKind, Arc<dyn Tool>>,
    enabled: HashSet<ToolKind>,
    sequential: bool,
    timeout: Duration,
    events: Option<EventBus>,
}

impl ToolExecutor {
    /// An executor with every given tool registered and enabled.
    pub fn new(tools: impl IntoIterator<Item = Arc<dyn Tool>>) -> Self {
        let tools: HashMap<ToolKind, Arc<dyn Tool>> =
            tools.into_iter().map(|t| (t.kind(), t)).collect();
        let enabled = tools.keys().copied().collect();
        Self {
            tools,
            enabled,
            sequential: false,
            timeout: Duration::from_secs(20),
            events: None,
        }
    }

    /// Restrict dispatch to `kinds`; registered tools outside the set
    /// answer as unsupported.
    pub fn with_enabled(mut self, kinds: impl IntoIterator<Item = ToolKind>) -> Self {
        self.enabled = kinds.into_iter().collect();
        self
    }

    /// Run the calls of a round one after another instead of concurrently.
    pub fn sequential(mut self, sequential: bool) -> Self {
        self.sequential = sequential;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    fn lookup(&self, kind: ToolKind) -> Option<&Arc<dyn Tool>> {
        self.tools.get(&kind).filter(|_| self.enabled.contains(&kind))
    }

    /// Definitions of the tools the model may call, in a stable order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        ToolKind::ALL
            .iter()
            .filter_map(|kind| self.lookup(*kind))
            .map(|tool| tool.to_definition())
            .collect()
    }

    /// Execute every call of one round. Results come back in call order
    /// whatever the execution mode.
    pub async fn execute(&self, calls: Vec<ToolCall>, ctx: &ToolContext) -> Vec<ToolResult> {
        if self.sequential {
            let mut results = Vec::with_capacity(calls.len());
            for call in calls {
                results.push(self.execute_one(call, ctx).await);
            }
            results
        } else {
            join_all(calls.into_iter().map(|call| self.execute_one(call, ctx))).await
        }
    }

    async fn execute_one(&self, call: ToolCall, ctx: &ToolContext) -> ToolResult {
        let started = Instant::now();

        let Some(tool) = call.tool.kind().and_then(|kind| self.lookup(kind)) else {
            warn!(agent_id = %ctx.agent_id, tool = %call.tool, call_id = %call.id, "Unsupported tool call");
            let result = ToolResult::failure(&call, UNSUPPORTED_TOOL, Duration::ZERO);
            self.publish(ctx, &result);
            return result;
        };

        debug!(agent_id = %ctx.agent_id, tool = %call.tool, call_id = %call.id, round = call.round, "Executing tool");
        let args = call.args();
        let outcome = tokio::time::timeout(self.timeout, tool.execute(&args, ctx)).await;
        let latency = started.elapsed();

        let result = match outcome {
            Ok(Ok(payload)) => ToolResult::ok(&call, payload, latency),
            Ok(Err(e)) => {
                warn!(agent_id = %ctx.agent_id, tool = %call.tool, error = %e, "Tool failed");
                ToolResult::failure(&call, e.to_string(), latency)
            }
            Err(_) => {
                warn!(agent_id = %ctx.agent_id, tool = %call.tool, timeout_ms = self.timeout.as_millis() as u64, "Tool timed out");
                ToolResult::failure(&call, TIMEOUT, latency)
            }
        };
        self.publish(ctx, &result);
        result
    }

    fn publish(&self, ctx: &ToolContext, result: &ToolResult) {
        if let Some(events) = &self.events {
            events.publish(DomainEvent::ToolExecuted {
                agent_id: ctx.agent_id.clone(),
                call_id: result.call_id.clone(),
                tool_name: result.tool.to_string(),
                success: result.success,
                duration_ms: result.latency.as_millis() as u64,
                timestamp: Utc::now(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chorus_core::{ConversationId, ToolArgs, ToolError, ToolName};
    use std::sync::Mutex;

    /// Records execution order; sleeps for `delay_ms` taken from the args.
    struct Recorder {
        kind: ToolKind,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Tool for Recorder {
        fn kind(&self) -> ToolKind {
            self.kind
        }
        fn description(&self) -> &str {
            "records calls"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }
        async fn execute(&self, args: &ToolArgs, _ctx: &ToolContext) -> Result<String, ToolError> {
            let delay = args.integer("delay_ms").unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            let label = args.field("label").unwrap_or("?").to_string();
            if label == "boom" {
                return Err(ToolError::ExecutionFailed {
                    tool_name: self.kind.to_string(),
                    reason: "exploded".into(),
                });
            }
            self.log.lock().unwrap().push(label.clone());
            Ok(format!("done {label}"))
        }
    }

    fn ctx() -> ToolContext {
        ToolContext {
            agent_id: "scout".into(),
            participant_id: "p-scout".into(),
            conversation_id: ConversationId::from("general"),
            trigger_message_id: "m-1".into(),
        }
    }

    fn call(kind: ToolKind, label: &str, delay_ms: u64, index: usize) -> ToolCall {
        ToolCall::new(
            ToolName::Known(kind),
            format!(r#"{{"label":"{label}","delay_ms":{delay_ms}}}"#),
        )
        .in_round(1, index)
    }

    fn executor(log: &Arc<Mutex<Vec<String>>>) -> ToolExecutor {
        ToolExecutor::new([
            Arc::new(Recorder { kind: ToolKind::WebSearch, log: log.clone() }) as Arc<dyn Tool>,
            Arc::new(Recorder { kind: ToolKind::KnowledgeBaseQuery, log: log.clone() }),
        ])
    }

    #[tokio::test(start_paused = true)]
    async fn independent_mode_keeps_call_order_in_results() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let exec = executor(&log);

        let results = exec
            .execute(
                vec![
                    call(ToolKind::WebSearch, "slow", 300, 0),
                    call(ToolKind::KnowledgeBaseQuery, "fast", 10, 1),
                ],
                &ctx(),
            )
            .await;

        // Concurrent: the fast call finished first
        assert_eq!(*log.lock().unwrap(), vec!["fast", "slow"]);
        let ids: Vec<_> = results.iter().map(|r| r.call_id.as_str()).collect();
        assert_eq!(ids, vec!["r1c0", "r1c1"]);
        assert_eq!(results[0].payload, "done slow");
    }

    #[tokio::test(start_paused = true)]
    async fn sequential_mode_runs_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let exec = executor(&log).sequential(true);

        exec.execute(
            vec![
                call(ToolKind::WebSearch, "first", 300, 0),
                call(ToolKind::KnowledgeBaseQuery, "second", 10, 1),
            ],
            &ctx(),
        )
        .await;
        assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_becomes_failed_result() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let exec = executor(&log).with_timeout(Duration::from_secs(1));

        let results = exec
            .execute(
                vec![
                    call(ToolKind::WebSearch, "hang", 60_000, 0),
                    call(ToolKind::KnowledgeBaseQuery, "ok", 0, 1),
                ],
                &ctx(),
            )
            .await;
        assert!(!results[0].success);
        assert_eq!(results[0].error.as_deref(), Some(TIMEOUT));
        assert!(results[1].success);
    }

    #[tokio::test]
    async fn unsupported_and_disabled_tools_never_run() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let exec = executor(&log).with_enabled([ToolKind::WebSearch]);

        let results = exec
            .execute(
                vec![
                    ToolCall::new(ToolName::Unsupported("shell".into()), "rm -rf /").in_round(1, 0),
                    call(ToolKind::KnowledgeBaseQuery, "disabled", 0, 1),
                    call(ToolKind::React, "unregistered", 0, 2),
                ],
                &ctx(),
            )
            .await;
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| !r.success));
        assert!(results.iter().all(|r| r.error.as_deref() == Some(UNSUPPORTED_TOOL)));
        assert!(log.lock().unwrap().is_empty());
        assert_eq!(exec.definitions().len(), 1);
    }

    #[tokio::test]
    async fn tool_error_is_captured_and_published() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let exec = executor(&log).with_events(bus);

        let results = exec
            .execute(vec![call(ToolKind::WebSearch, "boom", 0, 0)], &ctx())
            .await;
        assert!(!results[0].success);
        assert!(results[0].error.as_deref().unwrap().contains("exploded"));

        let event = rx.recv().await.unwrap();
        match event.as_ref() {
            DomainEvent::ToolExecuted { success, tool_name, .. } => {
                assert!(!success);
                assert_eq!(tool_name, "web-search");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}
