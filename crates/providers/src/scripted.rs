//! A scripted inference client for tests and offline demos.
//!
//! Replies are consumed in order; once the script runs out, the last
//! reply repeats.

use async_trait::async_trait;
use chorus_core::{Completion, InferenceClient, InferenceError, InferenceRequest};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

type Reply = Result<String, InferenceError>;

pub struct ScriptedClient {
    script: Mutex<VecDeque<Reply>>,
    last: Mutex<Option<Reply>>,
    requests: Mutex<Vec<InferenceRequest>>,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedClient {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_results(replies.into_iter().map(|r| Ok(r.into())))
    }

    /// A script that mixes replies and failures.
    pub fn from_results(replies: impl IntoIterator<Item = Reply>) -> Self {
        Self {
            script: Mutex::new(replies.into_iter().collect()),
            last: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
            delay: None,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Always answer with `reply`.
    pub fn repeating(reply: impl Into<String>) -> Self {
        Self::new([reply.into()])
    }

    /// Sleep before every reply.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Every request received so far, oldest first.
    pub fn requests(&self) -> Vec<InferenceRequest> {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Highest number of requests that were ever in progress at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn next_reply(&self) -> Reply {
        let mut script = self.script.lock().unwrap_or_else(|e| e.into_inner());
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(reply) = script.pop_front() {
            *last = Some(reply.clone());
            return reply;
        }
        last.clone().unwrap_or(Err(InferenceError::EmptyCompletion))
    }
}

#[async_trait]
impl InferenceClient for ScriptedClient {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: InferenceRequest) -> Result<Completion, InferenceError> {
        let model = request.params.model.clone();
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).push(request);

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let text = self.next_reply()?;
        Ok(Completion {
            text,
            model,
            usage: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chorus_core::{ChatMessage, InferenceParams};

    fn request() -> InferenceRequest {
        InferenceRequest {
            messages: vec![ChatMessage::user("hi")],
            params: InferenceParams::default(),
            tools: vec![],
        }
    }

    #[tokio::test]
    async fn replies_in_order_then_repeats_last() {
        let client = ScriptedClient::new(["one", "two"]);
        assert_eq!(client.complete(request()).await.unwrap().text, "one");
        assert_eq!(client.complete(request()).await.unwrap().text, "two");
        assert_eq!(client.complete(request()).await.unwrap().text, "two");
        assert_eq!(client.call_count(), 3);
    }

    #[tokio::test]
    async fn scripted_failures_surface() {
        let client = ScriptedClient::from_results([
            Err(InferenceError::Connection("refused".into())),
            Ok("recovered".into()),
        ]);
        assert!(matches!(
            client.complete(request()).await,
            Err(InferenceError::Connection(_))
        ));
        assert_eq!(client.complete(request()).await.unwrap().text, "recovered");
    }

    #[tokio::test]
    async fn empty_script_is_empty_completion() {
        let client = ScriptedClient::new(Vec::<String>::new());
        assert!(matches!(
            client.complete(request()).await,
            Err(InferenceError::EmptyCompletion)
        ));
    }
}
