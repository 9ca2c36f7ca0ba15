//! REST client for the conversation backend.
//!
//! ```text
//! GET  {base}/conversations/{id}/messages?since=<rfc3339>
//! POST {base}/conversations/{id}/messages   {author_id, content, reply_to}
//! POST {base}/messages/{id}/reactions       {emoji, author_id}
//! POST {base}/agents/{id}/heartbeat
//! ```

use async_trait::async_trait;
use chorus_core::{ConversationId, FeedError, Message, MessageFeed};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

pub struct HttpMessageFeed {
    base_url: String,
    credential: Option<String>,
    client: reqwest::Client,
}

impl std::fmt::Debug for HttpMessageFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpMessageFeed")
            .field("base_url", &self.base_url)
            .field("credential", &self.credential.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

#[derive(Serialize)]
struct NewMessage<'a> {
    author_id: &'a str,
    content: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_to: Option<&'a str>,
}

#[derive(Serialize)]
struct NewReaction<'a> {
    emoji: &'a str,
    author_id: &'a str,
}

impl HttpMessageFeed {
    pub fn new(base_url: impl Into<String>, credential: Option<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credential,
            client,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.credential {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::Response, FeedError> {
        let response = self
            .authorized(builder)
            .send()
            .await
            .map_err(|e| FeedError::Connection(e.to_string()))?;
        check_status(response).await
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, FeedError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    match status.as_u16() {
        401 | 403 => Err(FeedError::Unauthorized),
        404 => Err(FeedError::NotFound(response.url().path().to_string())),
        code => {
            let body = response.text().await.unwrap_or_default();
            warn!(status = code, body = %body, "Feed request failed");
            Err(FeedError::Status { status_code: code, body })
        }
    }
}

fn since_param(since: DateTime<Utc>) -> String {
    since.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[async_trait]
impl MessageFeed for HttpMessageFeed {
    async fn list_messages(
        &self,
        since: Option<DateTime<Utc>>,
        conversation_id: &ConversationId,
    ) -> Result<Vec<Message>, FeedError> {
        let mut request = self
            .client
            .get(self.url(&format!("/conversations/{conversation_id}/messages")));
        if let Some(since) = since {
            request = request.query(&[("since", since_param(since))]);
        }

        let mut messages: Vec<Message> = self
            .send(request)
            .await?
            .json()
            .await
            .map_err(|e| FeedError::MalformedPayload(e.to_string()))?;

        // The backend is not trusted to sort or filter
        if let Some(since) = since {
            messages.retain(|m| m.timestamp >= since);
        }
        messages.sort_by_key(Message::cursor);
        debug!(conversation_id = %conversation_id, count = messages.len(), "Listed messages");
        Ok(messages)
    }

    async fn post_message(
        &self,
        author_id: &str,
        conversation_id: &ConversationId,
        content: &str,
        reply_to: Option<&str>,
    ) -> Result<Message, FeedError> {
        let request = self
            .client
            .post(self.url(&format!("/conversations/{conversation_id}/messages")))
            .json(&NewMessage {
                author_id,
                content,
                reply_to,
            });
        self.send(request)
            .await?
            .json()
            .await
            .map_err(|e| FeedError::MalformedPayload(e.to_string()))
    }

    async fn post_reaction(
        &self,
        message_id: &str,
        emoji: &str,
        author_id: &str,
    ) -> Result<(), FeedError> {
        let request = self
            .client
            .post(self.url(&format!("/messages/{message_id}/reactions")))
            .json(&NewReaction { emoji, author_id });
        self.send(request).await.map(|_| ())
    }

    async fn post_heartbeat(&self, agent_id: &str) -> Result<(), FeedError> {
        let request = self.client.post(self.url(&format!("/agents/{agent_id}/heartbeat")));
        self.send(request).await.map(|_| ())
    }
}
