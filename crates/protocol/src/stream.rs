//! Folding streamed event records back into channel-tagged text, so
//! streamed and non-streamed responses go through the same parser.

use chorus_core::StreamEvent;

use crate::tokens::Marker;

#[derive(Debug, Default)]
pub struct StreamAssembler {
    text: String,
    channel: Option<String>,
}

impl StreamAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::ChannelSwitch(name) => self.open(name.trim()),
            StreamEvent::Reasoning(content) => {
                self.ensure("analysis");
                self.text.push_str(&content);
            }
            StreamEvent::Final(content) => {
                self.ensure("final");
                self.text.push_str(&content);
            }
            StreamEvent::Chunk(content) => self.text.push_str(&content),
        }
    }

    /// Close any open channel and return the canonical text.
    pub fn finish(mut self) -> String {
        self.close();
        self.text
    }

    fn ensure(&mut self, channel: &str) {
        let current = self
            .channel
            .as_deref()
            .and_then(|c| c.split_whitespace().next());
        if current != Some(channel) {
            self.open(channel);
        }
    }

    fn open(&mut self, channel: &str) {
        self.close();
        self.text.push_str(Marker::Start.as_str());
        self.text.push_str("assistant");
        self.text.push_str(Marker::Channel.as_str());
        self.text.push_str(channel);
        self.text.push_str(Marker::Message.as_str());
        self.channel = Some(channel.to_string());
    }

    fn close(&mut self) {
        if let Some(channel) = self.channel.take() {
            let marker = if channel.contains("to=") { Marker::Call } else { Marker::End };
            self.text.push_str(marker.as_str());
        }
    }
}
