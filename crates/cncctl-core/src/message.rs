//! Human-facing message feed.
//!
//! Separate from the engine's [`crate::event`] channels: this carries
//! free-text, leveled messages (the kind a terminal UI or log viewer would
//! show directly to an operator), while `event` carries structured engine
//! state. Built on the same broadcast-channel pattern.

use std::sync::Arc;
use tokio::sync::broadcast;

/// Message severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MessageLevel {
    Verbose = 0,
    Info = 1,
    Warning = 2,
    Error = 3,
}

impl std::fmt::Display for MessageLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Verbose => write!(f, "VERB"),
            Self::Info => write!(f, "INFO"),
            Self::Warning => write!(f, "WARN"),
            Self::Error => write!(f, "ERR!"),
        }
    }
}

/// A single message from the engine or a dialect driver.
#[derive(Debug, Clone)]
pub struct Message {
    pub level: MessageLevel,
    /// Origin, e.g. `"grbl"`, `"tinyg"`, `"transport"`.
    pub source: String,
    pub text: String,
}

impl Message {
    pub fn new(level: MessageLevel, source: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            level,
            source: source.into(),
            text: text.into(),
        }
    }

    pub fn info(source: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(MessageLevel::Info, source, text)
    }

    pub fn warning(source: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(MessageLevel::Warning, source, text)
    }

    pub fn error(source: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(MessageLevel::Error, source, text)
    }

    pub fn verbose(source: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(MessageLevel::Verbose, source, text)
    }
}

impl std::fmt::Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} | {}: {}", self.level, self.source, self.text)
    }
}

/// Fan-out dispatcher for [`Message`]s, mirroring each message into
/// `tracing` at the matching level as well as to any subscribers.
pub struct MessageDispatcher {
    tx: broadcast::Sender<Message>,
    min_level: Arc<parking_lot::RwLock<MessageLevel>>,
}

impl MessageDispatcher {
    pub fn new(buffer_size: usize, min_level: MessageLevel) -> Self {
        let (tx, _) = broadcast::channel(buffer_size);
        Self {
            tx,
            min_level: Arc::new(parking_lot::RwLock::new(min_level)),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Message> {
        self.tx.subscribe()
    }

    pub fn publish(&self, message: Message) {
        if message.level < *self.min_level.read() {
            return;
        }
        match message.level {
            MessageLevel::Verbose => tracing::trace!("{}", message),
            MessageLevel::Info => tracing::info!("{}", message),
            MessageLevel::Warning => tracing::warn!("{}", message),
            MessageLevel::Error => tracing::error!("{}", message),
        }
        let _ = self.tx.send(message);
    }

    pub fn set_min_level(&self, level: MessageLevel) {
        *self.min_level.write() = level;
    }
}

impl Clone for MessageDispatcher {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            min_level: Arc::clone(&self.min_level),
        }
    }
}

impl Default for MessageDispatcher {
    fn default() -> Self {
        Self::new(100, MessageLevel::Info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn below_min_level_is_dropped() {
        let d = MessageDispatcher::new(8, MessageLevel::Warning);
        let mut rx = d.subscribe();
        d.publish(Message::info("grbl", "chatty"));
        d.publish(Message::error("grbl", "alarm:1"));
        let got = rx.recv().await.unwrap();
        assert_eq!(got.text, "alarm:1");
    }
}
