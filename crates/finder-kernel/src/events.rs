//! Connector event bus.
//!
//! A typed publish/subscribe channel for things the connector did: one
//! `command.<name>` event per successfully executed command and
//! `volume.*` events for mount lifecycle. Subscribers filter with NATS-style
//! subject patterns.
//!
//! # Pattern Matching
//!
//! Patterns use dot-separated tokens with wildcards:
//! - `*` matches exactly one token: `command.*` matches `command.rm`
//! - `>` matches one or more tokens (only at end): `volume.>`
//! - Exact match: `command.rm` only matches `command.rm`
//!
//! Publishing never fails: with no subscribers the event is dropped.

use std::borrow::Cow;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

// ============================================================================
// Pattern Matching
// ============================================================================

/// Check if a subject matches a pattern.
///
/// ```ignore
/// assert!(matches_pattern("command.*", "command.rm"));
/// assert!(matches_pattern("volume.>", "volume.mount.failed"));
/// assert!(!matches_pattern("command.*", "volume.mounted"));
/// ```
pub fn matches_pattern(pattern: &str, subject: &str) -> bool {
    let pattern_tokens: Vec<&str> = pattern.split('.').collect();
    let subject_tokens: Vec<&str> = subject.split('.').collect();

    let mut pi = 0;
    let mut si = 0;

    while pi < pattern_tokens.len() && si < subject_tokens.len() {
        match pattern_tokens[pi] {
            ">" => {
                // `>` must be last and swallows the remaining tokens
                return pi == pattern_tokens.len() - 1;
            }
            "*" => {
                pi += 1;
                si += 1;
            }
            token => {
                if token != subject_tokens[si] {
                    return false;
                }
                pi += 1;
                si += 1;
            }
        }
    }

    pi == pattern_tokens.len() && si == subject_tokens.len()
}

// ============================================================================
// Messages
// ============================================================================

/// Payloads that know their subject.
pub trait HasSubject {
    fn subject(&self) -> Cow<'_, str>;
}

/// A message published to the bus.
#[derive(Clone, Debug)]
pub struct EventMessage<T> {
    pub subject: String,
    pub payload: T,
    pub timestamp: Instant,
}

impl<T: HasSubject> EventMessage<T> {
    pub fn new(payload: T) -> Self {
        Self {
            subject: payload.subject().into_owned(),
            payload,
            timestamp: Instant::now(),
        }
    }
}

/// Events emitted by the connector.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectorEvent {
    /// A command completed (possibly with per-item warnings).
    Executed {
        command: String,
        /// Hashes of added nodes, after filtering.
        added: Vec<String>,
        changed: Vec<String>,
        removed: Vec<String>,
        warnings: usize,
    },

    /// A root was mounted.
    Mounted { volume_id: String, driver: String },

    /// A root failed to mount.
    MountFailed { driver: String, error: String },

    /// A volume was unmounted.
    Unmounted { volume_id: String },
}

impl HasSubject for ConnectorEvent {
    fn subject(&self) -> Cow<'_, str> {
        match self {
            Self::Executed { command, .. } => Cow::Owned(format!("command.{command}")),
            Self::Mounted { .. } => Cow::Borrowed("volume.mounted"),
            Self::MountFailed { .. } => Cow::Borrowed("volume.mount_failed"),
            Self::Unmounted { .. } => Cow::Borrowed("volume.unmounted"),
        }
    }
}

// ============================================================================
// EventBus
// ============================================================================

/// Broadcast bus for one event type.
#[derive(Debug)]
pub struct EventBus<T: Clone + Send + 'static> {
    tx: broadcast::Sender<EventMessage<T>>,
    capacity: usize,
}

impl<T: Clone + Send + 'static> EventBus<T> {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl<T: Clone + Send + HasSubject + 'static> EventBus<T> {
    /// Publish a payload. Returns the number of receivers it reached.
    pub fn publish(&self, payload: T) -> usize {
        self.tx.send(EventMessage::new(payload)).unwrap_or(0)
    }

    /// Subscribe to messages matching a pattern.
    pub fn subscribe(&self, pattern: &str) -> Subscription<T> {
        Subscription {
            pattern: pattern.to_string(),
            rx: self.tx.subscribe(),
        }
    }
}

impl<T: Clone + Send + 'static> Clone for EventBus<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            capacity: self.capacity,
        }
    }
}

// ============================================================================
// Subscription
// ============================================================================

/// A pattern-filtered subscription.
pub struct Subscription<T: Clone> {
    pattern: String,
    rx: broadcast::Receiver<EventMessage<T>>,
}

impl<T: Clone> Subscription<T> {
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Receive the next matching message, waiting if necessary.
    ///
    /// Returns None if the bus is gone.
    pub async fn recv(&mut self) -> Option<EventMessage<T>> {
        loop {
            match self.rx.recv().await {
                Ok(msg) => {
                    if matches_pattern(&self.pattern, &msg.subject) {
                        return Some(msg);
                    }
                }
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(
                        pattern = %self.pattern,
                        lagged = n,
                        "event subscription lagged behind"
                    );
                }
            }
        }
    }

    /// Receive the next matching message without blocking.
    pub fn try_recv(&mut self) -> Option<EventMessage<T>> {
        loop {
            match self.rx.try_recv() {
                Ok(msg) => {
                    if matches_pattern(&self.pattern, &msg.subject) {
                        return Some(msg);
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Closed) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    tracing::warn!(
                        pattern = %self.pattern,
                        lagged = n,
                        "event subscription lagged behind"
                    );
                }
            }
        }
    }
}

impl<T: Clone> std::fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("pattern", &self.pattern)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn executed(command: &str) -> ConnectorEvent {
        ConnectorEvent::Executed {
            command: command.to_string(),
            added: Vec::new(),
            changed: Vec::new(),
            removed: Vec::new(),
            warnings: 0,
        }
    }

    #[test]
    fn test_pattern_matching() {
        assert!(matches_pattern("command.rm", "command.rm"));
        assert!(!matches_pattern("command.rm", "command.ls"));
        assert!(matches_pattern("command.*", "command.rm"));
        assert!(!matches_pattern("command.*", "command"));
        assert!(matches_pattern("volume.>", "volume.mounted"));
        assert!(matches_pattern(">", "command.open"));
        assert!(!matches_pattern("volume.>", "volume"));
    }

    #[test]
    fn test_subjects() {
        let mut event = executed("rm");
        assert_eq!(event.subject(), "command.rm");
        event = ConnectorEvent::MountFailed {
            driver: "Bogus".into(),
            error: "Driver Bogus does not exist".into(),
        };
        assert_eq!(event.subject(), "volume.mount_failed");
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::<ConnectorEvent>::new(8);
        assert_eq!(bus.publish(executed("ls")), 0);
    }

    #[tokio::test]
    async fn test_subscription_filters_by_pattern() {
        let bus = EventBus::<ConnectorEvent>::new(16);
        let mut commands = bus.subscribe("command.*");
        let mut volumes = bus.subscribe("volume.>");
        assert_eq!(bus.subscriber_count(), 2);

        bus.publish(ConnectorEvent::Mounted {
            volume_id: "m1_".into(),
            driver: "Memory".into(),
        });
        bus.publish(executed("mkdir"));

        let msg = commands.recv().await.unwrap();
        assert_eq!(msg.subject, "command.mkdir");
        assert!(commands.try_recv().is_none());

        let msg = volumes.recv().await.unwrap();
        assert_eq!(
            msg.payload,
            ConnectorEvent::Mounted {
                volume_id: "m1_".into(),
                driver: "Memory".into()
            }
        );
    }
}
