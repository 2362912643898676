//! Connection events and the observer registry.

use crate::config::OverflowPolicy;
use crate::error::StreamError;
use crate::message::Message;
use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Event emitted by a [`StreamConnection`](crate::StreamConnection).
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// Handshake completed and queued messages were flushed.
    Open,
    /// The session ended.
    Close {
        /// Why the session ended.
        reason: String,
    },
    /// A text or binary frame arrived.
    Message(Message),
    /// A connection attempt or session failed.
    Error(StreamError),
    /// A reconnect attempt has been scheduled.
    Reconnecting {
        /// Attempt number, starting at 1.
        attempt: u32,
        /// Delay before the attempt.
        delay: Duration,
    },
    /// The outbound queue was full and a message was dropped.
    Overflow {
        /// The dropped message.
        dropped: Message,
        /// Policy that chose it.
        policy: OverflowPolicy,
    },
    /// The reconnect budget is spent; the connection stays closed.
    ReconnectExhausted {
        /// Failed attempts made.
        attempts: u32,
    },
}

impl StreamEvent {
    /// The kind of this event.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Open => EventKind::Open,
            Self::Close { .. } => EventKind::Close,
            Self::Message(_) => EventKind::Message,
            Self::Error(_) => EventKind::Error,
            Self::Reconnecting { .. } => EventKind::Reconnecting,
            Self::Overflow { .. } => EventKind::Overflow,
            Self::ReconnectExhausted { .. } => EventKind::ReconnectExhausted,
        }
    }
}

/// Event kinds handlers subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// [`StreamEvent::Open`]
    Open,
    /// [`StreamEvent::Close`]
    Close,
    /// [`StreamEvent::Message`]
    Message,
    /// [`StreamEvent::Error`]
    Error,
    /// [`StreamEvent::Reconnecting`]
    Reconnecting,
    /// [`StreamEvent::Overflow`]
    Overflow,
    /// [`StreamEvent::ReconnectExhausted`]
    ReconnectExhausted,
}

/// Handle returned by [`EventRegistry::on`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription {
    id: u64,
    kind: EventKind,
}

impl Subscription {
    /// Kind the handler was registered for.
    pub fn kind(&self) -> EventKind {
        self.kind
    }
}

type Handler = Arc<dyn Fn(&StreamEvent) + Send + Sync>;

/// Typed observer registry.
///
/// Handlers are called in registration order on the task that emits the
/// event, outside of any registry lock, so a handler may subscribe or
/// unsubscribe.
#[derive(Default)]
pub struct EventRegistry {
    next_id: AtomicU64,
    handlers: RwLock<Vec<(Subscription, Handler)>>,
}

impl EventRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for events of `kind`.
    pub fn on<F>(&self, kind: EventKind, handler: F) -> Subscription
    where
        F: Fn(&StreamEvent) + Send + Sync + 'static,
    {
        let subscription = Subscription {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            kind,
        };
        self.handlers.write().push((subscription, Arc::new(handler)));
        subscription
    }

    /// Remove a handler. Returns false if it was already removed.
    pub fn off(&self, subscription: &Subscription) -> bool {
        let mut handlers = self.handlers.write();
        let before = handlers.len();
        handlers.retain(|(s, _)| s != subscription);
        handlers.len() != before
    }

    /// Deliver `event` to every handler registered for its kind.
    pub fn emit(&self, event: &StreamEvent) {
        let kind = event.kind();
        let matching: Vec<Handler> = self
            .handlers
            .read()
            .iter()
            .filter(|(s, _)| s.kind == kind)
            .map(|(_, h)| h.clone())
            .collect();

        for handler in matching {
            handler(event);
        }
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    /// Check if no handlers are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every handler.
    pub fn clear(&self) {
        self.handlers.write().clear();
    }
}

impl std::fmt::Debug for EventRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRegistry")
            .field("handlers", &self.len())
            .finish()
    }
}
