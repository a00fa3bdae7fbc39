use crate::config::MessagingConfig;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub enum MessageKind {
    /// A data product finished assembly
    ProductAssembled,
    /// Free-text status announcement
    Log,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub kind: MessageKind,
    pub text: String,
}

impl Message {
    pub fn new(kind: MessageKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
        }
    }

    pub fn log(text: impl Into<String>) -> Self {
        Self::new(MessageKind::Log, text)
    }
}

/// Receives messages on the publisher's thread.
pub trait MessageHandler: Send + Sync {
    fn handle(&self, message: &Message);
}

impl<F> MessageHandler for F
where
    F: Fn(&Message) + Send + Sync,
{
    fn handle(&self, message: &Message) {
        self(message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub struct SubscriptionId(u64);

/// Publish/subscribe channel shared by the session.
#[async_trait]
pub trait MessageChannel: Send + Sync {
    fn is_enabled(&self) -> bool;

    /// Whether the channel's endpoint can currently be reached.
    async fn is_reachable(&self) -> bool;

    fn publish(&self, message: Message);

    fn subscribe(&self, kind: MessageKind, handler: Arc<dyn MessageHandler>) -> SubscriptionId;

    /// Removing an unknown id is a no-op.
    fn unsubscribe(&self, id: SubscriptionId);
}

struct Subscriber {
    id: SubscriptionId,
    kind: MessageKind,
    handler: Arc<dyn MessageHandler>,
}

/// In-process message bus.
///
/// Subscribers are invoked synchronously by `publish`. Every published message is
/// also copied onto a broadcast channel for passive observers, see [`MessageBus::tap`].
pub struct MessageBus {
    config: MessagingConfig,
    subscribers: Mutex<Vec<Subscriber>>,
    next_id: AtomicU64,
    tap: broadcast::Sender<Message>,
}

impl MessageBus {
    pub fn new(config: MessagingConfig) -> Self {
        let (tap, _rx) = broadcast::channel(256);
        Self {
            config,
            subscribers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            tap,
        }
    }

    /// Receiver observing every message published after this call.
    pub fn tap(&self) -> broadcast::Receiver<Message> {
        self.tap.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().map(|s| s.len()).unwrap_or(0)
    }
}

#[async_trait]
impl MessageChannel for MessageBus {
    fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    async fn is_reachable(&self) -> bool {
        if !self.config.enabled {
            return false;
        }
        if !self.config.check_service {
            return true;
        }
        let addr = (self.config.host.as_str(), self.config.port);
        match tokio::time::timeout(self.config.connect_timeout(), TcpStream::connect(addr)).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                warn!(host = %self.config.host, port = self.config.port, "Message service unreachable: {e}");
                false
            }
            Err(_) => {
                warn!(host = %self.config.host, port = self.config.port, "Connecting to message service timed out");
                false
            }
        }
    }

    fn publish(&self, message: Message) {
        let handlers: Vec<Arc<dyn MessageHandler>> = match self.subscribers.lock() {
            Ok(subscribers) => subscribers
                .iter()
                .filter(|s| s.kind == message.kind)
                .map(|s| s.handler.clone())
                .collect(),
            Err(_) => Vec::new(),
        };
        for handler in handlers {
            handler.handle(&message);
        }
        let _ = self.tap.send(message);
    }

    fn subscribe(&self, kind: MessageKind, handler: Arc<dyn MessageHandler>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.push(Subscriber { id, kind, handler });
        }
        debug!(%id, %kind, "Subscribed");
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.retain(|s| s.id != id);
        }
        debug!(%id, "Unsubscribed");
    }
}
