use crate::api::models::Message;
use crate::error::SubscriptionError;
use tokio::sync::mpsc;

/// A push from the store: the complete current thread, or a terminal error.
#[derive(Debug, Clone)]
pub enum SnapshotEvent {
    Snapshot(Vec<Message>),
    Failed(SubscriptionError),
}

/// A snapshot event stamped with the subscription generation it belongs to.
#[derive(Debug)]
pub struct Tagged {
    pub generation: u64,
    pub event: SnapshotEvent,
}

/// Delivery end handed to the store on subscribe.
#[derive(Debug, Clone)]
pub struct SnapshotSink {
    generation: u64,
    tx: mpsc::UnboundedSender<Tagged>,
}

impl SnapshotSink {
    pub fn new(generation: u64, tx: mpsc::UnboundedSender<Tagged>) -> Self {
        Self { generation, tx }
    }

    /// Returns false once the receiving side is gone.
    pub fn deliver(&self, event: SnapshotEvent) -> bool {
        self.tx.send(Tagged { generation: self.generation, event }).is_ok()
    }
}

/// Releases a store subscription. Release runs at most once, on `release()` or drop.
pub struct SubscriptionHandle {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl SubscriptionHandle {
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self { release: Some(Box::new(release)) }
    }

    /// A handle with nothing to release, for subscriptions that failed up front.
    pub fn inert() -> Self {
        Self { release: None }
    }

    pub fn release(&mut self) {
        if let Some(f) = self.release.take() {
            f();
        }
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.release();
    }
}
