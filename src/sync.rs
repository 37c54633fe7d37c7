use crate::api::events::{SnapshotEvent, SnapshotSink, SubscriptionHandle, Tagged};
use crate::api::models::{Message, NewMessage};
use crate::error::{SendError, SubscriptionError};
use crate::identity::{ConversationId, ParticipantId};
use crate::storage::MessageStore;
use std::cell::RefCell;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

/// What applying one store push did to the local view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncUpdate {
    /// The view was replaced by a snapshot of this many messages.
    Replaced(usize),
    /// The active subscription failed and has been released.
    Failed(SubscriptionError),
    /// The push belonged to a released subscription and was dropped.
    Stale,
}

struct Active {
    conversation: ConversationId,
    handle: SubscriptionHandle,
}

#[derive(Default)]
struct State {
    generation: u64,
    active: Option<Active>,
    messages: Vec<Message>,
}

/// Keeps the local, time-ordered view of a single conversation in step with
/// the store. At most one subscription is held at a time.
pub struct ThreadSync {
    store: Arc<dyn MessageStore>,
    tx: mpsc::UnboundedSender<Tagged>,
    events: Mutex<mpsc::UnboundedReceiver<Tagged>>,
    state: RefCell<State>,
}

impl ThreadSync {
    pub fn new(store: Arc<dyn MessageStore>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            store,
            tx,
            events: Mutex::new(rx),
            state: RefCell::new(State::default()),
        }
    }

    /// Switches the view to `conversation`. The previous subscription is
    /// released before the new one is opened, and anything it still delivers
    /// is discarded.
    pub fn subscribe(&self, conversation: ConversationId) {
        let mut state = self.state.borrow_mut();
        if let Some(mut old) = state.active.take() {
            log::debug!("releasing subscription to {}", old.conversation);
            old.handle.release();
        }
        state.messages.clear();
        state.generation += 1;

        log::info!("subscribing to {}", conversation);
        let sink = SnapshotSink::new(state.generation, self.tx.clone());
        let handle = self.store.subscribe(&conversation, sink);
        state.active = Some(Active { conversation, handle });
    }

    pub fn unsubscribe(&self) {
        let mut state = self.state.borrow_mut();
        if let Some(mut old) = state.active.take() {
            log::debug!("releasing subscription to {}", old.conversation);
            old.handle.release();
        }
        state.messages.clear();
        state.generation += 1;
    }

    pub fn active(&self) -> Option<ConversationId> {
        self.state.borrow().active.as_ref().map(|a| a.conversation.clone())
    }

    pub fn messages(&self) -> Vec<Message> {
        self.state.borrow().messages.clone()
    }

    pub fn message(&self, id: &str) -> Option<Message> {
        self.state.borrow().messages.iter().find(|m| m.id == id).cloned()
    }

    pub fn apply(&self, tagged: Tagged) -> SyncUpdate {
        let mut state = self.state.borrow_mut();
        if tagged.generation != state.generation || state.active.is_none() {
            log::debug!("dropping push from released subscription (generation {})", tagged.generation);
            return SyncUpdate::Stale;
        }
        match tagged.event {
            SnapshotEvent::Snapshot(mut messages) => {
                messages.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
                let n = messages.len();
                state.messages = messages;
                SyncUpdate::Replaced(n)
            }
            SnapshotEvent::Failed(err) => {
                if let Some(mut old) = state.active.take() {
                    log::warn!("subscription to {} failed: {}", old.conversation, err);
                    old.handle.release();
                }
                state.messages.clear();
                state.generation += 1;
                SyncUpdate::Failed(err)
            }
        }
    }

    /// Applies the next queued push, if one is waiting.
    pub fn try_next(&self) -> Option<SyncUpdate> {
        let tagged = self.events.try_lock().ok()?.try_recv().ok()?;
        Some(self.apply(tagged))
    }

    /// Waits for the next push and applies it.
    pub async fn next(&self) -> SyncUpdate {
        let tagged = {
            let mut events = self.events.lock().await;
            events.recv().await
        };
        match tagged {
            Some(tagged) => self.apply(tagged),
            // `self.tx` keeps the channel open for as long as `self` lives.
            None => SyncUpdate::Stale,
        }
    }

    pub async fn append(
        &self,
        conversation: &ConversationId,
        sender_id: &ParticipantId,
        text: &str,
    ) -> Result<Message, SendError> {
        let store = Arc::clone(&self.store);
        let message = NewMessage { sender_id: sender_id.clone(), text: text.to_string() };
        let created = store.append(conversation, message).await?;
        log::debug!("appended {} to {}", created.id, conversation);
        Ok(created)
    }
}
