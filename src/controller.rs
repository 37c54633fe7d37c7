use crate::api::models::Message;
use crate::audio::AudioSink;
use crate::identity::{derive_id, ConversationId, ParticipantId};
use crate::notify::{Notice, NoticeKind, Notifications};
use crate::rewrite::{DraftRewriter, RewriteStyle};
use crate::session::Session;
use crate::speech::SpeechSynthesizer;
use crate::storage::MessageStore;
use crate::sync::{SyncUpdate, ThreadSync};
use std::cell::{Cell, RefCell};
use std::sync::Arc;
use std::time::Instant;

/// What a user action ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    /// Nothing to do, or the same kind of work is already in flight.
    Ignored,
    /// The action failed and a notice was raised.
    Failed,
}

/// Invariant: `loading` implies `active_message_id.is_some()`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaybackState {
    pub active_message_id: Option<String>,
    pub loading: bool,
}

struct DraftingGuard<'a>(&'a Cell<bool>);

impl Drop for DraftingGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

struct PlaybackGuard<'a>(&'a RefCell<PlaybackState>);

impl Drop for PlaybackGuard<'_> {
    fn drop(&mut self) {
        *self.0.borrow_mut() = PlaybackState::default();
    }
}

/// Owns the session's chat state. Runs on a single thread; state is only
/// borrowed between awaits.
pub struct ConversationController {
    session: Session,
    sync: ThreadSync,
    rewriter: DraftRewriter,
    synthesizer: SpeechSynthesizer,
    sink: Arc<dyn AudioSink>,
    draft: RefCell<String>,
    drafting: Cell<bool>,
    playback: RefCell<PlaybackState>,
    contacts: RefCell<Vec<ParticipantId>>,
    notices: RefCell<Notifications>,
}

impl ConversationController {
    pub fn new(
        session: Session,
        store: Arc<dyn MessageStore>,
        rewriter: DraftRewriter,
        synthesizer: SpeechSynthesizer,
        sink: Arc<dyn AudioSink>,
    ) -> Self {
        Self {
            session,
            sync: ThreadSync::new(store),
            rewriter,
            synthesizer,
            sink,
            draft: RefCell::new(String::new()),
            drafting: Cell::new(false),
            playback: RefCell::new(PlaybackState::default()),
            contacts: RefCell::new(Vec::new()),
            notices: RefCell::new(Notifications::default()),
        }
    }

    pub fn user_id(&self) -> &ParticipantId {
        &self.session.user_id
    }

    fn notify(&self, kind: NoticeKind, detail: Option<String>) {
        self.notices.borrow_mut().push(kind, detail, Instant::now());
    }

    /// Opens the conversation with `recipient`, or keeps the current one if it
    /// is already open.
    pub fn start_chat(&self, recipient: &str) -> Outcome {
        let Some(friend) = ParticipantId::parse(recipient) else {
            self.notify(NoticeKind::InvalidRecipient, None);
            return Outcome::Failed;
        };
        if friend == self.session.user_id {
            self.notify(NoticeKind::SelfChat, None);
            return Outcome::Failed;
        }
        self.open(friend);
        Outcome::Completed
    }

    pub fn select_contact(&self, contact: &ParticipantId) -> Outcome {
        self.start_chat(contact.as_str())
    }

    fn open(&self, friend: ParticipantId) {
        let conversation = derive_id(&self.session.user_id, &friend);
        {
            let mut contacts = self.contacts.borrow_mut();
            if !contacts.contains(&friend) {
                contacts.push(friend);
            }
        }
        if self.sync.active().as_ref() == Some(&conversation) {
            return;
        }
        self.sync.subscribe(conversation);
    }

    pub fn close_chat(&self) {
        self.sync.unsubscribe();
    }

    pub fn contacts(&self) -> Vec<ParticipantId> {
        self.contacts.borrow().clone()
    }

    /// The other participant of the open conversation.
    pub fn current_recipient(&self) -> Option<ParticipantId> {
        let active = self.sync.active()?;
        self.contacts
            .borrow()
            .iter()
            .find(|c| derive_id(&self.session.user_id, c) == active)
            .cloned()
    }

    pub fn active_conversation(&self) -> Option<ConversationId> {
        self.sync.active()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.sync.messages()
    }

    pub fn draft(&self) -> String {
        self.draft.borrow().clone()
    }

    pub fn set_draft(&self, text: &str) {
        *self.draft.borrow_mut() = text.to_string();
    }

    pub fn is_drafting(&self) -> bool {
        self.drafting.get()
    }

    pub fn playback(&self) -> PlaybackState {
        self.playback.borrow().clone()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices_at(Instant::now())
    }

    pub fn notices_at(&self, now: Instant) -> Vec<Notice> {
        self.notices.borrow_mut().visible(now)
    }

    /// Sends the draft to the open conversation. The draft is cleared only
    /// once the store has accepted the message.
    pub async fn send(&self) -> Outcome {
        let text = self.draft.borrow().trim().to_string();
        if text.is_empty() {
            return Outcome::Ignored;
        }
        let Some(conversation) = self.sync.active() else {
            self.notify(NoticeKind::NoConversation, None);
            return Outcome::Failed;
        };
        match self.sync.append(&conversation, &self.session.user_id, &text).await {
            Ok(_) => {
                self.draft.borrow_mut().clear();
                Outcome::Completed
            }
            Err(e) => {
                log::warn!("sending to {} failed: {}", conversation, e);
                self.notify(NoticeKind::SendFailed, Some(e.to_string()));
                Outcome::Failed
            }
        }
    }

    /// Replaces the draft with a rewritten version. A request made while
    /// another rewrite is pending is ignored.
    pub async fn rewrite_draft(&self, style: RewriteStyle) -> Outcome {
        let text = self.draft.borrow().trim().to_string();
        if text.is_empty() || self.drafting.get() {
            return Outcome::Ignored;
        }
        self.drafting.set(true);
        let _guard = DraftingGuard(&self.drafting);

        match self.rewriter.rewrite(&text, style).await {
            Ok(rewritten) => {
                *self.draft.borrow_mut() = rewritten;
                Outcome::Completed
            }
            Err(e) => {
                log::warn!("rewrite failed: {}", e);
                self.notify(NoticeKind::RewriteFailed, Some(e.to_string()));
                Outcome::Failed
            }
        }
    }

    /// Reads a message aloud. Only one message is synthesized or played at a
    /// time; playback state is reset however this returns.
    pub async fn speak(&self, message_id: &str) -> Outcome {
        {
            let playback = self.playback.borrow();
            if playback.loading || playback.active_message_id.is_some() {
                return Outcome::Ignored;
            }
        }
        let Some(message) = self.sync.message(message_id) else {
            return Outcome::Ignored;
        };

        *self.playback.borrow_mut() = PlaybackState {
            active_message_id: Some(message.id.clone()),
            loading: true,
        };
        let _guard = PlaybackGuard(&self.playback);

        let clip = match self.synthesizer.synthesize(&message.text).await {
            Ok(clip) => clip,
            Err(e) => {
                log::warn!("speech for {} failed: {}", message.id, e);
                self.notify(NoticeKind::SpeechFailed, Some(e.to_string()));
                return Outcome::Failed;
            }
        };
        self.playback.borrow_mut().loading = false;

        match self.sink.play(&clip).await {
            Ok(()) => Outcome::Completed,
            Err(e) => {
                log::warn!("playback of {} failed: {}", message.id, e);
                self.notify(NoticeKind::SpeechFailed, Some(e.to_string()));
                Outcome::Failed
            }
        }
    }

    fn on_update(&self, update: &SyncUpdate) {
        if let SyncUpdate::Failed(e) = update {
            self.notify(NoticeKind::SubscriptionFailed, Some(e.0.clone()));
        }
    }

    /// Applies every store push already queued. Returns how many were applied.
    pub fn process_pending(&self) -> usize {
        let mut n = 0;
        while let Some(update) = self.sync.try_next() {
            self.on_update(&update);
            n += 1;
        }
        n
    }

    /// Waits for the next store push and applies it.
    pub async fn next_update(&self) -> SyncUpdate {
        let update = self.sync.next().await;
        self.on_update(&update);
        update
    }
}
