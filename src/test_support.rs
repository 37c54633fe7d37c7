//! Fakes for the store, generation backend and audio sink seams.

use crate::api::client::GenerativeBackend;
use crate::api::events::{SnapshotEvent, SnapshotSink, SubscriptionHandle};
use crate::api::models::{
    Candidate, Content, GenerateContentRequest, GenerateContentResponse, InlineData, Message, NewMessage, Part,
    UserProfile,
};
use crate::audio::{AudioSink, SpeechClip};
use crate::error::{SendError, SpeechError, StoreError, TransportError};
use crate::identity::{ConversationId, ParticipantId};
use crate::storage::MessageStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

pub fn pid(s: &str) -> ParticipantId {
    ParticipantId::parse(s).unwrap()
}

pub fn message_at(id: &str, sender: &str, secs: i64) -> Message {
    Message {
        id: id.to_string(),
        sender_id: pid(sender),
        text: format!("text of {id}"),
        timestamp: DateTime::<Utc>::from_timestamp(secs, 0).unwrap(),
    }
}

/// Store whose pushes are driven by the test.
#[derive(Default)]
pub struct ScriptedStore {
    sinks: Mutex<Vec<(ConversationId, SnapshotSink)>>,
    released: Arc<AtomicUsize>,
    fail_appends: AtomicBool,
    appended: Mutex<Vec<(ConversationId, NewMessage)>>,
}

impl ScriptedStore {
    pub fn latest_sink(&self) -> SnapshotSink {
        self.sinks.lock().unwrap().last().unwrap().1.clone()
    }

    pub fn latest_conversation(&self) -> Option<ConversationId> {
        self.sinks.lock().unwrap().last().map(|(c, _)| c.clone())
    }

    pub fn subscriptions(&self) -> usize {
        self.sinks.lock().unwrap().len()
    }

    pub fn push_latest(&self, event: SnapshotEvent) {
        self.latest_sink().deliver(event);
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    pub fn fail_appends(&self, fail: bool) {
        self.fail_appends.store(fail, Ordering::SeqCst);
    }

    pub fn appended(&self) -> Vec<(ConversationId, String)> {
        self.appended.lock().unwrap().iter().map(|(c, m)| (c.clone(), m.text.clone())).collect()
    }
}

#[async_trait]
impl MessageStore for ScriptedStore {
    async fn append(&self, conversation: &ConversationId, message: NewMessage) -> Result<Message, SendError> {
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(SendError(StoreError::Unavailable("permission denied".into())));
        }
        let mut appended = self.appended.lock().unwrap();
        appended.push((conversation.clone(), message.clone()));
        let n = appended.len() as i64;
        Ok(Message {
            id: format!("m{n}"),
            sender_id: message.sender_id,
            text: message.text,
            timestamp: DateTime::<Utc>::from_timestamp(n, 0).unwrap(),
        })
    }

    fn subscribe(&self, conversation: &ConversationId, sink: SnapshotSink) -> SubscriptionHandle {
        self.sinks.lock().unwrap().push((conversation.clone(), sink));
        let released = Arc::clone(&self.released);
        SubscriptionHandle::new(move || {
            released.fetch_add(1, Ordering::SeqCst);
        })
    }

    async fn touch_user(&self, _profile: &UserProfile) -> Result<(), StoreError> {
        Ok(())
    }
}

pub fn text_response(text: &str) -> GenerateContentResponse {
    GenerateContentResponse {
        candidates: vec![Candidate { content: Some(Content::text(text)) }],
    }
}

pub fn audio_response(mime: Option<&str>, data: Option<&str>) -> GenerateContentResponse {
    GenerateContentResponse {
        candidates: vec![Candidate {
            content: Some(Content {
                parts: vec![Part {
                    text: None,
                    inline_data: Some(InlineData {
                        mime_type: mime.map(str::to_string),
                        data: data.map(str::to_string),
                    }),
                }],
            }),
        }],
    }
}

/// Backend answering from a queue. With `hold()`, each call waits for `release()`.
#[derive(Default)]
pub struct ScriptedBackend {
    replies: Mutex<VecDeque<Result<GenerateContentResponse, TransportError>>>,
    requests: Mutex<Vec<(String, GenerateContentRequest)>>,
    held: AtomicBool,
    gate: Notify,
}

impl ScriptedBackend {
    pub fn reply(self, reply: Result<GenerateContentResponse, TransportError>) -> Self {
        self.replies.lock().unwrap().push_back(reply);
        self
    }

    pub fn hold(self) -> Self {
        self.held.store(true, Ordering::SeqCst);
        self
    }

    pub fn release(&self) {
        self.gate.notify_one();
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn last_request(&self) -> (String, GenerateContentRequest) {
        self.requests.lock().unwrap().last().cloned().unwrap()
    }
}

#[async_trait]
impl GenerativeBackend for ScriptedBackend {
    async fn generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse, TransportError> {
        self.requests.lock().unwrap().push((model.to_string(), request.clone()));
        if self.held.load(Ordering::SeqCst) {
            self.gate.notified().await;
        }
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(TransportError::Network("no scripted reply".into())))
    }
}

/// Sink that records clips instead of playing them.
#[derive(Default)]
pub struct RecordingSink {
    played: Mutex<Vec<usize>>,
    fail: AtomicBool,
}

impl RecordingSink {
    pub fn failing() -> Self {
        let sink = Self::default();
        sink.fail.store(true, Ordering::SeqCst);
        sink
    }

    pub fn played(&self) -> Vec<usize> {
        self.played.lock().unwrap().clone()
    }
}

#[async_trait]
impl AudioSink for RecordingSink {
    async fn play(&self, clip: &SpeechClip) -> Result<(), SpeechError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(SpeechError::Playback("device busy".into()));
        }
        self.played.lock().unwrap().push(clip.wav.len());
        Ok(())
    }
}
