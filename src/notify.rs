use std::fmt;
use std::time::{Duration, Instant};

/// How long a notice stays visible.
pub const DISPLAY_DURATION: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    SelfChat,
    InvalidRecipient,
    NoConversation,
    SendFailed,
    SubscriptionFailed,
    RewriteFailed,
    SpeechFailed,
}

impl fmt::Display for NoticeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::SelfChat => "You cannot start a chat with yourself.",
            Self::InvalidRecipient => "Please enter a valid friend ID.",
            Self::NoConversation => "Select or start a chat first.",
            Self::SendFailed => "Message could not be sent.",
            Self::SubscriptionFailed => "Could not load messages.",
            Self::RewriteFailed => "Could not generate a draft.",
            Self::SpeechFailed => "Could not generate speech.",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone)]
pub struct Notice {
    pub kind: NoticeKind,
    pub detail: Option<String>,
    expires_at: Instant,
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.detail {
            Some(d) => write!(f, "{} ({})", self.kind, d),
            None => write!(f, "{}", self.kind),
        }
    }
}

/// Transient notices. Each one expires on its own after [`DISPLAY_DURATION`].
#[derive(Debug, Default)]
pub struct Notifications {
    items: Vec<Notice>,
}

impl Notifications {
    pub fn push(&mut self, kind: NoticeKind, detail: Option<String>, now: Instant) {
        self.items.push(Notice { kind, detail, expires_at: now + DISPLAY_DURATION });
    }

    /// Drops expired notices and returns what is still visible at `now`.
    pub fn visible(&mut self, now: Instant) -> Vec<Notice> {
        self.items.retain(|n| n.expires_at > now);
        self.items.clone()
    }
}
