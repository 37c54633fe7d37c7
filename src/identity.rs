use serde::{Deserialize, Serialize};
use std::fmt;

/// Joins the two participant ids of a conversation. Never valid inside an id.
pub const SEPARATOR: &str = "___";

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(String);

impl ParticipantId {
    /// Trims the input and rejects empty ids or ids containing [`SEPARATOR`].
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.contains(SEPARATOR) {
            return None;
        }
        Some(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(String);

impl ConversationId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Order-independent id of the conversation between `a` and `b`.
pub fn derive_id(a: &ParticipantId, b: &ParticipantId) -> ConversationId {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    ConversationId(format!("{}{}{}", lo.0, SEPARATOR, hi.0))
}
