use crate::api::models::Message;
use crate::controller::PlaybackState;
use crate::identity::ParticipantId;
use crate::notify::Notice;
use crate::session::display_name;

pub fn header(user: &ParticipantId) -> String {
    format!("Messenger - your ID: {} ({})", user, display_name(user))
}

pub fn contacts(list: &[ParticipantId], current: Option<&ParticipantId>) -> String {
    if list.is_empty() {
        return "No chats yet. Start one with /chat <friend id>.".to_string();
    }
    list.iter()
        .enumerate()
        .map(|(i, c)| {
            let marker = if Some(c) == current { '*' } else { ' ' };
            format!("{} {:>2}. {}", marker, i + 1, c)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// One line per message, numbered from 1 for `/speak`.
pub fn thread(messages: &[Message], me: &ParticipantId, playback: &PlaybackState) -> String {
    if messages.is_empty() {
        return "(no messages yet)".to_string();
    }
    messages
        .iter()
        .enumerate()
        .map(|(i, m)| {
            let who = if &m.sender_id == me { "you".to_string() } else { display_name(&m.sender_id) };
            let status = match &playback.active_message_id {
                Some(id) if *id == m.id && playback.loading => " [loading audio]",
                Some(id) if *id == m.id => " [playing]",
                _ => "",
            };
            format!("{:>3} {} {}: {}{}", i + 1, m.timestamp.format("%H:%M"), who, m.text, status)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn notices(list: &[Notice]) -> Option<String> {
    if list.is_empty() {
        return None;
    }
    Some(list.iter().map(|n| format!("! {}", n)).collect::<Vec<_>>().join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{message_at, pid};

    #[test]
    fn thread_marks_own_messages_and_playback() {
        let messages = vec![message_at("a1", "me", 0), message_at("a2", "anna", 60)];
        let playback = PlaybackState { active_message_id: Some("a2".into()), loading: true };
        let out = thread(&messages, &pid("me"), &playback);
        let lines: Vec<_> = out.lines().collect();
        assert_eq!(lines[0], "  1 00:00 you: text of a1");
        assert_eq!(lines[1], "  2 00:01 User anna: text of a2 [loading audio]");
    }

    #[test]
    fn contacts_mark_current() {
        let list = vec![pid("anna"), pid("ben")];
        let out = contacts(&list, Some(&pid("ben")));
        assert_eq!(out, "   1. anna\n*  2. ben");
    }
}
