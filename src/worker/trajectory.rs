//! Conversation container and the trajectory flush policies that keep a
//! long task inside bounded model context.

use serde::Serialize;

use crate::llm::types::Message;

#[derive(Debug, Clone, Copy, Serialize)]
pub struct TrajectoryMeta {
    pub turn_count: u32,
    pub max_trajectory_length: usize,
    pub max_images: usize,
}

/// An ordered message sequence. Index 0 is always the system prompt;
/// user/assistant turns alternate after it.
#[derive(Debug, Clone)]
pub struct Conversation {
    pub messages: Vec<Message>,
}

impl Conversation {
    pub fn new(system: Message) -> Self {
        Self {
            messages: vec![system],
        }
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn total_images(&self) -> usize {
        self.messages.iter().map(|m| m.image_count()).sum()
    }

    /// Long-context flush: keep every text part but retain only the newest
    /// `max_images` image parts across all messages. Walks newest to
    /// oldest; message ordering is untouched.
    pub fn flush_images(&mut self, max_images: usize) {
        let mut seen = 0usize;
        for message in self.messages.iter_mut().rev() {
            message.parts.retain(|part| {
                if part.is_image() {
                    seen += 1;
                    seen <= max_images
                } else {
                    true
                }
            });
        }
    }

    /// Short-context flush: drop the oldest user/assistant round (the two
    /// messages right after the system prompt) while the conversation is
    /// longer than `threshold` messages.
    pub fn flush_rounds(&mut self, threshold: usize) {
        while self.messages.len() > threshold && self.messages.len() >= 3 {
            self.messages.drain(1..3);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::{ContentPart, Role};

    fn image_message(label: &str) -> Message {
        let mut msg = Message::text(Role::User, label);
        msg.push_image(vec![0u8; 4], "image/png");
        msg
    }

    #[test]
    fn flush_images_keeps_only_newest() {
        let mut conv = Conversation::new(Message::text(Role::System, "sys"));
        for i in 0..5 {
            conv.push(image_message(&format!("turn-{i}")));
            conv.push(Message::text(Role::Assistant, "plan"));
        }
        assert_eq!(conv.total_images(), 5);
        conv.flush_images(2);
        assert_eq!(conv.total_images(), 2);
        // The newest two user turns keep their image, the older ones lose it.
        assert_eq!(conv.messages[9].image_count(), 1);
        assert_eq!(conv.messages[7].image_count(), 1);
        assert_eq!(conv.messages[5].image_count(), 0);
    }

    #[test]
    fn flush_images_never_drops_text() {
        let mut conv = Conversation::new(Message::text(Role::System, "sys"));
        for i in 0..4 {
            conv.push(image_message(&format!("turn-{i}")));
            conv.push(Message::text(Role::Assistant, format!("plan-{i}")));
        }
        conv.flush_images(1);
        let texts: Vec<String> = conv
            .messages
            .iter()
            .flat_map(|m| m.parts.iter())
            .filter_map(|p| match p {
                ContentPart::Text { text } => Some(text.clone()),
                _ => None,
            })
            .collect();
        for i in 0..4 {
            assert!(texts.contains(&format!("turn-{i}")));
            assert!(texts.contains(&format!("plan-{i}")));
        }
    }

    #[test]
    fn flush_rounds_drops_oldest_pairs_after_system() {
        let mut conv = Conversation::new(Message::text(Role::System, "sys"));
        for i in 0..6 {
            conv.push(Message::text(Role::User, format!("u{i}")));
            conv.push(Message::text(Role::Assistant, format!("a{i}")));
        }
        // max_trajectory_length 2 => threshold 2*2+1 = 5 messages.
        conv.flush_rounds(5);
        assert_eq!(conv.messages.len(), 5);
        assert_eq!(conv.messages[0].joined_text(), "sys");
        assert_eq!(conv.messages[1].joined_text(), "u4");
        assert_eq!(conv.messages[4].joined_text(), "a5");
    }
}
