//! Just-in-time history compaction.
//!
//! When a conversation drifts into the warning band the guard folds the
//! oldest slice of history into a single synthetic system message, keeping
//! the most recent exchanges verbatim so the model retains working context.

use crate::types::{Message, Role};

/// Prefix of the synthetic message produced by compaction.
pub const COMPACTION_MARKER: &str = "[Compacted History]";

/// Folds the oldest portion of a conversation into one summary message.
#[derive(Debug, Clone)]
pub struct Compactor {
    /// Conversations shorter than this are returned unchanged.
    pub min_messages: usize,
    /// Fraction of the conversation (oldest first) to fold away.
    pub ratio: f64,
}

impl Default for Compactor {
    fn default() -> Self {
        Self {
            min_messages: 4,
            ratio: 0.3,
        }
    }
}

impl Compactor {
    /// Compact the conversation, replacing the oldest `ratio` of messages
    /// with a single system message that records what was removed.
    ///
    /// Conversations with fewer than `min_messages` entries pass through
    /// untouched. The result is always valid input for another round of
    /// compaction.
    pub fn compact(&self, conversation: &[Message]) -> Vec<Message> {
        if conversation.len() < self.min_messages {
            return conversation.to_vec();
        }

        let head_len = (conversation.len() as f64 * self.ratio).floor() as usize;
        if head_len == 0 {
            return conversation.to_vec();
        }

        let (head, tail) = conversation.split_at(head_len);

        let mut users = 0usize;
        let mut assistants = 0usize;
        let mut systems = 0usize;
        for message in head {
            match message.role {
                Role::User => users += 1,
                Role::Assistant => assistants += 1,
                Role::System => systems += 1,
            }
        }

        let summary = format!(
            "{COMPACTION_MARKER} {} earlier messages summarized ({users} user, {assistants} assistant, {systems} system)",
            head.len()
        );

        let mut compacted = Vec::with_capacity(tail.len() + 1);
        compacted.push(Message::system(summary));
        compacted.extend_from_slice(tail);
        compacted
    }
}
