//! Narration log
//!
//! Append-only. Entries keep arrival order; the drawer shows them newest
//! first, which is a view over the same data.

use crate::model::{Message, Player};

/// A message plus the text derived when it arrived
#[derive(Debug, Clone, PartialEq)]
pub struct LoggedMessage {
    pub message: Message,
    pub display_string: String,
}

#[derive(Debug, Clone, Default)]
pub struct MessageLog {
    entries: Vec<LoggedMessage>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a message, resolving names against the current roster
    pub fn append(&mut self, message: Message, players: &[Player]) {
        let display_string = message.display_string(players);
        log::debug!("Message: {}", display_string);
        self.entries.push(LoggedMessage {
            message,
            display_string,
        });
    }

    /// Arrival order
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &LoggedMessage> {
        self.entries.iter()
    }

    /// Newest first, for display
    pub fn recent_first(&self) -> impl Iterator<Item = &LoggedMessage> {
        self.entries.iter().rev()
    }

    pub fn last(&self) -> Option<&LoggedMessage> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
