use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;

const MAX_MESSAGES: usize = 20;

/// One user-emitted diagnostic line, timestamped for host-side display.
#[derive(Clone, Debug, Serialize)]
pub struct Message {
    pub text: String,
    pub at: DateTime<Utc>,
}

/// Bounded FIFO of script diagnostics. Inserting past capacity evicts the
/// oldest entry. Survives script reloads.
#[derive(Default)]
pub struct MessageLog {
    entries: VecDeque<Message>,
    total: u64,
}

impl MessageLog {
    pub fn push(&mut self, text: impl Into<String>) {
        self.entries.push_back(Message {
            text: text.into(),
            at: Utc::now(),
        });
        self.total += 1;
        while self.entries.len() > MAX_MESSAGES {
            self.entries.pop_front();
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Messages emitted over the whole run, including evicted ones.
    pub fn total(&self) -> u64 {
        self.total
    }
}
