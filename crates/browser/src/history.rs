//! Back / forward history
//!
//! Entries hold the encoded page so revisiting never re-fetches.

use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub address: String,
    pub data: Arc<[u8]>,
}

impl HistoryEntry {
    pub fn new(address: impl Into<String>, data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            address: address.into(),
            data: data.into(),
        }
    }
}

#[derive(Debug, Default)]
pub struct History {
    back: Vec<HistoryEntry>,
    forward: Vec<HistoryEntry>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the page being left for a new one; forward history is dropped
    pub fn visit(&mut self, current: HistoryEntry) {
        self.back.push(current);
        self.forward.clear();
    }

    pub fn peek_back(&self) -> Option<&HistoryEntry> {
        self.back.last()
    }

    pub fn peek_forward(&self) -> Option<&HistoryEntry> {
        self.forward.last()
    }

    /// Pop the previous entry, parking `current` on the forward stack
    pub fn step_back(&mut self, current: HistoryEntry) -> Option<HistoryEntry> {
        let previous = self.back.pop()?;
        self.forward.push(current);
        Some(previous)
    }

    /// Pop the next entry, parking `current` on the back stack
    pub fn step_forward(&mut self, current: HistoryEntry) -> Option<HistoryEntry> {
        let next = self.forward.pop()?;
        self.back.push(current);
        Some(next)
    }

    pub fn can_go_back(&self) -> bool {
        !self.back.is_empty()
    }

    pub fn can_go_forward(&self) -> bool {
        !self.forward.is_empty()
    }

    pub fn back_len(&self) -> usize {
        self.back.len()
    }

    pub fn forward_len(&self) -> usize {
        self.forward.len()
    }
}
