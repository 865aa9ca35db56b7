use std::collections::VecDeque;

use crate::data_capture::types::CapturedMessage;

/// In-memory, capture-ordered messages waiting for a consumer in this
/// process lifetime. Guarded by the coordinator's delivery lock.
#[derive(Debug, Default)]
pub struct PendingQueue {
    messages: VecDeque<CapturedMessage>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, message: CapturedMessage) {
        self.messages.push_back(message);
    }

    /// Returns every queued message in order and leaves the queue empty.
    pub fn drain_all(&mut self) -> Vec<CapturedMessage> {
        self.messages.drain(..).collect()
    }

    /// Puts messages back ahead of anything queued since they were taken.
    pub fn prepend(&mut self, messages: Vec<CapturedMessage>) {
        for message in messages.into_iter().rev() {
            self.messages.push_front(message);
        }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
