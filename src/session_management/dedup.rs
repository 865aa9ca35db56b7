//! Suppression of the second copy of a message captured by both paths
//! during a start/stop handoff.

use std::collections::{HashSet, VecDeque};

use chrono::{DateTime, Utc};

use crate::data_capture::types::CapturedMessage;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct MessageKey {
    sender: String,
    body: String,
    captured_at: DateTime<Utc>,
}

impl From<&CapturedMessage> for MessageKey {
    fn from(message: &CapturedMessage) -> Self {
        Self {
            sender: message.sender.clone(),
            body: message.body.clone(),
            captured_at: message.captured_at,
        }
    }
}

/// Identities of the most recently delivered messages, oldest evicted first.
#[derive(Debug)]
pub struct RecentDeliveries {
    capacity: usize,
    order: VecDeque<MessageKey>,
    index: HashSet<MessageKey>,
}

impl RecentDeliveries {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity),
            index: HashSet::with_capacity(capacity),
        }
    }

    pub fn contains(&self, message: &CapturedMessage) -> bool {
        self.index.contains(&MessageKey::from(message))
    }

    pub fn remember(&mut self, message: &CapturedMessage) {
        let key = MessageKey::from(message);
        if !self.index.insert(key.clone()) {
            return;
        }
        self.order.push_back(key);
        if self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.index.remove(&evicted);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }
}
