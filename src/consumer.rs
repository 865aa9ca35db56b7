//! The boundary between the relay and the listener it feeds.
//!
//! A [`Consumer`] is handed one [`ConsumerEvent`] per message, in capture
//! order. Returning `false` from [`Consumer::notify`] means the listener is
//! gone and the coordinator must keep the message for a later attach.

use log::debug;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::data_capture::types::ConsumerEvent;

pub trait Consumer: Send + Sync {
    /// Called with the coordinator's delivery lock held: implementations
    /// must return promptly and must not call back into the coordinator.
    fn notify(&self, event: &ConsumerEvent) -> bool;
}

/// Forwards events into a tokio channel read by an async listener task.
///
/// Once the receiving half is dropped, `notify` reports the consumer as
/// detached.
#[derive(Clone)]
pub struct ChannelConsumer {
    tx: UnboundedSender<ConsumerEvent>,
}

impl ChannelConsumer {
    pub fn new() -> (Self, UnboundedReceiver<ConsumerEvent>) {
        let (tx, rx) = unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Consumer for ChannelConsumer {
    fn notify(&self, event: &ConsumerEvent) -> bool {
        match self.tx.send(event.clone()) {
            Ok(()) => true,
            Err(_) => {
                debug!("Listener channel closed, message from {} not taken", event.sender);
                false
            }
        }
    }
}
