//! Session management core module.
//!
//! This module owns the capture session lifecycle and the delivery
//! pipeline behind it:
//! - `session`: listening state of the single per-process session.
//! - `authority`: the flag telling the fallback path to stand down.
//! - `pending_queue`: in-memory buffer for messages with no consumer yet.
//! - `dedup`: suppression of messages captured by both paths.
//! - `coordinator`: the state machine and flush protocol tying them together.

pub mod authority;
pub mod coordinator;
pub mod dedup;
pub mod pending_queue;
pub mod session;


pub use authority::AuthorityFlag;
pub use coordinator::{DeliveryCoordinator, DeliveryOutcome, FlushReport};
pub use pending_queue::PendingQueue;
pub use session::{ListeningState, Session};
