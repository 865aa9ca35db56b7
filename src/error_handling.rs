//! Error types shared across the relay.

pub mod types;
