//! Durable Buffer Trait
//!
//! This module defines the `DurableBuffer` trait: a persisted, ordered
//! collection of captured messages that survives process termination.
//!
//! Implementors are responsible for:
//! - Appending messages safely from concurrent capture callbacks
//! - Returning and emptying the whole collection in one step
//! - Preserving append order on read
//!
//! All methods return a `Result` to handle potential storage errors.

use crate::data_capture::types::CapturedMessage;
use crate::error_handling::types::StorageError;

/// The `DurableBuffer` trait defines the interface for buffer backends.
pub trait DurableBuffer: Send + Sync {
    /// Appends one message at the tail of the buffer.
    fn append(&self, message: &CapturedMessage) -> Result<(), StorageError>;

    /// Returns every buffered message in append order and empties the buffer.
    ///
    /// Messages appended concurrently either appear in the result or stay
    /// buffered for the next call; they are never lost in between.
    fn read_and_clear(&self) -> Result<Vec<CapturedMessage>, StorageError>;

    /// Number of messages currently buffered.
    fn len(&self) -> Result<usize, StorageError>;

    fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.len()? == 0)
    }
}
