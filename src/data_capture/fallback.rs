//! Fallback capture path: registered for the whole install, independent
//! of any session, and possibly running in a process with no coordinator.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, trace, warn};

use super::types::{CaptureEvent, CapturedMessage};
use crate::context::RelayContext;
use crate::error_handling::types::CaptureError;
use crate::host::{CaptureReceiver, KeepAlive};
use crate::session_management::AuthorityFlag;
use crate::storage::DurableBuffer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackOutcome {
    /// The primary path is authoritative; nothing was done.
    Deferred,
    /// The message was written to the durable buffer.
    Persisted,
}

/// Writes events to the durable buffer whenever the primary path is not
/// active. It never attempts delivery: no consumer or coordinator can be
/// assumed to exist.
pub struct FallbackCapture {
    authority: Arc<AuthorityFlag>,
    buffer: Arc<dyn DurableBuffer>,
    keep_alive: Arc<dyn KeepAlive>,
    keep_alive_for: Duration,
}

impl FallbackCapture {
    pub fn new(context: &RelayContext) -> Self {
        Self {
            authority: Arc::clone(&context.authority),
            buffer: Arc::clone(&context.buffer),
            keep_alive: Arc::clone(&context.keep_alive),
            keep_alive_for: context.keep_alive_for,
        }
    }

    pub fn handle(&self, event: &CaptureEvent) -> Result<FallbackOutcome, CaptureError> {
        if self.authority.is_primary_active() {
            trace!("[fallback] primary path active, standing down");
            return Ok(FallbackOutcome::Deferred);
        }
        let message = CapturedMessage::from_event(event)?;
        if !self.keep_alive_for.is_zero() {
            self.keep_alive.keep_alive(self.keep_alive_for);
        }
        self.buffer
            .append(&message)
            .map_err(CaptureError::PersistenceWriteFailed)?;
        debug!("[fallback] persisted message from {}", message.sender);
        Ok(FallbackOutcome::Persisted)
    }
}

impl CaptureReceiver for FallbackCapture {
    fn name(&self) -> &str {
        "fallback"
    }

    fn on_receive(&self, event: &CaptureEvent) {
        match self.handle(event) {
            Ok(FallbackOutcome::Deferred) => {}
            Ok(FallbackOutcome::Persisted) => info!("[fallback] message buffered for later delivery"),
            Err(CaptureError::MalformedEvent(reason)) => {
                warn!("[fallback] discarding malformed event: {}", reason)
            }
            Err(CaptureError::PersistenceWriteFailed(e)) => {
                warn!("[fallback] message dropped, durable write failed: {}", e)
            }
            Err(e) => error!("[fallback] event not handled: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error_handling::types::StorageError;
    use crate::host::{Broadcaster, LogKeepAlive};
    use crate::storage::FileBuffer;
    use tempfile::TempDir;

    struct BrokenBuffer;

    impl DurableBuffer for BrokenBuffer {
        fn append(&self, _message: &CapturedMessage) -> Result<(), StorageError> {
            Err(StorageError::WriteFailed)
        }

        fn read_and_clear(&self) -> Result<Vec<CapturedMessage>, StorageError> {
            Ok(Vec::new())
        }

        fn len(&self) -> Result<usize, StorageError> {
            Ok(0)
        }
    }

    fn context_with(buffer: Arc<dyn DurableBuffer>, keep_alive: Arc<LogKeepAlive>) -> RelayContext {
        RelayContext::new(
            buffer,
            Arc::new(Broadcaster::new()),
            keep_alive,
            Duration::from_secs(5),
        )
    }

    #[test]
    fn persists_when_primary_inactive() {
        let dir = TempDir::new().unwrap();
        let buffer = Arc::new(FileBuffer::new(dir.path()).unwrap());
        let keep_alive = Arc::new(LogKeepAlive::new());
        let ctx = context_with(buffer.clone(), keep_alive.clone());
        let fallback = FallbackCapture::new(&ctx);

        let outcome = fallback.handle(&CaptureEvent::single("555", "hello")).unwrap();
        assert_eq!(outcome, FallbackOutcome::Persisted);
        assert_eq!(buffer.len().unwrap(), 1);
        assert!(keep_alive.deadline().is_some());
    }

    #[test]
    fn stands_down_when_primary_active() {
        let dir = TempDir::new().unwrap();
        let buffer = Arc::new(FileBuffer::new(dir.path()).unwrap());
        let keep_alive = Arc::new(LogKeepAlive::new());
        let ctx = context_with(buffer.clone(), keep_alive.clone());
        ctx.authority.set_primary_active(true);
        let fallback = FallbackCapture::new(&ctx);

        let outcome = fallback.handle(&CaptureEvent::single("555", "hello")).unwrap();
        assert_eq!(outcome, FallbackOutcome::Deferred);
        assert!(buffer.is_empty().unwrap());
        assert!(keep_alive.deadline().is_none());
    }

    #[test]
    fn write_failure_is_reported_not_raised() {
        let ctx = context_with(Arc::new(BrokenBuffer), Arc::new(LogKeepAlive::new()));
        let fallback = FallbackCapture::new(&ctx);
        let event = CaptureEvent::single("555", "lost");
        assert_eq!(
            fallback.handle(&event),
            Err(CaptureError::PersistenceWriteFailed(StorageError::WriteFailed))
        );
        // the callback swallows it
        fallback.on_receive(&event);
    }

    #[test]
    fn malformed_event_is_not_persisted() {
        let dir = TempDir::new().unwrap();
        let buffer = Arc::new(FileBuffer::new(dir.path()).unwrap());
        let ctx = context_with(buffer.clone(), Arc::new(LogKeepAlive::new()));
        let fallback = FallbackCapture::new(&ctx);
        fallback.on_receive(&CaptureEvent::new(vec![]));
        assert!(buffer.is_empty().unwrap());
    }
}
