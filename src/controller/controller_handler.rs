use std::sync::Arc;

use log::{debug, error, info, warn};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::configuration::config::Config;
use crate::consumer::ChannelConsumer;
use crate::context::RelayContext;
use crate::data_capture::types::{CaptureEvent, ConsumerEvent, MessagePart};
use crate::error_handling::types::*;
use crate::host::{Broadcaster, LogKeepAlive, ReceiverId, StaticPermissions};
use crate::session_management::DeliveryCoordinator;
use crate::storage::open_buffer;

/// Wires the relay together for the binary: durable buffer, host
/// collaborators, the install-level fallback receiver and, on demand, a
/// delivery coordinator.
pub struct Controller {
    pub config: Config,
    host: Arc<Broadcaster>,
    permissions: Arc<StaticPermissions>,
    context: RelayContext,
    fallback: ReceiverId,
}

impl Controller {
    pub fn new(config: Config) -> Result<Self, ControllerError> {
        info!("Building relay controller");
        let buffer = open_buffer(&config.storage).map_err(|e| {
            error!("Unable to open durable buffer: {}", e);
            ControllerError::StorageError(e)
        })?;

        let host = Arc::new(Broadcaster::new());
        let context = RelayContext::new(
            buffer,
            host.clone(),
            Arc::new(LogKeepAlive::new()),
            config.keep_alive(),
        );
        let fallback = context
            .install_fallback()
            .map_err(|e| ControllerError::InitializationFailed(e.to_string()))?;
        let permissions = Arc::new(StaticPermissions::new(config.permissions.granted));

        Ok(Self {
            config,
            host,
            permissions,
            context,
            fallback,
        })
    }

    pub fn context(&self) -> &RelayContext {
        &self.context
    }

    /// A new coordinator over this controller's context. Construction runs
    /// the startup flush.
    pub fn coordinator(&self) -> DeliveryCoordinator {
        DeliveryCoordinator::new(
            self.context.clone(),
            self.permissions.clone(),
            self.config.delivery.dedup_capacity,
        )
    }

    /// Hands `event` to the host with no session running, so only the
    /// fallback path sees it. Returns the durable buffer length afterwards.
    pub fn receive(&self, event: &CaptureEvent) -> Result<usize, ControllerError> {
        let receivers = self.host.dispatch(event);
        debug!("Event dispatched to {} receiver(s)", receivers);
        Ok(self.context.buffer.len()?)
    }

    /// Attaches a consumer, flushes everything buffered to `output` as JSON
    /// lines and detaches again.
    pub async fn drain<W>(&self, output: &mut W) -> Result<usize, ControllerError>
    where
        W: AsyncWrite + Unpin,
    {
        let coordinator = self.coordinator();
        let (consumer, mut rx) = ChannelConsumer::new();
        let report = coordinator.on_consumer_attached(Arc::new(consumer))?;
        coordinator.on_consumer_detached();
        info!(
            "Drained {} message(s), {} from durable buffer",
            report.delivered, report.from_durable
        );

        let mut written = 0;
        while let Some(event) = rx.recv().await {
            write_event(output, &event).await?;
            written += 1;
        }
        Ok(written)
    }

    /// Runs a listening session fed by `input`, one capture event per line,
    /// until EOF. Delivered events are written to `output` as JSON lines.
    pub async fn listen<R, W>(
        &self,
        input: R,
        output: &mut W,
        grant: bool,
    ) -> Result<usize, ControllerError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        if grant {
            self.permissions.set_granted(true);
        }
        let coordinator = self.coordinator();
        coordinator.start()?;
        let (consumer, mut rx) = ChannelConsumer::new();
        coordinator.on_consumer_attached(Arc::new(consumer))?;

        let mut written = 0;
        let mut lines = input.lines();
        while let Some(line) = lines
            .next_line()
            .await
            .map_err(|e| ControllerError::IoFailed(e.to_string()))?
        {
            match parse_line(&line) {
                Some(event) => {
                    self.host.dispatch(&event);
                }
                None => continue,
            }
            while let Ok(event) = rx.try_recv() {
                write_event(output, &event).await?;
                written += 1;
            }
        }

        info!("Input closed, stopping session");
        coordinator.stop();
        coordinator.on_consumer_detached();
        while let Some(event) = rx.recv().await {
            write_event(output, &event).await?;
            written += 1;
        }
        if coordinator.pending_len() > 0 {
            warn!(
                "{} message(s) left pending at shutdown",
                coordinator.pending_len()
            );
        }
        Ok(written)
    }

    pub fn shutdown(&self) {
        info!("Shutting down, fallback receiver {} stays with the host", self.fallback);
    }
}

/// Parses `sender<TAB>part<TAB>part...` into a capture event.
///
/// Blank lines yield `None`. A line with a sender but no parts becomes an
/// event with one empty-bodied part, which the capture paths reject.
pub fn parse_line(line: &str) -> Option<CaptureEvent> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return None;
    }
    let mut fields = line.split('\t');
    let sender = fields.next()?.to_string();
    let mut parts: Vec<MessagePart> = fields
        .map(|body| MessagePart::new(sender.clone(), body))
        .collect();
    if parts.is_empty() {
        parts.push(MessagePart {
            sender: Some(sender),
            body: None,
        });
    }
    Some(CaptureEvent::new(parts))
}

async fn write_event<W>(output: &mut W, event: &ConsumerEvent) -> Result<(), ControllerError>
where
    W: AsyncWrite + Unpin,
{
    let mut line =
        serde_json::to_string(event).map_err(|e| ControllerError::IoFailed(e.to_string()))?;
    line.push('\n');
    output
        .write_all(line.as_bytes())
        .await
        .map_err(|e| ControllerError::IoFailed(e.to_string()))?;
    output
        .flush()
        .await
        .map_err(|e| ControllerError::IoFailed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configuration::StorageBackend;
    use crate::storage::DurableBuffer;
    use tempfile::TempDir;
    use tokio::io::BufReader;

    fn config_in(dir: &TempDir, backend: StorageBackend, granted: bool) -> Config {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut config = Config::default();
        config.storage.backend = backend;
        config.storage.path = dir.path().join("data");
        config.permissions.granted = granted;
        config.delivery.keep_alive_ms = 0;
        config
    }

    fn bodies(output: &[u8]) -> Vec<String> {
        String::from_utf8_lossy(output)
            .lines()
            .map(|l| serde_json::from_str::<ConsumerEvent>(l).unwrap().body)
            .collect()
    }

    #[test]
    fn parse_line_handles_parts_and_blanks() {
        let event = parse_line("BANK\tYour card \twas used\r\n").unwrap();
        assert_eq!(event.parts.len(), 2);
        assert_eq!(event.parts[1].body.as_deref(), Some("was used"));
        assert!(parse_line("   ").is_none());

        let bare = parse_line("BANK").unwrap();
        assert_eq!(bare.parts[0].body, None);
    }

    #[tokio::test]
    async fn receive_then_drain_prints_in_order() {
        for backend in [StorageBackend::File, StorageBackend::Database] {
            let dir = TempDir::new().unwrap();
            let controller = Controller::new(config_in(&dir, backend, false)).unwrap();
            assert_eq!(controller.receive(&CaptureEvent::single("A", "one")).unwrap(), 1);
            assert_eq!(controller.receive(&CaptureEvent::single("A", "two")).unwrap(), 2);

            let mut out = Vec::new();
            assert_eq!(controller.drain(&mut out).await.unwrap(), 2);
            assert_eq!(bodies(&out), vec!["one", "two"]);
            assert!(controller.context().buffer.is_empty().unwrap());
        }
    }

    #[tokio::test]
    async fn listen_delivers_stdin_events() {
        let dir = TempDir::new().unwrap();
        let controller = Controller::new(config_in(&dir, StorageBackend::File, false)).unwrap();
        let input: &[u8] = b"A\thello \tworld\n\nB\n C\tsecond\n";
        let mut out = Vec::new();

        let written = controller.listen(input, &mut out, true).await.unwrap();
        assert_eq!(written, 2);
        assert_eq!(bodies(&out), vec!["hello world", "second"]);
        assert!(controller.context().buffer.is_empty().unwrap());
        assert!(!controller.context().authority.is_primary_active());
    }

    #[tokio::test]
    async fn listen_reads_chunked_input() {
        let dir = TempDir::new().unwrap();
        let controller = Controller::new(config_in(&dir, StorageBackend::File, true)).unwrap();
        let mock = tokio_test::io::Builder::new()
            .read(b"A\tfir")
            .read(b"st\nA\tsecond\n")
            .build();
        let mut out = Vec::new();

        controller
            .listen(BufReader::new(mock), &mut out, false)
            .await
            .unwrap();
        assert_eq!(bodies(&out), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn listen_without_permission_is_refused() {
        let dir = TempDir::new().unwrap();
        let controller = Controller::new(config_in(&dir, StorageBackend::File, false)).unwrap();
        let input: &[u8] = b"A\tignored\n";
        let mut out = Vec::new();

        let err = controller.listen(input, &mut out, false).await.unwrap_err();
        assert!(matches!(
            err,
            ControllerError::RelayError(RelayError::NotAuthorized)
        ));
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn messages_received_before_listen_are_flushed_first() {
        let dir = TempDir::new().unwrap();
        let controller = Controller::new(config_in(&dir, StorageBackend::File, true)).unwrap();
        controller.receive(&CaptureEvent::single("A", "early")).unwrap();

        let input: &[u8] = b"A\tlate\n";
        let mut out = Vec::new();
        controller.listen(input, &mut out, false).await.unwrap();
        assert_eq!(bodies(&out), vec!["early", "late"]);
    }
}
