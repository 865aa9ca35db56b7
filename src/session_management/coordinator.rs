use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use log::{debug, error, info, warn};

use super::dedup::RecentDeliveries;
use super::pending_queue::PendingQueue;
use super::session::{ListeningState, Session};
use crate::consumer::Consumer;
use crate::context::RelayContext;
use crate::data_capture::primary::{DeliverySink, PrimaryCapture};
use crate::data_capture::types::CapturedMessage;
use crate::error_handling::types::RelayError;
use crate::host::{AuthorizationResult, CaptureReceiver, PermissionProvider, ReceiverId};

/// What happened to a message handed to [`DeliveryCoordinator::deliver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The attached consumer accepted it.
    Delivered,
    /// No consumer took it; it waits in the pending queue.
    Buffered,
    /// The same capture was already delivered through the other path.
    Duplicate,
}

/// Counters describing one flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Messages taken out of the durable buffer.
    pub from_durable: usize,
    pub delivered: usize,
    pub duplicates: usize,
    /// Messages put back in the pending queue because the consumer went away.
    pub requeued: usize,
}

struct SessionSlot {
    session: Session,
    primary: Option<ReceiverId>,
}

struct DeliveryState {
    consumer: Option<Arc<dyn Consumer>>,
    /// Set while a flush reads the durable buffer; live deliveries queue
    /// behind it instead of overtaking older messages.
    flushing: bool,
    pending: PendingQueue,
    recent: RecentDeliveries,
}

struct Shared {
    context: RelayContext,
    permissions: Arc<dyn PermissionProvider>,
    session: Mutex<SessionSlot>,
    /// Serializes flushes. Taken before the delivery lock, never while
    /// holding it.
    flush: Mutex<()>,
    delivery: Mutex<DeliveryState>,
}

/// Owns the capture session, the authority flag transitions and the flush
/// protocol that hands buffered messages to the consumer.
///
/// Cloning yields another handle to the same coordinator. Lock order is
/// session, flush, delivery. The delivery lock is held across consumer
/// notifications but never across durable buffer I/O.
#[derive(Clone)]
pub struct DeliveryCoordinator {
    shared: Arc<Shared>,
}

impl DeliveryCoordinator {
    /// Builds the coordinator in `NotListening` and runs the startup flush.
    pub fn new(
        context: RelayContext,
        permissions: Arc<dyn PermissionProvider>,
        dedup_capacity: usize,
    ) -> Self {
        let coordinator = Self {
            shared: Arc::new(Shared {
                context,
                permissions,
                session: Mutex::new(SessionSlot {
                    session: Session::default(),
                    primary: None,
                }),
                flush: Mutex::new(()),
                delivery: Mutex::new(DeliveryState {
                    consumer: None,
                    flushing: false,
                    pending: PendingQueue::new(),
                    recent: RecentDeliveries::new(dedup_capacity),
                }),
            }),
        };
        match coordinator.shared.context.buffer.len() {
            Ok(n) => info!("Coordinator created, {} message(s) in durable buffer", n),
            Err(e) => warn!("Coordinator created, durable buffer unreadable: {}", e),
        }
        if let Err(e) = coordinator.flush() {
            error!("[flush] startup flush failed: {}", e);
        }
        coordinator
    }

    /// Registers the primary path and raises the authority flag.
    ///
    /// Idempotent while listening. The primary receiver is registered before
    /// the flag goes up, so during the handoff both paths may capture an
    /// event; the copy is dropped at delivery.
    pub fn start(&self) -> Result<(), RelayError> {
        let shared = &self.shared;
        let mut slot = shared.session();
        slot.session.authorization_granted = shared.permissions.is_authorized();
        if !slot.session.authorization_granted {
            warn!("Cannot start listening, capture not authorized");
            return Err(RelayError::NotAuthorized);
        }
        if slot.session.is_listening() {
            debug!("Already listening");
            return Ok(());
        }

        let sink: Weak<dyn DeliverySink> = Arc::downgrade(&self.shared) as Weak<dyn DeliverySink>;
        let primary: Arc<dyn CaptureReceiver> = Arc::new(PrimaryCapture::new(sink));
        let id = shared.context.events.register(primary).map_err(|e| {
            error!("Failed to register primary capture path: {}", e);
            RelayError::CaptureRegistrationFailed(e.to_string())
        })?;
        slot.primary = Some(id);
        shared.context.authority.set_primary_active(true);
        slot.session.state = ListeningState::Listening;
        drop(slot);
        info!("Now listening, primary path registered as {}", id);

        if let Err(e) = self.flush() {
            error!("[flush] flush after start failed: {}", e);
        }
        Ok(())
    }

    /// Lowers the authority flag and unregisters the primary path.
    /// Idempotent. An in-flight `deliver` is not interrupted.
    pub fn stop(&self) {
        let mut slot = self.shared.session();
        if !slot.session.is_listening() {
            debug!("Not currently listening, nothing to do");
            return;
        }
        self.shared.release_primary(&mut slot);
        info!("Stopped listening");
    }

    /// Hands a claimed message to the consumer, or queues it. Never waits on I/O.
    pub fn deliver(&self, message: CapturedMessage) -> DeliveryOutcome {
        self.shared.deliver(message)
    }

    /// Records the consumer and flushes everything buffered to it.
    pub fn on_consumer_attached(
        &self,
        consumer: Arc<dyn Consumer>,
    ) -> Result<FlushReport, RelayError> {
        {
            let mut delivery = self.shared.delivery();
            if delivery.consumer.is_some() {
                debug!("Replacing attached consumer");
            }
            delivery.consumer = Some(consumer);
        }
        info!("Consumer attached");
        self.flush()
    }

    /// Marks the consumer absent; later deliveries are queued.
    pub fn on_consumer_detached(&self) {
        if self.shared.delivery().consumer.take().is_some() {
            info!("Consumer detached");
        }
    }

    /// Drains the durable buffer, then the pending queue, into the consumer.
    ///
    /// Without a consumer nothing moves: the durable buffer stays on disk
    /// and the pending queue is kept. The durable read happens without the
    /// delivery lock; deliveries arriving meanwhile join the pending queue.
    /// If the consumer reports detachment midway, the undelivered tail goes
    /// back to the front of the pending queue. Running it on empty queues
    /// is a no-op.
    pub fn flush(&self) -> Result<FlushReport, RelayError> {
        let _flush = self.shared.flush.lock().unwrap_or_else(PoisonError::into_inner);
        let mut report = FlushReport::default();
        {
            let mut delivery = self.shared.delivery();
            if delivery.consumer.is_none() {
                debug!(
                    "[flush] no consumer attached, keeping {} pending message(s)",
                    delivery.pending.len()
                );
                return Ok(report);
            }
            delivery.flushing = true;
        }

        let durable = self.shared.context.buffer.read_and_clear();

        let mut delivery = self.shared.delivery();
        delivery.flushing = false;
        let durable = durable?;
        report.from_durable = durable.len();
        let mut batch: VecDeque<CapturedMessage> = durable.into();
        batch.extend(delivery.pending.drain_all());
        if batch.is_empty() {
            return Ok(report);
        }

        let consumer = match delivery.consumer.clone() {
            Some(consumer) => consumer,
            None => {
                report.requeued = batch.len();
                warn!(
                    "[flush] consumer detached during durable read, keeping {} message(s) pending",
                    report.requeued
                );
                delivery.pending.prepend(batch.into());
                return Ok(report);
            }
        };
        debug!("[flush] delivering {} message(s)", batch.len());

        while let Some(message) = batch.pop_front() {
            if delivery.recent.contains(&message) {
                debug!("[flush] dropping duplicate from {}", message.sender);
                report.duplicates += 1;
                continue;
            }
            if consumer.notify(&message.to_consumer_event()) {
                delivery.recent.remember(&message);
                report.delivered += 1;
            } else {
                batch.push_front(message);
                report.requeued = batch.len();
                warn!(
                    "[flush] consumer detached mid-flush, re-queueing {} message(s)",
                    report.requeued
                );
                delivery.consumer = None;
                delivery.pending.prepend(batch.into());
                break;
            }
        }

        info!(
            "[flush] delivered={} duplicates={} requeued={} (durable={})",
            report.delivered, report.duplicates, report.requeued, report.from_durable
        );
        Ok(report)
    }

    /// Passes a permission request through to the permission collaborator.
    pub fn request_authorization(&self) -> AuthorizationResult {
        self.shared.permissions.request_authorization()
    }

    pub fn session(&self) -> Session {
        self.shared.session().session
    }

    pub fn is_listening(&self) -> bool {
        self.session().is_listening()
    }

    pub fn has_consumer(&self) -> bool {
        self.shared.delivery().consumer.is_some()
    }

    pub fn pending_len(&self) -> usize {
        self.shared.delivery().pending.len()
    }

    pub fn context(&self) -> &RelayContext {
        &self.shared.context
    }
}

impl Shared {
    fn session(&self) -> MutexGuard<'_, SessionSlot> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn delivery(&self) -> MutexGuard<'_, DeliveryState> {
        self.delivery.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Flag first, then unregister: the fallback path takes over before the
    /// primary path goes away.
    fn release_primary(&self, slot: &mut SessionSlot) {
        self.context.authority.set_primary_active(false);
        if let Some(id) = slot.primary.take() {
            if !self.context.events.unregister(id) {
                warn!("Primary path {} was already unregistered", id);
            }
        }
        slot.session.state = ListeningState::NotListening;
    }
}

impl DeliverySink for Shared {
    fn deliver(&self, message: CapturedMessage) -> DeliveryOutcome {
        let mut delivery = self.delivery();
        if delivery.recent.contains(&message) {
            debug!("Dropping duplicate capture from {}", message.sender);
            return DeliveryOutcome::Duplicate;
        }
        if delivery.flushing {
            debug!("Flush in progress, queueing message from {}", message.sender);
            delivery.pending.append(message);
            return DeliveryOutcome::Buffered;
        }
        if let Some(consumer) = delivery.consumer.clone() {
            if consumer.notify(&message.to_consumer_event()) {
                delivery.recent.remember(&message);
                return DeliveryOutcome::Delivered;
            }
            warn!("Consumer no longer attached, buffering message");
            delivery.consumer = None;
        }
        debug!(
            "Buffered message from {} ({} pending)",
            message.sender,
            delivery.pending.len() + 1
        );
        delivery.pending.append(message);
        DeliveryOutcome::Buffered
    }
}

impl DeliverySink for DeliveryCoordinator {
    fn deliver(&self, message: CapturedMessage) -> DeliveryOutcome {
        self.shared.deliver(message)
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        let mut slot = self.session();
        if slot.session.is_listening() {
            debug!("Coordinator dropped while listening, releasing primary path");
            self.release_primary(&mut slot);
        }
    }
}
