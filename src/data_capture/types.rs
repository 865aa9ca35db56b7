//! Common data types used across the data_capture subsystem.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error_handling::types::CaptureError;

/// One protocol data unit of an incoming message as the host reports it.
///
/// Long messages arrive split over several parts that share one event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePart {
    /// Originating address, when the host could decode it.
    pub sender: Option<String>,
    /// Text carried by this part.
    pub body: Option<String>,
}

impl MessagePart {
    pub fn new<S: Into<String>, B: Into<String>>(sender: S, body: B) -> Self {
        Self {
            sender: Some(sender.into()),
            body: Some(body.into()),
        }
    }
}

/// A message-arrival notification from the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureEvent {
    pub parts: Vec<MessagePart>,
    /// Host timestamp of the notification, shared by every receiver of the event.
    pub received_at: DateTime<Utc>,
}

impl CaptureEvent {
    pub fn new(parts: Vec<MessagePart>) -> Self {
        Self {
            parts,
            received_at: Utc::now(),
        }
    }

    /// Convenience constructor for a single-part event.
    pub fn single<S: Into<String>, B: Into<String>>(sender: S, body: B) -> Self {
        Self::new(vec![MessagePart::new(sender, body)])
    }
}

/// A message claimed by one of the capture paths. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedMessage {
    pub sender: String,
    pub body: String,
    pub captured_at: DateTime<Utc>,
}

impl CapturedMessage {
    pub fn new<S: Into<String>, B: Into<String>>(sender: S, body: B) -> Self {
        Self {
            sender: sender.into(),
            body: body.into(),
            captured_at: Utc::now(),
        }
    }

    /// Decodes a capture event into a single message.
    ///
    /// The sender comes from the first part and the bodies of all parts are
    /// concatenated in order. `captured_at` is the event's own timestamp so
    /// that both capture paths build identical messages for one event.
    pub fn from_event(event: &CaptureEvent) -> Result<Self, CaptureError> {
        let first = event
            .parts
            .first()
            .ok_or_else(|| CaptureError::MalformedEvent("event carries no parts".into()))?;
        let sender = match first.sender.as_deref() {
            Some(s) if !s.trim().is_empty() => s.to_string(),
            _ => return Err(CaptureError::MalformedEvent("missing sender".into())),
        };

        let mut body = String::new();
        for (index, part) in event.parts.iter().enumerate() {
            let chunk = part.body.as_deref().ok_or_else(|| {
                CaptureError::MalformedEvent(format!("part {} has no body", index))
            })?;
            body.push_str(chunk);
        }

        Ok(Self {
            sender,
            body,
            captured_at: event.received_at,
        })
    }

    /// The payload handed to the consumer.
    pub fn to_consumer_event(&self) -> ConsumerEvent {
        ConsumerEvent {
            sender: self.sender.clone(),
            body: self.body.clone(),
        }
    }
}

/// What the attached listener receives, one per message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumerEvent {
    pub sender: String,
    pub body: String,
}
