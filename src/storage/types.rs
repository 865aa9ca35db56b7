use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::data_capture::types::CapturedMessage;

/// Persisted form of a buffered message.
///
/// `captured_at` is diagnostic only; order comes from the store itself.
/// Records written without it are still accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferedRecord {
    pub sender: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub captured_at: Option<DateTime<Utc>>,
}

impl BufferedRecord {
    pub fn into_message(self) -> CapturedMessage {
        CapturedMessage {
            sender: self.sender,
            body: self.body,
            captured_at: self.captured_at.unwrap_or_else(Utc::now),
        }
    }
}

impl From<&CapturedMessage> for BufferedRecord {
    fn from(message: &CapturedMessage) -> Self {
        Self {
            sender: message.sender.clone(),
            body: message.body.clone(),
            captured_at: Some(message.captured_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_without_timestamp_is_accepted() {
        let record: BufferedRecord =
            serde_json::from_str(r#"{"sender":"555","body":"hello"}"#).unwrap();
        assert!(record.captured_at.is_none());
        let msg = record.into_message();
        assert_eq!(msg.sender, "555");
        assert_eq!(msg.body, "hello");
    }
}
