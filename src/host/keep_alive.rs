use std::sync::Mutex;
use std::sync::PoisonError;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::debug;

/// Best-effort request that the host keep the process running for a while.
pub trait KeepAlive: Send + Sync {
    fn keep_alive(&self, until: Duration);
}

/// Records the latest requested deadline and logs it. Hosts without a
/// process-lifetime mechanism use this.
#[derive(Debug, Default)]
pub struct LogKeepAlive {
    deadline: Mutex<Option<DateTime<Utc>>>,
}

impl LogKeepAlive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        *self.deadline.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl KeepAlive for LogKeepAlive {
    fn keep_alive(&self, until: Duration) {
        let requested = chrono::Duration::from_std(until)
            .ok()
            .and_then(|d| Utc::now().checked_add_signed(d));
        let mut deadline = self.deadline.lock().unwrap_or_else(PoisonError::into_inner);
        // Never shorten an earlier, longer request.
        if let Some(requested) = requested {
            if deadline.map_or(true, |current| requested > current) {
                *deadline = Some(requested);
            }
        }
        debug!("Keep-alive requested for {:?}", until);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn longest_deadline_wins() {
        let ka = LogKeepAlive::new();
        assert!(ka.deadline().is_none());
        ka.keep_alive(Duration::from_secs(60));
        let long = ka.deadline().unwrap();
        ka.keep_alive(Duration::from_millis(1));
        assert_eq!(ka.deadline().unwrap(), long);
    }
}
