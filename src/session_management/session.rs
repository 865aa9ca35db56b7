/// Whether the primary capture path is registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListeningState {
    NotListening,
    Listening,
}

impl Default for ListeningState {
    fn default() -> Self {
        ListeningState::NotListening
    }
}

/// The one capture session of this process, owned by the coordinator.
///
/// Only `start` and `stop` on the coordinator change `state`;
/// `authorization_granted` is refreshed from the permission provider on
/// every `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Session {
    pub state: ListeningState,
    pub authorization_granted: bool,
}

impl Session {
    pub fn is_listening(&self) -> bool {
        self.state == ListeningState::Listening
    }
}
