//! Tunnel session state types.

use std::fmt;

/// Tunnel session state machine.
///
/// Owned by the [`SessionController`](crate::core::SessionController); everything
/// else only ever sees a copy. A tunnel handle exists exactly while the state is
/// `Connected` or `Disconnecting`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum State {
    /// No tunnel is open.
    #[default]
    Disconnected,
    /// Tunnel establishment in progress.
    Connecting,
    /// Tunnel open and the filter engine running on it.
    Connected,
    /// Teardown in progress.
    Disconnecting,
}

impl State {
    /// Whether a lifecycle operation is currently in flight.
    #[must_use]
    pub const fn is_transitional(self) -> bool {
        matches!(self, Self::Connecting | Self::Disconnecting)
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            State::Disconnected => write!(f, "DISCONNECTED"),
            State::Connecting => write!(f, "CONNECTING"),
            State::Connected => write!(f, "CONNECTED"),
            State::Disconnecting => write!(f, "DISCONNECTING"),
        }
    }
}

/// Commands the front end may issue to the controller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    /// One-time setup; verifies tunnel permission.
    Initialize,
    /// Open the tunnel and start filtering.
    Connect,
    /// Stop filtering and close the tunnel.
    Disconnect,
}

impl Operation {
    /// The `(from, to)` transition this operation performs, if it moves the state.
    #[must_use]
    pub const fn transition(self) -> Option<(State, State)> {
        match self {
            Self::Initialize => None,
            Self::Connect => Some((State::Disconnected, State::Connecting)),
            Self::Disconnect => Some((State::Connected, State::Disconnecting)),
        }
    }

    /// What a toggle in `state` means, or `None` while a transition is in flight.
    #[must_use]
    pub const fn toggle_from(state: State) -> Option<Self> {
        match state {
            State::Disconnected => Some(Self::Connect),
            State::Connected => Some(Self::Disconnect),
            State::Connecting | State::Disconnecting => None,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Initialize => write!(f, "INITIALIZE"),
            Operation::Connect => write!(f, "CONNECT"),
            Operation::Disconnect => write!(f, "DISCONNECT"),
        }
    }
}

/// Notifications delivered to the registered listener.
///
/// Emitted exactly once per transition or failure. The tag is the whole payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Event {
    /// `initialize()` succeeded.
    Initialized,
    /// A connect was accepted.
    Connecting,
    /// The tunnel is up and filtering.
    Connected,
    /// A disconnect was accepted.
    Disconnecting,
    /// Teardown finished.
    Disconnected,
    /// The tunnel could not be established.
    NetworkError,
    /// `initialize()` failed; the session is disabled.
    CouldntInitialize,
}

impl Event {
    /// The state a display should show after receiving this event.
    #[must_use]
    pub const fn resulting_state(self) -> State {
        match self {
            Self::Connecting => State::Connecting,
            Self::Connected => State::Connected,
            Self::Disconnecting => State::Disconnecting,
            Self::Initialized | Self::Disconnected | Self::NetworkError | Self::CouldntInitialize => {
                State::Disconnected
            }
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            Event::Initialized => "INITIALIZED",
            Event::Connecting => "CONNECTING",
            Event::Connected => "CONNECTED",
            Event::Disconnecting => "DISCONNECTING",
            Event::Disconnected => "DISCONNECTED",
            Event::NetworkError => "NETWORK_ERROR",
            Event::CouldntInitialize => "COULDNT_INITIALIZE",
        };
        f.write_str(tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state_is_disconnected() {
        assert_eq!(State::default(), State::Disconnected);
    }

    #[test]
    fn test_transitional_states() {
        assert!(!State::Disconnected.is_transitional());
        assert!(State::Connecting.is_transitional());
        assert!(!State::Connected.is_transitional());
        assert!(State::Disconnecting.is_transitional());
    }

    #[test]
    fn test_failure_events_settle_disconnected() {
        assert_eq!(Event::NetworkError.resulting_state(), State::Disconnected);
        assert_eq!(Event::CouldntInitialize.resulting_state(), State::Disconnected);
        assert_eq!(Event::Connected.resulting_state(), State::Connected);
    }

    #[test]
    fn test_operation_transitions() {
        assert_eq!(Operation::Initialize.transition(), None);
        assert_eq!(
            Operation::Connect.transition(),
            Some((State::Disconnected, State::Connecting))
        );
        assert_eq!(
            Operation::Disconnect.transition(),
            Some((State::Connected, State::Disconnecting))
        );
    }

    #[test]
    fn test_toggle_from_state() {
        assert_eq!(Operation::toggle_from(State::Disconnected), Some(Operation::Connect));
        assert_eq!(Operation::toggle_from(State::Connected), Some(Operation::Disconnect));
        assert_eq!(Operation::toggle_from(State::Connecting), None);
        assert_eq!(Operation::toggle_from(State::Disconnecting), None);
    }

    #[test]
    fn test_event_tags() {
        assert_eq!(Event::CouldntInitialize.to_string(), "COULDNT_INITIALIZE");
        assert_eq!(State::Disconnecting.to_string(), "DISCONNECTING");
    }
}
