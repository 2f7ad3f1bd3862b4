//! Connection state machine.

use serde::{Deserialize, Serialize};

/// State of the serial link to the vehicle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionState {
    /// No link and no attempt in flight.
    #[default]
    Disconnected,
    /// An attempt sequence is resolving the device or opening the transport.
    Connecting,
    /// The link is open and accepts commands.
    Connected,
    /// Retries were exhausted, the device was not paired, or a write failed.
    Error,
}

impl ConnectionState {
    /// Whether `connect()` may start a new attempt sequence from this state.
    pub fn can_connect(self) -> bool {
        matches!(self, Self::Disconnected | Self::Error)
    }

    /// Whether commands are written to the link in this state.
    pub fn accepts_commands(self) -> bool {
        self == Self::Connected
    }

    /// Whether an attempt is in progress or the link is up.
    pub fn is_busy(self) -> bool {
        matches!(self, Self::Connecting | Self::Connected)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
            Self::Error => write!(f, "Error"),
        }
    }
}
