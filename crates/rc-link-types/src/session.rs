//! Observable session snapshot.

use serde::{Deserialize, Serialize};

use crate::command::Command;
use crate::state::ConnectionState;

/// Number of commands kept in [`SessionState::command_history`].
pub const HISTORY_LIMIT: usize = 10;

/// A complete, immutable view of the session.
///
/// Snapshots are never edited in place: every transition builds a new value
/// with one of the `with_*` methods and publishes it whole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    pub connection: ConnectionState,
    pub last_command: Command,
    /// Most recent first, at most [`HISTORY_LIMIT`] entries.
    pub command_history: Vec<Command>,
    /// Paired device names seen when the session was created.
    pub bonded_devices: Vec<String>,
    /// Mirrors `connection == Connecting`.
    pub is_connecting: bool,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            connection: ConnectionState::Disconnected,
            last_command: Command::Stop,
            command_history: Vec::new(),
            bonded_devices: Vec::new(),
            is_connecting: false,
        }
    }
}

impl SessionState {
    /// Initial snapshot carrying the paired device names.
    pub fn with_bonded_devices(bonded_devices: Vec<String>) -> Self {
        Self {
            bonded_devices,
            ..Self::default()
        }
    }

    /// Copy of this snapshot in a different connection state.
    #[must_use]
    pub fn with_connection(&self, connection: ConnectionState) -> Self {
        Self {
            connection,
            is_connecting: connection == ConnectionState::Connecting,
            ..self.clone()
        }
    }

    /// Copy of this snapshot after `command` was written to the link.
    #[must_use]
    pub fn with_command(&self, command: Command) -> Self {
        let mut command_history = Vec::with_capacity(HISTORY_LIMIT);
        command_history.push(command);
        command_history.extend(
            self.command_history
                .iter()
                .copied()
                .take(HISTORY_LIMIT - 1),
        );
        Self {
            last_command: command,
            command_history,
            ..self.clone()
        }
    }
}
