//! Shared types for rc-link.
//!
//! This crate contains the value types shared across the rc-link workspace:
//! the vehicle command alphabet, connection states, the observable session
//! snapshot, and paired-device descriptors.

pub mod command;
pub mod device;
pub mod session;
pub mod state;

pub use command::{Command, ParseCommandError};
pub use device::{PairedDevice, DEFAULT_DEVICE_NAME, SERIAL_PORT_PROFILE_UUID};
pub use session::{SessionState, HISTORY_LIMIT};
pub use state::ConnectionState;
