//! Connection core for rc-link.
//!
//! Owns the serial link to the vehicle: resolves the paired target device,
//! connects with bounded retries, writes single-byte commands, and tears the
//! link down on request or on write failure. Every transition is published
//! as a [`SessionState`](rc_link_types::SessionState) snapshot to observers.

pub mod config;
pub mod error;
pub mod link;
pub mod manager;
pub mod session;
pub mod setup;

pub use config::{Config, LinkPolicy};
pub use error::LinkError;
pub use manager::{LinkManager, EMERGENCY_STOP_REPEATS, STOP_GRACE};
pub use session::{SessionUpdates, SessionView};
