//! Platform-abstracted Bluetooth collaborators for rc-link.
//!
//! This crate defines the [`PairedDeviceRegistry`] and [`SerialTransport`]
//! traits that platform backends must implement, plus the two halves of an
//! open connection ([`ByteSink`] and [`ConnectionHandle`]). The BlueZ backend
//! lives behind the `bluez` feature, the in-memory backend behind `mock`.

use async_trait::async_trait;
use rc_link_types::PairedDevice;
use uuid::Uuid;

#[cfg(feature = "bluez")]
pub mod bluez;
pub mod error;
#[cfg(feature = "mock")]
pub mod mock;

pub use error::TransportError;

/// Read-only view of the devices bonded at the OS level.
#[async_trait]
pub trait PairedDeviceRegistry: Send + Sync + 'static {
    /// List currently paired devices.
    ///
    /// Returns [`TransportError::AdapterUnavailable`] when no adapter is
    /// present or powered.
    async fn paired_devices(&self) -> Result<Vec<PairedDevice>, TransportError>;
}

/// Opens byte-stream connections to paired devices.
#[async_trait]
pub trait SerialTransport: Send + Sync + 'static {
    /// Open a connection to `device` for the given service class.
    ///
    /// On failure the implementation must release anything it opened
    /// partially; the caller never sees a half-open connection.
    async fn open(
        &self,
        device: &PairedDevice,
        service: Uuid,
    ) -> Result<SerialConnection, TransportError>;
}

/// Writable half of an open connection.
#[async_trait]
pub trait ByteSink: Send + 'static {
    /// Write one byte and flush it to the peer.
    async fn write_byte(&mut self, byte: u8) -> Result<(), TransportError>;

    /// Close the output channel.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// The underlying connection handle (socket, profile registration, ...).
#[async_trait]
pub trait ConnectionHandle: Send + 'static {
    /// Release the connection.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// An opened connection as returned by [`SerialTransport::open`].
pub struct SerialConnection {
    pub handle: Box<dyn ConnectionHandle>,
    pub output: Box<dyn ByteSink>,
}

impl SerialConnection {
    pub fn new(handle: Box<dyn ConnectionHandle>, output: Box<dyn ByteSink>) -> Self {
        Self { handle, output }
    }
}

impl std::fmt::Debug for SerialConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialConnection").finish_non_exhaustive()
    }
}
