//! The open serial link as an owned resource.

use rc_link_transport::{ByteSink, ConnectionHandle, SerialConnection, TransportError};
use rc_link_types::{Command, PairedDevice};
use tracing::{debug, info, warn};

/// An open connection to the vehicle.
///
/// Created only on the success path of a connect attempt and consumed by
/// [`Link::close`], which always attempts to release both the output
/// channel and the underlying handle.
pub struct Link {
    device: PairedDevice,
    handle: Box<dyn ConnectionHandle>,
    output: Box<dyn ByteSink>,
}

impl Link {
    pub(crate) fn new(device: PairedDevice, connection: SerialConnection) -> Self {
        let SerialConnection { handle, output } = connection;
        Self {
            device,
            handle,
            output,
        }
    }

    /// The device this link is connected to.
    pub fn device(&self) -> &PairedDevice {
        &self.device
    }

    /// Write the command's wire byte.
    pub(crate) async fn write(&mut self, command: Command) -> Result<(), TransportError> {
        self.output.write_byte(command.wire_byte()).await?;
        debug!(code = %command.code(), "sent command");
        Ok(())
    }

    /// Close the output channel, then the handle.
    ///
    /// Failures are logged and never stop the second close.
    pub(crate) async fn close(mut self) {
        if let Err(e) = self.output.close().await {
            warn!(device = %self.device.name, error = %e, "error closing output channel");
        }
        if let Err(e) = self.handle.close().await {
            warn!(device = %self.device.name, error = %e, "error closing connection handle");
        }
        info!(device = %self.device.name, "link closed");
    }
}

impl std::fmt::Debug for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Link")
            .field("device", &self.device)
            .finish_non_exhaustive()
    }
}
