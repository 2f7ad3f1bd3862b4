//! Transport subsystem errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("bluetooth adapter unavailable: {0}")]
    AdapterUnavailable(String),

    #[error("failed to open serial connection: {0}")]
    Open(String),

    #[error("failed to write to serial connection: {0}")]
    Write(String),

    #[error("failed to close serial connection: {0}")]
    Close(String),
}
