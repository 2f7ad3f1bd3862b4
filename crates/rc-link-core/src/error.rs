//! Link manager errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("configuration error: {0}")]
    Config(String),
}
