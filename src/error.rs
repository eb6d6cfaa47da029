//! Error types for sockmux

use thiserror::Error;

/// Main error type for sockmux
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unable to resolve address: {0}")]
    AddressResolution(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("unable to find socket")]
    UnknownConnection,

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias for sockmux
pub type Result<T> = std::result::Result<T, Error>;
