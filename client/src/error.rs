use shared::BeaconError;
use std::io;
use thiserror::Error;

/// Failures of a single outbound HTTP exchange.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid url `{0}`")]
    InvalidUrl(String),

    #[error("could not connect: {0}")]
    Connect(#[source] io::Error),

    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("connection closed before any response")]
    Empty,

    #[error("malformed response: {0}")]
    Malformed(&'static str),

    #[error("response larger than {0} bytes")]
    TooLarge(usize),

    /// The blocking worker running the exchange died.
    #[error("transport task aborted: {0}")]
    Aborted(String),
}

#[derive(Debug, Error)]
pub enum LanError {
    #[error("a LAN search is already in progress")]
    SearchInProgress,

    #[error("socket error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Beacon(#[from] BeaconError),

    /// The collector task ended without delivering results.
    #[error("LAN search ended unexpectedly")]
    Interrupted,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DriverError {
    #[error("directory driver has shut down")]
    Closed,
}
