//! Error kinds shared by the wire engine, the directory payload codec and
//! the LAN beacon format.
//!
//! None of these are fatal: the daemon turns HTTP failures into a 500 reply,
//! and the directory driver folds payload failures into
//! [`Outcome::ParseError`](crate::protocol::Outcome::ParseError).

use std::io;
use thiserror::Error;

/// Failures of the percent/plus decoder.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// A `%` was not followed by two hex digits.
    #[error("malformed percent-encoding at byte {position}")]
    MalformedEncoding { position: usize },
}

/// Failures while reading a request or writing a response.
#[derive(Debug, Error)]
pub enum HttpError {
    /// The peer closed the connection without sending anything.
    #[error("no data received")]
    NoData,

    /// The request violated the minimal HTTP/1.1 grammar the daemon accepts.
    #[error("protocol error: {0}")]
    Protocol(&'static str),

    /// A name, value or path carried an invalid escape.
    #[error(transparent)]
    Encoding(#[from] CodecError),

    /// Writing to the connection failed; the connection must be treated as dead.
    #[error("send failure: {0}")]
    SendFailure(#[source] io::Error),

    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

/// Failures while encoding or decoding a directory JSON payload.
#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),

    /// Corrupt deflate stream or output limit exceeded.
    #[error("compression error: {0}")]
    Compression(#[source] io::Error),

    #[error("missing or invalid field `{0}`")]
    Field(&'static str),

    #[error("payload has no recognised root key")]
    UnknownRoot,
}

/// Failures of the LAN beacon wire format.
#[derive(Debug, Error)]
pub enum BeaconError {
    #[error("packet too short")]
    Truncated,

    #[error("not a beacon packet")]
    BadMagic,

    #[error("unsupported beacon version {0}")]
    Version(u8),

    /// Encoding exceeded the maximum datagram size, or decoding failed.
    #[error("beacon encoding: {0}")]
    Encoding(#[from] bincode::Error),
}
