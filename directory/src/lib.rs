//! # Directory Service
//!
//! The master server game servers register with and clients list from. It
//! runs on the same single-connection HTTP daemon as the probe responder,
//! with PUT enabled for registration traffic.

pub mod registry;
pub mod service;

pub use registry::{server_id, Registry};
pub use service::DirectoryService;

use shared::{HttpDaemon, HttpError, Method};
use std::net::ToSocketAddrs;
use std::time::Duration;

/// Methods the directory answers.
pub const DIRECTORY_METHODS: &[Method] = &[Method::Get, Method::Post, Method::Put, Method::Options];

/// Converts a check-in frequency in seconds, rejecting values that are not
/// positive or do not fit a [`Duration`].
pub fn check_in_period(seconds: f64) -> Result<Duration, String> {
    if seconds.is_nan() || seconds <= 0.0 {
        return Err(format!("check-in frequency must be positive, got {}", seconds));
    }
    Duration::try_from_secs_f64(seconds)
        .map_err(|e| format!("check-in frequency {} is out of range: {}", seconds, e))
}

/// Binds a directory daemon that asks servers to check in every
/// `check_in_frequency`.
pub fn bind<A: ToSocketAddrs>(
    addr: A,
    check_in_frequency: Duration,
) -> Result<HttpDaemon<DirectoryService>, HttpError> {
    Ok(HttpDaemon::bind(addr, DirectoryService::new(check_in_frequency))?
        .with_methods(DIRECTORY_METHODS))
}
