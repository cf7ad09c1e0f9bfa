//! # Directory Client Library
//!
//! Client-side half of the master-server protocol. A game (or a game server
//! announcing itself) uses it to talk to the directory and to find sessions
//! on the local network.
//!
//! ## Module Organization
//!
//! ### HTTP Client (`http_client`)
//! Blocking one-shot HTTP/1.1 exchanges behind the [`Transport`] trait, so
//! the driver can be tested against a scripted transport.
//!
//! ### Request Queue (`queue`)
//! FIFO with a single in-flight slot. Directory operations never overlap.
//!
//! ### Protocol Driver (`driver`)
//! The task that builds, compresses and sends directory requests, interprets
//! replies, keeps the registered server record and runs the periodic
//! check-in.
//!
//! ### LAN Discovery (`discovery`)
//! Broadcast query and nonce-matched response collection with a timeout.
//!
//! ## Usage Example
//!
//! ```no_run
//! use client::{DirectoryConfig, DirectoryDriver, HttpClient};
//! use std::sync::Arc;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let (directory, _events, _task) =
//!     DirectoryDriver::spawn(&DirectoryConfig::default(), Arc::new(HttpClient::default()))?;
//! let listing = directory.list_servers(0).wait().await?;
//! println!("{:?}", listing);
//! # Ok(())
//! # }
//! ```

pub mod discovery;
pub mod driver;
pub mod error;
pub mod http_client;
pub mod queue;

pub use discovery::{LanDiscovery, LanSearch, LanSearchResult, SearchHandle};
pub use driver::{
    DirectoryConfig, DirectoryDriver, DirectoryEvent, DirectoryHandle, DriverStatus,
    PendingOperation,
};
pub use error::{DriverError, LanError, TransportError};
pub use http_client::{Endpoint, HttpClient, HttpResponse, OutboundRequest, Transport};
pub use queue::RequestQueue;
