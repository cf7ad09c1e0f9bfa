//! # Game Server Host Library
//!
//! Everything a game server process runs next to the game itself so that
//! players can find it:
//!
//! - a probe daemon answering liveness requests on the daemon port, used by
//!   clients to measure ping;
//! - a LAN beacon answering broadcast discovery queries (`beacon`);
//! - registration with the directory and periodic check-ins, through the
//!   client crate's protocol driver (`host`).

pub mod beacon;
pub mod host;

pub use beacon::{answer_query, BeaconHost, SharedSessions};
pub use host::{GameHost, HostConfig};
