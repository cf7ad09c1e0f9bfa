//! Wire-level building blocks shared by the directory client, the game
//! server host and the directory service: a minimal HTTP/1.1 engine, the
//! directory payload format and the LAN beacon format.

pub mod codec;
pub mod compression;
pub mod daemon;
pub mod error;
pub mod http;
pub mod lan;
pub mod protocol;
pub mod record;
pub mod response;

pub use codec::{compare_by_name, decode_uri, decode_uri_in_place, quote_for_html, Pair, SortedPairs};
pub use daemon::{Acknowledge, HttpDaemon, RequestHandler, DEFAULT_DAEMON_PORT};
pub use error::{BeaconError, CodecError, HttpError, PayloadError};
pub use http::{HttpMessage, Method};
pub use lan::{BeaconPacket, LanConfig, LanSession};
pub use protocol::{OperationKind, Outcome};
pub use record::ServerRecord;
pub use response::ResponseWriter;
