//! LAN beacon wire format.
//!
//! Every datagram is `MAGIC | VERSION | bincode(BeaconPacket)`, bounded by
//! [`MAX_BEACON_SIZE`]. Packets with a foreign prefix are dropped by both
//! sides before any decoding happens.

use crate::error::BeaconError;
use crate::record::ServerRecord;
use bincode::Options;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::time::Duration;

pub const BEACON_MAGIC: [u8; 4] = *b"MSLN";
pub const BEACON_VERSION: u8 = 1;
pub const MAX_BEACON_SIZE: usize = 1024;

const HEADER_LEN: usize = BEACON_MAGIC.len() + 1;

pub const DEFAULT_LAN_PORT: u16 = 14001;
pub const DEFAULT_SEARCH_TIMEOUT: Duration = Duration::from_millis(1500);

/// Addressing shared by the searching client and the answering host.
#[derive(Debug, Clone)]
pub struct LanConfig {
    /// Port hosts listen on for queries.
    pub port: u16,
    /// Destination of queries and responses.
    pub broadcast_addr: Ipv4Addr,
    pub search_timeout: Duration,
    /// Order results by round-trip time when a search ends.
    pub sort_by_ping: bool,
}

impl Default for LanConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_LAN_PORT,
            broadcast_addr: Ipv4Addr::BROADCAST,
            search_timeout: DEFAULT_SEARCH_TIMEOUT,
            sort_by_ping: false,
        }
    }
}

/// What a host advertises about one of its sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanSession {
    pub owner_name: String,
    pub num_public_connections: u32,
    pub open_public_connections: u32,
    pub should_advertise: bool,
    pub is_lan_match: bool,
    pub in_progress: bool,
    pub allow_join_in_progress: bool,
    pub build_id: u32,
    pub server: ServerRecord,
}

impl LanSession {
    /// Builds an advertised LAN session describing `server`.
    pub fn for_server(server: &ServerRecord, build_id: u32) -> Self {
        Self {
            owner_name: server.name.clone(),
            num_public_connections: server.max_players.max(0) as u32,
            open_public_connections: server.open_slots(),
            should_advertise: true,
            is_lan_match: true,
            in_progress: false,
            allow_join_in_progress: true,
            build_id,
            server: server.clone(),
        }
    }

    /// Only joinable sessions are answered to a query.
    pub fn is_joinable(&self) -> bool {
        (self.should_advertise || self.is_lan_match)
            && (!self.in_progress || self.allow_join_in_progress)
            && self.open_public_connections > 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BeaconPacket {
    Query { nonce: u64 },
    Response { nonce: u64, session: LanSession },
}

fn wire_options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_limit((MAX_BEACON_SIZE - HEADER_LEN) as u64)
}

impl BeaconPacket {
    pub fn nonce(&self) -> u64 {
        match self {
            BeaconPacket::Query { nonce } | BeaconPacket::Response { nonce, .. } => *nonce,
        }
    }

    /// Serializes with the beacon header. Fails if the datagram would exceed
    /// [`MAX_BEACON_SIZE`].
    pub fn encode(&self) -> Result<Vec<u8>, BeaconError> {
        let body = wire_options().serialize(self)?;
        let mut datagram = Vec::with_capacity(HEADER_LEN + body.len());
        datagram.extend_from_slice(&BEACON_MAGIC);
        datagram.push(BEACON_VERSION);
        datagram.extend_from_slice(&body);
        Ok(datagram)
    }

    pub fn decode(datagram: &[u8]) -> Result<Self, BeaconError> {
        if datagram.len() < HEADER_LEN {
            return Err(BeaconError::Truncated);
        }
        if datagram[..BEACON_MAGIC.len()] != BEACON_MAGIC {
            return Err(BeaconError::BadMagic);
        }
        let version = datagram[BEACON_MAGIC.len()];
        if version != BEACON_VERSION {
            return Err(BeaconError::Version(version));
        }
        Ok(wire_options().deserialize(&datagram[HEADER_LEN..])?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> LanSession {
        let server = ServerRecord {
            name: "Garage".to_string(),
            port: "7777".to_string(),
            max_players: 4,
            current_players: 1,
            ..ServerRecord::default()
        };
        LanSession::for_server(&server, 7)
    }

    #[test]
    fn test_session_from_server() {
        let session = session();
        assert_eq!(session.owner_name, "Garage");
        assert_eq!(session.num_public_connections, 4);
        assert_eq!(session.open_public_connections, 3);
        assert!(session.is_joinable());
    }

    #[test]
    fn test_joinable_rules() {
        let mut full = session();
        full.open_public_connections = 0;
        assert!(!full.is_joinable());

        let mut hidden = session();
        hidden.should_advertise = false;
        hidden.is_lan_match = false;
        assert!(!hidden.is_joinable());

        let mut lan_only = session();
        lan_only.should_advertise = false;
        assert!(lan_only.is_joinable());

        let mut running = session();
        running.in_progress = true;
        running.allow_join_in_progress = false;
        assert!(!running.is_joinable());
        running.allow_join_in_progress = true;
        assert!(running.is_joinable());
    }

    #[test]
    fn test_response_survives_wire() {
        let packet = BeaconPacket::Response {
            nonce: 0xDEAD_BEEF,
            session: session(),
        };
        let datagram = packet.encode().unwrap();
        assert_eq!(&datagram[..4], b"MSLN");
        assert_eq!(datagram[4], BEACON_VERSION);
        let decoded = BeaconPacket::decode(&datagram).unwrap();
        assert_eq!(decoded.nonce(), 0xDEAD_BEEF);
        assert_eq!(decoded, packet);
    }

    #[test]
    fn test_decode_rejects_foreign_datagrams() {
        assert!(matches!(BeaconPacket::decode(b"MS"), Err(BeaconError::Truncated)));
        assert!(matches!(
            BeaconPacket::decode(b"HTTP/1.1 200"),
            Err(BeaconError::BadMagic)
        ));

        let mut datagram = BeaconPacket::Query { nonce: 1 }.encode().unwrap();
        datagram[4] = 9;
        assert!(matches!(
            BeaconPacket::decode(&datagram),
            Err(BeaconError::Version(9))
        ));
    }

    #[test]
    fn test_decode_rejects_truncated_body() {
        let datagram = BeaconPacket::Response {
            nonce: 3,
            session: session(),
        }
        .encode()
        .unwrap();
        assert!(BeaconPacket::decode(&datagram[..datagram.len() - 3]).is_err());
    }

    #[test]
    fn test_encode_rejects_oversized_session() {
        let mut session = session();
        session.server.map = "m".repeat(MAX_BEACON_SIZE);
        let packet = BeaconPacket::Response { nonce: 1, session };
        assert!(matches!(packet.encode(), Err(BeaconError::Encoding(_))));
    }
}
