//! Host side of LAN discovery: answers broadcast queries with one response
//! per joinable session.

use bincode::ErrorKind;
use log::{debug, error, info, warn};
use shared::lan::MAX_BEACON_SIZE;
use shared::{BeaconError, BeaconPacket, LanConfig, LanSession};
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::RwLock;

/// Sessions advertised by this process, shared with whoever updates them.
pub type SharedSessions = Arc<RwLock<Vec<LanSession>>>;

pub struct BeaconHost {
    socket: UdpSocket,
    sessions: SharedSessions,
    broadcast_addr: IpAddr,
}

impl BeaconHost {
    /// Binds the query port on every interface.
    pub async fn bind(config: &LanConfig, sessions: SharedSessions) -> io::Result<Self> {
        let socket = UdpSocket::bind(("0.0.0.0", config.port)).await?;
        socket.set_broadcast(true)?;
        info!("LAN beacon listening on {}", socket.local_addr()?);

        Ok(Self {
            socket,
            sessions,
            broadcast_addr: config.broadcast_addr.into(),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Serves queries until the task is dropped.
    pub async fn run(self) {
        let mut buffer = [0u8; MAX_BEACON_SIZE];

        loop {
            let (len, from) = match self.socket.recv_from(&mut buffer).await {
                Ok(received) => received,
                Err(e) => {
                    error!("Error receiving beacon query: {}", e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    continue;
                }
            };

            let nonce = match BeaconPacket::decode(&buffer[..len]) {
                Ok(BeaconPacket::Query { nonce }) => nonce,
                Ok(BeaconPacket::Response { .. }) => continue,
                Err(e) => {
                    debug!("Dropping datagram from {}: {}", from, e);
                    continue;
                }
            };

            let replies = {
                let sessions = self.sessions.read().await;
                answer_query(&sessions, nonce)
            };
            // Replies go to the broadcast address on the searcher's port.
            let destination = SocketAddr::new(self.broadcast_addr, from.port());
            debug!(
                "Query {:016x} from {}: {} joinable session(s)",
                nonce,
                from,
                replies.len()
            );
            for reply in replies {
                if let Err(e) = self.socket.send_to(&reply, destination).await {
                    warn!("Failed to answer query from {}: {}", from, e);
                }
            }
        }
    }
}

/// Encodes a response for every joinable session. Sessions too large for a
/// beacon datagram are skipped.
pub fn answer_query(sessions: &[LanSession], nonce: u64) -> Vec<Vec<u8>> {
    sessions
        .iter()
        .filter(|session| session.is_joinable())
        .filter_map(|session| {
            let packet = BeaconPacket::Response {
                nonce,
                session: session.clone(),
            };
            match packet.encode() {
                Ok(datagram) => Some(datagram),
                Err(BeaconError::Encoding(e)) if matches!(*e, ErrorKind::SizeLimit) => {
                    warn!("Session '{}' does not fit in a beacon", session.owner_name);
                    None
                }
                Err(e) => {
                    warn!("Could not encode session '{}': {}", session.owner_name, e);
                    None
                }
            }
        })
        .collect()
}
