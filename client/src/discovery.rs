//! LAN session discovery.
//!
//! A search broadcasts one nonce-tagged query and then collects responses
//! carrying the same nonce until its timeout elapses or it is cancelled.
//! Results are only handed out once the search is finalized.

use crate::error::LanError;
use log::{debug, info, warn};
use shared::lan::MAX_BEACON_SIZE;
use shared::{BeaconPacket, LanConfig, LanSession};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::oneshot;
use tokio::time;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanSearchResult {
    pub session: LanSession,
    /// Source address of the response.
    pub host: SocketAddr,
    /// Time from the query to this response.
    pub ping_ms: u64,
}

/// State of one search, independent of any socket.
#[derive(Debug)]
pub struct LanSearch {
    nonce: u64,
    started: Instant,
    deadline: Instant,
    results: Vec<LanSearchResult>,
}

impl LanSearch {
    pub fn new(nonce: u64, timeout: Duration, now: Instant) -> Self {
        Self {
            nonce,
            started: now,
            deadline: now + timeout,
            results: Vec::new(),
        }
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn query(&self) -> BeaconPacket {
        BeaconPacket::Query { nonce: self.nonce }
    }

    /// Records a response to this search. Anything else is ignored and
    /// `false` returned.
    pub fn accept(&mut self, packet: BeaconPacket, host: SocketAddr, now: Instant) -> bool {
        let mut session = match packet {
            BeaconPacket::Response { nonce, session } if nonce == self.nonce => session,
            _ => return false,
        };
        let ping_ms = now.saturating_duration_since(self.started).as_millis() as u64;
        session.server.ping = ping_ms.min(i32::MAX as u64) as i32;
        self.results.push(LanSearchResult {
            session,
            host,
            ping_ms,
        });
        true
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn finalize(mut self, sort_by_ping: bool) -> Vec<LanSearchResult> {
        if sort_by_ping {
            self.results.sort_by_key(|result| result.ping_ms);
        }
        self.results
    }
}

/// Clears the searching flag when the search ends, however it ends.
struct ActiveSearch(Arc<AtomicBool>);

impl Drop for ActiveSearch {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// A running search.
pub struct SearchHandle {
    nonce: u64,
    cancel: Option<oneshot::Sender<()>>,
    results: oneshot::Receiver<Vec<LanSearchResult>>,
}

impl SearchHandle {
    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    /// Finalizes the search now with whatever has been collected.
    pub fn cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
    }

    /// Waits for the search to finalize and returns every result at once.
    pub async fn finished(self) -> Result<Vec<LanSearchResult>, LanError> {
        let SearchHandle {
            cancel, results, ..
        } = self;
        let found = results.await.map_err(|_| LanError::Interrupted);
        drop(cancel);
        found
    }
}

pub struct LanDiscovery {
    config: LanConfig,
    active: Arc<AtomicBool>,
}

impl LanDiscovery {
    pub fn new(config: LanConfig) -> Self {
        Self {
            config,
            active: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_searching(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Broadcasts a query and starts collecting responses.
    ///
    /// Fails with [`LanError::SearchInProgress`] while another search from
    /// this instance has not finalized.
    pub async fn start_search(&self) -> Result<SearchHandle, LanError> {
        if self
            .active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(LanError::SearchInProgress);
        }
        let guard = ActiveSearch(Arc::clone(&self.active));

        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.set_broadcast(true)?;

        let search = LanSearch::new(rand::random(), self.config.search_timeout, Instant::now());
        let nonce = search.nonce();
        let destination = SocketAddr::new(self.config.broadcast_addr.into(), self.config.port);
        socket.send_to(&search.query().encode()?, destination).await?;
        info!("LAN search {:016x} sent to {}", nonce, destination);

        let (cancel_tx, cancel_rx) = oneshot::channel();
        let (results_tx, results_rx) = oneshot::channel();
        tokio::spawn(collect(
            socket,
            search,
            self.config.sort_by_ping,
            cancel_rx,
            results_tx,
            guard,
        ));

        Ok(SearchHandle {
            nonce,
            cancel: Some(cancel_tx),
            results: results_rx,
        })
    }
}

async fn collect(
    socket: UdpSocket,
    mut search: LanSearch,
    sort_by_ping: bool,
    mut cancel: oneshot::Receiver<()>,
    results: oneshot::Sender<Vec<LanSearchResult>>,
    guard: ActiveSearch,
) {
    let deadline = time::Instant::from_std(search.deadline());
    let mut buffer = [0u8; MAX_BEACON_SIZE];

    loop {
        tokio::select! {
            _ = time::sleep_until(deadline) => break,

            _ = &mut cancel => {
                debug!("LAN search {:016x} cancelled", search.nonce());
                break;
            },

            received = socket.recv_from(&mut buffer) => match received {
                Ok((len, from)) => match BeaconPacket::decode(&buffer[..len]) {
                    Ok(packet) => {
                        if !search.accept(packet, from, Instant::now()) {
                            debug!("Ignoring beacon from {} not meant for this search", from);
                        }
                    }
                    Err(e) => debug!("Dropping datagram from {}: {}", from, e),
                },
                Err(e) => warn!("LAN receive failed: {}", e),
            },
        }
    }

    let found = search.finalize(sort_by_ping);
    info!("LAN search finished with {} result(s)", found.len());
    drop(guard);
    let _ = results.send(found);
}
