//! Glue for a game server process: probe daemon, LAN beacon and directory
//! registration running side by side.

use crate::beacon::{BeaconHost, SharedSessions};
use client::{DirectoryConfig, DirectoryDriver, DirectoryEvent, DirectoryHandle, PendingOperation, Transport};
use log::{info, warn};
use shared::{Acknowledge, HttpDaemon, LanConfig, LanSession, ServerRecord, DEFAULT_DAEMON_PORT};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;

/// How long shutdown waits for the directory to confirm deregistration.
const UNREGISTER_GRACE: Duration = Duration::from_secs(3);

#[derive(Debug, Clone)]
pub struct HostConfig {
    pub directory: DirectoryConfig,
    pub lan: LanConfig,
    pub bind_addr: IpAddr,
    pub daemon_port: u16,
    /// Poll period of the probe daemon.
    pub tick: Duration,
    pub build_id: u32,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            directory: DirectoryConfig::default(),
            lan: LanConfig::default(),
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            daemon_port: DEFAULT_DAEMON_PORT,
            tick: Duration::from_millis(50),
            build_id: 1,
        }
    }
}

pub struct GameHost {
    server: ServerRecord,
    sessions: SharedSessions,
    directory: DirectoryHandle,
    events: Option<mpsc::UnboundedReceiver<DirectoryEvent>>,
    daemon_addr: SocketAddr,
    beacon_addr: SocketAddr,
    stop: Arc<AtomicBool>,
    daemon_task: JoinHandle<()>,
    beacon_task: JoinHandle<()>,
    driver_task: JoinHandle<()>,
}

impl GameHost {
    /// Binds the probe daemon and the beacon, and starts the directory
    /// driver. Registration is a separate step, see [`GameHost::register`].
    pub async fn start(
        config: HostConfig,
        server: ServerRecord,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let mut daemon = HttpDaemon::bind((config.bind_addr, config.daemon_port), Acknowledge)?;
        let daemon_addr = daemon.local_addr()?;
        let stop = Arc::new(AtomicBool::new(false));
        let daemon_task = {
            let stop = Arc::clone(&stop);
            let tick = config.tick;
            tokio::task::spawn_blocking(move || daemon.run_until(tick, &stop))
        };

        let sessions: SharedSessions = Arc::new(RwLock::new(vec![LanSession::for_server(
            &server,
            config.build_id,
        )]));
        let beacon = BeaconHost::bind(&config.lan, Arc::clone(&sessions)).await?;
        let beacon_addr = beacon.local_addr()?;
        let beacon_task = tokio::spawn(beacon.run());

        let (directory, events, driver_task) = DirectoryDriver::spawn(&config.directory, transport)?;
        info!(
            "Hosting '{}' (probe {}, beacon {})",
            server.name, daemon_addr, beacon_addr
        );

        Ok(Self {
            server,
            sessions,
            directory,
            events: Some(events),
            daemon_addr,
            beacon_addr,
            stop,
            daemon_task,
            beacon_task,
            driver_task,
        })
    }

    pub fn server(&self) -> &ServerRecord {
        &self.server
    }

    pub fn directory(&self) -> &DirectoryHandle {
        &self.directory
    }

    pub fn daemon_addr(&self) -> SocketAddr {
        self.daemon_addr
    }

    pub fn beacon_addr(&self) -> SocketAddr {
        self.beacon_addr
    }

    /// Takes the directory event stream. Only the first call gets it.
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<DirectoryEvent>> {
        self.events.take()
    }

    /// Announces this server to the directory. Check-ins follow on their own
    /// once the directory accepts it.
    pub fn register(&self) -> PendingOperation {
        self.directory.register(self.server.clone())
    }

    /// Updates the player count for the LAN beacon and the next check-in.
    pub async fn set_player_count(&mut self, current_players: i32) {
        self.server.current_players = current_players;
        {
            let mut sessions = self.sessions.write().await;
            for session in sessions.iter_mut() {
                session.server.current_players = current_players;
                session.open_public_connections = self.server.open_slots();
            }
        }
        if self.directory.update_player_count(current_players).is_err() {
            warn!("Directory driver is gone; player count not forwarded");
        }
    }

    /// Deregisters and stops every task. Returns the deregistration outcome
    /// if the directory answered in time.
    pub async fn shutdown(self) -> Option<DirectoryEvent> {
        let outcome = match tokio::time::timeout(UNREGISTER_GRACE, self.directory.unregister().wait()).await {
            Ok(Ok(event)) => Some(event),
            Ok(Err(e)) => {
                warn!("Could not unregister: {}", e);
                None
            }
            Err(_) => {
                warn!("Directory did not confirm deregistration in time");
                None
            }
        };

        self.stop.store(true, Ordering::Relaxed);
        self.beacon_task.abort();
        self.driver_task.abort();
        if let Err(e) = self.daemon_task.await {
            warn!("Probe daemon task failed: {}", e);
        }
        info!("Host for '{}' stopped", self.server.name);
        outcome
    }
}
