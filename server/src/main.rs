use clap::Parser;
use client::{DirectoryConfig, HttpClient};
use log::{info, warn};
use server::{GameHost, HostConfig};
use shared::lan::{LanConfig, DEFAULT_LAN_PORT};
use shared::{ServerRecord, DEFAULT_DAEMON_PORT};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

/// Runs the probe daemon and LAN beacon for a game server and keeps it
/// registered with the directory until Ctrl+C.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    #[derive(Parser, Debug)]
    #[clap(author, version, about)]
    struct Args {
        /// Directory base URL
        #[clap(short = 'd', long, default_value = "http://127.0.0.1:8081")]
        directory: String,
        /// Address the probe daemon and beacon bind to
        #[clap(long, default_value = "0.0.0.0")]
        bind: IpAddr,
        /// Probe daemon port
        #[clap(long, default_value_t = DEFAULT_DAEMON_PORT)]
        daemon_port: u16,
        /// LAN beacon port
        #[clap(long, default_value_t = DEFAULT_LAN_PORT)]
        lan_port: u16,
        /// Broadcast address for LAN responses
        #[clap(short = 'b', long, default_value = "255.255.255.255")]
        broadcast: Ipv4Addr,
        /// Server display name
        #[clap(short, long)]
        name: String,
        /// Game port advertised to players
        #[clap(short, long, default_value = "7777")]
        port: u16,
        #[clap(long, default_value = "")]
        game_mode: String,
        #[clap(short, long, default_value = "")]
        map: String,
        #[clap(long, default_value = "16")]
        max_players: i32,
        #[clap(long, default_value = "0")]
        game_id: i64,
        /// Probe daemon poll period in milliseconds
        #[clap(long, default_value = "50")]
        tick_ms: u64,
    }

    env_logger::init();
    let args = Args::parse();

    let record = ServerRecord {
        game_id: args.game_id,
        name: args.name,
        port: args.port.to_string(),
        game_mode: args.game_mode,
        map: args.map,
        max_players: args.max_players,
        current_players: 0,
        ..ServerRecord::default()
    };
    let config = HostConfig {
        directory: DirectoryConfig {
            url: args.directory,
            daemon_port: args.daemon_port,
        },
        lan: LanConfig {
            port: args.lan_port,
            broadcast_addr: args.broadcast,
            ..LanConfig::default()
        },
        bind_addr: args.bind,
        daemon_port: args.daemon_port,
        tick: Duration::from_millis(args.tick_ms),
        ..HostConfig::default()
    };

    let mut host = GameHost::start(config, record, Arc::new(HttpClient::default())).await?;
    let mut events = host
        .take_events()
        .ok_or("directory event stream unavailable")?;
    host.register();

    loop {
        tokio::select! {
            Some(event) = events.recv() => {
                if event.outcome().is_success() {
                    info!("{:?} ok", event.kind());
                } else {
                    warn!("{:?} failed: {:?}", event.kind(), event.outcome());
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("Received Ctrl+C, shutting down gracefully...");
                break;
            }
        }
    }

    host.shutdown().await;
    Ok(())
}
