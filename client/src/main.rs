use clap::{Parser, Subcommand};
use client::{DirectoryConfig, DirectoryDriver, DirectoryEvent, HttpClient, LanDiscovery};
use log::{info, warn};
use shared::lan::DEFAULT_LAN_PORT;
use shared::{LanConfig, ServerRecord, DEFAULT_DAEMON_PORT};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory base URL
    #[arg(short = 'd', long, default_value = "http://127.0.0.1:8081")]
    directory: String,

    /// Probe daemon port on game servers
    #[arg(long, default_value_t = DEFAULT_DAEMON_PORT)]
    daemon_port: u16,

    /// Port LAN hosts listen on
    #[arg(long, default_value_t = DEFAULT_LAN_PORT)]
    lan_port: u16,

    /// Broadcast address for LAN queries
    #[arg(short = 'b', long, default_value = "255.255.255.255")]
    broadcast: Ipv4Addr,

    /// How long a LAN search collects responses
    #[arg(long, default_value = "1500")]
    search_timeout_ms: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List servers known to the directory and ping each of them
    List {
        /// Only servers of this game (0 = all)
        #[arg(short = 'g', long, default_value = "0")]
        game_id: i64,

        /// Skip the ping pass
        #[arg(long)]
        no_ping: bool,
    },

    /// Measure round-trip time to a server's probe daemon
    Ping { ip: String },

    /// Look for sessions on the local network
    Search,
}

fn print_server(server: &ServerRecord) {
    let ping = if server.ping < 0 {
        "-".to_string()
    } else {
        format!("{}ms", server.ping)
    };
    println!(
        "{:<24} {:>15}:{:<5} {:<10} {:<12} {:>3}/{:<3} {:>6}",
        server.name,
        server.ip,
        server.port,
        server.game_mode,
        server.map,
        server.current_players,
        server.max_players,
        ping
    );
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    if let Command::Search = args.command {
        let discovery = LanDiscovery::new(LanConfig {
            port: args.lan_port,
            broadcast_addr: args.broadcast,
            search_timeout: Duration::from_millis(args.search_timeout_ms),
            sort_by_ping: true,
        });
        let results = discovery.start_search().await?.finished().await?;
        if results.is_empty() {
            println!("No LAN sessions found");
        }
        for result in &results {
            println!("{} via {}", result.session.owner_name, result.host);
            print_server(&result.session.server);
        }
        return Ok(());
    }

    let config = DirectoryConfig {
        url: args.directory.clone(),
        daemon_port: args.daemon_port,
    };
    let (directory, _events, _task) = DirectoryDriver::spawn(&config, Arc::new(HttpClient::default()))?;
    info!("Using directory at {}", args.directory);

    match args.command {
        Command::List { game_id, no_ping } => {
            let servers = match directory.list_servers(game_id).wait().await? {
                DirectoryEvent::ServerListReceived { outcome, servers } if outcome.is_success() => {
                    servers
                }
                other => {
                    warn!("Listing failed: {:?}", other.outcome());
                    return Err(format!("listing failed: {:?}", other.outcome()).into());
                }
            };

            if no_ping {
                servers.iter().for_each(print_server);
            } else {
                let pending: Vec<_> = servers
                    .into_iter()
                    .map(|server| directory.ping(server))
                    .collect();
                for probe in pending {
                    if let DirectoryEvent::PingComplete { server, .. } = probe.wait().await? {
                        print_server(&server);
                    }
                }
            }
        }

        Command::Ping { ip } => {
            let target = ServerRecord {
                ip,
                ..ServerRecord::default()
            };
            match directory.ping(target).wait().await? {
                DirectoryEvent::PingComplete { outcome, server } if outcome.is_success() => {
                    println!("{}: {}ms", server.ip, server.ping);
                }
                other => println!("Ping failed: {:?}", other.outcome()),
            }
        }

        Command::Search => {}
    }

    Ok(())
}
