use clap::Parser;
use log::{error, info};
use shared::protocol::{DEFAULT_CHECK_IN_FREQUENCY, DEFAULT_DIRECTORY_PORT};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value_t = DEFAULT_DIRECTORY_PORT)]
    port: u16,

    /// Seconds between check-ins requested from servers
    #[arg(short, long, default_value_t = DEFAULT_CHECK_IN_FREQUENCY)]
    check_in_frequency: f64,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let check_in_frequency = directory::check_in_period(args.check_in_frequency)?;

    let mut daemon = directory::bind(("0.0.0.0", args.port), check_in_frequency)?;
    info!(
        "Directory serving on port {} (check-in every {}s)",
        args.port, args.check_in_frequency
    );

    loop {
        if let Err(e) = daemon.process_once(true) {
            error!("Accept failed: {}", e);
            std::thread::sleep(Duration::from_millis(100));
        }
    }
}
