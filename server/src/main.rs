use clap::Parser;
use log::info;
use server::network::{Server, ServerConfig};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Tick rate (updates per second)
    #[arg(
        short,
        long,
        default_value = "60",
        value_parser = clap::value_parser!(u32).range(1..=1000)
    )]
    tick_rate: u32,

    /// Maximum number of connected peers
    #[arg(short, long, default_value = "8")]
    max_peers: usize,

    /// Seconds of silence before a peer is dropped
    #[arg(long, default_value = "5")]
    peer_timeout_secs: u64,

    /// Directory the end-of-day save is written to
    #[arg(long, default_value = "saves")]
    save_dir: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let config = ServerConfig {
        bind_addr: format!("{}:{}", args.host, args.port),
        tick_duration: Duration::from_secs_f64(1.0 / f64::from(args.tick_rate)),
        max_peers: args.max_peers,
        peer_timeout: Duration::from_secs(args.peer_timeout_secs),
        save_dir: args.save_dir,
    };

    info!(
        "Starting server at {} ({} Hz, up to {} peers)",
        config.bind_addr, args.tick_rate, config.max_peers
    );

    let mut server = Server::new(config).await?;

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
