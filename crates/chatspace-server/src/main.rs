//! Chatspace relay binary.
//!
//! # Usage
//!
//! ```bash
//! # Listen on the default port 8081
//! chatspace-server
//!
//! # Port from the environment, verbose logging
//! WS_SERVER_PORT=9000 RUST_LOG=debug chatspace-server
//! ```

use std::time::Duration;

use chatspace_server::{RelayConfig, Server, ServerRuntimeConfig};
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Chatspace relay
#[derive(Parser, Debug)]
#[command(name = "chatspace-server")]
#[command(about = "Content-agnostic WebSocket relay for chatspace rooms")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, env = "WS_SERVER_PORT", default_value_t = 8081)]
    port: u16,

    /// Interface to bind to
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Seconds between liveness pings
    #[arg(long, default_value_t = 30)]
    ping_interval_secs: u64,

    /// Maximum concurrent sockets
    #[arg(long, default_value_t = 10_000)]
    max_connections: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!("Chatspace relay starting");

    let config = ServerRuntimeConfig {
        bind_address: format!("{}:{}", args.host, args.port),
        driver: RelayConfig {
            ping_interval: Duration::from_secs(args.ping_interval_secs.max(1)),
            max_connections: args.max_connections,
        },
    };

    let server = Server::bind(config).await?;

    tracing::info!("Relay bound to {}", server.local_addr()?);

    server.run().await?;

    Ok(())
}
