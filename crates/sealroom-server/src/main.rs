//! Sealroom server binary.
//!
//! # Usage
//!
//! ```bash
//! # Start with self-signed certificate (development)
//! sealroom-server --bind 0.0.0.0:4433 --http-bind 0.0.0.0:3001
//!
//! # Start with TLS certificate (production)
//! sealroom-server --cert cert.pem --key key.pem --allowed-origin https://chat.example
//! ```

use std::{path::PathBuf, time::Duration};

use clap::Parser;
use sealroom_core::RelayConfig;
use sealroom_server::{RateLimit, Server, ServerRuntimeConfig};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Sealroom relay server
#[derive(Parser, Debug)]
#[command(name = "sealroom-server")]
#[command(about = "End-to-end encrypted chat relay")]
#[command(version)]
struct Args {
    /// QUIC address to bind to
    #[arg(short, long, env = "SEALROOM_BIND", default_value = "0.0.0.0:4433")]
    bind: String,

    /// HTTP directory API address to bind to
    #[arg(long, env = "SEALROOM_HTTP_BIND", default_value = "0.0.0.0:3001")]
    http_bind: String,

    /// Path to TLS certificate (PEM format)
    #[arg(short, long, env = "SEALROOM_CERT")]
    cert: Option<PathBuf>,

    /// Path to TLS private key (PEM format)
    #[arg(short, long, env = "SEALROOM_KEY")]
    key: Option<PathBuf>,

    /// Only origin allowed by CORS (any origin when unset)
    #[arg(long, env = "ALLOWED_ORIGIN")]
    allowed_origin: Option<String>,

    /// Frames buffered per connection before new ones are dropped
    #[arg(long, env = "SEALROOM_OUTBOUND_QUEUE", default_value = "256")]
    outbound_queue: usize,

    /// HTTP requests allowed per client IP per window
    #[arg(long, env = "SEALROOM_HTTP_RATE_LIMIT", default_value = "200")]
    http_rate_limit: u32,

    /// HTTP rate limit window in seconds
    #[arg(long, env = "SEALROOM_HTTP_RATE_WINDOW", default_value = "60")]
    http_rate_window: u64,

    /// Maximum concurrent connections
    #[arg(long, env = "SEALROOM_MAX_CONNECTIONS", default_value = "10000")]
    max_connections: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "SEALROOM_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!("Sealroom server starting");

    if args.cert.is_none() || args.key.is_none() {
        tracing::warn!("No TLS certificate provided - using self-signed certificate");
        tracing::warn!("This is NOT suitable for production use!");
    }

    let config = ServerRuntimeConfig {
        bind_address: args.bind,
        http_address: args.http_bind,
        cert_path: args.cert,
        key_path: args.key,
        allowed_origin: args.allowed_origin,
        outbound_queue: args.outbound_queue,
        http_rate_limit: RateLimit {
            max_requests: args.http_rate_limit,
            window: Duration::from_secs(args.http_rate_window),
        },
        relay: RelayConfig { max_connections: args.max_connections },
    };

    let server = Server::bind(config).await?;

    tracing::info!(
        quic = %server.local_addr()?,
        http = %server.http_addr()?,
        "listening"
    );

    server.run().await?;

    Ok(())
}
