//! Sealroom production server.
//!
//! This crate runs the Sans-IO [`Relay`] on real I/O:
//! - Quinn for QUIC transport
//! - Tokio for the async runtime
//! - Axum for the HTTP directory API
//! - System time and cryptographic RNG
//!
//! ## Architecture
//!
//! ```text
//! sealroom-server
//!   ├─ SystemEnv        (production Environment impl)
//!   ├─ QuinnTransport   (QUIC via Quinn)
//!   ├─ Hub              (Relay + per-connection bounded outboxes)
//!   └─ http             (status, users, prekeys; rate limited)
//! ```
//!
//! Each connection gets a reader (this module) and a writer task fed by a
//! bounded channel. Readers lock the hub once per frame.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod error;
pub mod http;
mod hub;
mod ratelimit;
mod system_env;
mod transport;

use std::{net::SocketAddr, path::PathBuf, time::Duration};

pub use error::ServerError;
pub use hub::{Hub, Outbox, OutboxReader, SharedHub, outbox};
pub use ratelimit::{RateLimit, RateLimiter};
use sealroom_core::{Environment, Relay, RelayConfig, RelayEvent};
use sealroom_proto::{Frame, FrameHeader};
pub use system_env::SystemEnv;
pub use transport::{ALPN, QuinnConnection, QuinnTransport, load_pem};

/// How long a closing connection waits for queued frames to be acknowledged.
const CLOSE_LINGER: Duration = Duration::from_secs(1);

/// Server configuration for the production runtime.
#[derive(Debug, Clone)]
pub struct ServerRuntimeConfig {
    /// QUIC address to bind to (e.g., "0.0.0.0:4433")
    pub bind_address: String,
    /// HTTP API address to bind to (e.g., "0.0.0.0:3001")
    pub http_address: String,
    /// Path to TLS certificate (PEM format)
    pub cert_path: Option<PathBuf>,
    /// Path to TLS private key (PEM format)
    pub key_path: Option<PathBuf>,
    /// Only origin allowed by CORS; permissive when `None`
    pub allowed_origin: Option<String>,
    /// Per-connection outbound frame capacity
    pub outbound_queue: usize,
    /// Per-IP quota on the HTTP API
    pub http_rate_limit: RateLimit,
    /// Relay limits
    pub relay: RelayConfig,
}

impl Default for ServerRuntimeConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:4433".to_string(),
            http_address: "0.0.0.0:3001".to_string(),
            cert_path: None,
            key_path: None,
            allowed_origin: None,
            outbound_queue: 256,
            http_rate_limit: RateLimit::default(),
            relay: RelayConfig::default(),
        }
    }
}

/// Production Sealroom server.
pub struct Server {
    hub: SharedHub,
    transport: QuinnTransport,
    http_listener: tokio::net::TcpListener,
    http_router: axum::Router,
    env: SystemEnv,
    outbound_queue: usize,
}

impl Server {
    /// Create and bind a new server.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Binding either address fails
    /// - TLS configuration is invalid
    /// - The allowed origin is not a valid header value
    pub async fn bind(config: ServerRuntimeConfig) -> Result<Self, ServerError> {
        if config.outbound_queue == 0 {
            return Err(ServerError::Config("outbound queue must be at least 1".to_string()));
        }

        let env = SystemEnv::new();
        let hub = Hub::new(Relay::new(env.clone(), config.relay)).shared();

        let transport = QuinnTransport::bind(
            &config.bind_address,
            config.cert_path.as_deref(),
            config.key_path.as_deref(),
        )?;

        let http_router =
            http::router(hub.clone(), config.allowed_origin.as_deref(), config.http_rate_limit)?;
        let http_listener = tokio::net::TcpListener::bind(&config.http_address).await?;

        Ok(Self {
            hub,
            transport,
            http_listener,
            http_router,
            env,
            outbound_queue: config.outbound_queue,
        })
    }

    /// Run the server, accepting connections and processing frames.
    ///
    /// Runs until Ctrl-C or until the HTTP server fails.
    pub async fn run(self) -> Result<(), ServerError> {
        tracing::info!(
            quic = %self.transport.local_addr()?,
            http = %self.http_listener.local_addr()?,
            "server starting"
        );

        let Self { hub, transport, http_listener, http_router, env, outbound_queue } = self;

        let http = tokio::spawn(async move {
            let service = http_router.into_make_service_with_connect_info::<SocketAddr>();
            axum::serve(http_listener, service).await
        });

        let result = tokio::select! {
            () = accept_loop(&transport, &hub, &env, outbound_queue) => Ok(()),
            joined = http => match joined {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(ServerError::Transport(format!("http server: {e}"))),
                Err(e) => Err(ServerError::Internal(format!("http task: {e}"))),
            },
            signal = tokio::signal::ctrl_c() => {
                tracing::info!("shutdown requested");
                signal.map_err(ServerError::from)
            },
        };

        transport.close();
        result
    }

    /// QUIC address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.transport.local_addr()
    }

    /// HTTP address the server is bound to.
    pub fn http_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.http_listener.local_addr()?)
    }

    /// Leaf certificate presented to QUIC clients.
    pub fn certificate(&self) -> &rustls::pki_types::CertificateDer<'static> {
        self.transport.certificate()
    }

    /// Shared hub, for inspection.
    pub fn hub(&self) -> SharedHub {
        self.hub.clone()
    }
}

/// Accept connections until the endpoint closes, one task each.
async fn accept_loop(
    transport: &QuinnTransport,
    hub: &SharedHub,
    env: &SystemEnv,
    outbound_queue: usize,
) {
    loop {
        match transport.accept().await {
            Ok(None) => {
                tracing::info!("endpoint closed; no longer accepting");
                return;
            },
            Ok(Some(conn)) => {
                let hub = hub.clone();
                let env = env.clone();

                tokio::spawn(async move {
                    if let Err(e) = handle_connection(conn, hub, env, outbound_queue).await {
                        tracing::debug!("connection error: {}", e);
                    }
                });
            },
            Err(e) => {
                tracing::error!("accept error: {}", e);
            },
        }
    }
}

/// Handle a single QUIC connection.
async fn handle_connection(
    conn: QuinnConnection,
    hub: SharedHub,
    env: SystemEnv,
    outbound_queue: usize,
) -> Result<(), ServerError> {
    let conn_id = env.random_u64();
    tracing::debug!(conn_id, remote = %conn.remote_address(), "new connection");

    let (send, recv) = conn.accept_bi().await.map_err(|e| ServerError::Transport(e.to_string()))?;

    let (tx, rx) = outbox(outbound_queue);
    let writer = tokio::spawn(write_loop(conn_id, send, rx, conn.clone()));

    hub.lock().await.accept(conn_id, tx)?;

    let result = read_loop(conn_id, recv, &hub).await;

    {
        let mut hub = hub.lock().await;
        hub.detach(conn_id);
        if let Err(e) = hub.process(RelayEvent::ConnectionClosed { conn_id }) {
            tracing::warn!(conn_id, "close processing error: {}", e);
        }
    }

    if let Err(e) = writer.await {
        tracing::error!(conn_id, "writer task failed: {}", e);
    }

    result
}

/// Read frames until the stream ends or a frame cannot be parsed.
async fn read_loop(
    conn_id: u64,
    mut recv: quinn::RecvStream,
    hub: &SharedHub,
) -> Result<(), ServerError> {
    let mut header_buf = [0u8; FrameHeader::SIZE];

    loop {
        if let Err(e) = recv.read_exact(&mut header_buf).await {
            tracing::debug!(conn_id, "read ended: {}", e);
            return Ok(());
        }

        // Size is validated here, before the payload is read.
        let payload_size = match FrameHeader::from_bytes(&header_buf) {
            Ok(header) => header.payload_size() as usize,
            Err(e) => {
                tracing::warn!(conn_id, "invalid frame header: {}", e);
                return Err(e.into());
            },
        };

        let mut buf = vec![0u8; FrameHeader::SIZE + payload_size];
        buf[..FrameHeader::SIZE].copy_from_slice(&header_buf);
        if let Err(e) = recv.read_exact(&mut buf[FrameHeader::SIZE..]).await {
            tracing::debug!(conn_id, "payload read error: {}", e);
            return Ok(());
        }

        let frame = Frame::decode(&buf)?;

        let mut hub = hub.lock().await;
        if let Err(e) = hub.process(RelayEvent::FrameReceived { conn_id, frame }) {
            tracing::warn!(conn_id, "frame processing error: {}", e);
            return Err(e.into());
        }
    }
}

/// Drain the outbox onto the stream, then close if the relay asked to.
async fn write_loop(
    conn_id: u64,
    mut send: quinn::SendStream,
    mut outbox: OutboxReader,
    conn: QuinnConnection,
) {
    while let Some(bytes) = outbox.next_frame().await {
        if let Err(e) = send.write_all(&bytes).await {
            tracing::debug!(conn_id, "write error: {}", e);
            return;
        }
    }

    if let Err(e) = send.finish() {
        tracing::debug!(conn_id, "finish error: {}", e);
    }

    if let Some(reason) = outbox.close_reason() {
        match tokio::time::timeout(CLOSE_LINGER, send.stopped()).await {
            Ok(Ok(_)) => {},
            Ok(Err(e)) => tracing::debug!(conn_id, "stream stopped with error: {}", e),
            Err(_) => tracing::debug!(conn_id, "close linger elapsed"),
        }
        conn.close(0u32.into(), reason.as_bytes());
    }
}
