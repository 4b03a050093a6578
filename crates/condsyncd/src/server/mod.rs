//! TCP server for the condsync daemon.
//!
//! The server:
//! - Binds a TCP listener, retrying once if the port is taken
//! - Spawns a ConnectionHandler task for each accepted client
//! - Shares one SolutionRegistry across all handlers
//! - Supports graceful shutdown via CancellationToken
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   SyncServer    │
//! │                 │
//! │   TcpListener   │
//! └───────┬─────────┘
//!         │ accept()
//!         ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ConnectionHandler│────▶│ SolutionRegistry │
//! │   (per client)  │     │                  │
//! └─────────────────┘     └────────┬─────────┘
//!                                  │
//!                                  ▼
//!                         ┌──────────────────┐
//!                         │ Solution         │
//!                         │  └─ Condition .. │
//!                         └──────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?` or pattern matching
//! - Accept errors are logged and allow continued operation

mod connection;

pub use connection::{execute, ConnectionError, ConnectionHandler};

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::diagnostics::{describe_holders, find_port_holders, PortHolder};
use crate::registry::SolutionRegistry;

/// TCP server for condition synchronization clients.
pub struct SyncServer {
    /// Bound listener
    listener: TcpListener,

    /// Registry shared with every connection
    registry: Arc<SolutionRegistry>,

    /// Cancellation token for graceful shutdown
    cancel_token: CancellationToken,

    /// Connection counter for numbering clients in logs
    connection_counter: AtomicU64,
}

impl SyncServer {
    /// Binds the listener described by `config`.
    ///
    /// If the address is in use, waits `config.bind_retry_delay` and tries
    /// once more. A second failure looks up which processes hold the port
    /// and returns them in [`ServerError::AddressInUse`].
    pub async fn bind(
        config: &ServerConfig,
        registry: Arc<SolutionRegistry>,
        cancel_token: CancellationToken,
    ) -> Result<Self, ServerError> {
        let addr = config.socket_addr();

        let listener = match TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
                warn!(
                    addr = %addr,
                    retry_in_ms = config.bind_retry_delay.as_millis() as u64,
                    "Address in use, retrying once"
                );
                tokio::time::sleep(config.bind_retry_delay).await;

                match TcpListener::bind(addr).await {
                    Ok(listener) => listener,
                    Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
                        let holders = find_port_holders(addr.port());
                        error!(
                            addr = %addr,
                            holders = %describe_holders(&holders),
                            "Address still in use"
                        );
                        return Err(ServerError::AddressInUse { addr, holders });
                    }
                    Err(source) => return Err(ServerError::Bind { addr, source }),
                }
            }
            Err(source) => return Err(ServerError::Bind { addr, source }),
        };

        let local_addr = listener.local_addr().map_err(ServerError::LocalAddr)?;
        info!(addr = %local_addr, "Sync server listening");

        Ok(Self {
            listener,
            registry,
            cancel_token,
            connection_counter: AtomicU64::new(0),
        })
    }

    /// Returns the address actually bound (resolves port `0`).
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.listener.local_addr().map_err(ServerError::LocalAddr)
    }

    /// Returns the registry shared by this server's connections.
    pub fn registry(&self) -> &Arc<SolutionRegistry> {
        &self.registry
    }

    /// Accepts connections until the cancellation token is triggered.
    ///
    /// Connections already running are left to finish on their own.
    pub async fn run(self) {
        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    info!("Server shutdown requested");
                    break;
                }

                result = self.listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            let conn_num = self.connection_counter.fetch_add(1, Ordering::Relaxed);
                            self.handle_connection(stream, peer, conn_num);
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                        }
                    }
                }
            }
        }

        debug!(
            connections = self.connection_counter.load(Ordering::Relaxed),
            "Accept loop stopped"
        );
    }

    fn handle_connection(&self, stream: TcpStream, peer: SocketAddr, connection_number: u64) {
        if let Err(e) = stream.set_nodelay(true) {
            debug!(error = %e, "Failed to set TCP_NODELAY");
        }

        let handler = ConnectionHandler::new(
            stream,
            peer,
            Arc::clone(&self.registry),
            connection_number,
        );
        tokio::spawn(handler.run());
    }
}

/// Errors that can occur while starting the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("Address {addr} already in use ({})", describe_holders(.holders))]
    AddressInUse {
        addr: SocketAddr,
        holders: Vec<PortHolder>,
    },

    #[error("Failed to read local address: {0}")]
    LocalAddr(#[source] io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};
    use std::time::Duration;

    fn loopback(port: u16) -> ServerConfig {
        ServerConfig {
            bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port,
            bind_retry_delay: Duration::from_millis(50),
        }
    }

    #[tokio::test]
    async fn test_bind_ephemeral_port() {
        let server = SyncServer::bind(
            &loopback(0),
            Arc::new(SolutionRegistry::new()),
            CancellationToken::new(),
        )
        .await
        .unwrap();

        let addr = server.local_addr().unwrap();
        assert_ne!(addr.port(), 0);
        assert!(addr.ip().is_loopback());
    }

    #[tokio::test]
    async fn test_bind_conflict_reports_address_in_use() {
        let occupant = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = occupant.local_addr().unwrap().port();

        let result = SyncServer::bind(
            &loopback(port),
            Arc::new(SolutionRegistry::new()),
            CancellationToken::new(),
        )
        .await;

        match result {
            Err(ServerError::AddressInUse { addr, .. }) => assert_eq!(addr.port(), port),
            Err(other) => panic!("expected AddressInUse, got {other}"),
            Ok(_) => panic!("bind should fail while port is held"),
        }
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel() {
        let cancel_token = CancellationToken::new();
        let server = SyncServer::bind(
            &loopback(0),
            Arc::new(SolutionRegistry::new()),
            cancel_token.clone(),
        )
        .await
        .unwrap();

        let handle = tokio::spawn(server.run());
        cancel_token.cancel();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("server stops")
            .expect("server task");
    }

    #[test]
    fn test_address_in_use_display() {
        let err = ServerError::AddressInUse {
            addr: "0.0.0.0:9999".parse().unwrap(),
            holders: Vec::new(),
        };
        assert_eq!(
            err.to_string(),
            "Address 0.0.0.0:9999 already in use (holder unknown)"
        );
    }
}
