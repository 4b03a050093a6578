//! Connection client for the condsync daemon.
//!
//! This module provides the `SyncClient` which handles:
//! - Connecting over TCP with exponential backoff
//! - Framing requests and reading response lines
//! - Mapping responses onto typed results
//!
//! **Panic-Free Policy:** This module follows the project's panic-free guidelines.
//! No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, or `todo!()`.

use std::time::Duration;

use condsync_core::{WaitOutcome, WaitTimeout};
use condsync_protocol::{ClientCodec, Request, Response};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::sleep;
use tokio_util::codec::Framed;
use tracing::{debug, warn};

use crate::error::{ClientError, Result};

/// Default daemon address.
pub const DEFAULT_ADDRESS: &str = "127.0.0.1:9999";

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for the client connection.
///
/// # Example
///
/// ```rust
/// use condsync_client::ClientConfig;
/// use std::time::Duration;
///
/// let config = ClientConfig {
///     address: "10.0.0.5:9999".to_string(),
///     retry_initial_delay: Duration::from_millis(50),
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// `host:port` of the daemon.
    pub address: String,

    /// Initial delay before first retry after connection failure.
    pub retry_initial_delay: Duration,

    /// Maximum delay between retry attempts.
    pub retry_max_delay: Duration,

    /// Multiplier for exponential backoff (e.g., 2.0 doubles delay each retry).
    pub retry_multiplier: f64,

    /// Total connection attempts before giving up (at least one is made).
    pub max_connect_attempts: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            retry_initial_delay: Duration::from_millis(100),
            retry_max_delay: Duration::from_secs(5),
            retry_multiplier: 2.0,
            max_connect_attempts: 5,
        }
    }
}

impl ClientConfig {
    /// Configuration for `address` with default retry settings.
    pub fn for_address(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Self::default()
        }
    }

    fn next_delay(&self, delay: Duration) -> Duration {
        let next_delay_ms = (delay.as_millis() as f64 * self.retry_multiplier) as u64;
        Duration::from_millis(next_delay_ms).min(self.retry_max_delay)
    }
}

// ============================================================================
// Sync Client
// ============================================================================

/// One connection to the daemon.
///
/// Requests are strictly sequential: each call sends one request and
/// reads its single response line. A blocking `wait` therefore occupies
/// the connection until it returns.
///
/// # Example
///
/// ```rust,ignore
/// use condsync_client::{ClientConfig, SyncClient};
/// use condsync_core::WaitTimeout;
///
/// let mut client = SyncClient::connect(&ClientConfig::default()).await?;
/// client.set("A", "ready", 1).await?;
/// let outcome = client.wait("A", "go", 1, WaitTimeout::from_millis(2000)).await?;
/// client.quit().await?;
/// ```
pub struct SyncClient {
    framed: Framed<TcpStream, ClientCodec>,
    address: String,
}

impl SyncClient {
    /// Connects with exponential backoff between attempts.
    pub async fn connect(config: &ClientConfig) -> Result<Self> {
        let attempts = config.max_connect_attempts.max(1);
        let mut delay = config.retry_initial_delay;
        let mut attempt = 0u32;

        loop {
            attempt = attempt.saturating_add(1);
            debug!(attempt, address = %config.address, "Attempting to connect to daemon");

            match TcpStream::connect(config.address.as_str()).await {
                Ok(stream) => {
                    debug!(attempt, "Connection successful");
                    return Ok(Self::from_stream(stream, config.address.clone()));
                }
                Err(e) if attempt >= attempts => {
                    warn!(attempt, error = %e, "Giving up connecting to daemon");
                    return Err(ClientError::Connect {
                        address: config.address.clone(),
                        attempts: attempt,
                        error: e.to_string(),
                    });
                }
                Err(e) => {
                    debug!(attempt, error = %e, "Connection attempt failed");
                }
            }

            sleep(delay).await;
            delay = config.next_delay(delay);
        }
    }

    /// Wraps an already connected stream.
    pub fn from_stream(stream: TcpStream, address: String) -> Self {
        if let Err(e) = stream.set_nodelay(true) {
            debug!(error = %e, "Failed to set TCP_NODELAY");
        }
        Self {
            framed: Framed::new(stream, ClientCodec::new()),
            address,
        }
    }

    /// Address this client connected to.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Sends `request` and returns the response as received, including
    /// `Error:` and `Fatal:` lines.
    pub async fn request(&mut self, request: &Request) -> Result<Response> {
        self.send_body(&request.to_string()).await
    }

    /// Sends an arbitrary frame body and reads the response line.
    pub async fn send_body(&mut self, body: &str) -> Result<Response> {
        self.framed.send(body).await?;
        self.read_response().await
    }

    /// Reads one response line.
    pub async fn read_response(&mut self) -> Result<Response> {
        match self.framed.next().await {
            Some(Ok(line)) => Ok(line.parse()?),
            Some(Err(e)) => Err(e.into()),
            None => Err(ClientError::Closed),
        }
    }

    /// Sends `quit` and closes the connection.
    pub async fn quit(mut self) -> Result<()> {
        self.framed.send("quit").await?;
        SinkExt::<&str>::close(&mut self.framed).await?;
        Ok(())
    }

    /// INIT: returns the condition's current state (`-1` if unset).
    pub async fn init(&mut self, solution: &str, condition: &str) -> Result<i64> {
        match self.checked(&Request::init(solution, condition)?).await? {
            Response::Init { state, .. } => Ok(state),
            other => Err(unexpected("INIT", &other)),
        }
    }

    /// SET: returns the stored state (`-1` if the condition was removed).
    pub async fn set(&mut self, solution: &str, condition: &str, value: i64) -> Result<i64> {
        match self.checked(&Request::set(solution, condition, value)?).await? {
            Response::Set { state, .. } => Ok(state),
            other => Err(unexpected("SET", &other)),
        }
    }

    /// WAIT: blocks until the condition holds `value`, the timeout
    /// elapses, or the condition is deleted.
    pub async fn wait(
        &mut self,
        solution: &str,
        condition: &str,
        value: i64,
        timeout: WaitTimeout,
    ) -> Result<WaitOutcome> {
        let response = self
            .checked(&Request::wait(solution, condition, value, timeout)?)
            .await?;
        response
            .wait_outcome()
            .ok_or_else(|| unexpected("WAIT", &response))
    }

    /// GET: returns the condition's current state (`-1` if unset).
    pub async fn get(&mut self, solution: &str, condition: &str) -> Result<i64> {
        match self.checked(&Request::get(solution, condition)?).await? {
            Response::Get { state } => Ok(state),
            other => Err(unexpected("GET", &other)),
        }
    }

    /// DELETE: removes the condition, releasing its waiters.
    pub async fn delete(&mut self, solution: &str, condition: &str) -> Result<()> {
        match self.checked(&Request::delete(solution, condition)?).await? {
            Response::Deleted { .. } => Ok(()),
            other => Err(unexpected("DELETE", &other)),
        }
    }

    /// RESET: removes every condition of the solution.
    pub async fn reset(&mut self, solution: &str) -> Result<()> {
        match self.checked(&Request::reset(solution)?).await? {
            Response::Reset { .. } => Ok(()),
            other => Err(unexpected("RESET", &other)),
        }
    }

    /// Sends `request`, turning `Error:`/`Fatal:` lines into errors.
    async fn checked(&mut self, request: &Request) -> Result<Response> {
        match self.request(request).await? {
            Response::Error { message } => Err(ClientError::Rejected(message)),
            Response::Fatal { message } => Err(ClientError::Fatal(message)),
            response => Ok(response),
        }
    }
}

fn unexpected(operation: &'static str, response: &Response) -> ClientError {
    ClientError::Unexpected {
        operation,
        line: response.to_string(),
    }
}
