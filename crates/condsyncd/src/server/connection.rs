//! Connection handler for individual client connections.
//!
//! Each connection runs one request/response cycle at a time:
//!
//! ```text
//! READING_LENGTH -> READING_BODY -> DISPATCHING -> RESPONDING -> (loop)
//!        |                |              |
//!       EOF          quit / q        fatal error  ----------------> CLOSED
//! ```
//!
//! A blocked WAIT holds the cycle in DISPATCHING; the socket is not read
//! meanwhile, so a client hanging up does not end the wait.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - A panic raised while dispatching is caught and reported as `Fatal:`
//! - The socket is released on every exit path when the handler drops

use std::any::Any;
use std::future::Future;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::{FutureExt, SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::codec::Framed;
use tracing::{debug, error, info, warn};

use condsync_protocol::{is_quit, Command, FrameError, Request, Response, ServerCodec};

use crate::registry::SolutionRegistry;

/// Write timeout for a single response line.
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection handler for a single client.
pub struct ConnectionHandler {
    framed: Framed<TcpStream, ServerCodec>,
    peer: SocketAddr,
    registry: Arc<SolutionRegistry>,
    connection_number: u64,
}

impl ConnectionHandler {
    /// Creates a new connection handler.
    ///
    /// # Arguments
    ///
    /// * `stream` - Accepted TCP stream
    /// * `peer` - Remote address, for logging
    /// * `registry` - Registry shared by all handlers of one server
    /// * `connection_number` - Unique number for this connection
    pub fn new(
        stream: TcpStream,
        peer: SocketAddr,
        registry: Arc<SolutionRegistry>,
        connection_number: u64,
    ) -> Self {
        Self {
            framed: Framed::new(stream, ServerCodec::new()),
            peer,
            registry,
            connection_number,
        }
    }

    /// Runs the connection until the client quits, hangs up, or a
    /// terminal error occurs.
    pub async fn run(self) {
        self.serve(|registry: Arc<SolutionRegistry>, request| async move {
            execute(&registry, request).await
        })
        .await;
    }

    /// Connection lifecycle with `dispatch` answering each parsed request.
    async fn serve<F, Fut>(mut self, dispatch: F)
    where
        F: Fn(Arc<SolutionRegistry>, Request) -> Fut,
        Fut: Future<Output = Response>,
    {
        info!(
            connection = self.connection_number,
            peer = %self.peer,
            "Client connected"
        );

        if let Err(e) = self.process_messages(&dispatch).await {
            debug!(
                connection = self.connection_number,
                error = %e,
                "Connection ended with error"
            );
        }

        // Flush and shut down the write half; the stream closes on drop.
        if let Err(e) = SinkExt::<Response>::close(&mut self.framed).await {
            debug!(connection = self.connection_number, error = %e, "Close failed");
        }

        info!(
            connection = self.connection_number,
            peer = %self.peer,
            "Client disconnected"
        );
    }

    /// Main request/response loop.
    async fn process_messages<F, Fut>(&mut self, dispatch: &F) -> Result<(), ConnectionError>
    where
        F: Fn(Arc<SolutionRegistry>, Request) -> Fut,
        Fut: Future<Output = Response>,
    {
        loop {
            let body = match self.framed.next().await {
                Some(Ok(body)) => body,
                Some(Err(e)) => return Err(e.into()),
                None => {
                    debug!(connection = self.connection_number, "Client sent EOF");
                    return Ok(());
                }
            };

            if is_quit(&body) {
                debug!(connection = self.connection_number, "Client requested quit");
                return Ok(());
            }

            let request = match Request::parse(&body) {
                Ok(request) => request,
                Err(e) => {
                    warn!(
                        connection = self.connection_number,
                        error = %e,
                        "Rejected malformed request"
                    );
                    self.send(Response::error(&e)).await?;
                    continue;
                }
            };

            debug!(
                connection = self.connection_number,
                operation = %request.operation(),
                solution = %request.solution(),
                condition = ?request.condition(),
                "Received request"
            );

            let dispatched = AssertUnwindSafe(dispatch(Arc::clone(&self.registry), request))
                .catch_unwind()
                .await;

            match dispatched {
                Ok(response) => self.send(response).await?,
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    error!(
                        connection = self.connection_number,
                        error = %message,
                        "Dispatch failed, closing connection"
                    );
                    // Best effort: the connection closes either way.
                    let _ = self.send(Response::fatal(&message)).await;
                    return Err(ConnectionError::Dispatch(message));
                }
            }
        }
    }

    /// Writes one response line.
    async fn send(&mut self, response: Response) -> Result<(), ConnectionError> {
        match timeout(WRITE_TIMEOUT, self.framed.send(response)).await {
            Ok(result) => result.map_err(ConnectionError::from),
            Err(_) => Err(ConnectionError::WriteTimeout),
        }
    }
}

/// Runs one request against the registry and builds its response.
pub async fn execute(registry: &SolutionRegistry, request: Request) -> Response {
    let solution = registry.get_or_create(request.solution()).await;

    match request.command() {
        Command::Init { condition } => Response::Init {
            condition: condition.clone(),
            state: solution.get_condition_state(condition).await,
        },
        Command::Get { condition } => Response::Get {
            state: solution.get_condition_state(condition).await,
        },
        Command::Set { condition, value } => Response::set(
            condition.clone(),
            solution.set_condition_state(condition, *value).await,
        ),
        Command::Wait {
            condition,
            value,
            timeout,
        } => Response::waited(
            condition.clone(),
            *value,
            solution.wait_for_cond(condition, *value, *timeout).await,
        ),
        Command::Delete { condition } => {
            solution.delete_condition(condition).await;
            Response::Deleted {
                condition: condition.clone(),
            }
        }
        Command::Reset => {
            solution.reset().await;
            Response::Reset {
                solution: solution.name().to_string(),
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unexpected error while dispatching request".to_string()
    }
}

/// Errors that end a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("Framing error: {0}")]
    Frame(#[from] FrameError),

    #[error("Write timeout")]
    WriteTimeout,

    #[error("Dispatch failed: {0}")]
    Dispatch(String),
}
