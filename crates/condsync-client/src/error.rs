//! Error types for the condsync client.
//!
//! **Panic-Free Policy:** This module follows the project's panic-free guidelines.
//! No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, or `todo!()`.

use condsync_protocol::{FrameError, MalformedResponse, RequestError};
use thiserror::Error;

// ============================================================================
// Client Error Type
// ============================================================================

/// Errors returned by [`SyncClient`](crate::SyncClient).
#[derive(Error, Debug)]
pub enum ClientError {
    /// Every connection attempt failed.
    ///
    /// Usually the daemon is not running or listens elsewhere.
    #[error("Failed to connect to {address} after {attempts} attempt(s): {error}")]
    Connect {
        address: String,
        attempts: u32,
        error: String,
    },

    /// The request could not be built (bad name or verb).
    #[error("Invalid request: {0}")]
    Request(#[from] RequestError),

    /// Framing or socket failure.
    #[error("Connection error: {0}")]
    Frame(#[from] FrameError),

    /// The daemon closed the connection before answering.
    #[error("Connection closed by daemon")]
    Closed,

    /// The daemon sent a line this client does not understand.
    #[error(transparent)]
    Malformed(#[from] MalformedResponse),

    /// The daemon answered with an `Error:` line.
    #[error("Daemon rejected request: {0}")]
    Rejected(String),

    /// The daemon answered with a `Fatal:` line and closed the connection.
    #[error("Daemon closed connection: {0}")]
    Fatal(String),

    /// The daemon answered with a response of the wrong kind.
    #[error("Unexpected response to {operation}: {line}")]
    Unexpected {
        operation: &'static str,
        line: String,
    },
}

// ============================================================================
// Result Type Alias
// ============================================================================

/// Convenience Result type alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_error_display() {
        let error = ClientError::Connect {
            address: "127.0.0.1:9999".to_string(),
            attempts: 3,
            error: "connection refused".to_string(),
        };
        let display = format!("{error}");
        assert!(display.contains("127.0.0.1:9999"));
        assert!(display.contains("3 attempt(s)"));
        assert!(display.contains("connection refused"));
    }

    #[test]
    fn test_rejected_error_display() {
        let error = ClientError::Rejected("Invalid opcode in request: 9 A cond".to_string());
        assert_eq!(
            error.to_string(),
            "Daemon rejected request: Invalid opcode in request: 9 A cond"
        );
    }

    #[test]
    fn test_malformed_is_transparent() {
        let error: ClientError = MalformedResponse("Hello".to_string()).into();
        assert!(matches!(error, ClientError::Malformed(_)));
        assert!(error.to_string().contains("Malformed response line"));
    }

    #[test]
    fn test_request_error_from_conversion() {
        let error: ClientError = RequestError::UnknownVerb("frob".to_string()).into();
        assert!(matches!(error, ClientError::Request(_)));
    }
}
