//! condsync protocol - wire format for daemon communication
//!
//! This crate provides the request parser, response formatting and the
//! frame codecs shared by the daemon and its clients.

pub mod codec;
pub mod request;
pub mod response;

pub use codec::{encode_frame, ClientCodec, FrameError, ServerCodec, MAX_FRAME_CHARS};
pub use request::{Command, Operation, ParseError, Request, RequestError};
pub use response::{MalformedResponse, Response};

/// Bodies that close the connection without a response.
pub const QUIT_COMMANDS: [&str; 2] = ["quit", "q"];

/// Returns true if `body` asks the daemon to close the connection.
pub fn is_quit(body: &str) -> bool {
    QUIT_COMMANDS.contains(&body)
}
