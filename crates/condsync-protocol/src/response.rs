//! Response lines sent by the daemon.
//!
//! Every request except `quit`/`q` gets exactly one newline-terminated
//! line. Clients tell success from failure by the line prefix.

use std::fmt;
use std::str::FromStr;

use condsync_core::{SetOutcome, WaitOutcome};
use serde::Serialize;
use thiserror::Error;

/// Prefix added to every fatal message.
const FATAL_PREFIX: &str = "Closing Connection ";

/// One response line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// `Init: <cond> = <state>`
    Init { condition: String, state: i64 },

    /// `Set: <cond> = <state>`
    Set { condition: String, state: i64 },

    /// `Waited: <code> :: <cond> = <target>`
    Waited {
        code: i64,
        condition: String,
        target: i64,
    },

    /// `Deleted: <cond>`
    Deleted { condition: String },

    /// `Reset: <solution>`
    Reset { solution: String },

    /// `Get: <state>`
    Get { state: i64 },

    /// `Error: <message><offending input>`; the connection stays open.
    Error { message: String },

    /// `Fatal: Closing Connection <message>`; the connection closes.
    Fatal { message: String },
}

impl Response {
    pub fn set(condition: impl Into<String>, outcome: SetOutcome) -> Self {
        Self::Set {
            condition: condition.into(),
            state: outcome.state(),
        }
    }

    pub fn waited(condition: impl Into<String>, target: i64, outcome: WaitOutcome) -> Self {
        Self::Waited {
            code: outcome.code(),
            condition: condition.into(),
            target,
        }
    }

    pub fn error(message: impl fmt::Display) -> Self {
        Self::Error {
            message: message.to_string(),
        }
    }

    pub fn fatal(message: impl fmt::Display) -> Self {
        Self::Fatal {
            message: message.to_string(),
        }
    }

    /// Returns true for `Error:` and `Fatal:` lines.
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Error { .. } | Self::Fatal { .. })
    }

    /// Decoded wait outcome for `Waited:` lines.
    pub fn wait_outcome(&self) -> Option<WaitOutcome> {
        match self {
            Self::Waited { code, .. } => WaitOutcome::from_code(*code),
            _ => None,
        }
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init { condition, state } => write!(f, "Init: {condition} = {state}"),
            Self::Set { condition, state } => write!(f, "Set: {condition} = {state}"),
            Self::Waited {
                code,
                condition,
                target,
            } => write!(f, "Waited: {code} :: {condition} = {target}"),
            Self::Deleted { condition } => write!(f, "Deleted: {condition}"),
            Self::Reset { solution } => write!(f, "Reset: {solution}"),
            Self::Get { state } => write!(f, "Get: {state}"),
            Self::Error { message } => write!(f, "Error: {message}"),
            Self::Fatal { message } => write!(f, "Fatal: {FATAL_PREFIX}{message}"),
        }
    }
}

impl FromStr for Response {
    type Err = MalformedResponse;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let malformed = || MalformedResponse(line.to_string());
        let line = line.trim_end_matches(['\r', '\n']);
        let (kind, rest) = line.split_once(": ").ok_or_else(malformed)?;

        let assignment = |text: &str| -> Result<(String, i64), MalformedResponse> {
            let (name, value) = text.rsplit_once(" = ").ok_or_else(malformed)?;
            let value = value.parse::<i64>().map_err(|_| malformed())?;
            Ok((name.to_string(), value))
        };

        match kind {
            "Init" => {
                let (condition, state) = assignment(rest)?;
                Ok(Self::Init { condition, state })
            }
            "Set" => {
                let (condition, state) = assignment(rest)?;
                Ok(Self::Set { condition, state })
            }
            "Waited" => {
                let (code, rest) = rest.split_once(" :: ").ok_or_else(malformed)?;
                let code = code.parse::<i64>().map_err(|_| malformed())?;
                let (condition, target) = assignment(rest)?;
                Ok(Self::Waited {
                    code,
                    condition,
                    target,
                })
            }
            "Deleted" => Ok(Self::Deleted {
                condition: rest.to_string(),
            }),
            "Reset" => Ok(Self::Reset {
                solution: rest.to_string(),
            }),
            "Get" => Ok(Self::Get {
                state: rest.parse::<i64>().map_err(|_| malformed())?,
            }),
            "Error" => Ok(Self::Error {
                message: rest.to_string(),
            }),
            "Fatal" => Ok(Self::Fatal {
                message: rest.strip_prefix(FATAL_PREFIX).unwrap_or(rest).to_string(),
            }),
            _ => Err(malformed()),
        }
    }
}

/// A line that is not a recognised response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Malformed response line: {0:?}")]
pub struct MalformedResponse(pub String);
