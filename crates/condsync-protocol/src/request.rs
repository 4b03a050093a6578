//! Parsed client requests.
//!
//! A request body is whitespace-separated tokens:
//!
//! ```text
//! <opcode> <solution> [<condition>] [<value>] [<timeout-ms>]
//! ```
//!
//! On the wire the opcode is always numeric. The English verbs are only
//! understood by [`Operation::from_str`] for local tooling.

use std::fmt;
use std::str::FromStr;

use condsync_core::WaitTimeout;
use thiserror::Error;

/// Operation codes understood by the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Init = 1,
    Set = 2,
    Wait = 3,
    Reset = 4,
    Delete = 5,
    Get = 6,
}

impl Operation {
    /// Maps a numeric opcode to an operation.
    pub fn from_opcode(code: i64) -> Option<Self> {
        match code {
            1 => Some(Self::Init),
            2 => Some(Self::Set),
            3 => Some(Self::Wait),
            4 => Some(Self::Reset),
            5 => Some(Self::Delete),
            6 => Some(Self::Get),
            _ => None,
        }
    }

    /// Numeric opcode sent on the wire.
    pub fn opcode(self) -> u8 {
        self as u8
    }

    /// Lowercase English verb.
    pub fn verb(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Set => "set",
            Self::Wait => "wait",
            Self::Reset => "reset",
            Self::Delete => "delete",
            Self::Get => "get",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.verb())
    }
}

impl FromStr for Operation {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "init" => Ok(Self::Init),
            "set" => Ok(Self::Set),
            "wait" => Ok(Self::Wait),
            "reset" => Ok(Self::Reset),
            "delete" => Ok(Self::Delete),
            "get" => Ok(Self::Get),
            _ => Err(RequestError::UnknownVerb(s.to_string())),
        }
    }
}

/// What a request asks the target solution to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Init { condition: String },
    Set { condition: String, value: i64 },
    Wait { condition: String, value: i64, timeout: WaitTimeout },
    Delete { condition: String },
    Reset,
    Get { condition: String },
}

/// One immutable client operation against a solution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    solution: String,
    command: Command,
}

impl Request {
    /// Parses a request body received from a client.
    ///
    /// Tokens past the ones an operation needs are ignored.
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        let mut tokens = input.split_whitespace();

        let operation = tokens
            .next()
            .and_then(|token| token.parse::<i64>().ok())
            .and_then(Operation::from_opcode)
            .ok_or_else(|| ParseError::InvalidOpcode {
                input: input.to_string(),
            })?;

        let solution = required(tokens.next(), "solution name", input)?.to_string();

        let command = match operation {
            Operation::Reset => Command::Reset,
            Operation::Init | Operation::Get | Operation::Delete => {
                let condition = required(tokens.next(), "condition name", input)?.to_string();
                match operation {
                    Operation::Init => Command::Init { condition },
                    Operation::Get => Command::Get { condition },
                    _ => Command::Delete { condition },
                }
            }
            Operation::Set => {
                let condition = required(tokens.next(), "condition name", input)?.to_string();
                let value = number::<i64>(tokens.next(), "value", input)?;
                Command::Set { condition, value }
            }
            Operation::Wait => {
                let condition = required(tokens.next(), "condition name", input)?.to_string();
                let value = number::<i64>(tokens.next(), "value", input)?;
                let millis = number::<u64>(tokens.next(), "timeout", input)?;
                Command::Wait {
                    condition,
                    value,
                    timeout: WaitTimeout::from_millis(millis),
                }
            }
        };

        Ok(Self { solution, command })
    }

    /// Builds an INIT request.
    pub fn init(solution: &str, condition: &str) -> Result<Self, RequestError> {
        Self::build(
            solution,
            Command::Init {
                condition: validated("condition", condition)?,
            },
        )
    }

    /// Builds a SET request.
    pub fn set(solution: &str, condition: &str, value: i64) -> Result<Self, RequestError> {
        Self::build(
            solution,
            Command::Set {
                condition: validated("condition", condition)?,
                value,
            },
        )
    }

    /// Builds a WAIT request.
    pub fn wait(
        solution: &str,
        condition: &str,
        value: i64,
        timeout: WaitTimeout,
    ) -> Result<Self, RequestError> {
        Self::build(
            solution,
            Command::Wait {
                condition: validated("condition", condition)?,
                value,
                timeout,
            },
        )
    }

    /// Builds a DELETE request.
    pub fn delete(solution: &str, condition: &str) -> Result<Self, RequestError> {
        Self::build(
            solution,
            Command::Delete {
                condition: validated("condition", condition)?,
            },
        )
    }

    /// Builds a RESET request.
    pub fn reset(solution: &str) -> Result<Self, RequestError> {
        Self::build(solution, Command::Reset)
    }

    /// Builds a GET request.
    pub fn get(solution: &str, condition: &str) -> Result<Self, RequestError> {
        Self::build(
            solution,
            Command::Get {
                condition: validated("condition", condition)?,
            },
        )
    }

    fn build(solution: &str, command: Command) -> Result<Self, RequestError> {
        Ok(Self {
            solution: validated("solution", solution)?,
            command,
        })
    }

    pub fn operation(&self) -> Operation {
        match self.command {
            Command::Init { .. } => Operation::Init,
            Command::Set { .. } => Operation::Set,
            Command::Wait { .. } => Operation::Wait,
            Command::Delete { .. } => Operation::Delete,
            Command::Reset => Operation::Reset,
            Command::Get { .. } => Operation::Get,
        }
    }

    pub fn solution(&self) -> &str {
        &self.solution
    }

    pub fn command(&self) -> &Command {
        &self.command
    }

    /// Condition name; `None` only for RESET.
    pub fn condition(&self) -> Option<&str> {
        match &self.command {
            Command::Init { condition }
            | Command::Set { condition, .. }
            | Command::Wait { condition, .. }
            | Command::Delete { condition }
            | Command::Get { condition } => Some(condition),
            Command::Reset => None,
        }
    }
}

/// Formats the request body exactly as it is sent on the wire.
impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.operation().opcode(), self.solution)?;
        match &self.command {
            Command::Init { condition }
            | Command::Delete { condition }
            | Command::Get { condition } => write!(f, " {condition}"),
            Command::Set { condition, value } => write!(f, " {condition} {value}"),
            Command::Wait {
                condition,
                value,
                timeout,
            } => write!(f, " {condition} {value} {}", timeout.as_millis()),
            Command::Reset => Ok(()),
        }
    }
}

fn required<'a>(
    token: Option<&'a str>,
    field: &'static str,
    input: &str,
) -> Result<&'a str, ParseError> {
    token.ok_or_else(|| ParseError::MissingField {
        field,
        input: input.to_string(),
    })
}

fn number<T: FromStr>(
    token: Option<&str>,
    field: &'static str,
    input: &str,
) -> Result<T, ParseError> {
    required(token, field, input)?
        .parse::<T>()
        .map_err(|_| ParseError::InvalidNumber {
            field,
            input: input.to_string(),
        })
}

fn validated(field: &'static str, name: &str) -> Result<String, RequestError> {
    if name.is_empty() || name.chars().any(char::is_whitespace) {
        return Err(RequestError::InvalidName {
            field,
            name: name.to_string(),
        });
    }
    Ok(name.to_string())
}

/// Failure to parse a request body.
///
/// The display form is the message followed by the offending input, as
/// written after `Error: ` on the response line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Invalid opcode in request: {input}")]
    InvalidOpcode { input: String },

    #[error("Missing {field} in request: {input}")]
    MissingField { field: &'static str, input: String },

    #[error("Invalid {field} in request: {input}")]
    InvalidNumber { field: &'static str, input: String },
}

impl ParseError {
    /// The request body that failed to parse.
    pub fn input(&self) -> &str {
        match self {
            Self::InvalidOpcode { input }
            | Self::MissingField { input, .. }
            | Self::InvalidNumber { input, .. } => input,
        }
    }
}

/// Failure to build a request locally.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("Unknown operation '{0}' (expected init, set, wait, delete, reset or get)")]
    UnknownVerb(String),

    #[error("Invalid {field} name '{name}': must be non-empty and contain no whitespace")]
    InvalidName { field: &'static str, name: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_parse_set() {
        let req = Request::parse("2 A cond 5").unwrap();
        assert_eq!(req.operation(), Operation::Set);
        assert_eq!(req.solution(), "A");
        assert_eq!(
            req.command(),
            &Command::Set {
                condition: "cond".to_string(),
                value: 5
            }
        );
    }

    #[test]
    fn test_parse_wait_with_timeout() {
        let req = Request::parse("3 A cond 9 2000").unwrap();
        assert_eq!(
            req.command(),
            &Command::Wait {
                condition: "cond".to_string(),
                value: 9,
                timeout: WaitTimeout::Bounded(Duration::from_millis(2000)),
            }
        );
    }

    #[test]
    fn test_parse_wait_zero_timeout_is_unbounded() {
        let req = Request::parse("3 A cond 9 0").unwrap();
        assert!(matches!(
            req.command(),
            Command::Wait {
                timeout: WaitTimeout::Unbounded,
                ..
            }
        ));
    }

    #[test]
    fn test_parse_reset_has_no_condition() {
        let req = Request::parse("4 suite").unwrap();
        assert_eq!(req.operation(), Operation::Reset);
        assert_eq!(req.condition(), None);
    }

    #[test]
    fn test_parse_tolerates_whitespace_runs() {
        let req = Request::parse("  6\tA   cond \n").unwrap();
        assert_eq!(req.operation(), Operation::Get);
        assert_eq!(req.condition(), Some("cond"));
    }

    #[test]
    fn test_parse_ignores_extra_tokens() {
        let req = Request::parse("5 A cond 1 2 3").unwrap();
        assert_eq!(
            req.command(),
            &Command::Delete {
                condition: "cond".to_string()
            }
        );
    }

    #[test]
    fn test_parse_rejects_unknown_opcode() {
        let err = Request::parse("9 A cond").unwrap_err();
        assert_eq!(
            err,
            ParseError::InvalidOpcode {
                input: "9 A cond".to_string()
            }
        );
        assert_eq!(err.to_string(), "Invalid opcode in request: 9 A cond");
    }

    #[test]
    fn test_parse_rejects_verb_on_wire() {
        assert!(matches!(
            Request::parse("set A cond 1"),
            Err(ParseError::InvalidOpcode { .. })
        ));
    }

    #[test]
    fn test_parse_missing_fields() {
        assert!(matches!(
            Request::parse(""),
            Err(ParseError::InvalidOpcode { .. })
        ));
        assert!(matches!(
            Request::parse("6"),
            Err(ParseError::MissingField { field: "solution name", .. })
        ));
        assert!(matches!(
            Request::parse("1 A"),
            Err(ParseError::MissingField { field: "condition name", .. })
        ));
        assert!(matches!(
            Request::parse("2 A cond"),
            Err(ParseError::MissingField { field: "value", .. })
        ));
        assert!(matches!(
            Request::parse("3 A cond 4"),
            Err(ParseError::MissingField { field: "timeout", .. })
        ));
    }

    #[test]
    fn test_parse_invalid_numbers() {
        let err = Request::parse("2 A cond five").unwrap_err();
        assert_eq!(err.to_string(), "Invalid value in request: 2 A cond five");
        assert_eq!(err.input(), "2 A cond five");

        assert!(matches!(
            Request::parse("3 A cond 1 -5"),
            Err(ParseError::InvalidNumber { field: "timeout", .. })
        ));
    }

    #[test]
    fn test_display_matches_wire_format() {
        let req = Request::wait("A", "cond", 9, WaitTimeout::from_millis(2000)).unwrap();
        assert_eq!(req.to_string(), "3 A cond 9 2000");
        assert_eq!(Request::reset("A").unwrap().to_string(), "4 A");
        assert_eq!(Request::get("A", "c").unwrap().to_string(), "6 A c");
        assert_eq!(Request::set("A", "c", -1).unwrap().to_string(), "2 A c -1");
    }

    #[test]
    fn test_builders_reject_bad_names() {
        assert!(matches!(
            Request::init("", "cond"),
            Err(RequestError::InvalidName { field: "solution", .. })
        ));
        assert!(matches!(
            Request::set("A", "two words", 1),
            Err(RequestError::InvalidName { field: "condition", .. })
        ));
    }

    #[test]
    fn test_operation_from_verb() {
        assert_eq!("WAIT".parse::<Operation>().unwrap(), Operation::Wait);
        assert_eq!("delete".parse::<Operation>().unwrap(), Operation::Delete);
        assert!("remove".parse::<Operation>().is_err());
    }

    #[test]
    fn test_opcodes() {
        for code in 1..=6 {
            let op = Operation::from_opcode(code).unwrap();
            assert_eq!(i64::from(op.opcode()), code);
        }
        assert_eq!(Operation::from_opcode(0), None);
        assert_eq!(Operation::from_opcode(7), None);
    }
}
