//! Line Protocol Data Types
//!
//! Requests and responses are single lines of text terminated by `\n`.
//!
//! ## Request Format
//!
//! A verb followed by whitespace-separated arguments:
//!
//! ```text
//! SET name linekv EX 60
//! GET name
//! ```
//!
//! ## Response Format
//!
//! Exactly one line per request:
//!
//! | Response          | Wire text           |
//! |-------------------|---------------------|
//! | success           | `OK`                |
//! | ping              | `PONG`              |
//! | stored value      | the value, verbatim |
//! | integer           | `42`                |
//! | boolean           | `YES` / `NO`        |
//! | missing key       | `KEY NOT FOUND`     |
//! | error             | e.g. `NON-INTEGER VALUE` |

use std::fmt;

/// The line terminator used for responses
pub const LF: u8 = b'\n';

/// Wire text for a missing key
pub const KEY_NOT_FOUND: &str = "KEY NOT FOUND";

/// A parsed request line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// The command name, upper-cased
    pub verb: String,
    /// Arguments in the order they were sent
    pub args: Vec<String>,
}

impl Command {
    /// Creates a command, upper-casing the verb.
    pub fn new(verb: &str, args: Vec<String>) -> Self {
        Self {
            verb: verb.to_ascii_uppercase(),
            args,
        }
    }
}

/// The result of executing one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Generic success
    Ok,
    /// Reply to PING
    Pong,
    /// A stored value. May be empty, which is distinct from `NotFound`.
    Value(String),
    /// An integer result (INCR/DECR)
    Integer(i64),
    /// A yes/no answer (EXISTS/DELETE)
    Bool(bool),
    /// The key does not exist
    NotFound,
    /// A short upper-case diagnostic
    Error(String),
}

impl Response {
    /// Creates an error response from anything printable.
    ///
    /// # Example
    /// ```
    /// use linekv::protocol::Response;
    /// let err = Response::error("UNKNOWN COMMAND");
    /// assert_eq!(err.serialize(), b"UNKNOWN COMMAND\n");
    /// ```
    pub fn error(e: impl fmt::Display) -> Self {
        Response::Error(e.to_string())
    }

    /// Serializes the response to bytes for sending over the wire.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.serialize_into(&mut buf);
        buf
    }

    /// Serializes the response into an existing buffer.
    pub fn serialize_into(&self, buf: &mut Vec<u8>) {
        match self {
            Response::Ok => buf.extend_from_slice(b"OK"),
            Response::Pong => buf.extend_from_slice(b"PONG"),
            Response::Value(s) | Response::Error(s) => buf.extend_from_slice(s.as_bytes()),
            Response::Integer(n) => buf.extend_from_slice(n.to_string().as_bytes()),
            Response::Bool(true) => buf.extend_from_slice(b"YES"),
            Response::Bool(false) => buf.extend_from_slice(b"NO"),
            Response::NotFound => buf.extend_from_slice(KEY_NOT_FOUND.as_bytes()),
        }
        buf.push(LF);
    }

    /// Returns true if this response is an error.
    pub fn is_error(&self) -> bool {
        matches!(self, Response::Error(_))
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Response::Ok => write!(f, "OK"),
            Response::Pong => write!(f, "PONG"),
            Response::Value(s) => write!(f, "\"{}\"", s),
            Response::Integer(n) => write!(f, "(integer) {}", n),
            Response::Bool(b) => write!(f, "{}", if *b { "YES" } else { "NO" }),
            Response::NotFound => write!(f, "(nil)"),
            Response::Error(s) => write!(f, "(error) {}", s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serialize() {
        assert_eq!(Response::Ok.serialize(), b"OK\n");
        assert_eq!(Response::Pong.serialize(), b"PONG\n");
    }

    #[test]
    fn test_value_serialize() {
        let value = Response::Value("hello".to_string());
        assert_eq!(value.serialize(), b"hello\n");
    }

    #[test]
    fn test_empty_value_differs_from_not_found() {
        assert_eq!(Response::Value(String::new()).serialize(), b"\n");
        assert_eq!(Response::NotFound.serialize(), b"KEY NOT FOUND\n");
    }

    #[test]
    fn test_integer_serialize() {
        assert_eq!(Response::Integer(1000).serialize(), b"1000\n");
        assert_eq!(Response::Integer(-1).serialize(), b"-1\n");
    }

    #[test]
    fn test_bool_serialize() {
        assert_eq!(Response::Bool(true).serialize(), b"YES\n");
        assert_eq!(Response::Bool(false).serialize(), b"NO\n");
    }

    #[test]
    fn test_error_serialize() {
        let value = Response::error("NON-INTEGER VALUE");
        assert!(value.is_error());
        assert_eq!(value.serialize(), b"NON-INTEGER VALUE\n");
    }

    #[test]
    fn test_serialize_into_appends() {
        let mut buf = Vec::new();
        Response::Ok.serialize_into(&mut buf);
        Response::Bool(false).serialize_into(&mut buf);
        assert_eq!(buf, b"OK\nNO\n");
    }

    #[test]
    fn test_command_new_uppercases_verb() {
        let cmd = Command::new("get", vec!["Key".to_string()]);
        assert_eq!(cmd.verb, "GET");
        assert_eq!(cmd.args, vec!["Key".to_string()]);
    }
}
