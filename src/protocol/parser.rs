//! Command Line Parser
//!
//! Turns one request line into a [`Command`]. The connection layer does the
//! framing (splitting the byte stream on `\n`); this module only sees a single
//! line at a time.
//!
//! ## Rules
//!
//! 1. Leading and trailing ASCII whitespace is ignored, so `\r\n` line endings
//!    from telnet-style clients work.
//! 2. Tokens are separated by runs of whitespace.
//! 3. The first token is the verb and is matched case-insensitively.
//! 4. Arguments are kept exactly as sent.

use crate::protocol::types::Command;
use thiserror::Error;

/// Errors that can occur while parsing a request line.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The line contains nothing but whitespace
    #[error("empty input")]
    EmptyInput,

    /// The line is not valid UTF-8
    #[error("invalid UTF-8: {0}")]
    InvalidUtf8(String),
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Parses a single request line.
///
/// # Example
///
/// ```
/// use linekv::protocol::parse_line;
///
/// let cmd = parse_line(b"set name  linekv\r\n").unwrap();
/// assert_eq!(cmd.verb, "SET");
/// assert_eq!(cmd.args, vec!["name", "linekv"]);
/// ```
pub fn parse_line(line: &[u8]) -> ParseResult<Command> {
    let text = std::str::from_utf8(line).map_err(|e| ParseError::InvalidUtf8(e.to_string()))?;

    let mut tokens = text.split_whitespace();
    let verb = tokens.next().ok_or(ParseError::EmptyInput)?;
    let args = tokens.map(str::to_string).collect();

    Ok(Command::new(verb, args))
}

/// Returns true if the line has no tokens.
pub fn is_blank(line: &[u8]) -> bool {
    line.iter().all(u8::is_ascii_whitespace)
}
