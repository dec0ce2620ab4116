//! Line Protocol Implementation
//!
//! Clients send one command per line and get one response line back.
//!
//! ## Modules
//!
//! - `types`: `Command` and `Response`, plus response encoding
//! - `parser`: turns a raw line into a `Command`
//!
//! ## Example
//!
//! ```
//! use linekv::protocol::{parse_line, Response};
//!
//! let cmd = parse_line(b"exists name").unwrap();
//! assert_eq!(cmd.verb, "EXISTS");
//!
//! assert_eq!(Response::Bool(true).serialize(), b"YES\n");
//! ```

pub mod parser;
pub mod types;

// Re-export commonly used types for convenience
pub use parser::{is_blank, parse_line, ParseError, ParseResult};
pub use types::{Command, Response};
