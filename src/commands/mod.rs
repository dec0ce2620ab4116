//! Command Handler Module
//!
//! This module implements the command processing layer for linekv.
//! It receives parsed commands, executes them against the storage layer,
//! and returns the response to encode.
//!
//! ## Architecture
//!
//! ```text
//! Client Request
//!       │
//!       ▼
//! ┌─────────────────┐
//! │  Line Parser    │  (protocol module)
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ CommandHandler  │  (this module)
//! │                 │
//! │  - Validate     │
//! │  - Dispatch     │
//! │  - Execute      │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ StorageEngine   │  (storage module)
//! └─────────────────┘
//! ```
//!
//! ## Supported Commands
//!
//! `PING`, `SAVE`, `GET`, `SET`, `DELETE`, `EXISTS`, `INCR`, `DECR`

pub mod handler;

pub use handler::{CommandError, CommandHandler};
