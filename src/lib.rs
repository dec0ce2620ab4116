//! # linekv - A Small In-Memory Key-Value Store
//!
//! linekv keeps string keys and values in memory and serves them over a
//! plain-text TCP protocol: one command per line, one response per line.
//!
//! ## Features
//!
//! - **Line Protocol**: `SET name linekv`, `GET name`, readable in telnet/nc
//! - **Atomic Counters**: `INCR`/`DECR` never lose updates under contention
//! - **TTL Support**: `SET key value EX seconds` / `PX milliseconds`
//! - **Snapshots**: `SAVE` writes a JSON file that is reloaded on startup
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              linekv                                     │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │ TCP Server  │───>│ Connection  │───>│  Command    │                  │
//! │  │ (Listener)  │    │  Handler    │    │  Handler    │                  │
//! │  └─────────────┘    └─────────────┘    └──────┬──────┘                  │
//! │                                               │                         │
//! │                          ┌────────────────────┼──────────────┐          │
//! │                          ▼                    ▼              ▼          │
//! │                 ┌────────────────┐  ┌────────────────┐ ┌────────────┐   │
//! │                 │ExpiryScheduler │─>│ StorageEngine  │<│Snapshotter │   │
//! │                 │ (Tokio task)   │  │ RwLock<HashMap>│ │ (JSON file)│   │
//! │                 └────────────────┘  └────────────────┘ └────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use linekv::commands::CommandHandler;
//! use linekv::connection::{handle_connection, ConnectionStats};
//! use linekv::storage::{ExpiryScheduler, Snapshotter, StorageEngine};
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() {
//!     let storage = Arc::new(StorageEngine::new());
//!     let snapshotter = Arc::new(Snapshotter::new("data.json"));
//!     storage.restore(snapshotter.load());
//!
//!     let expiry = Arc::new(ExpiryScheduler::start(Arc::clone(&storage)));
//!     let handler = CommandHandler::new(storage, expiry, snapshotter);
//!     let stats = Arc::new(ConnectionStats::new());
//!
//!     let listener = TcpListener::bind("127.0.0.1:6379").await.unwrap();
//!     loop {
//!         let (stream, addr) = listener.accept().await.unwrap();
//!         tokio::spawn(handle_connection(stream, addr, handler.clone(), Arc::clone(&stats)));
//!     }
//! }
//! ```
//!
//! ## Supported Commands
//!
//! - `PING`
//! - `SAVE`
//! - `GET key`
//! - `SET key value [EX seconds | PX milliseconds]`
//! - `DELETE key`
//! - `EXISTS key`
//! - `INCR key` / `DECR key`
//!
//! ## Module Overview
//!
//! - [`protocol`]: line parser and response encoding
//! - [`storage`]: storage engine, expiry scheduler, snapshots
//! - [`commands`]: command validation and dispatch
//! - [`connection`]: client connection management

pub mod commands;
pub mod connection;
pub mod protocol;
pub mod storage;

// Re-export commonly used types for convenience
pub use commands::{CommandError, CommandHandler};
pub use connection::{handle_connection, ConnectionStats};
pub use protocol::{parse_line, Command, ParseError, Response};
pub use storage::{ExpiryScheduler, Snapshotter, StorageEngine};

/// The default port linekv listens on
pub const DEFAULT_PORT: u16 = 6379;

/// The default host linekv binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// The default snapshot file
pub const DEFAULT_SNAPSHOT_PATH: &str = "data.json";

/// Version of linekv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
