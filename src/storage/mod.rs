//! Storage Module
//!
//! This module holds everything that touches stored data: the key-value
//! engine, the expiry scheduler that removes keys once their TTL elapses,
//! and the snapshotter that persists the engine to disk.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────┐      ┌──────────────────────┐
//! │   ExpiryScheduler    │─────>│    StorageEngine     │<──── Snapshotter
//! │ (Background Task)    │      │  RwLock<HashMap>     │      (SAVE, startup,
//! └──────────────────────┘      └──────────────────────┘       shutdown)
//! ```
//!
//! ## Example
//!
//! ```
//! use linekv::storage::StorageEngine;
//! use std::time::Duration;
//!
//! let engine = StorageEngine::new();
//!
//! engine.set("name".to_string(), "linekv".to_string(), None);
//! assert_eq!(engine.get("name"), Some("linekv".to_string()));
//!
//! // A TTL write returns the registration the scheduler needs
//! let reg = engine.set("session".to_string(), "token".to_string(), Some(Duration::from_secs(3600)));
//! assert!(reg.is_some());
//! ```

pub mod engine;
pub mod expiry;
pub mod snapshot;

// Re-export commonly used types
pub use engine::{Entry, StorageEngine, StorageError, StorageStats};
pub use expiry::{ExpiryRegistration, ExpiryScheduler};
pub use snapshot::{SnapshotError, Snapshotter};
