//! Command Handler Module
//!
//! Validates each command's arguments and runs it against the storage
//! engine, the expiry scheduler, or the snapshotter.
//!
//! ## Supported Commands
//!
//! - `PING` - Test connection
//! - `SAVE` - Write a snapshot to disk
//! - `GET key` - Get a key's value
//! - `SET key value [EX seconds | PX milliseconds]` - Set a key
//! - `DELETE key` - Delete a key
//! - `EXISTS key` - Check if a key exists
//! - `INCR key` - Increment integer
//! - `DECR key` - Decrement integer
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     CommandHandler                          │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐      │
//! │  │  execute()  │───>│  dispatch() │───>│  cmd_*()    │      │
//! │  └─────────────┘    └─────────────┘    └─────────────┘      │
//! │                                               │             │
//! │                     StorageEngine / ExpiryScheduler /       │
//! │                     Snapshotter                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use crate::protocol::{Command, ParseError, Response};
use crate::storage::{
    ExpiryScheduler, SnapshotError, Snapshotter, StorageEngine, StorageError,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error};

/// Errors reported back to the client.
///
/// The `Display` text is the wire diagnostic. None of these close the
/// connection.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Wrong argument count or an unusable argument
    #[error("MALFORMED COMMAND")]
    MalformedCommand(&'static str),

    /// The verb is not recognised
    #[error("UNKNOWN COMMAND")]
    UnknownCommand(String),

    /// INCR/DECR failure
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// SAVE failure
    #[error("IO ERROR")]
    Io(#[from] SnapshotError),

    /// The request line could not be parsed
    #[error("MALFORMED COMMAND")]
    Parse(#[from] ParseError),
}

/// Handles commands by dispatching them to the appropriate handlers.
#[derive(Clone)]
pub struct CommandHandler {
    /// The storage engine
    storage: Arc<StorageEngine>,
    /// Deferred deletion for TTL writes
    expiry: Arc<ExpiryScheduler>,
    /// Snapshot writer for SAVE
    snapshotter: Arc<Snapshotter>,
}

impl CommandHandler {
    /// Creates a new command handler.
    pub fn new(
        storage: Arc<StorageEngine>,
        expiry: Arc<ExpiryScheduler>,
        snapshotter: Arc<Snapshotter>,
    ) -> Self {
        Self {
            storage,
            expiry,
            snapshotter,
        }
    }

    /// Executes a command and returns the response.
    ///
    /// Errors become [`Response::Error`]; this never fails. Only SAVE
    /// suspends, while the snapshot is written on the blocking pool.
    pub async fn execute(&self, command: Command) -> Response {
        match self.dispatch(&command.verb, &command.args).await {
            Ok(response) => response,
            Err(e) => {
                debug!(verb = %command.verb, error = ?e, "Command failed");
                Response::error(e)
            }
        }
    }

    /// Dispatches a command to its handler.
    async fn dispatch(&self, verb: &str, args: &[String]) -> Result<Response, CommandError> {
        match verb {
            "PING" => self.cmd_ping(args),
            "SAVE" => self.cmd_save(args).await,
            "GET" => self.cmd_get(args),
            "SET" => self.cmd_set(args),
            "DELETE" => self.cmd_delete(args),
            "EXISTS" => self.cmd_exists(args),
            "INCR" => self.cmd_incr_by(args, 1),
            "DECR" => self.cmd_incr_by(args, -1),
            _ => Err(CommandError::UnknownCommand(verb.to_string())),
        }
    }

    /// PING
    fn cmd_ping(&self, args: &[String]) -> Result<Response, CommandError> {
        if !args.is_empty() {
            return Err(CommandError::MalformedCommand("PING takes no arguments"));
        }
        Ok(Response::Pong)
    }

    /// SAVE
    async fn cmd_save(&self, args: &[String]) -> Result<Response, CommandError> {
        if !args.is_empty() {
            return Err(CommandError::MalformedCommand("SAVE takes no arguments"));
        }

        let snapshotter = Arc::clone(&self.snapshotter);
        snapshotter.persist(Arc::clone(&self.storage)).await.map_err(|e| {
            error!(
                path = %self.snapshotter.path().display(),
                error = %e,
                "Snapshot save failed"
            );
            CommandError::from(e)
        })?;
        Ok(Response::Ok)
    }

    /// GET key
    fn cmd_get(&self, args: &[String]) -> Result<Response, CommandError> {
        let [key] = args else {
            return Err(CommandError::MalformedCommand("GET takes one key"));
        };

        Ok(match self.storage.get(key) {
            Some(value) => Response::Value(value),
            None => Response::NotFound,
        })
    }

    /// SET key value [EX seconds | PX milliseconds]
    fn cmd_set(&self, args: &[String]) -> Result<Response, CommandError> {
        let (key, value, ttl) = match args {
            [key, value] => (key, value, None),
            [key, value, flag, amount] => (key, value, Some(parse_ttl(flag, amount)?)),
            _ => {
                return Err(CommandError::MalformedCommand(
                    "SET takes a key, a value and an optional EX/PX amount",
                ))
            }
        };

        if let Some(registration) = self.storage.set(key.clone(), value.clone(), ttl) {
            self.expiry.schedule(registration);
        }
        Ok(Response::Ok)
    }

    /// DELETE key
    fn cmd_delete(&self, args: &[String]) -> Result<Response, CommandError> {
        let [key] = args else {
            return Err(CommandError::MalformedCommand("DELETE takes one key"));
        };

        Ok(Response::Bool(self.storage.delete(key)))
    }

    /// EXISTS key
    fn cmd_exists(&self, args: &[String]) -> Result<Response, CommandError> {
        let [key] = args else {
            return Err(CommandError::MalformedCommand("EXISTS takes one key"));
        };

        Ok(Response::Bool(self.storage.exists(key)))
    }

    /// INCR key / DECR key
    fn cmd_incr_by(&self, args: &[String], delta: i64) -> Result<Response, CommandError> {
        let [key] = args else {
            return Err(CommandError::MalformedCommand("INCR/DECR take one key"));
        };

        let value = self.storage.incr_by(key, delta)?;
        Ok(Response::Integer(value))
    }
}

/// Parses the `EX seconds` / `PX milliseconds` suffix of SET.
fn parse_ttl(flag: &str, amount: &str) -> Result<Duration, CommandError> {
    let amount: u64 = amount
        .parse()
        .map_err(|_| CommandError::MalformedCommand("expire amount is not an integer"))?;
    if amount == 0 {
        return Err(CommandError::MalformedCommand("expire amount must be positive"));
    }

    let ttl = match flag.to_ascii_uppercase().as_str() {
        "EX" => Duration::from_secs(amount),
        "PX" => Duration::from_millis(amount),
        _ => return Err(CommandError::MalformedCommand("expire flag must be EX or PX")),
    };

    if Instant::now().checked_add(ttl).is_none() {
        return Err(CommandError::MalformedCommand("expire amount is too large"));
    }
    Ok(ttl)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::parse_line;
    use tempfile::TempDir;

    struct Fixture {
        handler: CommandHandler,
        storage: Arc<StorageEngine>,
        snapshotter: Arc<Snapshotter>,
        _dir: TempDir,
    }

    fn create_handler() -> Fixture {
        let dir = TempDir::new().unwrap();
        let storage = Arc::new(StorageEngine::new());
        let expiry = Arc::new(ExpiryScheduler::start(Arc::clone(&storage)));
        let snapshotter = Arc::new(Snapshotter::new(dir.path().join("data.json")));
        let handler = CommandHandler::new(
            Arc::clone(&storage),
            expiry,
            Arc::clone(&snapshotter),
        );
        Fixture {
            handler,
            storage,
            snapshotter,
            _dir: dir,
        }
    }

    async fn run(handler: &CommandHandler, line: &str) -> Response {
        handler.execute(parse_line(line.as_bytes()).unwrap()).await
    }

    fn malformed() -> Response {
        Response::error("MALFORMED COMMAND")
    }

    #[tokio::test]
    async fn test_ping() {
        let f = create_handler();

        assert_eq!(run(&f.handler, "PING").await, Response::Pong);
        assert_eq!(run(&f.handler, "ping").await, Response::Pong);
        assert_eq!(run(&f.handler, "PING hello").await, malformed());
    }

    #[tokio::test]
    async fn test_set_get() {
        let f = create_handler();

        assert_eq!(run(&f.handler, "SET key value").await, Response::Ok);
        assert_eq!(
            run(&f.handler, "GET key").await,
            Response::Value("value".to_string())
        );
    }

    #[tokio::test]
    async fn test_get_nonexistent() {
        let f = create_handler();

        let response = run(&f.handler, "GET nonexistent").await;
        assert_eq!(response, Response::NotFound);
        assert_eq!(response.serialize(), b"KEY NOT FOUND\n");
    }

    #[tokio::test]
    async fn test_get_empty_value_is_found() {
        let f = create_handler();

        f.storage.set("empty".into(), String::new(), None);
        assert_eq!(run(&f.handler, "GET empty").await, Response::Value(String::new()));
    }

    #[tokio::test]
    async fn test_arity_is_checked() {
        let f = create_handler();

        for line in [
            "GET",
            "GET a b",
            "SET",
            "SET key",
            "SET key value EX",
            "SET key value EX 10 extra",
            "DELETE",
            "EXISTS",
            "EXISTS a b",
            "INCR",
            "DECR a b",
            "SAVE now",
        ] {
            assert_eq!(run(&f.handler, line).await, malformed(), "line: {}", line);
        }
    }

    #[tokio::test]
    async fn test_set_bad_ttl() {
        let f = create_handler();

        assert_eq!(run(&f.handler, "SET k v EX soon").await, malformed());
        assert_eq!(run(&f.handler, "SET k v EX -5").await, malformed());
        assert_eq!(run(&f.handler, "SET k v PX 0").await, malformed());
        assert_eq!(run(&f.handler, "SET k v XX 10").await, malformed());

        // Nothing was written
        assert_eq!(run(&f.handler, "EXISTS k").await, Response::Bool(false));
    }

    #[tokio::test]
    async fn test_set_ttl_past_clock_range_is_rejected() {
        let f = create_handler();

        assert_eq!(run(&f.handler, "SET k v EX 18446744073709551615").await, malformed());

        assert_eq!(run(&f.handler, "EXISTS k").await, Response::Bool(false));
        assert!(f.storage.is_empty());
        // The handler keeps serving, and a far but representable TTL is fine
        assert_eq!(run(&f.handler, "PING").await, Response::Pong);
        assert_eq!(run(&f.handler, "SET k v EX 3153600000").await, Response::Ok);
        assert_eq!(run(&f.handler, "GET k").await, Response::Value("v".into()));
    }

    #[tokio::test]
    async fn test_unknown_command() {
        let f = create_handler();

        let response = run(&f.handler, "FLUSHALL").await;
        assert_eq!(response, Response::error("UNKNOWN COMMAND"));
        assert_eq!(response.serialize(), b"UNKNOWN COMMAND\n");
    }

    #[tokio::test]
    async fn test_delete_exists() {
        let f = create_handler();

        run(&f.handler, "SET key value").await;
        assert_eq!(run(&f.handler, "EXISTS key").await, Response::Bool(true));

        assert_eq!(run(&f.handler, "DELETE key").await, Response::Bool(true));
        assert_eq!(run(&f.handler, "EXISTS key").await, Response::Bool(false));
        assert_eq!(run(&f.handler, "DELETE key").await, Response::Bool(false));
    }

    #[tokio::test]
    async fn test_incr_decr() {
        let f = create_handler();

        assert_eq!(run(&f.handler, "INCR counter").await, Response::Integer(1));
        assert_eq!(run(&f.handler, "INCR counter").await, Response::Integer(2));
        assert_eq!(run(&f.handler, "DECR counter").await, Response::Integer(1));

        assert_eq!(run(&f.handler, "DECR fresh").await, Response::Integer(-1));
        assert_eq!(run(&f.handler, "GET fresh").await, Response::Value("-1".into()));

        run(&f.handler, "SET num 5").await;
        run(&f.handler, "INCR num").await;
        assert_eq!(run(&f.handler, "GET num").await, Response::Value("6".into()));
    }

    #[tokio::test]
    async fn test_incr_non_integer() {
        let f = create_handler();

        run(&f.handler, "SET text abc").await;
        let response = run(&f.handler, "INCR text").await;
        assert_eq!(response.serialize(), b"NON-INTEGER VALUE\n");
        assert_eq!(run(&f.handler, "GET text").await, Response::Value("abc".into()));
    }

    #[tokio::test]
    async fn test_incr_overflow() {
        let f = create_handler();

        run(&f.handler, &format!("SET big {}", i64::MAX)).await;
        assert_eq!(run(&f.handler, "INCR big").await, Response::error("INTEGER OVERFLOW"));
    }

    #[tokio::test]
    async fn test_set_ex_expires() {
        let f = create_handler();

        assert_eq!(run(&f.handler, "SET k 1 EX 1").await, Response::Ok);
        assert_eq!(run(&f.handler, "GET k").await, Response::Value("1".into()));

        tokio::time::sleep(Duration::from_millis(1200)).await;

        assert_eq!(run(&f.handler, "GET k").await, Response::NotFound);
        assert_eq!(f.storage.len(), 0);
    }

    #[tokio::test]
    async fn test_set_px_flag_is_case_insensitive() {
        let f = create_handler();

        assert_eq!(run(&f.handler, "set k v px 50").await, Response::Ok);
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(run(&f.handler, "EXISTS k").await, Response::Bool(false));
    }

    #[tokio::test]
    async fn test_overwrite_before_expiry_keeps_new_value() {
        let f = create_handler();

        run(&f.handler, "SET k old PX 50").await;
        run(&f.handler, "SET k new").await;
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(run(&f.handler, "GET k").await, Response::Value("new".into()));
    }

    #[tokio::test]
    async fn test_save_writes_snapshot() {
        let f = create_handler();

        run(&f.handler, "SET a 1").await;
        run(&f.handler, "SET b 2 EX 100").await;
        assert_eq!(run(&f.handler, "SAVE").await, Response::Ok);

        let loaded = f.snapshotter.load();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.get("b").map(String::as_str), Some("2"));
    }

    #[tokio::test]
    async fn test_save_failure_reports_io_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.json");
        std::fs::create_dir_all(path.join("occupied")).unwrap();

        let storage = Arc::new(StorageEngine::new());
        let expiry = Arc::new(ExpiryScheduler::start(Arc::clone(&storage)));
        let handler = CommandHandler::new(storage, expiry, Arc::new(Snapshotter::new(path)));

        run(&handler, "SET a 1").await;
        assert_eq!(run(&handler, "SAVE").await, Response::error("IO ERROR"));
        // The handler keeps working
        assert_eq!(run(&handler, "PING").await, Response::Pong);
    }

    #[tokio::test]
    async fn test_concurrent_saves_keep_runtime_responsive() {
        let f = create_handler();
        for i in 0..100 {
            run(&f.handler, &format!("SET key{} value{}", i, i)).await;
        }

        let saves: Vec<_> = (0..8)
            .map(|_| {
                let handler = f.handler.clone();
                tokio::spawn(async move { run(&handler, "SAVE").await })
            })
            .collect();
        tokio::task::yield_now().await;

        // Served on the same single-threaded runtime while the saves run
        assert_eq!(run(&f.handler, "PING").await, Response::Pong);
        assert_eq!(run(&f.handler, "GET key7").await, Response::Value("value7".into()));

        for save in saves {
            assert_eq!(save.await.unwrap(), Response::Ok);
        }
        assert_eq!(f.snapshotter.load().len(), 100);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_incr() {
        let f = create_handler();
        run(&f.handler, "SET counter 0").await;

        let mut tasks = Vec::new();
        for _ in 0..100 {
            let handler = f.handler.clone();
            tasks.push(tokio::spawn(async move { run(&handler, "INCR counter").await }));
        }
        for task in tasks {
            assert!(!task.await.unwrap().is_error());
        }

        assert_eq!(run(&f.handler, "GET counter").await, Response::Value("100".into()));
    }
}
