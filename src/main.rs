//! linekv - A Small In-Memory Key-Value Store
//!
//! This is the main entry point for the linekv server.
//! It restores the last snapshot, starts the expiry scheduler, and accepts
//! client connections until Ctrl+C, then writes a final snapshot.

use linekv::commands::CommandHandler;
use linekv::connection::{handle_connection, ConnectionStats};
use linekv::storage::{ExpiryScheduler, Snapshotter, StorageEngine};
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Server configuration
struct Config {
    /// Host to bind to
    host: String,
    /// Port to listen on
    port: u16,
    /// Snapshot file
    snapshot_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: linekv::DEFAULT_HOST.to_string(),
            port: linekv::DEFAULT_PORT,
            snapshot_path: PathBuf::from(linekv::DEFAULT_SNAPSHOT_PATH),
        }
    }
}

impl Config {
    /// Parse configuration from command-line arguments
    fn from_args() -> Self {
        let mut config = Config::default();
        let args: Vec<String> = std::env::args().collect();

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--host" | "-h" => {
                    config.host = option_value(&args, i, "--host").to_string();
                    i += 2;
                }
                "--port" | "-p" => {
                    config.port = option_value(&args, i, "--port").parse().unwrap_or_else(|_| {
                        eprintln!("Error: invalid port number");
                        std::process::exit(1);
                    });
                    i += 2;
                }
                "--snapshot" | "-s" => {
                    config.snapshot_path = PathBuf::from(option_value(&args, i, "--snapshot"));
                    i += 2;
                }
                "--help" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("linekv version {}", linekv::VERSION);
                    std::process::exit(0);
                }
                _ => {
                    eprintln!("Unknown argument: {}", args[i]);
                    print_help();
                    std::process::exit(1);
                }
            }
        }

        config
    }

    /// Returns the bind address as a string
    fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Returns the value following the flag at `i`, or exits.
fn option_value<'a>(args: &'a [String], i: usize, name: &str) -> &'a str {
    match args.get(i + 1) {
        Some(value) => value.as_str(),
        None => {
            eprintln!("Error: {} requires a value", name);
            std::process::exit(1);
        }
    }
}

fn print_help() {
    println!(
        r#"
linekv - A Small In-Memory Key-Value Store

USAGE:
    linekv [OPTIONS]

OPTIONS:
    -h, --host <HOST>        Host to bind to (default: 127.0.0.1)
    -p, --port <PORT>        Port to listen on (default: 6379)
    -s, --snapshot <PATH>    Snapshot file (default: data.json)
    -v, --version            Print version information
        --help               Print this help message

ENVIRONMENT:
    RUST_LOG                 Log filter (default: info)

CONNECTING:
    Any line-based client works:
    $ nc 127.0.0.1 6379
    SET name linekv
    OK
    GET name
    linekv
"#
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_args();

    // Set up logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    info!(version = linekv::VERSION, "Starting linekv");

    // Restore the last snapshot before accepting anyone
    let storage = Arc::new(StorageEngine::new());
    let snapshotter = Arc::new(Snapshotter::new(config.snapshot_path.clone()));
    let restored = storage.restore(snapshotter.load());
    info!(keys = restored, "Storage engine initialized");

    let expiry = Arc::new(ExpiryScheduler::start(Arc::clone(&storage)));

    let handler = CommandHandler::new(Arc::clone(&storage), expiry, Arc::clone(&snapshotter));
    let stats = Arc::new(ConnectionStats::new());

    // Bind the TCP listener
    let listener = TcpListener::bind(config.bind_address()).await?;
    info!("Listening on {}", config.bind_address());

    // Set up graceful shutdown
    let shutdown = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received, stopping server...");
    };

    tokio::select! {
        _ = accept_loop(listener, handler, Arc::clone(&stats)) => {}
        _ = shutdown => {}
    }

    match Arc::clone(&snapshotter).persist(Arc::clone(&storage)).await {
        Ok(keys) => info!(keys, "Final snapshot written"),
        Err(e) => error!(error = %e, "Final snapshot failed"),
    }

    let storage_stats = storage.stats();
    info!(
        keys = storage_stats.keys,
        expired = storage_stats.expired,
        connections = stats.connections_accepted.load(Ordering::Relaxed),
        commands = stats.commands_processed.load(Ordering::Relaxed),
        "Server shutdown complete"
    );
    Ok(())
}

/// Main loop that accepts incoming connections
async fn accept_loop(listener: TcpListener, handler: CommandHandler, stats: Arc<ConnectionStats>) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let handler = handler.clone();
                let stats = Arc::clone(&stats);

                // One task per client; commands within it run in order
                tokio::spawn(async move {
                    handle_connection(stream, addr, handler, stats).await;
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}
