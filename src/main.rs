//! memline - A memcached Text-Protocol Server
//!
//! This is the main entry point for the memline server.
//! It sets up logging, the in-memory cache and the server, and stops the
//! server gracefully on Ctrl+C.

use anyhow::Context;
use memline::config::{DEFAULT_BUFFER_SIZE, DEFAULT_MAX_LINE_LEN};
use memline::storage::{start_expiry_sweeper, StorageEngine, DEFAULT_MAX_ITEM_SIZE};
use memline::{Server, ServerConfig};
use std::str::FromStr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Command-line configuration
struct Config {
    /// Host to bind to
    host: String,
    /// Port to listen on
    port: u16,
    /// Per-connection read buffer capacity
    read_buffer_size: usize,
    /// Per-connection write buffer capacity
    write_buffer_size: usize,
    /// Longest accepted request line
    max_line_len: usize,
    /// Largest value a `set` may store
    max_item_size: usize,
    /// Log filter used when `RUST_LOG` is not set
    log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: memline::DEFAULT_HOST.to_string(),
            port: memline::DEFAULT_PORT,
            read_buffer_size: DEFAULT_BUFFER_SIZE,
            write_buffer_size: DEFAULT_BUFFER_SIZE,
            max_line_len: DEFAULT_MAX_LINE_LEN,
            max_item_size: DEFAULT_MAX_ITEM_SIZE,
            log_level: "info".to_string(),
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
            let flag = args[i].as_str();
            let value = args.get(i + 1).map(String::as_str);
            match flag {
                "--host" | "-h" => config.host = required(flag, value).to_string(),
                "--port" | "-p" => config.port = parsed(flag, value),
                "--read-buffer-size" => config.read_buffer_size = parsed(flag, value),
                "--write-buffer-size" => config.write_buffer_size = parsed(flag, value),
                "--max-line-len" => config.max_line_len = parsed(flag, value),
                "--max-item-size" => config.max_item_size = parsed(flag, value),
                "--log-level" => config.log_level = required(flag, value).to_string(),
                "--help" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("memline version {}", memline::VERSION);
                    std::process::exit(0);
                }
                _ => {
                    eprintln!("Unknown argument: {}", flag);
                    print_help();
                    std::process::exit(1);
                }
            }
            i += 2;
        }

        config
    }

    /// Returns the bind address as a string
    fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn server_config(&self) -> ServerConfig {
        ServerConfig {
            listen_addr: self.bind_address(),
            read_buffer_size: self.read_buffer_size,
            write_buffer_size: self.write_buffer_size,
            max_line_len: self.max_line_len,
        }
    }
}

fn required<'a>(flag: &str, value: Option<&'a str>) -> &'a str {
    value.unwrap_or_else(|| {
        eprintln!("Error: {} requires a value", flag);
        std::process::exit(1);
    })
}

fn parsed<T: FromStr>(flag: &str, value: Option<&str>) -> T {
    required(flag, value).parse().unwrap_or_else(|_| {
        eprintln!("Error: invalid value for {}", flag);
        std::process::exit(1);
    })
}

fn print_help() {
    println!(
        r#"
memline - A memcached text-protocol server

USAGE:
    memline [OPTIONS]

OPTIONS:
    -h, --host <HOST>                Host to bind to (default: 127.0.0.1)
    -p, --port <PORT>                Port to listen on (default: 11211)
        --read-buffer-size <BYTES>   Per-connection read buffer (default: 4096)
        --write-buffer-size <BYTES>  Per-connection write buffer (default: 4096)
        --max-line-len <BYTES>       Longest request line (default: 8192)
        --max-item-size <BYTES>      Largest storable value (default: 1048576)
        --log-level <FILTER>         Log filter when RUST_LOG is unset (default: info)
    -v, --version                    Print version information
        --help                       Print this help message

    A size of 0 selects the default.

EXAMPLES:
    memline                          # Start on 127.0.0.1:11211
    memline --port 11311             # Start on port 11311
    memline --host 0.0.0.0           # Listen on all interfaces

CONNECTING:
    Any memcached client works, or plain telnet:
    $ telnet 127.0.0.1 11211
    set name 0 0 4
    Ariz
    STORED
    get name
    VALUE name 0 4
    Ariz
    END
"#
    );
}

fn print_banner(addr: &std::net::SocketAddr) {
    println!(
        r#"
memline v{} - memcached text-protocol server
──────────────────────────────────────────────
Server started on {}
Ready to accept connections.

Use Ctrl+C to shutdown gracefully.
"#,
        memline::VERSION,
        addr
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command-line arguments
    let config = Config::from_args();

    // Set up logging; RUST_LOG wins over --log-level
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .context("invalid log filter")?;
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    // Create the cache (shared across all connections)
    let max_item_size = if config.max_item_size == 0 {
        DEFAULT_MAX_ITEM_SIZE
    } else {
        config.max_item_size
    };
    let storage = Arc::new(StorageEngine::with_max_item_size(max_item_size));
    info!(max_item_size = storage.max_item_size(), "Storage engine initialized");

    // Start the background expiry sweeper
    let _sweeper = start_expiry_sweeper(Arc::clone(&storage));

    let mut server = Server::new(Arc::clone(&storage), config.server_config());
    let addr = server
        .start()
        .await
        .with_context(|| format!("failed to start server on {}", config.bind_address()))?;

    print_banner(&addr);

    // Set up graceful shutdown
    let shutdown = server.shutdown_handle();
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown signal received, waiting for connections to close...");
                shutdown.shutdown();
            }
            Err(e) => error!(error = %e, "Failed to install Ctrl+C handler"),
        }
    });

    let result = server.wait().await;

    let stats = server.stats();
    info!(
        connections = stats.connections_accepted.load(Ordering::Relaxed),
        commands = stats.commands_processed.load(Ordering::Relaxed),
        client_errors = stats.client_errors.load(Ordering::Relaxed),
        server_errors = stats.server_errors.load(Ordering::Relaxed),
        keys = storage.len(),
        "Server shutdown complete"
    );

    result.context("server stopped with an error")
}
