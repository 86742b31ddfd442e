//! Server configuration.

/// Default listen address
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:11211";

/// Default capacity of each connection's read and write buffers
pub const DEFAULT_BUFFER_SIZE: usize = 4096;

/// Default limit on the length of a request line, CRLF excluded
pub const DEFAULT_MAX_LINE_LEN: usize = 8192;

/// Settings for a [`Server`](crate::Server).
///
/// Zero sizes mean "unset"; [`ServerConfig::with_defaults`] fills them in
/// and the server applies it on start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address to bind, e.g. `127.0.0.1:11211` or `0.0.0.0:0`
    pub listen_addr: String,

    /// Capacity of the per-connection read buffer
    pub read_buffer_size: usize,

    /// Capacity of the per-connection write buffer
    pub write_buffer_size: usize,

    /// Longest accepted request line
    pub max_line_len: usize,
}

impl ServerConfig {
    /// Creates a configuration listening on `listen_addr` with default sizes.
    pub fn new(listen_addr: impl Into<String>) -> Self {
        Self {
            listen_addr: listen_addr.into(),
            ..Self::default()
        }
    }

    /// Returns a copy with every unset field replaced by its default.
    pub fn with_defaults(mut self) -> Self {
        if self.listen_addr.is_empty() {
            self.listen_addr = DEFAULT_LISTEN_ADDR.to_string();
        }
        if self.read_buffer_size == 0 {
            self.read_buffer_size = DEFAULT_BUFFER_SIZE;
        }
        if self.write_buffer_size == 0 {
            self.write_buffer_size = DEFAULT_BUFFER_SIZE;
        }
        if self.max_line_len == 0 {
            self.max_line_len = DEFAULT_MAX_LINE_LEN;
        }
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            read_buffer_size: DEFAULT_BUFFER_SIZE,
            write_buffer_size: DEFAULT_BUFFER_SIZE,
            max_line_len: DEFAULT_MAX_LINE_LEN,
        }
    }
}
