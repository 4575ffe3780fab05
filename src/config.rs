// Serde gives us config structs that deserialize straight from JSON.
use serde::Deserialize;

// Standard filesystem access for reading the optional config file.
use std::fs;

/// All the settings the relay server needs. Every field has a default, so a
/// config file only has to name the keys it wants to change.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// IP or hostname to listen on (e.g. `"127.0.0.1"`)
    pub host: String,

    /// Port number (e.g. `8080`)
    pub port: u16,

    /// How many clients the registry holds; further connections are rejected
    pub max_clients: usize,

    /// Capacity of the log message queue; producers block when it is full
    pub queue_capacity: usize,

    /// Milliseconds to sleep after a failed accept
    pub accept_error_backoff_ms: u64,

    /// Seconds the shutdown sequence waits for sessions and the log writer
    pub shutdown_grace_secs: u64,

    /// How many Tokio worker threads to spin up (defaults to cpu-1)
    pub worker_threads: usize,

    /// Settings for the log sink
    pub logger: LoggerConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 8080,
            max_clients: 10,
            queue_capacity: 50,
            accept_error_backoff_ms: 100,
            shutdown_grace_secs: 2,
            worker_threads: num_cpus::get().saturating_sub(1).max(1),
            logger: LoggerConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Reads settings from a JSON file. Keys missing from the file keep
    /// their defaults; a malformed file is an error.
    pub fn from_file(path: &str) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let raw = fs::read_to_string(path)?;
        let config = serde_json::from_str(&raw)?;
        Ok(config)
    }
}

/// Settings for the log sink.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    /// Minimum level recorded anywhere ("trace" .. "error")
    pub log_level: String,

    /// Mirror info-and-up records to stdout with colors
    pub enable_console_log: bool,

    /// Append every record to a log file
    pub enable_file_log: bool,

    /// Directory for the log file; empty means the working directory
    pub log_file_path: String,

    /// chrono format string used for record timestamps
    pub date_format: String,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        LoggerConfig {
            log_level: "debug".to_string(),
            enable_console_log: true,
            enable_file_log: true,
            log_file_path: String::new(),
            date_format: "%Y-%m-%d %H:%M:%S".to_string(),
        }
    }
}
