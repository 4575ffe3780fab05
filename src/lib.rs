// Public module for parsing and validating server configuration.
pub mod config;

// Public module exposing logging utilities for exchanged messages and server lifecycle events.
pub mod logger;

// Bounded producer/consumer queue feeding the log pipeline.
pub mod queue;

// Module implementing the TCP relay server.
pub mod server;

pub use config::{LoggerConfig, ServerConfig};
pub use logger::{Logger, init_logger};
pub use queue::{BoundedQueue, Message};
pub use server::{ServerContext, run_server, serve};
