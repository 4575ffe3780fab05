// Import local time formatting tools from chrono
use chrono::Local;

// Set the global log level (e.g., Debug, Info, Warn, Error)
use log::LevelFilter;

// Set up the dispatch builder for combining logger outputs
use fern::Dispatch;
use fern::colors::{Color, ColoredLevelConfig};

// Standard I/O and filesystem operations (stdout, file creation)
use std::{fs, io};

// Used to initialize a static value only once in a thread-safe way
use std::sync::OnceLock;

use crate::config::LoggerConfig;

/// A simple Logger struct that wraps logging functions.
/// Clonable to allow use across multiple threads/tasks.
#[derive(Clone)]
pub struct Logger;

impl Logger {
    /// Logs a message at DEBUG level
    pub fn debug(&self, msg: &str) {
        log::debug!("{}", msg);
    }

    /// Logs a message at INFO level
    pub fn info(&self, msg: &str) {
        log::info!("{}", msg);
    }

    /// Logs a message at WARN level
    pub fn warn(&self, msg: &str) {
        log::warn!("{}", msg);
    }

    /// Logs a message at ERROR level
    pub fn error(&self, msg: &str) {
        log::error!("{}", msg);
    }
}

/// Static global LOGGER instance, initialized once
static LOGGER: OnceLock<Logger> = OnceLock::new();

/// Initialize the global logger exactly once, according to the provided settings.
/// After this call, all `Logger` handles (and raw `log::...!` macros) go through
/// the configured fern dispatcher.
///
/// The console branch filters at INFO, so debug-severity records reach the
/// file branch only. That is how "normal" queue records stay out of the
/// terminal while "always show" records appear on both outputs.
pub fn init_logger(name: &str, cfg: &LoggerConfig) -> Logger {
    LOGGER
        .get_or_init(|| {
            // ────────────────────────────────────────────────────────────────
            // 1) Parse the configured level string into a log::LevelFilter
            // ────────────────────────────────────────────────────────────────
            let level = cfg
                .log_level
                .parse::<LevelFilter>()
                .unwrap_or(LevelFilter::Debug);

            let mut base = Dispatch::new().level(level);

            // ────────────────────────────────────────────────────────────────
            // 2) Console branch: timestamp, colored level, message, to stdout
            // ────────────────────────────────────────────────────────────────
            if cfg.enable_console_log {
                let colors = ColoredLevelConfig::new()
                    .info(Color::Green)
                    .warn(Color::Yellow)
                    .error(Color::Red)
                    .debug(Color::Blue);

                let datefmt = cfg.date_format.clone();
                base = base.chain(
                    Dispatch::new()
                        .level(LevelFilter::Info)
                        .format(move |out, message, record| {
                            out.finish(format_args!(
                                "{} - {} - {}",
                                Local::now().format(&datefmt),
                                colors.color(record.level()),
                                message
                            ))
                        })
                        .chain(io::stdout()),
                );
            }

            // ────────────────────────────────────────────────────────────────
            // 3) File branch: plain text lines at "<log_file_path>/<name>.log"
            // ────────────────────────────────────────────────────────────────
            if cfg.enable_file_log {
                if !cfg.log_file_path.is_empty() {
                    let _ = fs::create_dir_all(&cfg.log_file_path);
                }

                let nm = name.to_string();
                let datefmt = cfg.date_format.clone();

                let filepath = if cfg.log_file_path.is_empty() {
                    format!("{}.log", nm.replace('.', "_"))
                } else {
                    format!("{}/{}.log", cfg.log_file_path, nm.replace('.', "_"))
                };

                // Attempt to open the logfile, but don't panic; fall back to a sink on error
                let file_output: Box<dyn io::Write + Send> = match fern::log_file(&filepath) {
                    Ok(fh) => Box::new(fh),
                    Err(err) => {
                        eprintln!("Warning: could not open log file {}: {}", filepath, err);
                        Box::new(io::sink())
                    }
                };

                base = base.chain(
                    Dispatch::new()
                        .format(move |out, message, record| {
                            out.finish(format_args!(
                                "{} - {} - {} - {}",
                                Local::now().format(&datefmt),
                                nm,
                                record.level(),
                                message
                            ))
                        })
                        .chain(file_output),
                );
            }

            // ────────────────────────────────────────────────────────────────
            // 4) Apply the composed dispatcher as the global logger
            // ────────────────────────────────────────────────────────────────
            let _ = base.apply();

            Logger
        })
        .clone()
}
