use chat_relay::config::ServerConfig;
use chat_relay::logger::init_logger;
use chat_relay::server::run_server;

/// Builds the runtime from config and runs the relay until shutdown.
/// Usage: `chat-relay-server [config.json]`
fn main() {
    let config = match std::env::args().nth(1) {
        Some(path) => match ServerConfig::from_file(&path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load config {}: {}", path, e);
                std::process::exit(1);
            }
        },
        None => ServerConfig::default(),
    };

    let logger = init_logger("chat_relay", &config.logger);

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.worker_threads)
        .thread_name("chat-relay-worker")
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            logger.error(&format!("Failed to build Tokio runtime: {}", e));
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(run_server(config, logger.clone())) {
        logger.error(&format!("Chat relay error: {}", e));
        std::process::exit(1);
    }
}
