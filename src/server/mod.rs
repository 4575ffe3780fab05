use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio::time::{self, Duration};

pub mod broadcast;
pub mod registry;
pub mod session;
pub mod shutdown;
pub mod sink;

use crate::config::ServerConfig;
use crate::logger::Logger;
use crate::queue::BoundedQueue;

use registry::ClientRegistry;
use shutdown::ShutdownSignal;
use sink::LogEvent;

/// Everything the relay's tasks share, constructed once at startup and
/// passed around as `Arc<ServerContext>`. Tests build a fresh one per case.
pub struct ServerContext {
    pub config: ServerConfig,
    pub logger: Logger,
    pub registry: ClientRegistry,
    pub queue: BoundedQueue<LogEvent>,
    pub shutdown: ShutdownSignal,
}

impl ServerContext {
    pub fn new(config: ServerConfig, logger: Logger) -> Self {
        let registry = ClientRegistry::new(config.max_clients);
        let queue = BoundedQueue::new(config.queue_capacity);
        ServerContext {
            config,
            logger,
            registry,
            queue,
            shutdown: ShutdownSignal::new(),
        }
    }

    /// Queues a record for the log writer task. Blocks while the queue is
    /// full; empty texts are dropped here, on the producer side.
    pub async fn record(&self, text: &str, notice: bool) {
        if let Some(event) = LogEvent::entry(text, notice) {
            self.queue.push(event).await;
        }
    }
}

/// Binds the listener, installs the termination-signal listener and runs the
/// relay until shutdown completes. A bind failure is fatal and propagates to
/// the caller before any connection is accepted.
pub async fn run_server(
    config: ServerConfig,
    logger: Logger,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr).await?;
    logger.info(&format!("🚀 Chat relay listening on {}", addr));

    let ctx = Arc::new(ServerContext::new(config, logger));
    let signal_handle = shutdown::spawn_signal_listener(ctx.clone());

    serve(listener, ctx).await;

    signal_handle.abort();
    Ok(())
}

/// The accept loop: spawns one session task per connection, reaps finished
/// sessions, and breaks on the shutdown signal. Once the loop exits the
/// listener is dropped (no further admissions) and the shutdown sequence
/// runs to completion.
pub async fn serve(listener: TcpListener, ctx: Arc<ServerContext>) {
    let log_writer = sink::spawn_log_writer(ctx.clone());

    if let Ok(local) = listener.local_addr() {
        ctx.record(&format!("=== Chat relay started on {} ===", local), true)
            .await;
    }

    let mut sessions: JoinSet<()> = JoinSet::new();
    let mut shutdown_rx = ctx.shutdown.subscribe();

    loop {
        tokio::select! {
            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, addr)) => {
                        sessions.spawn(session::run(stream, addr, ctx.clone()));
                    }
                    Err(e) => {
                        ctx.logger.warn(&format!("⚠️ Failed to accept connection: {}", e));
                        time::sleep(Duration::from_millis(ctx.config.accept_error_backoff_ms)).await;
                    }
                }
            }

            Some(result) = sessions.join_next(), if !sessions.is_empty() => {
                if let Err(e) = result {
                    ctx.logger.warn(&format!("⚠️ Session task failed: {}", e));
                }
            }

            _ = shutdown_rx.recv() => {
                ctx.logger.info("🧹 Server received shutdown signal.");
                break;
            }
        }
    }

    // Closing the listener unblocks nothing else; it just stops admissions.
    drop(listener);

    shutdown::finalize(&ctx, sessions, log_writer).await;
}
