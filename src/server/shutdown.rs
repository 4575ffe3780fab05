use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::io::AsyncWriteExt;
use tokio::sync::broadcast;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{self, Duration};

use crate::server::ServerContext;
use crate::server::sink::LogEvent;

/// The one-way termination request, observable two ways: a polled flag for
/// code that is between awaits, and a broadcast channel for code parked in
/// a `select!`. Triggering is idempotent.
pub struct ShutdownSignal {
    flag: AtomicBool,
    notify_tx: broadcast::Sender<()>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (notify_tx, _) = broadcast::channel(1);
        ShutdownSignal {
            flag: AtomicBool::new(false),
            notify_tx,
        }
    }

    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
        // No receivers is fine: the flag alone still stops flag-polling code.
        let _ = self.notify_tx.send(());
    }

    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.notify_tx.subscribe()
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawns the task that turns an external termination request (Ctrl+C, and
/// SIGTERM on Unix) into the in-process shutdown signal.
pub fn spawn_signal_listener(ctx: Arc<ServerContext>) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = wait_for_termination().await {
            ctx.logger
                .error(&format!("Failed to listen for termination signal: {}", e));
            return;
        }
        ctx.logger.warn("🛑 Termination signal received — shutting down.");
        ctx.shutdown.trigger();
    })
}

#[cfg(unix)]
async fn wait_for_termination() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result,
        _ = terminate.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn wait_for_termination() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}

/// Runs the tail of the shutdown sequence, after the accept loop has exited
/// and the listener is gone:
/// close every registered connection, join the session tasks, then stop the
/// log writer once it has drained everything queued so far. Each step is
/// best-effort and tolerates sessions tearing themselves down concurrently.
pub async fn finalize(ctx: &Arc<ServerContext>, mut sessions: JoinSet<()>, log_writer: JoinHandle<()>) {
    let grace = Duration::from_secs(ctx.config.shutdown_grace_secs);

    // Sessions wake on the shutdown channel, notify their peer and tear
    // themselves down; give them the grace interval to do so.
    let joined = time::timeout(grace, async {
        while let Some(result) = sessions.join_next().await {
            if let Err(e) = result {
                ctx.logger.warn(&format!("⚠️ Session task failed: {}", e));
            }
        }
    })
    .await;
    if joined.is_err() {
        ctx.logger
            .warn("⚠️ Some sessions did not finish within the grace interval; aborting them.");
        sessions.abort_all();
    }

    // Mop up whatever is still in the table (aborted sessions, peers that
    // never observed the signal): close the connection and clear the slot.
    for peer in ctx.registry.drain() {
        let mut writer = peer.writer.lock().await;
        let _ = writer.shutdown().await;
    }

    // Final status record, then the sentinel. FIFO guarantees the writer
    // sees everything queued before the sentinel before it stops.
    ctx.record("Server shut down cleanly", true).await;
    ctx.queue.push(LogEvent::Shutdown).await;

    match time::timeout(grace, log_writer).await {
        Ok(_) => ctx.logger.info("🧹 Log queue drained."),
        Err(_) => ctx
            .logger
            .warn("⚠️ Log writer did not drain within the grace interval."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::timeout;

    #[tokio::test]
    async fn trigger_sets_the_flag_and_wakes_subscribers() {
        let signal = ShutdownSignal::new();
        assert!(!signal.is_triggered());

        let mut rx = signal.subscribe();
        signal.trigger();
        assert!(signal.is_triggered());
        timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("subscriber must wake")
            .unwrap();

        // A second trigger is a no-op, not an error.
        signal.trigger();
        assert!(signal.is_triggered());
    }

    #[tokio::test]
    async fn late_subscribers_rely_on_the_flag() {
        let signal = ShutdownSignal::new();
        signal.trigger();
        // The channel only carries sends that happen after subscription, so
        // code subscribing late must consult the flag first.
        assert!(signal.is_triggered());
    }
}
