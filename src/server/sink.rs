use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::queue::Message;
use crate::server::ServerContext;

/// What flows through the log queue toward the sink.
pub enum LogEvent {
    /// A finished record. `notice` records are always shown; the rest only
    /// reach the file branch of the sink.
    Entry { text: Message, notice: bool },
    /// Sentinel that stops the writer task. Everything pushed before it is
    /// still written, so a shutdown drains the queue completely.
    Shutdown,
}

impl LogEvent {
    /// Builds a record, or `None` when the text trims down to nothing.
    pub fn entry(text: &str, notice: bool) -> Option<LogEvent> {
        Message::new(text).map(|text| LogEvent::Entry { text, notice })
    }
}

/// Spawns the single consumer of the log queue. It forwards records to the
/// sink in push order and exits when it pops the shutdown sentinel.
pub fn spawn_log_writer(ctx: Arc<ServerContext>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match ctx.queue.pop().await {
                LogEvent::Entry { text, notice } => {
                    if notice {
                        ctx.logger.info(text.as_str());
                    } else {
                        ctx.logger.debug(text.as_str());
                    }
                }
                LogEvent::Shutdown => break,
            }
        }
    })
}
