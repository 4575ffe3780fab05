use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedReadHalf;

use crate::queue::Message;
use crate::server::ServerContext;
use crate::server::broadcast;
use crate::server::registry::{ClientRecord, ConnId, SharedWriter};

/// Lines that end a session from the client side. Exact match, case
/// sensitive, after the line terminator is trimmed.
const QUIT_KEYWORDS: [&str; 2] = ["sair", "/quit"];

/// Sent to a peer that arrives while the registry is full.
const CAPACITY_NOTICE: &[u8] = b"Server full. Try again later.\n";

/// Why a session left its relay loop. Every reason leads to the same close
/// protocol; only a server shutdown suppresses the leave announcement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CloseReason {
    Quit,
    PeerClosed,
    ReadError,
    WriteError,
    Shutdown,
}

/// Drives one accepted connection from registration to teardown.
///
/// The lifecycle is one-way: a rejected or failed step never retries, it
/// only moves the session closer to closed.
pub async fn run(stream: TcpStream, addr: SocketAddr, ctx: Arc<ServerContext>) {
    if let Err(e) = stream.set_nodelay(true) {
        ctx.logger
            .warn(&format!("⚠️ Failed to set TCP_NODELAY for {}: {}", addr, e));
    }

    let (reader_half, writer_half) = stream.into_split();
    let writer: SharedWriter = Arc::new(tokio::sync::Mutex::new(writer_half));
    let id = ctx.registry.issue_id();
    let record = ClientRecord {
        id,
        addr,
        writer: writer.clone(),
    };

    // Admission control: the connection is accepted at the transport level
    // but turned away here once the table is full.
    if ctx.registry.try_add(record).is_err() {
        ctx.record(
            &format!(
                "Client rejected: {} (all {} slots occupied)",
                addr,
                ctx.registry.capacity()
            ),
            true,
        )
        .await;
        let mut w = writer.lock().await;
        let _ = w.write_all(CAPACITY_NOTICE).await;
        let _ = w.shutdown().await;
        return;
    }

    ctx.logger.info(&format!(
        "🔌 {} connected. Active connections: {}",
        addr,
        ctx.registry.count()
    ));
    ctx.record(&format!("Client connected: {} [{}]", addr, id), true)
        .await;

    broadcast::broadcast(&ctx, &format!("New user connected: {}", addr), id).await;

    // Personal welcome. A peer we can't even greet goes straight to teardown.
    let welcome = format!("Welcome to the chat! You are connected as {}\n", addr);
    let welcome_failed = {
        let mut w = writer.lock().await;
        w.write_all(welcome.as_bytes()).await.is_err()
    };

    let reason = if welcome_failed {
        CloseReason::WriteError
    } else {
        relay_loop(reader_half, id, addr, &writer, &ctx).await
    };

    close(reason, id, addr, &writer, &ctx).await;
}

/// The Active state: reads one line at a time and fans it out, until the
/// peer quits, disconnects, errors out, or the server shuts down.
async fn relay_loop(
    reader_half: OwnedReadHalf,
    id: ConnId,
    addr: SocketAddr,
    writer: &SharedWriter,
    ctx: &ServerContext,
) -> CloseReason {
    let mut lines = BufReader::new(reader_half).lines();
    let mut shutdown_rx = ctx.shutdown.subscribe();

    loop {
        if ctx.shutdown.is_triggered() {
            return notify_shutdown(writer, ctx, addr).await;
        }

        tokio::select! {
            maybe_line = lines.next_line() => {
                match maybe_line {
                    Ok(Some(line)) => {
                        // Empty lines carry nothing and change nothing.
                        let Some(msg) = Message::new(&line) else { continue };

                        if QUIT_KEYWORDS.contains(&msg.as_str()) {
                            return CloseReason::Quit;
                        }

                        ctx.logger.info(&format!("📨 From {}: {}", addr, msg));
                        broadcast::broadcast(ctx, &format!("[{}]: {}", addr, msg), id).await;
                        ctx.record(&format!("Message from client [{}]: {}", addr, msg), false)
                            .await;
                    }
                    Ok(None) => {
                        ctx.logger.info(&format!("⚠️ {} disconnected gracefully.", addr));
                        return CloseReason::PeerClosed;
                    }
                    Err(e) => {
                        ctx.logger.warn(&format!("❌ Error reading from {}: {}", addr, e));
                        return CloseReason::ReadError;
                    }
                }
            }

            _ = shutdown_rx.recv() => {
                return notify_shutdown(writer, ctx, addr).await;
            }
        }
    }
}

async fn notify_shutdown(writer: &SharedWriter, ctx: &ServerContext, addr: SocketAddr) -> CloseReason {
    ctx.logger
        .warn(&format!("🛑 {} disconnected due to shutdown.", addr));
    let mut w = writer.lock().await;
    let _ = w.write_all(b"Warning: Server is shutting down.\n").await;
    CloseReason::Shutdown
}

/// The close protocol: disconnect record, leave announcement (unless the
/// whole server is going down), registry removal, connection teardown.
async fn close(
    reason: CloseReason,
    id: ConnId,
    addr: SocketAddr,
    writer: &SharedWriter,
    ctx: &ServerContext,
) {
    ctx.record(&format!("Client disconnected: {} [{}]", addr, id), true)
        .await;

    if reason != CloseReason::Shutdown {
        broadcast::broadcast(ctx, &format!("User left: {}", addr), id).await;
    }

    // May already be gone through an eviction or the shutdown drain.
    ctx.registry.remove(id);

    {
        let mut w = writer.lock().await;
        let _ = w.shutdown().await;
    }

    ctx.logger.info(&format!(
        "🔌 {} disconnected. Active connections: {}",
        addr,
        ctx.registry.count()
    ));
}
