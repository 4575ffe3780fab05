use std::borrow::Cow;
use std::io;

use bytes::Bytes;
use tokio::io::AsyncWriteExt;

use crate::server::ServerContext;
use crate::server::registry::{ClientRecord, ConnId};

/// What one fan-out pass did. `sent + failed` can be less than `total`:
/// peers that would have blocked are skipped without counting either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastOutcome {
    pub sent: usize,
    pub total: usize,
    pub failed: usize,
}

enum SendOutcome {
    Sent,
    /// The socket buffer is full or another task holds the writer right now.
    /// Dropped for this pass; not evidence the peer is dead.
    Busy,
    Dead(io::Error),
}

/// Fans `text` out to every registered peer except `excluding`.
///
/// Works from a registry snapshot, so registrations and removals are never
/// blocked by the sends. Each peer gets one non-blocking write attempt; a
/// hard failure evicts that peer and cannot affect the others. One summary
/// record goes into the log queue after the pass.
pub async fn broadcast(ctx: &ServerContext, text: &str, excluding: ConnId) -> BroadcastOutcome {
    let snapshot = ctx.registry.snapshot(Some(excluding));
    let total = snapshot.len();

    // Build the payload once; every peer gets the same newline-terminated bytes.
    let payload = Bytes::from(ensure_trailing_newline(text).into_owned());

    let mut sent = 0;
    let mut failed = 0;
    for peer in snapshot {
        match send_nonblocking(&peer, &payload) {
            SendOutcome::Sent => sent += 1,
            SendOutcome::Busy => {}
            SendOutcome::Dead(e) => {
                failed += 1;
                ctx.logger
                    .warn(&format!("❌ Failed to send to client {}: {}", peer.addr, e));
                evict(ctx, &peer).await;
            }
        }
    }

    ctx.record(
        &format!(
            "Broadcast: '{}' delivered to {}/{} clients ({} failed)",
            text, sent, total, failed
        ),
        false,
    )
    .await;

    BroadcastOutcome { sent, total, failed }
}

fn send_nonblocking(peer: &ClientRecord, payload: &[u8]) -> SendOutcome {
    let writer = match peer.writer.try_lock() {
        Ok(writer) => writer,
        Err(_) => return SendOutcome::Busy,
    };
    match writer.try_write(payload) {
        Ok(0) => SendOutcome::Dead(io::ErrorKind::WriteZero.into()),
        Ok(_) => SendOutcome::Sent,
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => SendOutcome::Busy,
        Err(e) => SendOutcome::Dead(e),
    }
}

/// Removes a dead peer from the registry and closes its connection. The
/// peer's own session does the same cleanup later; both paths are no-ops
/// the second time around.
async fn evict(ctx: &ServerContext, peer: &ClientRecord) {
    ctx.registry.remove(peer.id);
    let mut writer = peer.writer.lock().await;
    let _ = writer.shutdown().await;
}

/// Ensures the string ends with exactly one newline (`\n`), borrowing the
/// input unchanged when it already does.
fn ensure_trailing_newline(s: &str) -> Cow<'_, str> {
    if s.ends_with('\n') {
        Cow::Borrowed(s)
    } else {
        Cow::Owned(format!("{s}\n"))
    }
}
