use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::net::tcp::OwnedWriteHalf;

/// Process-unique identifier for one accepted connection. Slot indices get
/// reused; these never do, so exclusion and removal can't alias a newcomer
/// that landed in a freed slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnId(u64);

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

impl ConnId {
    #[cfg(test)]
    pub fn new(value: u64) -> Self {
        ConnId(value)
    }
}

/// The write-half of a client's TCP stream, shared between its session and
/// the broadcast engine.
pub type SharedWriter = Arc<tokio::sync::Mutex<OwnedWriteHalf>>;

/// One live connection as the registry sees it. Cloning is cheap (Arc).
#[derive(Clone)]
pub struct ClientRecord {
    pub id: ConnId,
    pub addr: SocketAddr,
    pub writer: SharedWriter,
}

/// Returned by `try_add` when every slot is occupied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryFull;

impl fmt::Display for RegistryFull {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("client registry is full")
    }
}

impl std::error::Error for RegistryFull {}

/// Fixed-capacity table of live connections.
///
/// All mutations go through one exclusion lock, held only for the table walk
/// itself. `snapshot` copies the occupied records out so callers do their
/// I/O without the lock.
pub struct ClientRegistry {
    slots: Mutex<Vec<Option<ClientRecord>>>,
    next_id: AtomicU64,
}

impl ClientRegistry {
    pub fn new(capacity: usize) -> Self {
        ClientRegistry {
            slots: Mutex::new((0..capacity).map(|_| None).collect()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Hands out the id a connection will be known by for its lifetime.
    pub fn issue_id(&self) -> ConnId {
        ConnId(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Claims the first empty slot for `record`, or fails when the table is
    /// full. Returns the claimed slot index.
    pub fn try_add(&self, record: ClientRecord) -> Result<usize, RegistryFull> {
        let mut slots = self.slots.lock().expect("registry lock poisoned");
        for (index, slot) in slots.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(record);
                return Ok(index);
            }
        }
        Err(RegistryFull)
    }

    /// Clears the slot owning `id` if present. Safe to call twice: a session
    /// cleaning up after itself may race a broadcast-triggered eviction or
    /// the shutdown drain.
    pub fn remove(&self, id: ConnId) -> Option<ClientRecord> {
        let mut slots = self.slots.lock().expect("registry lock poisoned");
        slots
            .iter_mut()
            .find(|slot| matches!(slot, Some(record) if record.id == id))
            .and_then(Option::take)
    }

    /// Point-in-time copy of all occupied slots, minus the excluded id.
    pub fn snapshot(&self, excluding: Option<ConnId>) -> Vec<ClientRecord> {
        let slots = self.slots.lock().expect("registry lock poisoned");
        slots
            .iter()
            .flatten()
            .filter(|record| Some(record.id) != excluding)
            .cloned()
            .collect()
    }

    /// Takes every occupied slot, leaving the table empty.
    pub fn drain(&self) -> Vec<ClientRecord> {
        let mut slots = self.slots.lock().expect("registry lock poisoned");
        slots.iter_mut().filter_map(Option::take).collect()
    }

    pub fn count(&self) -> usize {
        let slots = self.slots.lock().expect("registry lock poisoned");
        slots.iter().flatten().count()
    }

    pub fn capacity(&self) -> usize {
        self.slots.lock().expect("registry lock poisoned").len()
    }
}
