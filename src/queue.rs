// Blocking admission is handled by semaphores; the ring itself sits behind a
// plain mutex that is only held for the index bookkeeping.
use std::fmt;
use std::sync::Mutex;

use tokio::sync::Semaphore;

/// Maximum content bytes of a single message; the line terminator is extra.
pub const MAX_MESSAGE_BYTES: usize = 1023;

/// An immutable text payload, as stored in the queue and relayed to peers.
///
/// Construction trims trailing line terminators and silently truncates the
/// rest to [`MAX_MESSAGE_BYTES`] on a char boundary. There is no way to hold
/// an empty `Message`; producers drop empty lines instead of storing them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message(String);

impl Message {
    pub fn new(text: &str) -> Option<Message> {
        let trimmed = text.trim_end_matches(['\r', '\n']);
        if trimmed.is_empty() {
            return None;
        }
        let mut end = trimmed.len().min(MAX_MESSAGE_BYTES);
        while !trimmed.is_char_boundary(end) {
            end -= 1;
        }
        Some(Message(trimmed[..end].to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A fixed-capacity FIFO queue with blocking push and pop.
///
/// `push` suspends the calling task while the queue is full, `pop` while it
/// is empty. Delivery order is the order in which pushes claimed their slot,
/// across all producers. Capacity is fixed at construction; the queue never
/// drops or grows on overflow.
pub struct BoundedQueue<T> {
    ring: Mutex<Ring<T>>,
    /// Permits for free slots; a push consumes one, a pop returns one.
    space: Semaphore,
    /// Permits for queued items; a pop consumes one, a push returns one.
    items: Semaphore,
    capacity: usize,
}

struct Ring<T> {
    buf: Box<[Option<T>]>,
    head: usize,
    tail: usize,
    size: usize,
}

impl<T> BoundedQueue<T> {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "queue capacity must be at least 1");
        BoundedQueue {
            ring: Mutex::new(Ring {
                buf: (0..capacity).map(|_| None).collect(),
                head: 0,
                tail: 0,
                size: 0,
            }),
            space: Semaphore::new(capacity),
            items: Semaphore::new(0),
            capacity,
        }
    }

    /// Appends `item` at the tail, waiting while the queue is full.
    pub async fn push(&self, item: T) {
        let permit = self.space.acquire().await.expect("queue semaphore closed");
        permit.forget();
        {
            let mut ring = self.ring.lock().expect("queue lock poisoned");
            let capacity = ring.buf.len();
            debug_assert!(ring.size < capacity);
            let tail = ring.tail;
            ring.buf[tail] = Some(item);
            ring.tail = (tail + 1) % capacity;
            ring.size += 1;
        }
        self.items.add_permits(1);
    }

    /// Removes and returns the head item, waiting while the queue is empty.
    pub async fn pop(&self) -> T {
        let permit = self.items.acquire().await.expect("queue semaphore closed");
        permit.forget();
        let item = {
            let mut ring = self.ring.lock().expect("queue lock poisoned");
            let capacity = ring.buf.len();
            let head = ring.head;
            let item = ring.buf[head].take().expect("queued slot must be occupied");
            ring.head = (head + 1) % capacity;
            ring.size -= 1;
            item
        };
        self.space.add_permits(1);
        item
    }

    pub fn len(&self) -> usize {
        self.ring.lock().expect("queue lock poisoned").size
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
