use super::byte_size::ByteSize;
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

pub const BYTES_PER_MEGABYTE: usize = 1_048_576;

/// Error returned by [`BoundedChannel::send`]. The rejected item is handed back to the caller.
pub enum SendError<T> {
    /// The channel was closed. Sending on a closed channel is a caller bug.
    Closed(T),
    /// The cancellation token fired while the sender was waiting for room.
    Cancelled(T),
}

impl<T> SendError<T> {
    pub fn into_inner(self) -> T {
        match self {
            SendError::Closed(item) | SendError::Cancelled(item) => item,
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, SendError::Closed(_))
    }
}

impl<T> fmt::Debug for SendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendError::Closed(_) => f.write_str("SendError::Closed(..)"),
            SendError::Cancelled(_) => f.write_str("SendError::Cancelled(..)"),
        }
    }
}

impl<T> fmt::Display for SendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendError::Closed(_) => write!(f, "send on closed bounded channel"),
            SendError::Cancelled(_) => write!(f, "send on bounded channel cancelled"),
        }
    }
}

impl<T> std::error::Error for SendError<T> {}

/// Error returned by [`BoundedChannel::recv`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvError {
    /// The channel is closed and every buffered item has been drained.
    Closed,
    Cancelled,
}

impl fmt::Display for RecvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecvError::Closed => write!(f, "bounded channel closed and drained"),
            RecvError::Cancelled => write!(f, "receive on bounded channel cancelled"),
        }
    }
}

impl std::error::Error for RecvError {}

struct ChannelEntry<T> {
    item: T,
    size_bytes: usize,
}

struct ChannelState<T> {
    buffer: VecDeque<ChannelEntry<T>>,
    total_bytes: usize,
    closed: bool,
}

/// FIFO channel bounded by both item count and total byte size.
///
/// A send waits while the buffer already holds `capacity` items or `max_bytes` bytes. The check
/// happens before insertion, so a single item larger than `max_bytes` is still accepted into an
/// empty buffer and then blocks every later send until it is received. Peak usage is therefore
/// `max_bytes` plus the size of the most recently accepted item.
///
/// Closing never drops buffered data: receivers keep draining and only observe
/// [`RecvError::Closed`] once the buffer is empty.
pub struct BoundedChannel<T> {
    state: Mutex<ChannelState<T>>,
    not_full: Notify,
    not_empty: Notify,
    capacity: usize,
    max_bytes: usize,
}

impl<T: ByteSize> BoundedChannel<T> {
    pub fn new(capacity: usize, max_bytes: usize) -> Self {
        Self {
            state: Mutex::new(ChannelState {
                buffer: VecDeque::new(),
                total_bytes: 0,
                closed: false,
            }),
            not_full: Notify::new(),
            not_empty: Notify::new(),
            capacity: capacity.max(1),
            max_bytes: max_bytes.max(1),
        }
    }

    pub async fn send(&self, item: T, cancel: &CancellationToken) -> Result<(), SendError<T>> {
        let size_bytes = item.byte_size();
        loop {
            let notified = self.not_full.notified();
            {
                let mut state = self.lock();
                if state.closed {
                    return Err(SendError::Closed(item));
                }

                if !self.is_full(&state) {
                    state.buffer.push_back(ChannelEntry { item, size_bytes });
                    state.total_bytes = state.total_bytes.saturating_add(size_bytes);
                    drop(state);
                    self.not_empty.notify_waiters();
                    return Ok(());
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(SendError::Cancelled(item)),
                _ = notified => {}
            }
        }
    }

    pub async fn recv(&self, cancel: &CancellationToken) -> Result<T, RecvError> {
        loop {
            let notified = self.not_empty.notified();
            {
                let mut state = self.lock();
                if let Some(entry) = state.buffer.pop_front() {
                    state.total_bytes = state.total_bytes.saturating_sub(entry.size_bytes);
                    drop(state);
                    self.not_full.notify_waiters();
                    return Ok(entry.item);
                }

                if state.closed {
                    return Err(RecvError::Closed);
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(RecvError::Cancelled),
                _ = notified => {}
            }
        }
    }

    /// Pops the oldest item without waiting. An empty open channel also reports
    /// [`RecvError::Closed`]; use [`BoundedChannel::is_closed`] to tell the two apart.
    pub fn try_recv(&self) -> Result<T, RecvError> {
        let mut state = self.lock();
        let Some(entry) = state.buffer.pop_front() else {
            return Err(RecvError::Closed);
        };
        state.total_bytes = state.total_bytes.saturating_sub(entry.size_bytes);
        drop(state);
        self.not_full.notify_waiters();
        Ok(entry.item)
    }
}

impl<T> BoundedChannel<T> {
    /// Marks the channel closed and wakes every blocked sender and receiver. Idempotent.
    pub fn close(&self) {
        {
            let mut state = self.lock();
            if state.closed {
                return;
            }
            state.closed = true;
        }
        self.not_full.notify_waiters();
        self.not_empty.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn len(&self) -> usize {
        self.lock().buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().buffer.is_empty()
    }

    pub fn bytes(&self) -> usize {
        self.lock().total_bytes
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    fn is_full(&self, state: &ChannelState<T>) -> bool {
        state.buffer.len() >= self.capacity || state.total_bytes >= self.max_bytes
    }

    fn lock(&self) -> MutexGuard<'_, ChannelState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
