//! Bounded channels shared between daemons.
//!
//! A [`Channel`] bundles both ends of one tokio `mpsc` queue behind a cloneable handle. The
//! receiver lives behind an async mutex so several consumers can pull from the same queue, which
//! is how cluster workers load-balance: whoever holds the lock when a message arrives takes it.
//!
//! Closing is explicit and idempotent. The sender is dropped from the shared slot, so receivers
//! drain whatever is buffered and then observe end-of-stream.

use std::{
  fmt,
  sync::{Arc, Mutex as StdMutex, PoisonError},
};

use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

use crate::error::{PipelineError, SendError};

/// Capacity used for lazily allocated channels.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1;

/// Channel carrying errors reported by running daemons.
pub type ErrorChannel = Channel<PipelineError>;

pub struct Channel<T> {
  shared: Arc<Shared<T>>,
}

struct Shared<T> {
  tx: StdMutex<Option<mpsc::Sender<T>>>,
  rx: Mutex<mpsc::Receiver<T>>,
  capacity: usize,
}

impl<T> Clone for Channel<T> {
  fn clone(&self) -> Self {
    Self {
      shared: Arc::clone(&self.shared),
    }
  }
}

impl<T> fmt::Debug for Channel<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Channel")
      .field("capacity", &self.shared.capacity)
      .field("closed", &self.is_closed())
      .finish()
  }
}

impl<T> Channel<T> {
  /// Create a channel buffering up to `capacity` messages (at least one).
  pub fn new(capacity: usize) -> Self {
    let capacity = capacity.max(1);
    let (tx, rx) = mpsc::channel(capacity);
    Self {
      shared: Arc::new(Shared {
        tx: StdMutex::new(Some(tx)),
        rx: Mutex::new(rx),
        capacity,
      }),
    }
  }

  pub fn capacity(&self) -> usize {
    self.shared.capacity
  }

  fn sender(&self) -> Option<mpsc::Sender<T>> {
    self.shared.tx.lock().unwrap_or_else(PoisonError::into_inner).clone()
  }

  /// Push a value, waiting for capacity.
  ///
  /// Cancellation wins over a send that could complete at the same time.
  pub async fn send(&self, cancel: &CancellationToken, value: T) -> Result<(), SendError> {
    let Some(tx) = self.sender() else {
      return Err(SendError::Closed);
    };

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(SendError::Cancelled),
        sent = tx.send(value) => sent.map_err(|_| SendError::Closed),
    }
  }

  /// Take the next value.
  ///
  /// Returns `None` once the scope is cancelled or the channel is closed and drained.
  pub async fn recv(&self, cancel: &CancellationToken) -> Option<T> {
    let mut rx = tokio::select! {
        biased;
        _ = cancel.cancelled() => return None,
        guard = self.shared.rx.lock() => guard,
    };

    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        msg = rx.recv() => msg,
    }
  }

  /// Stop accepting new values. Safe to call any number of times.
  pub fn close(&self) {
    self.shared.tx.lock().unwrap_or_else(PoisonError::into_inner).take();
  }

  pub fn is_closed(&self) -> bool {
    self.shared.tx.lock().unwrap_or_else(PoisonError::into_inner).is_none()
  }

  /// True when both handles refer to the same underlying queue.
  pub fn same_channel(&self, other: &Channel<T>) -> bool {
    Arc::ptr_eq(&self.shared, &other.shared)
  }
}

impl<T> Default for Channel<T> {
  fn default() -> Self {
    Self::new(DEFAULT_CHANNEL_CAPACITY)
  }
}
