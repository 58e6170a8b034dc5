//! Live stream subscribers.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  Journal                                                     │
//! │  └── subscribers: Vec<Subscriber>                            │
//! │      ├── filters     (same chain as the reader's backlog)    │
//! │      ├── tx          mpsc::Sender<LogEntry>, bounded         │
//! │      ├── cancel      CancellationToken, fired by close()     │
//! │      └── missed      Arc<AtomicU64>, shared with the reader  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Delivery is best-effort: a full channel never blocks the producer, the
//! entry is dropped and counted as missed instead.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

use crate::config::StreamFiltering;
use crate::entry::LogEntry;
use crate::filter::{matches_all, Filter};

/// Outcome of offering an entry to a subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Delivery {
    Sent,
    /// Rejected by the subscriber's filters.
    Filtered,
    /// Channel full, counted as missed.
    Missed,
    /// Subscriber was closed or its receiver dropped; it must be removed.
    Gone,
}

/// The journal's side of a live stream.
pub(crate) struct Subscriber {
    filters: Vec<Filter>,
    tx: mpsc::Sender<LogEntry>,
    cancel: CancellationToken,
    missed: Arc<AtomicU64>,
}

/// The reader's side of a live stream.
#[derive(Debug)]
pub(crate) struct StreamHandle {
    pub(crate) rx: mpsc::Receiver<LogEntry>,
    pub(crate) cancel: CancellationToken,
    pub(crate) missed: Arc<AtomicU64>,
}

impl Subscriber {
    /// Create a subscriber with a delivery channel of the given capacity.
    pub(crate) fn new(filters: Vec<Filter>, buffer: usize) -> (Self, StreamHandle) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let cancel = CancellationToken::new();
        let missed = Arc::new(AtomicU64::new(0));
        let sub = Self {
            filters,
            tx,
            cancel: cancel.clone(),
            missed: missed.clone(),
        };
        (sub, StreamHandle { rx, cancel, missed })
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.cancel.is_cancelled() || self.tx.is_closed()
    }

    /// Offer an entry without blocking.
    pub(crate) fn offer(&self, entry: &LogEntry, mode: StreamFiltering) -> Delivery {
        if self.is_closed() {
            return Delivery::Gone;
        }
        if mode == StreamFiltering::Filtered && !matches_all(&self.filters, entry) {
            return Delivery::Filtered;
        }
        match self.tx.try_send(entry.clone()) {
            Ok(()) => Delivery::Sent,
            Err(TrySendError::Full(_)) => {
                self.missed.fetch_add(1, Ordering::Relaxed);
                Delivery::Missed
            }
            Err(TrySendError::Closed(_)) => Delivery::Gone,
        }
    }
}
