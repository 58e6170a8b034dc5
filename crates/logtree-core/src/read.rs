//! Consumer-facing query API.
//!
//! A read is described by [`ReadOptions`] and answered with a [`LogReader`]
//! holding a backlog of already recorded entries and/or a live stream of new
//! ones.
//!
//! ```text
//!   LogTree::read(dn, opts)
//!        │
//!        ├── filter chain: [kind] → Exact(dn) | Subtree(dn) → [MinSeverity]
//!        │
//!        ├── backlog:  get_entries (exact) | scan_entries (recursive)
//!        │                                          ┐ one write lock
//!        └── stream:   register Subscriber ─────────┘ when both are asked
//! ```
//!
//! Backlog and stream together never miss an entry. An entry appended but not
//! yet fanned out when the read runs is in the backlog and also streamed.

use std::sync::atomic::Ordering;

use tokio::sync::mpsc::error::TryRecvError;

use crate::dn::Dn;
use crate::entry::LogEntry;
use crate::error::{LogTreeError, LogTreeResult};
use crate::filter::Filter;
use crate::journal::{Backlog, Journal, Query};
use crate::severity::Severity;
use crate::subscriber::StreamHandle;

/// Options for a [`LogTree::read`](crate::LogTree::read) call.
///
/// All options are independent and can be combined freely, except
/// [`only_raw`](ReadOptions::only_raw) together with
/// [`only_leveled`](ReadOptions::only_leveled).
///
/// ```ignore
/// let opts = ReadOptions::new()
///     .with_children()
///     .with_backlog(Backlog::Count(100))
///     .min_severity(Severity::Warning);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadOptions {
    children: bool,
    backlog: Option<Backlog>,
    stream: bool,
    only_leveled: bool,
    only_raw: bool,
    min_severity: Option<Severity>,
}

impl ReadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Include entries of all DNs below the requested one.
    pub fn with_children(mut self) -> Self {
        self.children = true;
        self
    }

    /// Return already recorded entries, the most recent ones when limited.
    pub fn with_backlog(mut self, backlog: Backlog) -> Self {
        self.backlog = Some(backlog);
        self
    }

    /// Stream entries appended after the read.
    pub fn with_stream(mut self) -> Self {
        self.stream = true;
        self
    }

    pub fn only_leveled(mut self) -> Self {
        self.only_leveled = true;
        self
    }

    pub fn only_raw(mut self) -> Self {
        self.only_raw = true;
        self
    }

    /// Only return leveled entries at or above `severity`. Ignored for raw
    /// only reads.
    pub fn min_severity(mut self, severity: Severity) -> Self {
        self.min_severity = Some(severity);
        self
    }

    /// Filter chain shared by the backlog and the stream.
    fn filters(&self, dn: &Dn) -> Vec<Filter> {
        let mut filters = Vec::new();
        if self.only_leveled {
            filters.push(Filter::OnlyLeveled);
        }
        if self.only_raw {
            filters.push(Filter::OnlyRaw);
        }
        if self.children {
            filters.push(Filter::subtree(dn.clone()));
        } else {
            filters.push(Filter::Exact(dn.clone()));
        }
        if let Some(severity) = self.min_severity {
            if !self.only_raw {
                filters.push(Filter::MinSeverity(severity));
            }
        }
        filters
    }

    fn wants_backlog(&self) -> Option<Backlog> {
        match self.backlog {
            Some(Backlog::Count(0)) | None => None,
            some => some,
        }
    }
}

pub(crate) fn read(journal: &Journal, dn: &Dn, opts: &ReadOptions) -> LogTreeResult<LogReader> {
    if opts.only_leveled && opts.only_raw {
        return Err(LogTreeError::ConflictingQueryOptions);
    }

    let (backlog, stream) = journal.query(Query {
        dn,
        recursive: opts.children,
        filters: opts.filters(dn),
        backlog: opts.wants_backlog(),
        stream: opts.stream,
    });
    Ok(LogReader { backlog, stream })
}

/// Result of a read: a backlog and, if requested, a live stream.
///
/// A streaming reader must be closed (or dropped) once no longer needed.
/// Closing is lazy: the journal only forgets about the subscriber the next
/// time an entry is fanned out, so a closed reader may still count towards
/// [`Journal::subscriber_count`] for a while.
#[derive(Debug)]
pub struct LogReader {
    /// Entries recorded before the read, oldest first.
    pub backlog: Vec<LogEntry>,
    stream: Option<StreamHandle>,
}

impl LogReader {
    /// Whether this reader was created with a stream that has not been
    /// closed yet.
    pub fn is_streaming(&self) -> bool {
        self.stream
            .as_ref()
            .is_some_and(|s| !s.cancel.is_cancelled())
    }

    /// Wait for the next streamed entry. Returns None once the stream is
    /// closed and drained, or immediately if the read did not ask for a
    /// stream.
    pub async fn recv(&mut self) -> Option<LogEntry> {
        self.stream.as_mut()?.rx.recv().await
    }

    /// Next streamed entry if one is already buffered.
    pub fn try_recv(&mut self) -> Option<LogEntry> {
        let stream = self.stream.as_mut()?;
        match stream.rx.try_recv() {
            Ok(entry) => Some(entry),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Number of streamed entries dropped because this reader did not keep
    /// up. Always 0 for non-streaming readers.
    pub fn missed(&self) -> u64 {
        self.stream
            .as_ref()
            .map(|s| s.missed.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Stop receiving new entries. Entries already buffered can still be
    /// drained with [`recv`](LogReader::recv). Calling this more than once
    /// has no further effect.
    pub fn close(&mut self) {
        if let Some(stream) = self.stream.as_mut() {
            stream.cancel.cancel();
            stream.rx.close();
        }
    }
}

impl Drop for LogReader {
    fn drop(&mut self) {
        if let Some(stream) = &self.stream {
            stream.cancel.cancel();
        }
    }
}
