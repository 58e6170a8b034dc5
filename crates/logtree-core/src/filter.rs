//! Entry predicates used by backlog scans and subscribers.

use crate::dn::{segments_start_with, Dn};
use crate::entry::LogEntry;
use crate::severity::Severity;

/// A predicate that accepts the log entries a reader is interested in.
///
/// Filter chains are AND-combined: an entry passes a chain only if it passes
/// every filter in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    /// Accepts everything.
    All,
    /// Accepts entries logged at exactly this DN. Prefer the journal's local
    /// list traversal over scanning with this filter.
    Exact(Dn),
    /// Accepts entries at this DN and all DNs below it. The root's segments
    /// are kept pre-split for cheaper repeated comparison; `root` itself is
    /// only kept for `Debug` output and equality.
    Subtree { root: Dn, segments: Vec<String> },
    /// Accepts leveled entries at this severity or above. Raw entries never
    /// pass.
    MinSeverity(Severity),
    OnlyLeveled,
    OnlyRaw,
}

impl Filter {
    pub fn subtree(root: Dn) -> Self {
        if root.is_root() {
            return Filter::All;
        }
        let segments = root.path().into_iter().map(str::to_string).collect();
        Filter::Subtree { root, segments }
    }

    pub fn matches(&self, entry: &LogEntry) -> bool {
        match self {
            Filter::All => true,
            Filter::Exact(dn) => entry.dn() == dn,
            Filter::Subtree { segments, .. } => segments_start_with(
                entry.dn().as_str().split('.'),
                segments.iter().map(String::as_str),
            ),
            Filter::MinSeverity(min) => entry.severity().is_some_and(|s| s.at_least(*min)),
            Filter::OnlyLeveled => entry.is_leveled(),
            Filter::OnlyRaw => entry.is_raw(),
        }
    }
}

/// Returns true if the entry passes every filter in the chain.
pub fn matches_all(filters: &[Filter], entry: &LogEntry) -> bool {
    filters.iter().all(|f| f.matches(entry))
}
