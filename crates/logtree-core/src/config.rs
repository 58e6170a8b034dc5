//! Journal configuration: retention quotas and stream delivery.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::dn::Dn;
use crate::error::LogTreeResult;

/// Default maximum number of entries retained per DN.
pub const DEFAULT_QUOTA: u64 = 8192;

/// Default capacity of a stream's delivery channel.
pub const DEFAULT_STREAM_BUFFER: usize = 128;

/// Whether live streams honour their reader's filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamFiltering {
    /// Every live stream receives every appended entry; filters only shape
    /// backlogs. This is the historical behaviour consumers may rely on.
    #[default]
    Unfiltered,
    /// Streams only receive entries that pass the reader's filter chain, the
    /// same way backlogs do.
    Filtered,
}

/// Configuration of a journal.
///
/// # Example
///
/// ```ignore
/// use logtree_core::{JournalConfig, LogTree, StreamFiltering};
///
/// let mut config = JournalConfig::default();
/// config.stream_filtering = StreamFiltering::Filtered;
/// config.quota_overrides.insert("kernel".parse()?, 32768);
/// let tree = LogTree::with_config(config);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JournalConfig {
    /// Retention ceiling for DNs without an override.
    pub default_quota: u64,

    /// Per-DN retention ceilings. Consulted only when a DN's quota record is
    /// created, ie. on the first entry ever appended there.
    pub quota_overrides: HashMap<Dn, u64>,

    /// Capacity of each stream's delivery channel. Entries that do not fit
    /// are counted as missed.
    pub stream_buffer: usize,

    pub stream_filtering: StreamFiltering,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            default_quota: DEFAULT_QUOTA,
            quota_overrides: HashMap::new(),
            stream_buffer: DEFAULT_STREAM_BUFFER,
            stream_filtering: StreamFiltering::default(),
        }
    }
}

impl JournalConfig {
    /// Load a configuration from a JSON file. Missing fields take their
    /// defaults.
    pub fn from_file(path: impl AsRef<Path>) -> LogTreeResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Retention ceiling for a newly seen DN. At least 1, so that an append
    /// never evicts the entry it just inserted.
    pub fn quota_for(&self, dn: &Dn) -> u64 {
        self.quota_overrides
            .get(dn)
            .copied()
            .unwrap_or(self.default_quota)
            .max(1)
    }

    /// Channel capacity, at least 1 (a zero-capacity channel cannot be
    /// created).
    pub fn stream_buffer(&self) -> usize {
        self.stream_buffer.max(1)
    }
}
