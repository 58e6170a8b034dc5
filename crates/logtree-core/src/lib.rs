//! logtree core library
//!
//! An in-memory, hierarchical log journal with bounded per-logger retention
//! and live fan-out to readers.
//!
//! ## Overview
//!
//! Loggers are addressed by Distinguished Names (DNs) such as `net.dhcp`.
//! Producers write leveled messages (Info/Warning/Error/Fatal with source
//! location) or raw lines at a DN. Every DN keeps at most a fixed number of
//! its most recent entries. Consumers read a backlog of recorded entries,
//! optionally including all DNs below the requested one, and/or subscribe to
//! a live stream of new entries.
//!
//! ## Core Principles
//!
//! - **Bounded**: retention is enforced per DN, so a chatty logger cannot
//!   evict the history of a quiet one
//! - **Non-blocking**: producers never wait for slow readers, undelivered
//!   entries are counted instead
//! - **Virtual tree**: the hierarchy is a naming convention, subtree queries
//!   compare DN segments
//!
//! ## Quick Start
//!
//! ```ignore
//! use logtree_core::{Backlog, LogTree, ReadOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let tree = LogTree::new();
//!
//!     let mut reader = tree.read("net", ReadOptions::new().with_children().with_stream())?;
//!
//!     tree.leveled_for("net.dhcp")?.info("lease acquired");
//!     tree.raw_for("net.ntp")?.emit_str("selected source 10.0.0.1");
//!
//!     while let Some(entry) = reader.recv().await {
//!         println!("{entry}");
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod dn;
pub mod entry;
pub mod error;
pub mod filter;
pub mod journal;
pub mod layer;
pub mod payload;
pub mod read;
pub mod severity;
mod subscriber;
pub mod tree;

// Re-exports
pub use config::{JournalConfig, StreamFiltering, DEFAULT_QUOTA, DEFAULT_STREAM_BUFFER};
pub use dn::Dn;
pub use entry::{LogEntry, Payload};
pub use error::{LogTreeError, LogTreeResult};
pub use filter::Filter;
pub use journal::{AppendOutcome, Backlog, EntryId, Journal};
pub use layer::LogTreeLayer;
pub use payload::{ExternalLeveledPayload, LeveledPayload, RawLine};
pub use read::{LogReader, ReadOptions};
pub use severity::{Severity, VerbosityLevel};
pub use tree::{LeveledLogger, LogTree, RawLogger, VerboseLogger};
