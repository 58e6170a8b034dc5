//! Producer façade over a journal.
//!
//! [`LogTree`] hands out loggers bound to a DN. Every logger call builds an
//! entry, appends it to the journal and fans it out to live readers.

use std::collections::HashMap;
use std::panic::Location;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::config::JournalConfig;
use crate::dn::Dn;
use crate::entry::LogEntry;
use crate::error::LogTreeResult;
use crate::journal::Journal;
use crate::payload::{ExternalLeveledPayload, LeveledPayload, RawLine};
use crate::read::{self, LogReader, ReadOptions};
use crate::severity::{Severity, VerbosityLevel};

struct TreeInner {
    journal: Journal,
    /// Per-DN verbosity. DNs not present are at level 0.
    verbosity: RwLock<HashMap<Dn, VerbosityLevel>>,
}

/// A tree of loggers addressed by DN, backed by a single journal.
///
/// Cloning is cheap; all clones share the same journal.
///
/// # Example
///
/// ```ignore
/// use logtree_core::{Backlog, LogTree, ReadOptions};
///
/// let tree = LogTree::new();
/// tree.leveled_for("net.dhcp")?.info("lease acquired");
///
/// let reader = tree.read("net", ReadOptions::new().with_children().with_backlog(Backlog::All))?;
/// for entry in &reader.backlog {
///     println!("{entry}");
/// }
/// ```
#[derive(Clone)]
pub struct LogTree {
    inner: Arc<TreeInner>,
}

impl LogTree {
    pub fn new() -> Self {
        Self::with_config(JournalConfig::default())
    }

    pub fn with_config(config: JournalConfig) -> Self {
        Self {
            inner: Arc::new(TreeInner {
                journal: Journal::new(config),
                verbosity: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// The journal backing this tree.
    pub fn journal(&self) -> &Journal {
        &self.inner.journal
    }

    /// Logger emitting leveled messages at `dn`.
    pub fn leveled_for(&self, dn: impl AsRef<str>) -> LogTreeResult<LeveledLogger> {
        Ok(LeveledLogger {
            tree: self.clone(),
            dn: Dn::new(dn)?,
        })
    }

    /// Logger emitting raw lines at `dn`.
    pub fn raw_for(&self, dn: impl AsRef<str>) -> LogTreeResult<RawLogger> {
        Ok(RawLogger {
            tree: self.clone(),
            dn: Dn::new(dn)?,
        })
    }

    /// Like [`leveled_for`](LogTree::leveled_for), for DNs known to be valid.
    ///
    /// # Panics
    ///
    /// If `dn` is not a valid DN.
    pub fn must_leveled_for(&self, dn: impl AsRef<str>) -> LeveledLogger {
        match self.leveled_for(dn) {
            Ok(logger) => logger,
            Err(e) => panic!("leveled_for returned: {e}"),
        }
    }

    /// Like [`raw_for`](LogTree::raw_for), for DNs known to be valid.
    ///
    /// # Panics
    ///
    /// If `dn` is not a valid DN.
    pub fn must_raw_for(&self, dn: impl AsRef<str>) -> RawLogger {
        match self.raw_for(dn) {
            Ok(logger) => logger,
            Err(e) => panic!("raw_for returned: {e}"),
        }
    }

    /// Set the verbosity of a single DN. Does not affect DNs below it.
    pub fn set_verbosity(&self, dn: &Dn, level: VerbosityLevel) {
        self.inner.verbosity.write().insert(dn.clone(), level);
    }

    pub fn verbosity(&self, dn: &Dn) -> VerbosityLevel {
        self.inner.verbosity.read().get(dn).copied().unwrap_or(0)
    }

    /// Insert a leveled payload coming from a foreign source. The payload is
    /// sanitized on the way in.
    pub fn log_external(&self, dn: &Dn, payload: ExternalLeveledPayload) {
        self.publish(LogEntry::leveled(dn.clone(), payload.into()));
    }

    /// Append an already built entry and fan it out.
    pub fn publish(&self, entry: LogEntry) {
        self.inner.journal.append(entry.clone());
        self.inner.journal.notify(&entry);
    }

    /// Read entries at `dn` (and below, with
    /// [`with_children`](ReadOptions::with_children)).
    pub fn read(&self, dn: impl AsRef<str>, opts: ReadOptions) -> LogTreeResult<LogReader> {
        let dn = Dn::new(dn)?;
        read::read(&self.inner.journal, &dn, &opts)
    }
}

impl Default for LogTree {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for LogTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogTree")
            .field("journal", &self.inner.journal)
            .finish()
    }
}

/// Logger emitting leveled messages at a fixed DN.
///
/// The file and line of the calling code are recorded with every message.
#[derive(Clone, Debug)]
pub struct LeveledLogger {
    tree: LogTree,
    dn: Dn,
}

impl LeveledLogger {
    pub fn dn(&self) -> &Dn {
        &self.dn
    }

    #[track_caller]
    pub fn info(&self, msg: impl AsRef<str>) {
        self.emit(Severity::Info, msg.as_ref(), Location::caller());
    }

    #[track_caller]
    pub fn warning(&self, msg: impl AsRef<str>) {
        self.emit(Severity::Warning, msg.as_ref(), Location::caller());
    }

    #[track_caller]
    pub fn error(&self, msg: impl AsRef<str>) {
        self.emit(Severity::Error, msg.as_ref(), Location::caller());
    }

    /// Log at FATAL and terminate the process with exit status 1.
    #[track_caller]
    pub fn fatal(&self, msg: impl AsRef<str>) -> ! {
        self.emit(Severity::Fatal, msg.as_ref(), Location::caller());
        std::process::exit(1)
    }

    /// Log at any severity. Unlike [`fatal`](LeveledLogger::fatal), logging at
    /// FATAL through here does not terminate the process.
    #[track_caller]
    pub fn log(&self, severity: Severity, msg: impl AsRef<str>) {
        self.emit(severity, msg.as_ref(), Location::caller());
    }

    /// Logger that only emits if this DN's verbosity is at least `level`.
    pub fn v(&self, level: VerbosityLevel) -> VerboseLogger {
        VerboseLogger {
            enabled: self.tree.verbosity(&self.dn) >= level,
            logger: self.clone(),
        }
    }

    fn emit(&self, severity: Severity, msg: &str, location: &Location<'_>) {
        let payload = LeveledPayload::new(severity, msg, location.file(), location.line());
        self.tree.publish(LogEntry::leveled(self.dn.clone(), payload));
    }
}

/// Leveled logger gated on verbosity, obtained from [`LeveledLogger::v`].
///
/// The gate is evaluated once, when the verbose logger is created.
#[derive(Clone, Debug)]
pub struct VerboseLogger {
    logger: LeveledLogger,
    enabled: bool,
}

impl VerboseLogger {
    /// Whether messages logged through this logger are recorded. Useful to
    /// skip building expensive messages.
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    #[track_caller]
    pub fn info(&self, msg: impl AsRef<str>) {
        if self.enabled {
            self.logger
                .emit(Severity::Info, msg.as_ref(), Location::caller());
        }
    }
}

/// Logger emitting raw lines at a fixed DN.
#[derive(Clone, Debug)]
pub struct RawLogger {
    tree: LogTree,
    dn: Dn,
}

impl RawLogger {
    pub fn dn(&self) -> &Dn {
        &self.dn
    }

    pub fn emit(&self, line: RawLine) {
        self.tree.publish(LogEntry::raw(self.dn.clone(), line));
    }

    pub fn emit_str(&self, line: &str) {
        self.emit(RawLine::new(line));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::Backlog;

    fn all_at(tree: &LogTree, dn: &str) -> Vec<LogEntry> {
        tree.read(dn, ReadOptions::new().with_backlog(Backlog::All))
            .unwrap()
            .backlog.clone()
    }

    #[test]
    fn test_leveled_logger_records_location() {
        let tree = LogTree::new();
        let log = tree.leveled_for("main").unwrap();
        log.info("\nhello\nworld\n");
        let line = line!() - 1;

        let entries = all_at(&tree, "main");
        assert_eq!(entries.len(), 1);
        let p = entries[0].as_leveled().unwrap();
        assert_eq!(p.messages(), &["hello".to_string(), "world".to_string()]);
        assert_eq!(p.severity(), Severity::Info);
        assert_eq!(p.file(), "tree.rs");
        assert_eq!(p.line(), line);
    }

    #[test]
    fn test_severities() {
        let tree = LogTree::new();
        let log = tree.must_leveled_for("main");
        log.info("i");
        log.warning("w");
        log.error("e");
        log.log(Severity::Fatal, "f");

        let got: Vec<_> = all_at(&tree, "main")
            .iter()
            .filter_map(LogEntry::severity)
            .collect();
        assert_eq!(got, Severity::ALL.to_vec());
    }

    #[test]
    fn test_invalid_dn() {
        let tree = LogTree::new();
        assert!(tree.leveled_for("a..b").is_err());
        assert!(tree.raw_for(".a").is_err());
        assert!(tree.read("a.", ReadOptions::new()).is_err());
    }

    #[test]
    #[should_panic(expected = "leveled_for returned")]
    fn test_must_leveled_for_panics() {
        LogTree::new().must_leveled_for("a..b");
    }

    #[test]
    fn test_verbosity() {
        let tree = LogTree::new();
        let dn = Dn::new("svc").unwrap();
        let log = tree.leveled_for("svc").unwrap();

        assert!(log.v(0).enabled());
        assert!(!log.v(1).enabled());
        log.v(1).info("hidden");

        tree.set_verbosity(&dn, 2);
        assert_eq!(tree.verbosity(&dn), 2);
        log.v(2).info("shown");
        // Not recursive.
        assert!(!tree.leveled_for("svc.child").unwrap().v(1).enabled());

        let msgs: Vec<_> = all_at(&tree, "svc")
            .iter()
            .map(|e| e.as_leveled().unwrap().messages_joined())
            .collect();
        assert_eq!(msgs, vec!["shown"]);
    }

    #[test]
    fn test_raw_logger() {
        let tree = LogTree::new();
        let raw = tree.raw_for("proc").unwrap();
        raw.emit_str("one");
        raw.emit(RawLine::truncated("two", 100));

        let entries = all_at(&tree, "proc");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].as_raw().unwrap().data, "one");
        assert!(entries[1].as_raw().unwrap().is_truncated());
    }

    #[test]
    fn test_log_external_sanitizes() {
        let tree = LogTree::new();
        let dn = Dn::new("ext").unwrap();
        tree.log_external(
            &dn,
            ExternalLeveledPayload {
                message: "a\n\nb".to_string(),
                ..Default::default()
            },
        );

        let entries = all_at(&tree, "ext");
        let p = entries[0].as_leveled().unwrap();
        assert_eq!(p.messages(), &["a".to_string(), String::new(), "b".to_string()]);
        assert_eq!(p.file(), "unknown");
        assert_eq!(p.severity(), Severity::Info);
    }

    #[test]
    fn test_clones_share_journal() {
        let tree = LogTree::new();
        let other = tree.clone();
        other.must_raw_for("x").emit_str("line");
        assert_eq!(tree.journal().len(), 1);
    }
}
