//! Payloads carried by journal entries: leveled messages and raw lines.

use std::fmt;

use chrono::{DateTime, Utc};

use crate::error::{LogTreeError, LogTreeResult};
use crate::severity::Severity;

/// A leveled log message (Info/Warning/Error/Fatal) with the metadata that
/// would usually be seen in its textual glog-style representation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeveledPayload {
    /// The logged message split on newlines. Never empty.
    messages: Vec<String>,
    timestamp: DateTime<Utc>,
    severity: Severity,
    /// File name (no directories) of the code that emitted this message.
    file: String,
    line: u32,
}

impl LeveledPayload {
    /// Build a payload timestamped now. Leading and trailing newlines are
    /// stripped, the rest of the message is split into lines.
    pub fn new(severity: Severity, message: &str, file: &str, line: u32) -> Self {
        let messages = message
            .trim_matches('\n')
            .split('\n')
            .map(str::to_string)
            .collect();
        Self {
            messages,
            timestamp: Utc::now(),
            severity,
            file: basename(file).to_string(),
            line,
        }
    }

    pub(crate) fn from_parts(
        messages: Vec<String>,
        timestamp: DateTime<Utc>,
        severity: Severity,
        file: String,
        line: u32,
    ) -> Self {
        let messages = if messages.is_empty() {
            vec![String::new()]
        } else {
            messages
        };
        Self {
            messages,
            timestamp,
            severity,
            file,
            line,
        }
    }

    /// Replace the timestamp, eg. when the event time is known to differ
    /// from the time of construction.
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    /// Message lines joined back with newlines.
    pub fn messages_joined(&self) -> String {
        self.messages.join("\n")
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn file(&self) -> &str {
        &self.file
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    /// `file:line` of the code that emitted this message.
    pub fn location(&self) -> String {
        format!("{}:{}", self.file, self.line)
    }

    /// Canonical glog-style prefix and the message lines, for callers that
    /// lay out multi-line messages themselves.
    ///
    /// For example: `("I1102 17:20:06.921395 foo.rs:42] ", ["current tags:", " - one"])`.
    pub fn strings(&self) -> (String, &[String]) {
        let prefix = format!(
            "{}{} {}:{}] ",
            self.severity,
            self.timestamp.format("%m%d %H:%M:%S%.6f"),
            self.file,
            self.line
        );
        (prefix, &self.messages)
    }
}

impl fmt::Display for LeveledPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (prefix, lines) = self.strings();
        for (i, line) in lines.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}{}", prefix, line)?;
        }
        Ok(())
    }
}

/// Parse a `file:line` location.
pub(crate) fn parse_location(location: &str) -> LogTreeResult<(String, u32)> {
    let (file, line) = location
        .rsplit_once(':')
        .ok_or_else(|| LogTreeError::InvalidLocation(format!("{location:?} has no line number")))?;
    let line = line
        .parse::<u32>()
        .map_err(|e| LogTreeError::InvalidLocation(format!("{location:?}: {e}")))?;
    Ok((file.to_string(), line))
}

fn basename(file: &str) -> &str {
    file.rsplit(['/', '\\']).next().unwrap_or(file)
}

/// A leveled payload received from a foreign source, eg. parsed from the
/// output of a third-party program. It is sanitized when converted into a
/// [`LeveledPayload`], so buggy converters cannot insert malformed entries.
#[derive(Debug, Clone, Default)]
pub struct ExternalLeveledPayload {
    /// Newlines split the message into multiple lines. Empty lines are kept.
    pub message: String,
    /// Defaults to the time of conversion if unset.
    pub timestamp: Option<DateTime<Utc>>,
    /// Defaults to INFO if unset.
    pub severity: Option<Severity>,
    /// Defaults to "unknown" if empty.
    pub file: String,
    /// Zero when unknown.
    pub line: u32,
}

impl From<ExternalLeveledPayload> for LeveledPayload {
    fn from(e: ExternalLeveledPayload) -> Self {
        let file = if e.file.is_empty() {
            "unknown".to_string()
        } else {
            e.file
        };
        LeveledPayload::from_parts(
            e.message.split('\n').map(str::to_string).collect(),
            e.timestamp.unwrap_or_else(Utc::now),
            e.severity.unwrap_or(Severity::Info),
            file,
            e.line,
        )
    }
}

/// A single line of raw (unleveled) output, as produced by a line buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLine {
    /// Line contents, without the trailing newline.
    pub data: String,
    /// Length of the line before any truncation by the producer.
    pub original_length: usize,
}

impl RawLine {
    pub fn new(data: impl Into<String>) -> Self {
        let data = data.into();
        let original_length = data.len();
        Self {
            data,
            original_length,
        }
    }

    /// A line that was cut down from `original_length` bytes.
    pub fn truncated(data: impl Into<String>, original_length: usize) -> Self {
        Self {
            data: data.into(),
            original_length,
        }
    }

    pub fn is_truncated(&self) -> bool {
        self.original_length > self.data.len()
    }
}

impl fmt::Display for RawLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.data)?;
        if self.is_truncated() {
            write!(f, "... (truncated, {} bytes total)", self.original_length)?;
        }
        Ok(())
    }
}
