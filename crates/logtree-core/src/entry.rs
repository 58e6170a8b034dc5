//! Externally visible log entries.
//!
//! A [`LogEntry`] is what producers hand to the journal and what consumers get
//! back from backlogs and streams. It carries no journal bookkeeping (list
//! links, sequence numbers): those live only inside the journal arena.
//!
//! Entries also have a JSON line representation for carrying them between
//! processes:
//!
//! ```text
//! {"dn":"net.dhcp","leveled":{"lines":["lease acquired"],"timestamp":"2026-01-21T14:30:45.123456Z","severity":"I","location":"client.rs:80"}}
//! {"dn":"svc.chronyd","raw":{"data":"selected source 10.0.0.1","original_length":24}}
//! ```

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::dn::Dn;
use crate::error::{LogTreeError, LogTreeResult};
use crate::payload::{parse_location, LeveledPayload, RawLine};
use crate::severity::Severity;

/// Payload of an entry: exactly one of leveled or raw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Leveled(Arc<LeveledPayload>),
    Raw(Arc<RawLine>),
}

/// A single log event at a given DN. Cheap to clone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    dn: Dn,
    payload: Payload,
}

impl LogEntry {
    pub fn leveled(dn: Dn, payload: LeveledPayload) -> Self {
        Self {
            dn,
            payload: Payload::Leveled(Arc::new(payload)),
        }
    }

    pub fn raw(dn: Dn, line: RawLine) -> Self {
        Self {
            dn,
            payload: Payload::Raw(Arc::new(line)),
        }
    }

    /// DN from which this entry was logged.
    pub fn dn(&self) -> &Dn {
        &self.dn
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn as_leveled(&self) -> Option<&LeveledPayload> {
        match &self.payload {
            Payload::Leveled(p) => Some(p),
            Payload::Raw(_) => None,
        }
    }

    pub fn as_raw(&self) -> Option<&RawLine> {
        match &self.payload {
            Payload::Raw(r) => Some(r),
            Payload::Leveled(_) => None,
        }
    }

    pub fn is_leveled(&self) -> bool {
        matches!(self.payload, Payload::Leveled(_))
    }

    pub fn is_raw(&self) -> bool {
        matches!(self.payload, Payload::Raw(_))
    }

    /// Severity of a leveled entry, None for raw entries.
    pub fn severity(&self) -> Option<Severity> {
        self.as_leveled().map(LeveledPayload::severity)
    }

    /// Serialize to a single JSON line (no trailing newline).
    pub fn to_json_line(&self) -> LogTreeResult<String> {
        Ok(serde_json::to_string(&WireEntry::from(self))?)
    }

    /// Parse from a JSON line, validating the DN and the payload.
    pub fn from_json_line(line: &str) -> LogTreeResult<Self> {
        let wire: WireEntry = serde_json::from_str(line)?;
        wire.try_into()
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.payload {
            Payload::Leveled(p) => {
                let (prefix, lines) = p.strings();
                for (i, line) in lines.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "{:<32} {}{}", self.dn, prefix, line)?;
                }
                Ok(())
            }
            Payload::Raw(r) => write!(f, "{:<32} R {}", self.dn, r),
        }
    }
}

/// JSON shape of a LogEntry. DN validity is checked separately so that the
/// error is an InvalidDn rather than a generic deserialization failure.
#[derive(Debug, Serialize, Deserialize)]
struct WireEntry {
    dn: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    leveled: Option<WireLeveled>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    raw: Option<WireRaw>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireLeveled {
    lines: Vec<String>,
    /// RFC 3339, microsecond precision.
    timestamp: String,
    severity: String,
    location: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireRaw {
    data: String,
    #[serde(default)]
    original_length: Option<usize>,
}

impl From<&LogEntry> for WireEntry {
    fn from(e: &LogEntry) -> Self {
        let (leveled, raw) = match &e.payload {
            Payload::Leveled(p) => (
                Some(WireLeveled {
                    lines: p.messages().to_vec(),
                    timestamp: p
                        .timestamp()
                        .to_rfc3339_opts(chrono::SecondsFormat::Micros, true),
                    severity: p.severity().to_string(),
                    location: p.location(),
                }),
                None,
            ),
            Payload::Raw(r) => (
                None,
                Some(WireRaw {
                    data: r.data.clone(),
                    original_length: Some(r.original_length),
                }),
            ),
        };
        Self {
            dn: e.dn.as_str().to_string(),
            leveled,
            raw,
        }
    }
}

impl TryFrom<WireEntry> for LogEntry {
    type Error = LogTreeError;

    fn try_from(w: WireEntry) -> Result<Self, Self::Error> {
        let dn = Dn::new(&w.dn)?;
        match (w.leveled, w.raw) {
            (Some(l), None) => {
                let severity = l.severity.parse::<Severity>()?;
                let (file, line) = parse_location(&l.location)?;
                let timestamp = DateTime::parse_from_rfc3339(&l.timestamp)
                    .map_err(|e| LogTreeError::MalformedEntry(format!("timestamp: {e}")))?
                    .with_timezone(&Utc);
                Ok(LogEntry::leveled(
                    dn,
                    LeveledPayload::from_parts(l.lines, timestamp, severity, file, line),
                ))
            }
            (None, Some(r)) => {
                let original_length = r.original_length.unwrap_or(r.data.len());
                Ok(LogEntry::raw(dn, RawLine::truncated(r.data, original_length)))
            }
            (None, None) => Err(LogTreeError::MalformedEntry(
                "neither leveled nor raw payload set".to_string(),
            )),
            (Some(_), Some(_)) => Err(LogTreeError::MalformedEntry(
                "both leveled and raw payload set".to_string(),
            )),
        }
    }
}
