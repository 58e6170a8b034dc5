//! Distinguished Names: dot-delimited addresses of loggers.
//!
//! A DN such as `net.dhcp.client` designates the `client` logger under the
//! `dhcp` logger under the `net` logger under the root. The empty string is
//! the root itself. The hierarchy is a naming convention only: nothing in the
//! journal materializes a tree, subtree membership is decided by comparing
//! segments.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{LogTreeError, LogTreeResult};

/// Distinguished Name of a logger.
///
/// Always valid: every constructor rejects empty segments. Cloning is cheap.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Dn(Arc<str>);

impl Dn {
    /// Validate and wrap a DN string.
    pub fn new(dn: impl AsRef<str>) -> LogTreeResult<Self> {
        let dn = dn.as_ref();
        Self::parse_path(dn)?;
        Ok(Self(Arc::from(dn)))
    }

    /// The root DN (empty string).
    pub fn root() -> Self {
        Self(Arc::from(""))
    }

    /// Split a DN string into its segments. The root yields no segments.
    pub fn parse_path(dn: &str) -> LogTreeResult<Vec<&str>> {
        if dn.is_empty() {
            return Ok(Vec::new());
        }
        let parts: Vec<&str> = dn.split('.').collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(LogTreeError::InvalidDn(dn.to_string()));
        }
        Ok(parts)
    }

    /// Segments of this DN.
    pub fn path(&self) -> Vec<&str> {
        if self.0.is_empty() {
            return Vec::new();
        }
        self.0.split('.').collect()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns true if this DN is `root` or any of its descendants.
    ///
    /// `foo.bar` is in the subtree of `foo.bar` and `foo`, but not of
    /// `foo.ba` or `foo.bar.baz`.
    pub fn is_subtree_of(&self, root: &Dn) -> bool {
        if root.is_root() {
            return true;
        }
        segments_start_with(self.0.split('.'), root.0.split('.'))
    }

    /// Build the DN of a direct child of this DN.
    pub fn child(&self, segment: &str) -> LogTreeResult<Self> {
        if self.is_root() {
            Self::new(segment)
        } else {
            Self::new(format!("{}.{}", self.0, segment))
        }
    }

    /// Parent of this DN, or None for the root.
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind('.') {
            Some(idx) => Some(Self(Arc::from(&self.0[..idx]))),
            None => Some(Self::root()),
        }
    }
}

/// Segment-wise prefix check shared with the subtree filter, which keeps the
/// root's segments pre-split.
pub(crate) fn segments_start_with<'a, 'b>(
    candidate: impl Iterator<Item = &'a str>,
    root: impl IntoIterator<Item = &'b str>,
) -> bool {
    let mut candidate = candidate;
    for want in root {
        match candidate.next() {
            Some(got) if got == want => {}
            _ => return false,
        }
    }
    true
}

impl FromStr for Dn {
    type Err = LogTreeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Dn {
    type Error = LogTreeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl TryFrom<&str> for Dn {
    type Error = LogTreeError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<Dn> for String {
    fn from(dn: Dn) -> Self {
        dn.0.to_string()
    }
}

impl AsRef<str> for Dn {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Dn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Padding flags apply to the DN text, used by entry rendering.
        f.pad(&self.0)
    }
}

impl fmt::Debug for Dn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Dn({:?})", &*self.0)
    }
}
