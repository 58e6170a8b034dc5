//! Bridge from `tracing` to a log tree.
//!
//! [`LogTreeLayer`] records every `tracing` event as a leveled entry. The
//! event target becomes the DN below a configurable root, so that
//! `info!(target: "net::dhcp", ...)` under root `app` lands at `app.net.dhcp`.

use std::fmt::Write as FmtWrite;

use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

use crate::dn::Dn;
use crate::entry::LogEntry;
use crate::payload::LeveledPayload;
use crate::severity::Severity;
use crate::tree::LogTree;

/// Targets of this crate's own diagnostics. Recording them would feed the
/// journal's logging back into the journal.
const OWN_TARGET: &str = "logtree_core";

/// A tracing Layer that records events into a [`LogTree`].
///
/// ```ignore
/// use tracing_subscriber::prelude::*;
///
/// let tree = LogTree::new();
/// tracing_subscriber::registry()
///     .with(LogTreeLayer::new(tree.clone(), Dn::new("app")?))
///     .with(tracing_subscriber::fmt::layer())
///     .init();
/// ```
pub struct LogTreeLayer {
    tree: LogTree,
    root: Dn,
}

impl LogTreeLayer {
    pub fn new(tree: LogTree, root: Dn) -> Self {
        Self { tree, root }
    }

    pub fn root(&self) -> &Dn {
        &self.root
    }

    /// DN for an event target: `::` and `.` both separate segments, empty
    /// segments are dropped.
    fn dn_for(&self, target: &str) -> Option<Dn> {
        let mut dn = self.root.as_str().to_string();
        for segment in target
            .split("::")
            .flat_map(|s| s.split('.'))
            .filter(|s| !s.is_empty())
        {
            if !dn.is_empty() {
                dn.push('.');
            }
            dn.push_str(segment);
        }
        Dn::new(dn).ok()
    }
}

fn severity_for(level: &Level) -> Severity {
    match *level {
        Level::ERROR => Severity::Error,
        Level::WARN => Severity::Warning,
        _ => Severity::Info,
    }
}

impl<S> Layer<S> for LogTreeLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let target = metadata.target();
        if target == OWN_TARGET || target.starts_with("logtree_core::") {
            return;
        }
        let Some(dn) = self.dn_for(target) else {
            return;
        };

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let payload = LeveledPayload::new(
            severity_for(metadata.level()),
            &visitor.finish(),
            metadata.file().unwrap_or("unknown"),
            metadata.line().unwrap_or(0),
        );
        self.tree.publish(LogEntry::leveled(dn, payload));
    }
}

/// Renders an event as its message followed by `key=value` pairs.
#[derive(Default)]
struct FieldVisitor {
    message: String,
    fields: String,
}

impl FieldVisitor {
    fn finish(self) -> String {
        match (self.message.is_empty(), self.fields.is_empty()) {
            (_, true) => self.message,
            (true, false) => self.fields,
            (false, false) => format!("{} {}", self.message, self.fields),
        }
    }

    fn push_field(&mut self, name: &str, value: std::fmt::Arguments<'_>) {
        if !self.fields.is_empty() {
            self.fields.push(' ');
        }
        let _ = write!(self.fields, "{}={}", name, value);
    }
}

impl Visit for FieldVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{:?}", value);
        } else {
            self.push_field(field.name(), format_args!("{:?}", value));
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            self.push_field(field.name(), format_args!("{}", value));
        }
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.push_field(field.name(), format_args!("{}", value));
    }
}
