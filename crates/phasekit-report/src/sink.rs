//! Report sinks: where counted reports end up.

use std::cell::RefCell;
use std::rc::Rc;

use phasekit_types::{ReportMessage, Severity};
use tracing::{error, info, warn};

/// Destination for reports that passed verbosity filtering.
///
/// Sinks only format or store; they never influence control flow.
pub trait ReportSink {
    /// Deliver one report.
    fn deliver(&self, message: &ReportMessage);
}

/// Forwards reports to `tracing`, one event per report.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl ReportSink for TracingSink {
    fn deliver(&self, message: &ReportMessage) {
        let id = message.id.as_str();
        let context = message.context.as_str();
        let verbosity = message.verbosity as u32;
        match message.severity {
            Severity::Info => {
                info!(id, context, verbosity, "{}", message.message);
            }
            Severity::Warning => {
                warn!(id, context, "{}", message.message);
            }
            Severity::Error | Severity::Fatal => {
                error!(id, context, severity = %message.severity, "{}", message.message);
            }
        }
    }
}

/// Keeps every delivered report in memory.
///
/// Cloning the sink shares the underlying buffer, so a test can hand one
/// clone to the server and inspect the other.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    messages: Rc<RefCell<Vec<ReportMessage>>>,
}

impl MemorySink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all delivered reports, oldest first.
    pub fn messages(&self) -> Vec<ReportMessage> {
        self.messages.borrow().clone()
    }

    /// Number of delivered reports carrying the given id.
    pub fn count_id(&self, id: &str) -> usize {
        self.messages.borrow().iter().filter(|m| m.id == id).count()
    }

    /// Whether any delivered report carries the given id.
    pub fn contains_id(&self, id: &str) -> bool {
        self.count_id(id) > 0
    }

    /// Drop all stored reports.
    pub fn clear(&self) {
        self.messages.borrow_mut().clear();
    }
}

impl ReportSink for MemorySink {
    fn deliver(&self, message: &ReportMessage) {
        self.messages.borrow_mut().push(message.clone());
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use phasekit_types::Verbosity;

    use super::*;

    #[test]
    fn memory_sink_clones_share_storage() {
        let sink = MemorySink::new();
        let handle = sink.clone();
        sink.deliver(&ReportMessage::new(
            Severity::Warning,
            "TPRGED",
            "duplicate",
            "factory",
            Verbosity::None,
        ));
        assert_eq!(handle.messages().len(), 1);
        assert!(handle.contains_id("TPRGED"));
        handle.clear();
        assert!(sink.messages().is_empty());
    }

    #[test]
    fn tracing_sink_accepts_every_severity() {
        let sink = TracingSink;
        for severity in Severity::ALL {
            sink.deliver(&ReportMessage::new(severity, "ID", "text", "ctx", Verbosity::Low));
        }
    }
}
