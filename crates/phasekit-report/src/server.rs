//! The report server: filtering, counting and forwarding.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;

use phasekit_types::{ReportMessage, Severity, Verbosity};
use serde::Serialize;

use crate::sink::ReportSink;

/// Severity and id totals at a point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReportSummary {
    /// Number of delivered reports per severity.
    pub by_severity: BTreeMap<Severity, u32>,
    /// Number of delivered reports per id.
    pub by_id: BTreeMap<String, u32>,
    /// Whether the error count reached the configured quit count.
    pub quit_count_reached: bool,
}

impl ReportSummary {
    /// Count for one severity (0 if none were delivered).
    pub fn count(&self, severity: Severity) -> u32 {
        self.by_severity.get(&severity).copied().unwrap_or(0)
    }

    /// Render the summary as human-readable lines.
    pub fn render(&self) -> String {
        let mut out = String::from("--- Report Summary ---\n\n** Report counts by severity\n");
        for severity in Severity::ALL {
            out.push_str(&format!("{severity} : {}\n", self.count(severity)));
        }
        if !self.by_id.is_empty() {
            out.push_str("** Report counts by id\n");
            for (id, count) in &self.by_id {
                out.push_str(&format!("[{id}] {count}\n"));
            }
        }
        out
    }
}

/// Counts every report by severity and id and forwards it to a sink.
///
/// The server is shared (via `Rc`) by the factory, the phase engine and
/// every component context. Interior mutability keeps the API `&self`;
/// the framework runs on one thread.
pub struct ReportServer {
    /// Where reports go after filtering.
    sink: Box<dyn ReportSink>,
    /// Informational reports above this verbosity are dropped.
    verbosity: Cell<Verbosity>,
    /// Error count at which the quit threshold is considered reached
    /// (0 = never).
    max_quit_count: Cell<u32>,
    /// Delivered counts per severity.
    by_severity: RefCell<BTreeMap<Severity, u32>>,
    /// Delivered counts per id.
    by_id: RefCell<BTreeMap<String, u32>>,
}

impl core::fmt::Debug for ReportServer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ReportServer")
            .field("verbosity", &self.verbosity.get())
            .field("max_quit_count", &self.max_quit_count.get())
            .field("by_severity", &self.by_severity.borrow())
            .finish_non_exhaustive()
    }
}

impl ReportServer {
    /// Create a server forwarding to `sink`, with the default verbosity
    /// and no quit count.
    pub fn new(sink: impl ReportSink + 'static) -> Self {
        Self {
            sink: Box::new(sink),
            verbosity: Cell::new(Verbosity::default()),
            max_quit_count: Cell::new(0),
            by_severity: RefCell::new(BTreeMap::new()),
            by_id: RefCell::new(BTreeMap::new()),
        }
    }

    /// Current verbosity threshold.
    pub fn verbosity(&self) -> Verbosity {
        self.verbosity.get()
    }

    /// Change the verbosity threshold.
    pub fn set_verbosity(&self, verbosity: Verbosity) {
        self.verbosity.set(verbosity);
    }

    /// Current quit count (0 = unlimited).
    pub fn max_quit_count(&self) -> u32 {
        self.max_quit_count.get()
    }

    /// Set the number of errors after which the run should stop.
    pub fn set_max_quit_count(&self, count: u32) {
        self.max_quit_count.set(count);
    }

    /// Whether a report of this severity and verbosity would be delivered.
    pub fn is_enabled(&self, severity: Severity, verbosity: Verbosity) -> bool {
        severity != Severity::Info || verbosity <= self.verbosity.get()
    }

    /// Filter, count and forward one report.
    ///
    /// Returns `true` if the report was delivered.
    pub fn report(&self, message: &ReportMessage) -> bool {
        if !self.is_enabled(message.severity, message.verbosity) {
            return false;
        }
        {
            let mut by_severity = self.by_severity.borrow_mut();
            let count = by_severity.entry(message.severity).or_insert(0);
            *count = count.saturating_add(1);
        }
        {
            let mut by_id = self.by_id.borrow_mut();
            let count = by_id.entry(message.id.clone()).or_insert(0);
            *count = count.saturating_add(1);
        }
        self.sink.deliver(message);
        true
    }

    /// Report at [`Severity::Info`].
    pub fn info(&self, id: &str, message: &str, context: &str, verbosity: Verbosity) {
        self.report(&ReportMessage::new(Severity::Info, id, message, context, verbosity));
    }

    /// Report at [`Severity::Warning`].
    pub fn warning(&self, id: &str, message: &str, context: &str) {
        self.report(&ReportMessage::new(
            Severity::Warning,
            id,
            message,
            context,
            Verbosity::None,
        ));
    }

    /// Report at [`Severity::Error`].
    pub fn error(&self, id: &str, message: &str, context: &str) {
        self.report(&ReportMessage::new(
            Severity::Error,
            id,
            message,
            context,
            Verbosity::None,
        ));
    }

    /// Report at [`Severity::Fatal`]. The caller is responsible for
    /// aborting the run.
    pub fn fatal(&self, id: &str, message: &str, context: &str) {
        self.report(&ReportMessage::new(
            Severity::Fatal,
            id,
            message,
            context,
            Verbosity::None,
        ));
    }

    /// Number of delivered reports of one severity.
    pub fn severity_count(&self, severity: Severity) -> u32 {
        self.by_severity.borrow().get(&severity).copied().unwrap_or(0)
    }

    /// Number of delivered reports with one id.
    pub fn id_count(&self, id: &str) -> u32 {
        self.by_id.borrow().get(id).copied().unwrap_or(0)
    }

    /// Whether the error count reached the configured quit count.
    pub fn quit_count_reached(&self) -> bool {
        let max = self.max_quit_count.get();
        max > 0 && self.severity_count(Severity::Error) >= max
    }

    /// Reset every counter (verbosity and quit count are kept).
    pub fn reset_counts(&self) {
        self.by_severity.borrow_mut().clear();
        self.by_id.borrow_mut().clear();
    }

    /// Snapshot of the current counts.
    pub fn summary(&self) -> ReportSummary {
        ReportSummary {
            by_severity: self.by_severity.borrow().clone(),
            by_id: self.by_id.borrow().clone(),
            quit_count_reached: self.quit_count_reached(),
        }
    }

    /// Deliver the rendered summary to the sink (uncounted) and return it.
    pub fn summarize(&self) -> ReportSummary {
        let summary = self.summary();
        self.sink.deliver(&ReportMessage::new(
            Severity::Info,
            "SUMMARY",
            summary.render(),
            "report_server",
            Verbosity::None,
        ));
        summary
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;

    fn server() -> (ReportServer, MemorySink) {
        let sink = MemorySink::new();
        (ReportServer::new(sink.clone()), sink)
    }

    #[test]
    fn counts_by_severity_and_id() {
        let (server, _sink) = server();
        server.warning("TPRGED", "dup", "factory");
        server.warning("TPRGED", "dup again", "factory");
        server.error("OVRDLOOP", "loop", "factory");

        assert_eq!(server.severity_count(Severity::Warning), 2);
        assert_eq!(server.severity_count(Severity::Error), 1);
        assert_eq!(server.severity_count(Severity::Fatal), 0);
        assert_eq!(server.id_count("TPRGED"), 2);
    }

    #[test]
    fn info_above_threshold_is_filtered() {
        let (server, sink) = server();
        server.set_verbosity(Verbosity::Low);
        server.info("A", "shown", "ctx", Verbosity::Low);
        server.info("B", "hidden", "ctx", Verbosity::High);

        assert_eq!(sink.messages().len(), 1);
        assert_eq!(server.severity_count(Severity::Info), 1);
        assert_eq!(server.id_count("B"), 0);
    }

    #[test]
    fn warnings_ignore_verbosity() {
        let (server, sink) = server();
        server.set_verbosity(Verbosity::None);
        server.warning("W", "always", "ctx");
        assert_eq!(sink.count_id("W"), 1);
    }

    #[test]
    fn quit_count_reached_after_threshold() {
        let (server, _sink) = server();
        assert!(!server.quit_count_reached());
        server.set_max_quit_count(2);
        server.error("E", "one", "ctx");
        assert!(!server.quit_count_reached());
        server.error("E", "two", "ctx");
        assert!(server.quit_count_reached());
    }

    #[test]
    fn summarize_is_not_counted() {
        let (server, sink) = server();
        server.error("E", "one", "ctx");
        let summary = server.summarize();
        assert_eq!(summary.count(Severity::Error), 1);
        assert_eq!(server.severity_count(Severity::Info), 0);
        assert!(sink.contains_id("SUMMARY"));
        assert!(summary.render().contains("ERROR : 1"));
    }

    #[test]
    fn summary_serializes_to_json() {
        let (server, _sink) = server();
        server.fatal("F", "boom", "ctx");
        let json = serde_json::to_value(server.summary()).unwrap();
        assert_eq!(json["by_severity"]["fatal"], 1);
    }
}
