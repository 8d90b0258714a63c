//! Record types passed between the engine, the factory and the reporting
//! sink.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enums::{PhaseState, Severity, Verbosity};
use crate::ids::PhaseId;

/// A single report: severity, message id, text and the hierarchical
/// context (full component name, or a subsystem name) it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportMessage {
    /// Severity of the report.
    pub severity: Severity,
    /// Short machine-matchable identifier (e.g. `TPRGED`).
    pub id: String,
    /// Human-readable text.
    pub message: String,
    /// Where the report originated.
    pub context: String,
    /// Verbosity used for filtering informational reports.
    pub verbosity: Verbosity,
    /// Wall-clock time when the report was created.
    pub emitted_at: DateTime<Utc>,
}

impl ReportMessage {
    /// Build a report stamped with the current time.
    pub fn new(
        severity: Severity,
        id: impl Into<String>,
        message: impl Into<String>,
        context: impl Into<String>,
        verbosity: Verbosity,
    ) -> Self {
        Self {
            severity,
            id: id.into(),
            message: message.into(),
            context: context.into(),
            verbosity,
            emitted_at: Utc::now(),
        }
    }
}

/// A phase node state transition, delivered to phase listeners.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseStateChange {
    /// The node that changed state.
    pub phase: PhaseId,
    /// The node's full name (e.g. `common.build`, `uvm.uvm_sched.main`).
    pub name: String,
    /// State before the transition.
    pub prev_state: PhaseState,
    /// State after the transition.
    pub state: PhaseState,
    /// Target node when `state` is [`PhaseState::Jumping`].
    pub jump_to: Option<PhaseId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_message_roundtrips_through_json() {
        let msg = ReportMessage::new(
            Severity::Error,
            "OVRDLOOP",
            "Recursive loop detected while finding override.",
            "factory",
            Verbosity::None,
        );
        let json = serde_json::to_string(&msg).ok();
        assert!(json.is_some());
        let back: Option<ReportMessage> =
            json.as_deref().and_then(|j| serde_json::from_str(j).ok());
        assert_eq!(back, Some(msg));
    }
}
