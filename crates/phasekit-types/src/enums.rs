//! Enumeration types shared across the Phasekit workspace.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Phase node state
// ---------------------------------------------------------------------------

/// The state of a single phase graph node.
///
/// The declaration order is the transition order. A node only moves
/// forward through this list, except for the [`PhaseState::Jumping`]
/// excursion and the reset performed when a jump clears successors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PhaseState {
    /// Not yet scheduled (also the state a node is reset to by a jump).
    Uninitialized,
    /// Placed in the hopper; waiting for its predecessors to finish.
    Scheduled,
    /// Waiting for nodes it is synchronized with to reach `Syncing`.
    Syncing,
    /// `phase_started` callbacks are running.
    Started,
    /// The phase body is running.
    Executing,
    /// `phase_ready_to_end` callbacks are running; objections are polled.
    ReadyToEnd,
    /// `phase_ended` callbacks are running.
    Ended,
    /// Task bodies still alive for this node are being killed.
    Cleanup,
    /// The node is finished.
    Done,
    /// The node is relocating execution to a jump target.
    Jumping,
}

impl PhaseState {
    /// Whether the node is inside its active window (`Started..=Cleanup`).
    ///
    /// Active nodes are the ones a domain jump relocates.
    pub const fn is_active(self) -> bool {
        matches!(
            self,
            Self::Started | Self::Executing | Self::ReadyToEnd | Self::Ended | Self::Cleanup
        )
    }

    /// Whether a node in this state may be asked to jump.
    pub const fn can_jump(self) -> bool {
        matches!(self, Self::Started | Self::Executing | Self::ReadyToEnd)
    }
}

impl core::fmt::Display for PhaseState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            Self::Uninitialized => "UNINITIALIZED",
            Self::Scheduled => "SCHEDULED",
            Self::Syncing => "SYNCING",
            Self::Started => "STARTED",
            Self::Executing => "EXECUTING",
            Self::ReadyToEnd => "READY_TO_END",
            Self::Ended => "ENDED",
            Self::Cleanup => "CLEANUP",
            Self::Done => "DONE",
            Self::Jumping => "JUMPING",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Phase node type
// ---------------------------------------------------------------------------

/// The structural role of a node in the phase graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseType {
    /// A schedulable phase wrapping a phase implementation.
    Node,
    /// The begin marker of a schedule (a container with no action).
    Schedule,
    /// The begin marker of a domain (a named, independently scheduled graph).
    Domain,
    /// The end marker paired with a schedule or domain begin marker.
    Terminal,
}

/// How a phase implementation walks the component hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Traversal {
    /// Parent before children, children in insertion order.
    TopDown,
    /// Children (fully recursed) before parent.
    BottomUp,
    /// Bottom-up for bookkeeping states, one concurrent task per component
    /// for `Executing`.
    Task,
}

impl Traversal {
    /// Whether this traversal launches concurrent task bodies.
    pub const fn is_task(self) -> bool {
        matches!(self, Self::Task)
    }
}

// ---------------------------------------------------------------------------
// Reporting
// ---------------------------------------------------------------------------

/// Severity of a report delivered to the reporting sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational message, subject to verbosity filtering.
    Info,
    /// Something unexpected that processing recovered from.
    Warning,
    /// A user-visible error; counted toward the quit threshold.
    Error,
    /// An unrecoverable condition; the run is aborted.
    Fatal,
}

impl Severity {
    /// All severities in ascending order.
    pub const ALL: [Self; 4] = [Self::Info, Self::Warning, Self::Error, Self::Fatal];
}

impl core::fmt::Display for Severity {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
            Self::Fatal => "FATAL",
        };
        f.write_str(s)
    }
}

/// Verbosity of an informational report.
///
/// A report is emitted only if its verbosity is at or below the configured
/// threshold. The numeric values leave room between levels.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    /// Always emitted.
    None = 0,
    /// Low-noise progress messages.
    Low = 100,
    /// Default threshold.
    #[default]
    Medium = 200,
    /// Detailed messages.
    High = 300,
    /// Everything short of debug output.
    Full = 400,
    /// Debug output.
    Debug = 500,
}

impl Verbosity {
    /// Parse a verbosity name (case-insensitive, optionally prefixed with
    /// `V_`).
    pub fn parse(name: &str) -> Option<Self> {
        let lower = name.trim().to_lowercase();
        let bare = lower.strip_prefix("v_").unwrap_or(&lower);
        match bare {
            "none" => Some(Self::None),
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "full" => Some(Self::Full),
            "debug" => Some(Self::Debug),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Run state
// ---------------------------------------------------------------------------

/// Lifecycle state of the whole run, owned by the root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoreState {
    /// Root created, no test started.
    Initialized,
    /// `run_test` is resolving the test and applying settings.
    PreRun,
    /// Phases are executing.
    Running,
    /// All phases finished; summarizing.
    PostRun,
    /// The run completed normally.
    Finished,
    /// `die` is running `pre_abort` callbacks.
    PreAbort,
    /// The run was aborted.
    Aborted,
}

impl CoreState {
    /// Whether the run has reached a terminal state.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Aborted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_states_are_ordered() {
        assert!(PhaseState::Uninitialized < PhaseState::Scheduled);
        assert!(PhaseState::Started < PhaseState::Executing);
        assert!(PhaseState::ReadyToEnd < PhaseState::Ended);
        assert!(PhaseState::Cleanup < PhaseState::Done);
    }

    #[test]
    fn active_window_is_started_through_cleanup() {
        assert!(!PhaseState::Syncing.is_active());
        assert!(PhaseState::Started.is_active());
        assert!(PhaseState::Cleanup.is_active());
        assert!(!PhaseState::Done.is_active());
        assert!(!PhaseState::Jumping.is_active());
    }

    #[test]
    fn only_running_states_can_jump() {
        assert!(PhaseState::Executing.can_jump());
        assert!(!PhaseState::Ended.can_jump());
        assert!(!PhaseState::Scheduled.can_jump());
    }

    #[test]
    fn verbosity_parse_accepts_prefixes() {
        assert_eq!(Verbosity::parse("HIGH"), Some(Verbosity::High));
        assert_eq!(Verbosity::parse("v_debug"), Some(Verbosity::Debug));
        assert_eq!(Verbosity::parse("loud"), None);
    }

    #[test]
    fn severity_serializes_lowercase() {
        let json = serde_json::to_string(&Severity::Warning).ok();
        assert_eq!(json.as_deref(), Some("\"warning\""));
    }

    #[test]
    fn phase_state_display_matches_serde() {
        let json = serde_json::to_string(&PhaseState::ReadyToEnd).ok();
        assert_eq!(json.as_deref(), Some("\"READY_TO_END\""));
        assert_eq!(PhaseState::ReadyToEnd.to_string(), "READY_TO_END");
    }
}
