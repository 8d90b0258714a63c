//! Error types for schedule construction, the component tree and run
//! control.
//!
//! Failures that a running testbench can recover from are reported through
//! the report server instead; these errors cover misuse of the programming
//! interface.

use phasekit_types::{ComponentId, CoreState, PhaseId, PhaseState, Traversal};

/// Errors from phase graph construction and phase control.
#[derive(Debug, thiserror::Error)]
pub enum PhaseError {
    /// The referenced node does not exist in the graph.
    #[error("unknown phase node {id}")]
    UnknownNode {
        /// The missing node.
        id: PhaseId,
    },

    /// A schedule operation was given a node that is not a schedule or
    /// domain.
    #[error("phase node '{name}' is not a schedule or domain")]
    NotASchedule {
        /// Name of the offending node.
        name: String,
    },

    /// A placement anchor does not belong to the schedule being edited.
    #[error("phase node '{name}' is not part of schedule '{schedule}'")]
    NotInSchedule {
        /// Name of the anchor node.
        name: String,
        /// Name of the schedule.
        schedule: String,
    },

    /// The `after` anchor of a placement is not before its `before` anchor.
    #[error("'{after}' is not before '{before}'")]
    BadPlacement {
        /// Name of the `after` anchor.
        after: String,
        /// Name of the `before` anchor.
        before: String,
    },

    /// A domain with this name already exists.
    #[error("domain '{name}' already exists")]
    DuplicateDomain {
        /// The duplicated name.
        name: String,
    },

    /// The jump target is neither a predecessor nor a successor.
    #[error("phase '{target}' is not reachable from '{from}'")]
    BadJump {
        /// Name of the requested target.
        target: String,
        /// Full name of the jumping node.
        from: String,
    },

    /// The node is not in a state from which it can jump.
    #[error("phase '{name}' is not active (state {state})")]
    NotActive {
        /// Full name of the node.
        name: String,
        /// Its current state.
        state: PhaseState,
    },

    /// A per-component implementation is a task where the phase is a
    /// function, or the other way around.
    #[error("phase '{phase}' is a {expected:?} phase but the implementation is {found:?}")]
    ImpKindMismatch {
        /// Name of the phase.
        phase: String,
        /// Traversal of the phase in the graph.
        expected: Traversal,
        /// Traversal of the rejected implementation.
        found: Traversal,
    },

    /// The referenced component does not exist.
    #[error("unknown component {id}")]
    UnknownComponent {
        /// The missing component.
        id: ComponentId,
    },
}

/// Errors from the run entry points.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// `run_test` was called while a run is already in progress.
    #[error("a run is already in progress (core state {state:?})")]
    AlreadyRunning {
        /// The core state at the time of the call.
        state: CoreState,
    },

    /// `run_test` was called on a root whose run already finished.
    #[error("this root already ran a test (core state {state:?})")]
    AlreadyRan {
        /// The core state at the time of the call.
        state: CoreState,
    },
}
