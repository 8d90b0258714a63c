//! Shared type definitions for the Phasekit framework.
//!
//! This crate is the single source of truth for the data that crosses crate
//! boundaries: identifiers, phase and severity enums, and the records
//! delivered to report sinks and phase listeners.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe UUID wrappers for components and phase nodes
//! - [`enums`] -- Phase states, node types, traversal kinds, severities
//! - [`structs`] -- Report messages and phase state-change records

pub mod enums;
pub mod ids;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use enums::{CoreState, PhaseState, PhaseType, Severity, Traversal, Verbosity};
pub use ids::{ComponentId, PhaseId};
pub use structs::{PhaseStateChange, ReportMessage};
