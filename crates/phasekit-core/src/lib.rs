//! Phase graph engine, component tree and run control for Phasekit.
//!
//! A [`Root`] holds a component tree and a phase graph. `run_test` builds
//! the requested test through the factory and walks the graph: the common
//! domain's function phases (build, connect, ...), the `run` task phase
//! alongside the twelve run-time phases of every domain, and the closing
//! function phases. Each node moves through the states of
//! [`PhaseState`](phasekit_types::PhaseState); task phases stay open until
//! every objection raised against them is dropped.
//!
//! # Modules
//!
//! - [`args`] -- [`ConfigSource`] and the `+KEY=value` parsers.
//! - [`component`] -- The [`Component`] trait and factory bindings.
//! - [`config`] -- Configuration loading from `phasekit.yaml`.
//! - [`context`] -- [`PhaseContext`] handed to phase callbacks.
//! - [`error`] -- [`PhaseError`] and [`RunError`].
//! - [`graph`] -- [`PhaseGraph`]: nodes, schedules, domains, sync and
//!   jump bookkeeping.
//! - [`listener`] -- Phase state-change listeners.
//! - [`objection`] -- Per-phase objection counters.
//! - [`phase`] -- Phase implementations, builtin and custom.
//! - [`root`] -- [`Root`] and its component and phase APIs.
//! - [`run`] -- `run_test`, argument handling and `die`.
//! - [`tree`] -- The [`ComponentTree`].
//!
//! The executor and the tree walker are private; they add methods to
//! [`Root`].

pub mod args;
pub mod component;
pub mod config;
pub mod context;
pub mod error;
mod executor;
pub mod graph;
pub mod listener;
pub mod objection;
pub mod phase;
pub mod root;
pub mod run;
pub mod tree;
mod walker;

pub use args::{ArgsSource, ConfigSource};
pub use component::{
    Bench, BenchFactory, BenchType, Component, ComponentHandle, component_type, object_type,
};
pub use config::PhasekitConfig;
pub use context::PhaseContext;
pub use error::{PhaseError, RunError};
pub use graph::{PendingJump, PhaseGraph, PhaseNode, Placement};
pub use listener::{PhaseListener, RecordingListener};
pub use objection::Objections;
pub use phase::{BuiltinPhase, CustomPhase, PhaseBody, PhaseImp, PhaseImpRegistry};
pub use root::Root;
pub use run::{RunSummary, TEST_INSTANCE_NAME};
pub use tree::ComponentTree;
