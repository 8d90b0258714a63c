//! The handle a phase callback receives.

use std::any::Any;

use phasekit_types::{ComponentId, PhaseId, PhaseState, Verbosity};
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

use crate::component::{BenchType, ComponentHandle};
use crate::error::PhaseError;
use crate::root::Root;

/// What a component sees of the phase it is running in.
///
/// Cheap to clone; task bodies take it by value.
#[derive(Clone)]
pub struct PhaseContext {
    root: Root,
    phase: PhaseId,
    component: ComponentId,
    cancel: CancellationToken,
}

impl core::fmt::Debug for PhaseContext {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PhaseContext")
            .field("phase", &self.phase_full_name())
            .field("component", &self.full_name())
            .finish_non_exhaustive()
    }
}

impl PhaseContext {
    pub(crate) const fn new(
        root: Root,
        phase: PhaseId,
        component: ComponentId,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            root,
            phase,
            component,
            cancel,
        }
    }

    /// The root running the phase.
    pub const fn root(&self) -> &Root {
        &self.root
    }

    /// The phase node.
    pub const fn phase(&self) -> PhaseId {
        self.phase
    }

    /// The component the callback runs for.
    pub const fn component(&self) -> ComponentId {
        self.component
    }

    /// The component as a handle.
    pub fn handle(&self) -> ComponentHandle {
        ComponentHandle::new(self.root.clone(), self.component)
    }

    /// The phase's own name (`build`, `main`).
    pub fn phase_name(&self) -> String {
        self.root.phase_name(self.phase).unwrap_or_default()
    }

    /// The phase's dotted name (`common.build`, `uvm.uvm_sched.main`).
    pub fn phase_full_name(&self) -> String {
        self.root.phase_full_name(self.phase)
    }

    /// Current state of the phase node.
    pub fn state(&self) -> PhaseState {
        self.root.phase_state(self.phase)
    }

    /// The component's leaf name.
    pub fn name(&self) -> String {
        self.root.name(self.component).unwrap_or_default()
    }

    /// The component's dotted name.
    pub fn full_name(&self) -> String {
        self.root.full_name(self.component).unwrap_or_default()
    }

    // -----------------------------------------------------------------------
    // Objections
    // -----------------------------------------------------------------------

    /// Keep the phase open until the matching drop.
    pub fn raise_objection(&self, count: u32) {
        self.root
            .objections()
            .raise_objection(self.phase, self.component, &self.full_name(), count);
    }

    /// Release objections raised with [`Self::raise_objection`].
    pub fn drop_objection(&self, count: u32) {
        self.root
            .objections()
            .drop_objection(self.phase, self.component, &self.full_name(), count);
    }

    /// Objections outstanding on this phase from every component.
    pub fn objection_total(&self) -> u32 {
        self.root.objections().total(self.phase)
    }

    // -----------------------------------------------------------------------
    // Control
    // -----------------------------------------------------------------------

    /// Leave this phase for the phase named `target` once the current
    /// window closes.
    pub fn jump(&self, target: &str) -> Result<(), PhaseError> {
        self.root.jump_phase(self.phase, target).map(|_| ())
    }

    /// Resolves when the phase window closes and task bodies are killed.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }

    /// Whether the phase window has closed.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    // -----------------------------------------------------------------------
    // Reporting
    // -----------------------------------------------------------------------

    /// Informational report from this component.
    pub fn info(&self, id: &str, message: &str, verbosity: Verbosity) {
        self.root
            .reporter()
            .info(id, message, &self.full_name(), verbosity);
    }

    /// Warning from this component.
    pub fn warning(&self, id: &str, message: &str) {
        self.root.reporter().warning(id, message, &self.full_name());
    }

    /// Error from this component. Reaching the quit count aborts the run.
    pub fn error(&self, id: &str, message: &str) {
        self.root.reporter().error(id, message, &self.full_name());
        if self.root.reporter().quit_count_reached() {
            self.root.die();
        }
    }

    /// Fatal report from this component; aborts the run.
    pub fn fatal(&self, id: &str, message: &str) {
        self.root.reporter().fatal(id, message, &self.full_name());
        self.root.die();
    }

    // -----------------------------------------------------------------------
    // Creation
    // -----------------------------------------------------------------------

    /// Create a child of this component through the factory.
    pub fn create_component(&self, requested: &BenchType, name: &str) -> Option<ComponentId> {
        self.root
            .create_component_by_type(requested, self.component, name)
    }

    /// Create a child of this component by type name.
    pub fn create_component_by_name(&self, type_name: &str, name: &str) -> Option<ComponentId> {
        self.root
            .create_component_by_name(type_name, self.component, name)
    }

    /// Create an object scoped under this component by type name.
    pub fn create_object_by_name(&self, type_name: &str, name: &str) -> Option<Box<dyn Any>> {
        self.root
            .create_object_by_name(type_name, &self.full_name(), name)
    }
}
