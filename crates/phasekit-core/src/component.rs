//! The component lifecycle contract and the factory product family built
//! on it.
//!
//! A component is anything implementing [`Component`]. Every phase has a
//! method with a no-op default, so an implementation only overrides the
//! phases it takes part in. Function phases are plain methods; task
//! phases return a future that the engine runs alongside every other
//! component's and cancels when the phase ends.

use std::any::Any;
use std::rc::Rc;

use futures::future::LocalBoxFuture;
use phasekit_factory::{Factory, FnProxy, Products, TypeHandle};
use phasekit_types::ComponentId;

use crate::context::PhaseContext;
use crate::root::Root;

fn idle<'a>() -> LocalBoxFuture<'a, ()> {
    Box::pin(std::future::ready(()))
}

/// Per-phase callbacks of one component.
#[allow(unused_variables)]
pub trait Component {
    /// Build phase (top-down): create children here.
    fn build_phase(&self, ctx: &PhaseContext) {}

    /// Connect phase.
    fn connect_phase(&self, ctx: &PhaseContext) {}

    /// End-of-elaboration phase.
    fn end_of_elaboration_phase(&self, ctx: &PhaseContext) {}

    /// Start-of-simulation phase.
    fn start_of_simulation_phase(&self, ctx: &PhaseContext) {}

    /// Run phase, concurrent with the run-time schedule.
    fn run_phase(&self, ctx: PhaseContext) -> LocalBoxFuture<'_, ()> {
        idle()
    }

    /// Extract phase.
    fn extract_phase(&self, ctx: &PhaseContext) {}

    /// Check phase.
    fn check_phase(&self, ctx: &PhaseContext) {}

    /// Report phase.
    fn report_phase(&self, ctx: &PhaseContext) {}

    /// Final phase.
    fn final_phase(&self, ctx: &PhaseContext) {}

    /// Pre-reset phase.
    fn pre_reset_phase(&self, ctx: PhaseContext) -> LocalBoxFuture<'_, ()> {
        idle()
    }

    /// Reset phase.
    fn reset_phase(&self, ctx: PhaseContext) -> LocalBoxFuture<'_, ()> {
        idle()
    }

    /// Post-reset phase.
    fn post_reset_phase(&self, ctx: PhaseContext) -> LocalBoxFuture<'_, ()> {
        idle()
    }

    /// Pre-configure phase.
    fn pre_configure_phase(&self, ctx: PhaseContext) -> LocalBoxFuture<'_, ()> {
        idle()
    }

    /// Configure phase.
    fn configure_phase(&self, ctx: PhaseContext) -> LocalBoxFuture<'_, ()> {
        idle()
    }

    /// Post-configure phase.
    fn post_configure_phase(&self, ctx: PhaseContext) -> LocalBoxFuture<'_, ()> {
        idle()
    }

    /// Pre-main phase.
    fn pre_main_phase(&self, ctx: PhaseContext) -> LocalBoxFuture<'_, ()> {
        idle()
    }

    /// Main phase.
    fn main_phase(&self, ctx: PhaseContext) -> LocalBoxFuture<'_, ()> {
        idle()
    }

    /// Post-main phase.
    fn post_main_phase(&self, ctx: PhaseContext) -> LocalBoxFuture<'_, ()> {
        idle()
    }

    /// Pre-shutdown phase.
    fn pre_shutdown_phase(&self, ctx: PhaseContext) -> LocalBoxFuture<'_, ()> {
        idle()
    }

    /// Shutdown phase.
    fn shutdown_phase(&self, ctx: PhaseContext) -> LocalBoxFuture<'_, ()> {
        idle()
    }

    /// Post-shutdown phase.
    fn post_shutdown_phase(&self, ctx: PhaseContext) -> LocalBoxFuture<'_, ()> {
        idle()
    }

    /// A user-defined function phase named `phase`.
    fn custom_phase(&self, phase: &str, ctx: &PhaseContext) {}

    /// A user-defined task phase named `phase`.
    fn custom_task_phase(&self, phase: &str, ctx: PhaseContext) -> LocalBoxFuture<'_, ()> {
        idle()
    }

    /// Called when any phase this component takes part in starts.
    fn phase_started(&self, ctx: &PhaseContext) {}

    /// Called each time a phase polls whether it may end.
    fn phase_ready_to_end(&self, ctx: &PhaseContext) {}

    /// Called when a phase ends.
    fn phase_ended(&self, ctx: &PhaseContext) {}

    /// Called bottom-up when the run is aborted.
    fn pre_abort(&self, handle: &ComponentHandle) {}
}

/// A component's identity plus the root it lives in.
///
/// Passed to creation proxies as the parent and to [`Component::pre_abort`].
#[derive(Clone)]
pub struct ComponentHandle {
    root: Root,
    id: ComponentId,
}

impl core::fmt::Debug for ComponentHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ComponentHandle")
            .field("id", &self.id)
            .field("full_name", &self.full_name())
            .finish_non_exhaustive()
    }
}

impl ComponentHandle {
    pub(crate) const fn new(root: Root, id: ComponentId) -> Self {
        Self { root, id }
    }

    /// The component id.
    pub const fn id(&self) -> ComponentId {
        self.id
    }

    /// The root owning the component.
    pub const fn root(&self) -> &Root {
        &self.root
    }

    /// Leaf name.
    pub fn name(&self) -> String {
        self.root.name(self.id).unwrap_or_default()
    }

    /// Dotted hierarchical name.
    pub fn full_name(&self) -> String {
        self.root.full_name(self.id).unwrap_or_default()
    }
}

/// The product family of a root's factory.
#[derive(Debug)]
pub struct Bench;

impl Products for Bench {
    type Object = Box<dyn Any>;
    type Component = Rc<dyn Component>;
    type Parent = ComponentHandle;
}

/// The factory a root owns.
pub type BenchFactory = Factory<Bench>;

/// A registered component or object type.
pub type BenchType = TypeHandle<Bench>;

/// A component type built by `create`.
pub fn component_type<C, F>(type_name: &str, create: F) -> BenchType
where
    C: Component + 'static,
    F: Fn(&str, &ComponentHandle) -> C + 'static,
{
    FnProxy::<Bench>::component(type_name, move |name, parent| {
        Rc::new(create(name, parent)) as Rc<dyn Component>
    })
}

/// An object type built by `create`.
pub fn object_type<T, F>(type_name: &str, create: F) -> BenchType
where
    T: Any,
    F: Fn(&str) -> T + 'static,
{
    FnProxy::<Bench>::object(type_name, move |name| Box::new(create(name)) as Box<dyn Any>)
}

/// The do-nothing behavior of the implicit top component.
pub(crate) struct TopComponent;

impl Component for TopComponent {}
