//! Phase implementations: the built-in lifecycle phases, user-defined
//! phases, and the per-root registry that hands out one shared
//! implementation per phase kind.

use std::collections::BTreeMap;
use std::rc::Rc;

use futures::future::LocalBoxFuture;
use phasekit_types::Traversal;

use crate::component::Component;
use crate::context::PhaseContext;

/// The 21 phases every component can take part in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BuiltinPhase {
    /// Construct the hierarchy (top-down).
    Build,
    /// Wire components together.
    Connect,
    /// Final adjustments to the hierarchy; errors reported up to here
    /// abort the run.
    EndOfElaboration,
    /// Last chance before time starts.
    StartOfSimulation,
    /// The main time-consuming phase, parallel to the run-time schedule.
    Run,
    /// Collect results.
    Extract,
    /// Check results.
    Check,
    /// Report results.
    Report,
    /// Tie off loose ends.
    Final,
    /// Run-time: before reset.
    PreReset,
    /// Run-time: reset.
    Reset,
    /// Run-time: after reset.
    PostReset,
    /// Run-time: before configuration.
    PreConfigure,
    /// Run-time: configuration.
    Configure,
    /// Run-time: after configuration.
    PostConfigure,
    /// Run-time: before the main body.
    PreMain,
    /// Run-time: the main body.
    Main,
    /// Run-time: after the main body.
    PostMain,
    /// Run-time: before shutdown.
    PreShutdown,
    /// Run-time: shutdown.
    Shutdown,
    /// Run-time: after shutdown.
    PostShutdown,
}

impl BuiltinPhase {
    /// The common domain phases in execution order.
    pub const COMMON: [Self; 9] = [
        Self::Build,
        Self::Connect,
        Self::EndOfElaboration,
        Self::StartOfSimulation,
        Self::Run,
        Self::Extract,
        Self::Check,
        Self::Report,
        Self::Final,
    ];

    /// The run-time schedule in execution order.
    pub const RUNTIME: [Self; 12] = [
        Self::PreReset,
        Self::Reset,
        Self::PostReset,
        Self::PreConfigure,
        Self::Configure,
        Self::PostConfigure,
        Self::PreMain,
        Self::Main,
        Self::PostMain,
        Self::PreShutdown,
        Self::Shutdown,
        Self::PostShutdown,
    ];

    /// The phase name used in the graph and in reports.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Build => "build",
            Self::Connect => "connect",
            Self::EndOfElaboration => "end_of_elaboration",
            Self::StartOfSimulation => "start_of_simulation",
            Self::Run => "run",
            Self::Extract => "extract",
            Self::Check => "check",
            Self::Report => "report",
            Self::Final => "final",
            Self::PreReset => "pre_reset",
            Self::Reset => "reset",
            Self::PostReset => "post_reset",
            Self::PreConfigure => "pre_configure",
            Self::Configure => "configure",
            Self::PostConfigure => "post_configure",
            Self::PreMain => "pre_main",
            Self::Main => "main",
            Self::PostMain => "post_main",
            Self::PreShutdown => "pre_shutdown",
            Self::Shutdown => "shutdown",
            Self::PostShutdown => "post_shutdown",
        }
    }

    /// How this phase walks the hierarchy.
    pub const fn traversal(self) -> Traversal {
        match self {
            Self::Build => Traversal::TopDown,
            Self::Connect
            | Self::EndOfElaboration
            | Self::StartOfSimulation
            | Self::Extract
            | Self::Check
            | Self::Report
            | Self::Final => Traversal::BottomUp,
            _ => Traversal::Task,
        }
    }

    /// Look a built-in phase up by name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::COMMON
            .into_iter()
            .chain(Self::RUNTIME)
            .find(|phase| phase.name() == name)
    }
}

/// What a phase does to one component when it executes.
///
/// Function phases implement [`PhaseBody::exec_func`]; task phases
/// implement [`PhaseBody::exec_task`] and return a future the engine runs
/// concurrently with every other component's.
pub trait PhaseBody {
    /// Run a function phase for `component`.
    fn exec_func(&self, _component: &dyn Component, _ctx: &PhaseContext) {}

    /// Produce the task body of a task phase for `component`.
    fn exec_task(
        &self,
        _component: Rc<dyn Component>,
        _ctx: PhaseContext,
    ) -> LocalBoxFuture<'static, ()> {
        Box::pin(std::future::ready(()))
    }
}

impl PhaseBody for BuiltinPhase {
    fn exec_func(&self, component: &dyn Component, ctx: &PhaseContext) {
        match self {
            Self::Build => component.build_phase(ctx),
            Self::Connect => component.connect_phase(ctx),
            Self::EndOfElaboration => component.end_of_elaboration_phase(ctx),
            Self::StartOfSimulation => component.start_of_simulation_phase(ctx),
            Self::Extract => component.extract_phase(ctx),
            Self::Check => component.check_phase(ctx),
            Self::Report => component.report_phase(ctx),
            Self::Final => component.final_phase(ctx),
            _ => {}
        }
    }

    fn exec_task(
        &self,
        component: Rc<dyn Component>,
        ctx: PhaseContext,
    ) -> LocalBoxFuture<'static, ()> {
        let phase = *self;
        Box::pin(async move {
            match phase {
                Self::Run => component.run_phase(ctx).await,
                Self::PreReset => component.pre_reset_phase(ctx).await,
                Self::Reset => component.reset_phase(ctx).await,
                Self::PostReset => component.post_reset_phase(ctx).await,
                Self::PreConfigure => component.pre_configure_phase(ctx).await,
                Self::Configure => component.configure_phase(ctx).await,
                Self::PostConfigure => component.post_configure_phase(ctx).await,
                Self::PreMain => component.pre_main_phase(ctx).await,
                Self::Main => component.main_phase(ctx).await,
                Self::PostMain => component.post_main_phase(ctx).await,
                Self::PreShutdown => component.pre_shutdown_phase(ctx).await,
                Self::Shutdown => component.shutdown_phase(ctx).await,
                Self::PostShutdown => component.post_shutdown_phase(ctx).await,
                _ => {}
            }
        })
    }
}

/// A user-defined phase dispatched through [`Component::custom_phase`]
/// and [`Component::custom_task_phase`] under its own name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomPhase {
    name: String,
}

impl CustomPhase {
    /// A custom phase called `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl PhaseBody for CustomPhase {
    fn exec_func(&self, component: &dyn Component, ctx: &PhaseContext) {
        component.custom_phase(&self.name, ctx);
    }

    fn exec_task(
        &self,
        component: Rc<dyn Component>,
        ctx: PhaseContext,
    ) -> LocalBoxFuture<'static, ()> {
        let name = self.name.clone();
        Box::pin(async move { component.custom_task_phase(&name, ctx).await })
    }
}

/// A named phase implementation: what a phase node runs.
#[derive(Clone)]
pub struct PhaseImp {
    name: String,
    traversal: Traversal,
    body: Rc<dyn PhaseBody>,
}

impl core::fmt::Debug for PhaseImp {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PhaseImp")
            .field("name", &self.name)
            .field("traversal", &self.traversal)
            .finish_non_exhaustive()
    }
}

impl PhaseImp {
    /// An implementation with an arbitrary body.
    pub fn new(
        name: impl Into<String>,
        traversal: Traversal,
        body: impl PhaseBody + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            traversal,
            body: Rc::new(body),
        }
    }

    /// The implementation of a built-in phase.
    pub fn builtin(phase: BuiltinPhase) -> Self {
        Self::new(phase.name(), phase.traversal(), phase)
    }

    /// A [`CustomPhase`] called `name`.
    pub fn custom(name: impl Into<String>, traversal: Traversal) -> Self {
        let name = name.into();
        Self::new(name.clone(), traversal, CustomPhase::new(name))
    }

    /// The phase name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// How the phase walks the hierarchy.
    pub const fn traversal(&self) -> Traversal {
        self.traversal
    }

    pub(crate) fn body(&self) -> &dyn PhaseBody {
        self.body.as_ref()
    }
}

/// One shared implementation per phase name, created on first use.
///
/// Owned by a root so that separate roots (and separate tests) never share
/// phase state; [`PhaseImpRegistry::reset`] drops every entry.
#[derive(Debug, Default)]
pub struct PhaseImpRegistry {
    imps: BTreeMap<String, Rc<PhaseImp>>,
}

impl PhaseImpRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The shared implementation of a built-in phase.
    pub fn builtin(&mut self, phase: BuiltinPhase) -> Rc<PhaseImp> {
        Rc::clone(
            self.imps
                .entry(phase.name().to_owned())
                .or_insert_with(|| Rc::new(PhaseImp::builtin(phase))),
        )
    }

    /// Share `imp` under its name, returning the implementation already
    /// registered under that name if there is one.
    pub fn register(&mut self, imp: PhaseImp) -> Rc<PhaseImp> {
        Rc::clone(
            self.imps
                .entry(imp.name().to_owned())
                .or_insert_with(|| Rc::new(imp)),
        )
    }

    /// Look an implementation up by phase name.
    pub fn get(&self, name: &str) -> Option<Rc<PhaseImp>> {
        self.imps.get(name).cloned()
    }

    /// Number of shared implementations.
    pub fn len(&self) -> usize {
        self.imps.len()
    }

    /// Whether no implementation has been created yet.
    pub fn is_empty(&self) -> bool {
        self.imps.is_empty()
    }

    /// Drop every shared implementation.
    pub fn reset(&mut self) {
        self.imps.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_names_round_trip() {
        for phase in BuiltinPhase::COMMON.into_iter().chain(BuiltinPhase::RUNTIME) {
            assert_eq!(BuiltinPhase::from_name(phase.name()), Some(phase));
        }
        assert_eq!(BuiltinPhase::from_name("warmup"), None);
    }

    #[test]
    fn traversal_kinds() {
        assert_eq!(BuiltinPhase::Build.traversal(), Traversal::TopDown);
        assert_eq!(BuiltinPhase::Connect.traversal(), Traversal::BottomUp);
        assert_eq!(BuiltinPhase::Run.traversal(), Traversal::Task);
        assert!(
            BuiltinPhase::RUNTIME
                .iter()
                .all(|p| p.traversal().is_task())
        );
    }

    #[test]
    fn registry_shares_one_imp_per_phase() {
        let mut registry = PhaseImpRegistry::new();
        let a = registry.builtin(BuiltinPhase::Build);
        let b = registry.builtin(BuiltinPhase::Build);
        assert!(Rc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);

        registry.reset();
        assert!(registry.is_empty());
        let c = registry.builtin(BuiltinPhase::Build);
        assert!(!Rc::ptr_eq(&a, &c));
    }

    #[test]
    fn register_keeps_the_first_imp() {
        let mut registry = PhaseImpRegistry::new();
        let first = registry.register(PhaseImp::custom("warmup", Traversal::BottomUp));
        let second = registry.register(PhaseImp::custom("warmup", Traversal::Task));
        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(second.traversal(), Traversal::BottomUp);
    }
}
