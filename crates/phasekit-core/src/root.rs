//! The root: one phasing engine instance.
//!
//! A [`Root`] owns everything a run needs: the report server, the factory,
//! the component tree, the phase graph and its objections, the settings
//! and the injected configuration source. It is a cheap `Rc` handle; every
//! [`PhaseContext`](crate::PhaseContext) carries a clone. All state lives
//! on one thread and is only borrowed between await points.

use std::any::Any;
use std::cell::{Cell, Ref, RefCell, RefMut};
use std::collections::BTreeMap;
use std::rc::Rc;
use std::time::Duration;

use phasekit_report::ReportServer;
use phasekit_types::{ComponentId, CoreState, PhaseId, PhaseState, Verbosity};
use tokio::sync::Notify;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::args::{ArgsSource, ConfigSource};
use crate::component::{BenchFactory, BenchType, Component, ComponentHandle, TopComponent};
use crate::config::PhasekitConfig;
use crate::error::PhaseError;
use crate::graph::{PhaseGraph, PhaseNode, Placement};
use crate::listener::PhaseListener;
use crate::objection::Objections;
use crate::phase::{BuiltinPhase, PhaseImp, PhaseImpRegistry};
use crate::tree::{ComponentTree, InsertError};

const CONTEXT: &str = "root";

/// Tunables of the phase engine.
pub(crate) struct Settings {
    pub(crate) max_ready_to_end: Cell<u32>,
    pub(crate) ready_to_end_wait: Cell<Duration>,
    pub(crate) phase_timeout: Cell<Option<Duration>>,
    pub(crate) timeout_overridable: Cell<bool>,
    pub(crate) phase_trace: Cell<bool>,
    pub(crate) default_test: RefCell<String>,
}

/// Task bodies launched for one task phase window.
pub(crate) struct PhaseTasks {
    pub(crate) token: CancellationToken,
    pub(crate) handles: Vec<JoinHandle<()>>,
}

pub(crate) struct Shared {
    pub(crate) reporter: Rc<ReportServer>,
    pub(crate) factory: RefCell<BenchFactory>,
    pub(crate) tree: RefCell<ComponentTree>,
    pub(crate) graph: RefCell<PhaseGraph>,
    pub(crate) imps: RefCell<PhaseImpRegistry>,
    pub(crate) objections: Objections,
    pub(crate) settings: Settings,
    pub(crate) source: RefCell<Box<dyn ConfigSource>>,
    pub(crate) listeners: RefCell<Vec<Rc<dyn PhaseListener>>>,
    pub(crate) core_state: Cell<CoreState>,
    /// Woken on every phase state change and jump request.
    pub(crate) state_changed: Notify,
    pub(crate) tasks: RefCell<BTreeMap<PhaseId, PhaseTasks>>,
    pub(crate) engine: RefCell<Vec<JoinHandle<()>>>,
    pub(crate) abort: CancellationToken,
    pub(crate) done: CancellationToken,
    pub(crate) hopper: RefCell<Option<UnboundedSender<(PhaseId, u32)>>>,
    pub(crate) test: RefCell<Option<(String, String)>>,
}

/// Handle to a phasing engine instance.
#[derive(Clone)]
pub struct Root {
    pub(crate) shared: Rc<Shared>,
}

impl core::fmt::Debug for Root {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Root")
            .field("core_state", &self.core_state())
            .field("components", &self.shared.tree.borrow().len())
            .finish_non_exhaustive()
    }
}

impl Root {
    /// A root with default settings and no command-line arguments.
    pub fn new(reporter: Rc<ReportServer>) -> Self {
        let mut imps = PhaseImpRegistry::new();
        let graph = PhaseGraph::new(&mut imps);
        let tree = ComponentTree::new(Rc::new(TopComponent), graph.uvm_domain());
        let defaults = crate::config::PhasingConfig::default();
        let shared = Shared {
            factory: RefCell::new(BenchFactory::new(Rc::clone(&reporter))),
            objections: Objections::new(Rc::clone(&reporter)),
            reporter,
            tree: RefCell::new(tree),
            graph: RefCell::new(graph),
            imps: RefCell::new(imps),
            settings: Settings {
                max_ready_to_end: Cell::new(defaults.max_ready_to_end_iterations),
                ready_to_end_wait: Cell::new(defaults.ready_to_end_wait()),
                phase_timeout: Cell::new(defaults.phase_timeout()),
                timeout_overridable: Cell::new(true),
                phase_trace: Cell::new(false),
                default_test: RefCell::new(String::new()),
            },
            source: RefCell::new(Box::new(ArgsSource::default())),
            listeners: RefCell::new(Vec::new()),
            core_state: Cell::new(CoreState::Initialized),
            state_changed: Notify::new(),
            tasks: RefCell::new(BTreeMap::new()),
            engine: RefCell::new(Vec::new()),
            abort: CancellationToken::new(),
            done: CancellationToken::new(),
            hopper: RefCell::new(None),
            test: RefCell::new(None),
        };
        Self {
            shared: Rc::new(shared),
        }
    }

    /// A root configured from a loaded config file: phasing and report
    /// settings, the default test name and the configured arguments.
    pub fn from_config(config: &PhasekitConfig, reporter: Rc<ReportServer>) -> Self {
        reporter.set_verbosity(config.report.verbosity);
        reporter.set_max_quit_count(config.report.max_quit_count);
        let root = Self::new(reporter);
        let settings = &root.shared.settings;
        settings
            .max_ready_to_end
            .set(config.phasing.max_ready_to_end_iterations);
        settings
            .ready_to_end_wait
            .set(config.phasing.ready_to_end_wait());
        settings.phase_timeout.set(config.phasing.phase_timeout());
        settings.phase_trace.set(config.phasing.trace);
        *settings.default_test.borrow_mut() = config.test.name.clone();
        root.shared.objections.set_trace(config.objection.trace);
        root.set_config_source(ArgsSource::new(config.test.args.iter().cloned()));
        root
    }

    /// Replace the command-line style argument source.
    pub fn set_config_source(&self, source: impl ConfigSource + 'static) {
        *self.shared.source.borrow_mut() = Box::new(source);
    }

    // -----------------------------------------------------------------------
    // Settings
    // -----------------------------------------------------------------------

    /// Ready-to-end rounds before a phase is forced to end.
    pub fn set_max_ready_to_end_iterations(&self, iterations: u32) {
        self.shared.settings.max_ready_to_end.set(iterations);
    }

    /// How long each ready-to-end round waits for objections to drop.
    pub fn set_ready_to_end_wait(&self, wait: Duration) {
        self.shared.settings.ready_to_end_wait.set(wait);
    }

    /// Set the task phase timeout (`None` disables it). A locked timeout
    /// is kept and `NOTIMOUTOVR` is reported.
    pub fn set_timeout(&self, timeout: Option<Duration>, overridable: bool) {
        let settings = &self.shared.settings;
        if !settings.timeout_overridable.get() {
            self.shared.reporter.warning(
                "NOTIMOUTOVR",
                "The global timeout setting is not overridable",
                CONTEXT,
            );
            return;
        }
        settings.phase_timeout.set(timeout);
        settings.timeout_overridable.set(overridable);
    }

    /// The task phase timeout.
    pub fn phase_timeout(&self) -> Option<Duration> {
        self.shared.settings.phase_timeout.get()
    }

    /// Report every phase state transition as `PH/TRC/STATE`.
    pub fn set_phase_trace(&self, trace: bool) {
        self.shared.settings.phase_trace.set(trace);
    }

    // -----------------------------------------------------------------------
    // Shared services
    // -----------------------------------------------------------------------

    /// The report server.
    pub fn reporter(&self) -> &Rc<ReportServer> {
        &self.shared.reporter
    }

    /// The objection counters.
    pub fn objections(&self) -> &Objections {
        &self.shared.objections
    }

    /// Outstanding objections to `phase` from one component.
    pub fn objection_count(&self, phase: PhaseId, component: ComponentId) -> u32 {
        self.shared.objections.count(phase, component)
    }

    /// The factory. Do not hold the borrow across a creation call.
    pub fn factory(&self) -> RefMut<'_, BenchFactory> {
        self.shared.factory.borrow_mut()
    }

    /// Register a component or object type with the factory.
    pub fn register_type(&self, handle: &BenchType) {
        self.shared.factory.borrow_mut().register(handle);
    }

    /// The run lifecycle state.
    pub fn core_state(&self) -> CoreState {
        self.shared.core_state.get()
    }

    pub(crate) fn set_core_state(&self, state: CoreState) {
        debug!(from = ?self.core_state(), to = ?state, "core state change");
        self.shared.core_state.set(state);
    }

    /// Receive every phase state transition.
    pub fn add_listener(&self, listener: Rc<dyn PhaseListener>) {
        self.shared.listeners.borrow_mut().push(listener);
    }

    /// Read access to the phase graph.
    pub fn phase_graph(&self) -> Ref<'_, PhaseGraph> {
        self.shared.graph.borrow()
    }

    /// Read access to the component tree.
    pub fn tree(&self) -> Ref<'_, ComponentTree> {
        self.shared.tree.borrow()
    }

    /// Drop every shared phase implementation not referenced by the graph.
    pub fn reset_phase_imps(&self) {
        self.shared.imps.borrow_mut().reset();
    }

    // -----------------------------------------------------------------------
    // Component tree
    // -----------------------------------------------------------------------

    /// The implicit top component.
    pub fn top(&self) -> ComponentId {
        self.shared.tree.borrow().top()
    }

    /// Leaf name of a component.
    pub fn name(&self, id: ComponentId) -> Option<String> {
        self.shared.tree.borrow().name(id).map(str::to_owned)
    }

    /// Dotted name of a component.
    pub fn full_name(&self, id: ComponentId) -> Option<String> {
        self.shared.tree.borrow().full_name(id).map(str::to_owned)
    }

    /// Type name a component was created as.
    pub fn type_name(&self, id: ComponentId) -> Option<String> {
        self.shared.tree.borrow().type_name(id).map(str::to_owned)
    }

    /// Parent of a component.
    pub fn parent(&self, id: ComponentId) -> Option<ComponentId> {
        self.shared.tree.borrow().parent(id)
    }

    /// Children of a component in creation order.
    pub fn children(&self, id: ComponentId) -> Vec<ComponentId> {
        self.shared.tree.borrow().children(id).to_vec()
    }

    /// Every component whose full name matches the glob `pattern`.
    pub fn find_all(&self, pattern: &str) -> Vec<ComponentId> {
        self.shared.tree.borrow().find_all(pattern)
    }

    /// The first component matching `pattern`; `CMPNFD` when none does.
    pub fn find(&self, pattern: &str) -> Option<ComponentId> {
        let found = self.find_all(pattern).first().copied();
        if found.is_none() {
            self.shared.reporter.warning(
                "CMPNFD",
                &format!("Component matching '{pattern}' was not found in the list of components"),
                CONTEXT,
            );
        }
        found
    }

    /// The component with exactly this full name.
    pub fn lookup(&self, full_name: &str) -> Option<ComponentId> {
        self.shared.tree.borrow().lookup(full_name)
    }

    /// Report the hierarchy as `UVMTOP` and return it; `EMTCOMP` when
    /// nothing was created.
    pub fn print_topology(&self) -> String {
        let rendered = self.shared.tree.borrow().render();
        if rendered.is_empty() {
            self.shared.reporter.warning(
                "EMTCOMP",
                "print_topology - No UVM components to print.",
                CONTEXT,
            );
        } else {
            self.shared.reporter.info(
                "UVMTOP",
                &format!("UVM testbench topology:\n{rendered}"),
                CONTEXT,
                Verbosity::Low,
            );
        }
        rendered
    }

    /// Assign a component (and with `hier` its subtree) to `domain`.
    pub fn set_domain(
        &self,
        component: ComponentId,
        domain: PhaseId,
        hier: bool,
    ) -> Result<(), PhaseError> {
        if !self.shared.tree.borrow().contains(component) {
            return Err(PhaseError::UnknownComponent { id: component });
        }
        if self.shared.graph.borrow().node(domain).is_none() {
            return Err(PhaseError::UnknownNode { id: domain });
        }
        self.shared
            .tree
            .borrow_mut()
            .set_domain(component, domain, hier);
        Ok(())
    }

    /// Whether a component may still be added.
    fn creation_allowed(&self, name: &str, parent: ComponentId) -> bool {
        let eoe_started = {
            let graph = self.shared.graph.borrow();
            graph
                .find_in(graph.common_domain(), BuiltinPhase::EndOfElaboration.name())
                .map(|id| graph.state(id))
                .is_some_and(|s| s >= PhaseState::Started && s != PhaseState::Jumping)
        };
        if eoe_started {
            let parent_name = self.full_name(parent).unwrap_or_default();
            self.shared.reporter.fatal(
                "ILLCRT",
                &format!(
                    "It is illegal to create a component ('{name}' under '{parent_name}') after \
                     the build phase has ended."
                ),
                CONTEXT,
            );
            self.die();
            return false;
        }
        true
    }

    /// Pick the child name and reject collisions with `CLDEXT`.
    fn prepare_child(&self, parent: ComponentId, name: &str) -> Option<String> {
        let name = self.shared.tree.borrow_mut().choose_name(name);
        let tree = self.shared.tree.borrow();
        if !tree.contains(parent) {
            tracing::warn!(%parent, name, "component parent does not exist");
            return None;
        }
        if tree.child_by_name(parent, &name).is_some() {
            let parent_name = tree.full_name(parent).unwrap_or_default().to_owned();
            drop(tree);
            self.shared.reporter.error(
                "CLDEXT",
                &format!(
                    "Cannot set '{name}' as a child of '{parent_name}', which already has a \
                     child by that name."
                ),
                CONTEXT,
            );
            return None;
        }
        drop(tree);
        self.creation_allowed(&name, parent).then_some(name)
    }

    fn insert_child(
        &self,
        parent: ComponentId,
        name: &str,
        type_name: &str,
        behavior: Rc<dyn Component>,
    ) -> Option<ComponentId> {
        let inserted = self
            .shared
            .tree
            .borrow_mut()
            .insert(parent, name, type_name, behavior);
        match inserted {
            Ok(id) => {
                debug!(%id, name, type_name, "component created");
                Some(id)
            }
            Err(InsertError::NameTaken) => {
                self.shared.reporter.error(
                    "CLDEXT",
                    &format!("Cannot set '{name}' as a child: a sibling has that name."),
                    CONTEXT,
                );
                None
            }
            Err(InsertError::UnknownParent) => None,
        }
    }

    /// Add a component with an explicit behavior, bypassing the factory.
    pub fn add_component(
        &self,
        parent: ComponentId,
        name: &str,
        type_name: &str,
        behavior: Rc<dyn Component>,
    ) -> Option<ComponentId> {
        let name = self.prepare_child(parent, name)?;
        self.insert_child(parent, &name, type_name, behavior)
    }

    fn build_child(
        &self,
        handle: &BenchType,
        parent: ComponentId,
        name: &str,
    ) -> Option<ComponentId> {
        let parent_handle = ComponentHandle::new(self.clone(), parent);
        let Some(behavior) = handle.create_component(name, &parent_handle) else {
            self.shared.reporter.warning(
                "CRTCOMP",
                &format!("Type '{}' cannot create components.", handle.display_name()),
                "factory",
            );
            return None;
        };
        self.insert_child(parent, name, handle.type_name(), behavior)
    }

    /// Create a child of `parent` of type `requested` or its override.
    pub fn create_component_by_type(
        &self,
        requested: &BenchType,
        parent: ComponentId,
        name: &str,
    ) -> Option<ComponentId> {
        let name = self.prepare_child(parent, name)?;
        let parent_path = self.full_name(parent)?;
        let resolved = self
            .shared
            .factory
            .borrow_mut()
            .resolve_by_type(requested, &parent_path, &name)?;
        self.build_child(&resolved, parent, &name)
    }

    /// Create a child of `parent` of the type named `type_name` or its
    /// override.
    pub fn create_component_by_name(
        &self,
        type_name: &str,
        parent: ComponentId,
        name: &str,
    ) -> Option<ComponentId> {
        let name = self.prepare_child(parent, name)?;
        let parent_path = self.full_name(parent)?;
        let resolved = self
            .shared
            .factory
            .borrow_mut()
            .resolve_by_name(type_name, &parent_path, &name)?;
        self.build_child(&resolved, parent, &name)
    }

    /// Create an object of `requested` or its override.
    pub fn create_object_by_type(
        &self,
        requested: &BenchType,
        parent_path: &str,
        name: &str,
    ) -> Option<Box<dyn Any>> {
        let resolved = self
            .shared
            .factory
            .borrow_mut()
            .resolve_by_type(requested, parent_path, name)?;
        resolved.create_object(name)
    }

    /// Create an object of the type named `type_name` or its override.
    pub fn create_object_by_name(
        &self,
        type_name: &str,
        parent_path: &str,
        name: &str,
    ) -> Option<Box<dyn Any>> {
        let resolved = self
            .shared
            .factory
            .borrow_mut()
            .resolve_by_name(type_name, parent_path, name)?;
        resolved.create_object(name)
    }

    // -----------------------------------------------------------------------
    // Phase graph
    // -----------------------------------------------------------------------

    /// The common domain.
    pub fn common_domain(&self) -> PhaseId {
        self.shared.graph.borrow().common_domain()
    }

    /// The default run-time domain.
    pub fn uvm_domain(&self) -> PhaseId {
        self.shared.graph.borrow().uvm_domain()
    }

    /// A domain by name.
    pub fn domain(&self, name: &str) -> Option<PhaseId> {
        self.shared.graph.borrow().domain(name)
    }

    /// Every domain, by name.
    pub fn domains(&self) -> Vec<(String, PhaseId)> {
        self.shared
            .graph
            .borrow()
            .domains()
            .map(|(name, id)| (name.to_owned(), id))
            .collect()
    }

    /// Create a domain with its own run-time schedule. A duplicate name is
    /// reported as `UNIQDOMNAM`.
    pub fn create_domain(&self, name: &str) -> Result<PhaseId, PhaseError> {
        let created = {
            let mut imps = self.shared.imps.borrow_mut();
            self.shared.graph.borrow_mut().create_domain(name, &mut imps)
        };
        if let Err(PhaseError::DuplicateDomain { .. }) = &created {
            self.shared.reporter.error(
                "UNIQDOMNAM",
                &format!("Domain created with non-unique name '{name}'"),
                CONTEXT,
            );
        }
        created
    }

    /// Make same-named phases of two domains start together.
    pub fn sync(&self, a: PhaseId, b: PhaseId) -> Result<usize, PhaseError> {
        self.shared.graph.borrow_mut().sync(a, b)
    }

    /// Undo [`Self::sync`].
    pub fn unsync(&self, a: PhaseId, b: PhaseId) -> Result<usize, PhaseError> {
        self.shared.graph.borrow_mut().unsync(a, b)
    }

    /// Find a phase anywhere in the graph by name or full name.
    pub fn find_phase(&self, name: &str) -> Option<PhaseId> {
        self.shared.graph.borrow().find_by_name(name)
    }

    /// Find a phase inside a schedule or domain.
    pub fn find_phase_in(&self, scope: PhaseId, name: &str) -> Option<PhaseId> {
        self.shared.graph.borrow().find_in(scope, name)
    }

    /// State of a phase node.
    pub fn phase_state(&self, phase: PhaseId) -> PhaseState {
        self.shared.graph.borrow().state(phase)
    }

    /// Own name of a phase node.
    pub fn phase_name(&self, phase: PhaseId) -> Option<String> {
        self.shared
            .graph
            .borrow()
            .node(phase)
            .map(|n| n.name().to_owned())
    }

    /// Dotted name of a phase node.
    pub fn phase_full_name(&self, phase: PhaseId) -> String {
        self.shared.graph.borrow().full_name(phase)
    }

    /// Whether `earlier` runs before `later`.
    pub fn is_before(&self, earlier: PhaseId, later: PhaseId) -> bool {
        self.shared.graph.borrow().is_before(earlier, later)
    }

    /// Whether `later` runs after `earlier`.
    pub fn is_after(&self, later: PhaseId, earlier: PhaseId) -> bool {
        self.shared.graph.borrow().is_after(later, earlier)
    }

    /// Add a phase to a schedule or domain. The implementation is shared
    /// by name: adding a second phase with the same name reuses the first
    /// implementation.
    pub fn add_phase(
        &self,
        schedule: PhaseId,
        imp: PhaseImp,
        placement: Placement,
    ) -> Result<PhaseId, PhaseError> {
        let imp = self.shared.imps.borrow_mut().register(imp);
        self.shared
            .graph
            .borrow_mut()
            .add(schedule, imp, placement)
    }

    /// Add an empty schedule to a schedule or domain.
    pub fn add_schedule(
        &self,
        schedule: PhaseId,
        name: &str,
        placement: Placement,
    ) -> Result<PhaseId, PhaseError> {
        self.shared
            .graph
            .borrow_mut()
            .add_schedule(schedule, name, placement)
    }

    /// Run `imp` instead of the graph's implementation when the phase
    /// named `phase_name` executes for `component` (and, with `hier`, its
    /// current subtree). The implementation must be a task exactly when
    /// the phase is.
    pub fn set_phase_imp(
        &self,
        component: ComponentId,
        phase_name: &str,
        imp: PhaseImp,
        hier: bool,
    ) -> Result<(), PhaseError> {
        let expected = {
            let graph = self.shared.graph.borrow();
            graph
                .nodes()
                .filter(|n| n.name() == phase_name)
                .find_map(PhaseNode::traversal)
        };
        if let Some(expected) = expected
            && expected.is_task() != imp.traversal().is_task()
        {
            return Err(PhaseError::ImpKindMismatch {
                phase: phase_name.to_owned(),
                expected,
                found: imp.traversal(),
            });
        }
        let mut tree = self.shared.tree.borrow_mut();
        if !tree.contains(component) {
            return Err(PhaseError::UnknownComponent { id: component });
        }
        let imp = Rc::new(imp);
        let targets = if hier {
            tree.subtree(component)
        } else {
            vec![component]
        };
        for target in targets {
            if let Some(node) = tree.node_mut(target) {
                node.phase_imps
                    .insert(phase_name.to_owned(), Rc::clone(&imp));
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Jumps
    // -----------------------------------------------------------------------

    /// Ask the running phase `phase` to jump to the phase named `target`.
    ///
    /// An idle phase is `JMPPHIDL`; an unreachable target is
    /// `PH_BADJUMP`.
    pub fn jump_phase(&self, phase: PhaseId, target: &str) -> Result<PhaseId, PhaseError> {
        let requested = self.shared.graph.borrow_mut().request_jump(phase, target);
        match &requested {
            Ok(to) => {
                debug!(from = %phase, to = %to, "jump requested");
                self.shared.state_changed.notify_waiters();
            }
            Err(PhaseError::NotActive { name, .. }) => self.shared.reporter.error(
                "JMPPHIDL",
                &format!("Attempting to jump from phase '{name}' which is not currently active"),
                CONTEXT,
            ),
            Err(err) => self.shared.reporter.error("PH_BADJUMP", &err.to_string(), CONTEXT),
        }
        requested
    }

    /// Make every active phase of `domain` jump to the phase named
    /// `target`. Returns how many phases will jump.
    pub fn jump(&self, domain: PhaseId, target: &str) -> usize {
        self.jump_domains(&[domain], target)
    }

    /// [`Self::jump`] in every domain.
    pub fn jump_all(&self, target: &str) -> usize {
        let domains: Vec<PhaseId> = self.domains().into_iter().map(|(_, id)| id).collect();
        self.jump_domains(&domains, target)
    }

    fn jump_domains(&self, domains: &[PhaseId], target: &str) -> usize {
        let count = {
            let mut graph = self.shared.graph.borrow_mut();
            let candidates: BTreeMap<PhaseId, PhaseId> = domains
                .iter()
                .flat_map(|domain| graph.jump_candidates(*domain, target))
                .collect();
            for (from, to) in &candidates {
                graph.set_jump(*from, *to);
            }
            candidates.len()
        };
        if count > 0 {
            debug!(target, count, "domain jump requested");
            self.shared.state_changed.notify_waiters();
        }
        count
    }
}
