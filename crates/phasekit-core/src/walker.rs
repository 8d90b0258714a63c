//! Applying one phase state to the component tree.
//!
//! Top-down phases visit a parent before its children and re-read the
//! child list after each callback, so children created in `build_phase`
//! are visited in the same pass. Bottom-up and task phases visit children
//! first. For task phases `EXECUTING` launches one task per component
//! instead of calling into it.

use std::rc::Rc;

use phasekit_types::{ComponentId, PhaseId, PhaseState, Traversal};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::component::Component;
use crate::context::PhaseContext;
use crate::phase::{BuiltinPhase, PhaseImp};
use crate::root::Root;

/// What a traversal needs to know about its phase node.
struct Walk {
    phase: PhaseId,
    imp: Rc<PhaseImp>,
    domain: Option<PhaseId>,
    common: PhaseId,
    state: PhaseState,
}

impl Walk {
    fn in_common(&self) -> bool {
        self.domain == Some(self.common)
    }

    /// A phase acts on a component only when it belongs to the common
    /// domain or to the component's own domain.
    fn applies_to(&self, component_domain: PhaseId) -> bool {
        self.in_common() || self.domain == Some(component_domain)
    }
}

impl Root {
    /// Run the per-component action for `state` of `phase` over the whole
    /// tree. Nodes without an implementation have nothing to do.
    pub(crate) fn traverse(&self, phase: PhaseId, state: PhaseState) {
        let walk = {
            let graph = self.shared.graph.borrow();
            let Some(imp) = graph.node(phase).and_then(|n| n.imp().cloned()) else {
                return;
            };
            Walk {
                phase,
                imp,
                domain: graph.domain_of(phase),
                common: graph.common_domain(),
                state,
            }
        };

        if !matches!(
            state,
            PhaseState::Started
                | PhaseState::Executing
                | PhaseState::ReadyToEnd
                | PhaseState::Ended
        ) {
            self.shared.reporter.fatal(
                "PH_BADSTATE",
                &format!(
                    "traverse: phase '{}' was asked to act on illegal state {state}",
                    self.phase_full_name(phase)
                ),
                "phase",
            );
            self.die();
            return;
        }

        let top = self.top();
        match walk.imp.traversal() {
            Traversal::TopDown => self.visit_top_down(top, &walk),
            Traversal::BottomUp | Traversal::Task => {
                let order = self.shared.tree.borrow().bottom_up(top);
                for component in order {
                    if self.is_aborted() {
                        break;
                    }
                    self.apply(&walk, component);
                }
            }
        }
    }

    fn visit_top_down(&self, component: ComponentId, walk: &Walk) {
        if self.is_aborted() {
            return;
        }
        self.apply(walk, component);
        let mut index = 0usize;
        loop {
            let child = self.shared.tree.borrow().child(component, index);
            let Some(child) = child else {
                break;
            };
            self.visit_top_down(child, walk);
            index = index.saturating_add(1);
        }
    }

    /// The token handed to callbacks: the task window's token while task
    /// bodies run, otherwise a child of the abort token.
    fn phase_token(&self, phase: PhaseId) -> CancellationToken {
        self.shared
            .tasks
            .borrow()
            .get(&phase)
            .map_or_else(|| self.shared.abort.child_token(), |t| t.token.clone())
    }

    fn apply(&self, walk: &Walk, component: ComponentId) {
        let (behavior, build_done, override_imp) = {
            let tree = self.shared.tree.borrow();
            let Some(node) = tree.node(component) else {
                return;
            };
            if !walk.applies_to(node.domain) {
                return;
            }
            (
                Rc::clone(&node.behavior),
                node.build_done,
                node.phase_imps.get(walk.imp.name()).cloned(),
            )
        };
        let ctx = PhaseContext::new(
            self.clone(),
            walk.phase,
            component,
            self.phase_token(walk.phase),
        );

        match walk.state {
            PhaseState::Started => {
                self.set_current_phase(component, Some(walk.phase));
                behavior.phase_started(&ctx);
            }
            PhaseState::Executing => {
                let imp = override_imp
                    .filter(|imp| imp.traversal().is_task() == walk.imp.traversal().is_task())
                    .unwrap_or_else(|| Rc::clone(&walk.imp));
                if imp.traversal().is_task() {
                    self.spawn_task(walk.phase, component, behavior, &imp, ctx);
                    return;
                }
                let is_build = walk.in_common() && walk.imp.name() == BuiltinPhase::Build.name();
                if is_build && build_done {
                    return;
                }
                imp.body().exec_func(behavior.as_ref(), &ctx);
                if is_build && let Some(node) = self.shared.tree.borrow_mut().node_mut(component) {
                    node.build_done = true;
                }
            }
            PhaseState::ReadyToEnd => behavior.phase_ready_to_end(&ctx),
            PhaseState::Ended => {
                behavior.phase_ended(&ctx);
                self.set_current_phase(component, None);
            }
            _ => {}
        }
    }

    fn set_current_phase(&self, component: ComponentId, phase: Option<PhaseId>) {
        if let Some(node) = self.shared.tree.borrow_mut().node_mut(component) {
            node.current_phase = phase;
        }
    }

    fn spawn_task(
        &self,
        phase: PhaseId,
        component: ComponentId,
        behavior: Rc<dyn Component>,
        imp: &PhaseImp,
        ctx: PhaseContext,
    ) {
        let token = self.phase_token(phase);
        let body = imp.body().exec_task(behavior, ctx);
        let handle = tokio::task::spawn_local(async move {
            tokio::select! {
                () = token.cancelled() => {}
                () = body => {}
            }
        });
        debug!(%phase, %component, "task phase body spawned");
        match self.shared.tasks.borrow_mut().get_mut(&phase) {
            Some(tasks) => tasks.handles.push(handle),
            None => handle.abort(),
        }
    }
}
