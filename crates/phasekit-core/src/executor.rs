//! The phase engine.
//!
//! A hopper channel carries scheduled nodes; each one is executed by its
//! own local task that waits for its predecessors, walks the node through
//! its states and schedules its successors. A node is scheduled with an
//! epoch; when a jump resets or completes the node behind its back the
//! waiting execution notices the mismatch and quietly exits.

use std::collections::BTreeSet;
use std::time::Duration;

use phasekit_types::{PhaseId, PhaseState, PhaseStateChange, PhaseType, Severity, Verbosity};
use tokio::sync::mpsc;
use tracing::debug;

use crate::phase::BuiltinPhase;
use crate::root::{PhaseTasks, Root};

const CONTEXT: &str = "phase";

/// Scheduler passes given to waiters after each traversal.
const SETTLE_PASSES: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Readiness {
    Waiting,
    Ready,
    Stale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WindowEnd {
    Ended,
    Jumped,
    TimedOut,
}

async fn expire(timeout: Option<Duration>) {
    match timeout {
        Some(after) => tokio::time::sleep(after).await,
        None => std::future::pending().await,
    }
}

impl Root {
    /// Schedule the common domain and execute nodes as they arrive until
    /// every node is done or the run aborts.
    pub(crate) async fn run_phases(&self) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        *self.shared.hopper.borrow_mut() = Some(tx);
        self.schedule(self.common_domain());

        loop {
            tokio::select! {
                biased;
                () = self.shared.abort.cancelled() => break,
                () = self.shared.done.cancelled() => break,
                next = rx.recv() => {
                    let Some((phase, epoch)) = next else {
                        break;
                    };
                    let root = self.clone();
                    let handle = tokio::task::spawn_local(async move {
                        root.execute_phase(phase, epoch).await;
                    });
                    self.shared.engine.borrow_mut().push(handle);
                }
            }
        }

        self.shared.hopper.borrow_mut().take();
        let engine: Vec<_> = self.shared.engine.borrow_mut().drain(..).collect();
        for handle in engine {
            handle.abort();
        }
        self.kill_all_tasks();
    }

    /// Put a node in the hopper.
    pub(crate) fn schedule(&self, phase: PhaseId) {
        let epoch = {
            let mut graph = self.shared.graph.borrow_mut();
            let Some(node) = graph.node_mut(phase) else {
                return;
            };
            node.epoch = node.epoch.wrapping_add(1);
            node.epoch
        };
        self.set_state(phase, PhaseState::Scheduled, None);
        let sent = self
            .shared
            .hopper
            .borrow()
            .as_ref()
            .is_some_and(|tx| tx.send((phase, epoch)).is_ok());
        if !sent {
            debug!(%phase, "hopper closed, phase not scheduled");
        }
    }

    /// Change a node's state and tell listeners and waiters.
    pub(crate) fn set_state(&self, phase: PhaseId, state: PhaseState, jump_to: Option<PhaseId>) {
        let prev_state = {
            let mut graph = self.shared.graph.borrow_mut();
            let Some(node) = graph.node_mut(phase) else {
                return;
            };
            let prev = node.state;
            node.state = state;
            prev
        };
        let change = PhaseStateChange {
            phase,
            name: self.phase_full_name(phase),
            prev_state,
            state,
            jump_to,
        };
        debug!(phase = %change.name, from = %prev_state, to = %state, "phase state change");
        if self.shared.settings.phase_trace.get() {
            self.shared.reporter.info(
                "PH/TRC/STATE",
                &format!("Phase '{}' {prev_state} -> {state}", change.name),
                CONTEXT,
                Verbosity::None,
            );
        }
        let listeners = self.shared.listeners.borrow().clone();
        for listener in listeners {
            listener.phase_state_change(&change);
        }
        self.shared.state_changed.notify_waiters();
    }

    /// Resolve once `cond` holds, re-checking after every state change.
    async fn wait_until(&self, mut cond: impl FnMut(&Self) -> bool) {
        loop {
            let changed = self.shared.state_changed.notified();
            if cond(self) {
                return;
            }
            changed.await;
        }
    }

    async fn settle(&self) {
        for _ in 0..SETTLE_PASSES {
            tokio::task::yield_now().await;
        }
    }

    fn readiness(&self, phase: PhaseId, epoch: u32) -> Readiness {
        let graph = self.shared.graph.borrow();
        let Some(node) = graph.node(phase) else {
            return Readiness::Stale;
        };
        if node.epoch != epoch || node.state != PhaseState::Scheduled || self.is_aborted() {
            return Readiness::Stale;
        }
        if node
            .predecessors()
            .iter()
            .all(|pred| graph.state(*pred) == PhaseState::Done)
        {
            Readiness::Ready
        } else {
            Readiness::Waiting
        }
    }

    /// Whether a jump reset the node since it was scheduled.
    fn superseded(&self, phase: PhaseId, epoch: u32) -> bool {
        let graph = self.shared.graph.borrow();
        graph.node(phase).is_none_or(|node| {
            node.epoch != epoch || node.state == PhaseState::Uninitialized
        }) || self.is_aborted()
    }

    fn has_jump(&self, phase: PhaseId) -> bool {
        self.shared
            .graph
            .borrow()
            .node(phase)
            .is_some_and(|n| n.jump.is_some())
    }

    // -----------------------------------------------------------------------
    // One node
    // -----------------------------------------------------------------------

    async fn execute_phase(&self, phase: PhaseId, epoch: u32) {
        self.wait_until(|root| root.readiness(phase, epoch) != Readiness::Waiting)
            .await;
        if self.readiness(phase, epoch) == Readiness::Stale {
            return;
        }

        self.set_state(phase, PhaseState::Syncing, None);
        let (partners, kind, traversal) = {
            let mut graph = self.shared.graph.borrow_mut();
            let Some(node) = graph.node_mut(phase) else {
                return;
            };
            node.run_count = node.run_count.saturating_add(1);
            (node.sync.clone(), node.kind(), node.traversal())
        };
        self.wait_until(|root| {
            root.superseded(phase, epoch)
                || partners
                    .iter()
                    .all(|p| root.phase_state(*p) >= PhaseState::Syncing)
        })
        .await;
        if self.superseded(phase, epoch) {
            return;
        }

        let Some(traversal) = traversal.filter(|_| kind == PhaseType::Node) else {
            self.set_state(phase, PhaseState::Started, None);
            self.settle().await;
            self.set_state(phase, PhaseState::Executing, None);
            self.settle().await;
            if !self.is_aborted() {
                self.finish_phase(phase);
            }
            return;
        };

        // STARTED
        if let Some(node) = self.shared.graph.borrow_mut().node_mut(phase) {
            node.ready_to_end_count = 0;
        }
        self.set_state(phase, PhaseState::Started, None);
        self.traverse(phase, PhaseState::Started);
        self.settle().await;
        if self.is_aborted() {
            return;
        }

        // EXECUTING and READY_TO_END
        self.set_state(phase, PhaseState::Executing, None);
        let window = if traversal.is_task() {
            self.run_task_window(phase).await
        } else {
            self.traverse(phase, PhaseState::Executing);
            self.settle().await;
            if self.has_jump(phase) {
                WindowEnd::Jumped
            } else {
                self.ready_to_end_loop(phase).await;
                WindowEnd::Ended
            }
        };
        if self.is_aborted() {
            return;
        }
        if window == WindowEnd::TimedOut {
            let timeout = self.phase_timeout().unwrap_or_default();
            self.shared.reporter.fatal(
                "PH_TIMEOUT",
                &format!(
                    "Default timeout of {}ms hit in phase '{}', indicating a probable testbench \
                     issue",
                    timeout.as_millis(),
                    self.phase_full_name(phase)
                ),
                CONTEXT,
            );
            self.die();
            return;
        }

        let jump = self
            .shared
            .graph
            .borrow()
            .node(phase)
            .and_then(|n| n.pending_jump());
        if let Some(jump) = jump {
            self.shared.reporter.info(
                "PH_JUMP",
                &format!(
                    "phase '{}' is jumping to phase '{}'",
                    self.phase_full_name(phase),
                    self.phase_full_name(jump.target)
                ),
                CONTEXT,
                Verbosity::Medium,
            );
            self.set_state(phase, PhaseState::Jumping, Some(jump.target));
        }

        // ENDED
        self.set_state(phase, PhaseState::Ended, None);
        self.traverse(phase, PhaseState::Ended);
        self.settle().await;

        // CLEANUP
        self.set_state(phase, PhaseState::Cleanup, None);
        self.kill_tasks(phase);
        self.settle().await;
        if self.is_aborted() {
            return;
        }

        self.finish_phase(phase);
    }

    /// Launch the task bodies and race the window against jumps and the
    /// phase timeout.
    async fn run_task_window(&self, phase: PhaseId) -> WindowEnd {
        let token = self.shared.abort.child_token();
        self.shared.tasks.borrow_mut().insert(
            phase,
            PhaseTasks {
                token,
                handles: Vec::new(),
            },
        );
        self.traverse(phase, PhaseState::Executing);
        self.settle().await;
        if self.has_jump(phase) {
            return WindowEnd::Jumped;
        }

        let timeout = self.phase_timeout();
        tokio::select! {
            biased;
            () = self.wait_until(|root| root.has_jump(phase)) => WindowEnd::Jumped,
            () = async {
                self.wait_for_siblings_to_execute(phase).await;
                self.ready_to_end_loop(phase).await;
            } => WindowEnd::Ended,
            () = expire(timeout) => WindowEnd::TimedOut,
        }
    }

    fn watched(&self, phase: PhaseId) -> (Vec<PhaseId>, Vec<PhaseId>) {
        let siblings = self.shared.graph.borrow().siblings(phase);
        let mut watched = vec![phase];
        watched.extend(siblings.iter().copied());
        (siblings, watched)
    }

    /// Wait until every sibling converging on the same successor is
    /// executing.
    async fn wait_for_siblings_to_execute(&self, phase: PhaseId) {
        let (siblings, _) = self.watched(phase);
        for sibling in &siblings {
            self.wait_until(|root| root.phase_state(*sibling) >= PhaseState::Executing)
                .await;
        }
    }

    /// Poll `phase_ready_to_end` until no objection remains, the node is
    /// asked to jump, or the iteration cap forces the end.
    async fn ready_to_end_loop(&self, phase: PhaseId) {
        let (_, watched) = self.watched(phase);
        loop {
            let count = {
                let mut graph = self.shared.graph.borrow_mut();
                let Some(node) = graph.node_mut(phase) else {
                    return;
                };
                node.ready_to_end_count = node.ready_to_end_count.saturating_add(1);
                node.ready_to_end_count
            };
            self.set_state(phase, PhaseState::ReadyToEnd, None);
            self.traverse(phase, PhaseState::ReadyToEnd);
            self.settle().await;
            if self.is_aborted() || self.has_jump(phase) {
                return;
            }
            if self.shared.objections.total_of(&watched) == 0 {
                return;
            }
            let max = self.shared.settings.max_ready_to_end.get();
            if count >= max {
                self.shared.reporter.warning(
                    "PH_READY_TO_END",
                    &format!(
                        "Phase '{}' reached the maximum of {max} ready_to_end iterations with \
                         objections outstanding; ending it",
                        self.phase_full_name(phase)
                    ),
                    CONTEXT,
                );
                return;
            }
            self.set_state(phase, PhaseState::Executing, None);
            let wait = self.shared.settings.ready_to_end_wait.get();
            let dropped = self.shared.objections.wait_all_dropped(&watched);
            if tokio::time::timeout(wait, dropped).await.is_err() {
                debug!(%phase, count, "objections still raised after ready_to_end wait");
            }
        }
    }

    // -----------------------------------------------------------------------
    // Completion and jumps
    // -----------------------------------------------------------------------

    /// The DONE step: take a pending jump, or mark the node done and
    /// schedule its successors.
    fn finish_phase(&self, phase: PhaseId) {
        let jump = self
            .shared
            .graph
            .borrow_mut()
            .node_mut(phase)
            .and_then(|n| n.jump.take());
        if let Some(jump) = jump {
            if jump.forward {
                self.clear_successors(phase, PhaseState::Done, Some(jump.target), phase);
            }
            self.clear_successors(jump.target, PhaseState::Uninitialized, None, phase);
            if self.phase_state(jump.target) < PhaseState::Scheduled {
                self.schedule(jump.target);
            }
            return;
        }

        self.set_state(phase, PhaseState::Done, None);
        let (is_eoe, successors) = {
            let graph = self.shared.graph.borrow();
            let is_eoe = graph.domain_of(phase) == Some(graph.common_domain())
                && graph
                    .node(phase)
                    .is_some_and(|n| n.name() == BuiltinPhase::EndOfElaboration.name());
            let successors = graph
                .node(phase)
                .map(|n| n.successors().to_vec())
                .unwrap_or_default();
            (is_eoe, successors)
        };

        if is_eoe && self.shared.reporter.severity_count(Severity::Error) > 0 {
            self.shared.reporter.fatal(
                "BUILDERR",
                "stopping due to build errors",
                CONTEXT,
            );
            self.die();
            return;
        }

        if successors.is_empty() {
            debug!(%phase, "all phases done");
            self.shared.done.cancel();
            return;
        }
        for successor in successors {
            if self.phase_state(successor) < PhaseState::Scheduled {
                self.schedule(successor);
            }
        }

        if self.shared.reporter.quit_count_reached() {
            self.shared.reporter.info(
                "QUITCNT",
                "Quit count reached!",
                CONTEXT,
                Verbosity::None,
            );
            self.die();
        }
    }

    /// Set `from` and everything after it (up to `stop`) to `state`,
    /// leaving phases that are busy in their own window alone.
    fn clear_successors(
        &self,
        from: PhaseId,
        state: PhaseState,
        stop: Option<PhaseId>,
        origin: PhaseId,
    ) {
        let mut seen = BTreeSet::new();
        let mut pending = vec![from];
        while let Some(id) = pending.pop() {
            if Some(id) == stop || !seen.insert(id) {
                continue;
            }
            let (current, successors) = {
                let graph = self.shared.graph.borrow();
                let Some(node) = graph.node(id) else {
                    continue;
                };
                (node.state(), node.successors().to_vec())
            };
            let busy = id != origin && (current.is_active() || current == PhaseState::Jumping);
            if !busy {
                if let Some(node) = self.shared.graph.borrow_mut().node_mut(id) {
                    node.jump = None;
                    node.ready_to_end_count = 0;
                }
                if current != state {
                    self.set_state(id, state, None);
                }
                self.shared.objections.clear(id);
            }
            pending.extend(successors);
        }
    }

    /// Kill every task body still running for `phase`.
    pub(crate) fn kill_tasks(&self, phase: PhaseId) {
        let Some(tasks) = self.shared.tasks.borrow_mut().remove(&phase) else {
            return;
        };
        tasks.token.cancel();
        let alive = tasks.handles.iter().filter(|h| !h.is_finished()).count();
        for handle in tasks.handles {
            handle.abort();
        }
        if alive > 0 {
            debug!(%phase, alive, "killed task phase bodies");
        }
    }

    /// Kill the task bodies of every phase.
    pub(crate) fn kill_all_tasks(&self) {
        let phases: Vec<PhaseId> = self.shared.tasks.borrow().keys().copied().collect();
        for phase in phases {
            self.kill_tasks(phase);
        }
    }
}
