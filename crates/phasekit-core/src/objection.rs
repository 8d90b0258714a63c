//! Phase objections: counted reasons to keep a phase open.
//!
//! Counts are kept per phase node and per contributing component. The
//! engine polls [`Objections::total_of`] for a phase and the siblings
//! converging on the same successor, and waits on
//! [`Objections::wait_all_dropped`] between ready-to-end rounds.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

use phasekit_report::ReportServer;
use phasekit_types::{ComponentId, PhaseId, Verbosity};
use tokio::sync::Notify;

/// Per-phase, per-contributor objection counters.
pub struct Objections {
    reporter: Rc<ReportServer>,
    counts: RefCell<BTreeMap<PhaseId, BTreeMap<ComponentId, u32>>>,
    changed: Notify,
    trace: Cell<bool>,
}

impl core::fmt::Debug for Objections {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Objections")
            .field("counts", &self.counts.borrow())
            .field("trace", &self.trace.get())
            .finish_non_exhaustive()
    }
}

impl Objections {
    /// Empty counters reporting to `reporter`.
    pub fn new(reporter: Rc<ReportServer>) -> Self {
        Self {
            reporter,
            counts: RefCell::new(BTreeMap::new()),
            changed: Notify::new(),
            trace: Cell::new(false),
        }
    }

    /// Emit an `OBJTN_TRC` report for every raise and drop.
    pub fn set_trace(&self, trace: bool) {
        self.trace.set(trace);
    }

    /// Whether raise/drop tracing is on.
    pub fn trace(&self) -> bool {
        self.trace.get()
    }

    /// Raise `count` objections to ending `phase` on behalf of
    /// `contributor` (named `context` in reports).
    pub fn raise_objection(
        &self,
        phase: PhaseId,
        contributor: ComponentId,
        context: &str,
        count: u32,
    ) {
        let total = {
            let mut counts = self.counts.borrow_mut();
            let per_phase = counts.entry(phase).or_default();
            let entry = per_phase.entry(contributor).or_insert(0);
            *entry = entry.saturating_add(count);
            *entry
        };
        if self.trace.get() {
            self.reporter.info(
                "OBJTN_TRC",
                &format!("'{context}' raised {count} objection(s), count {total}"),
                context,
                Verbosity::None,
            );
        }
        self.changed.notify_waiters();
    }

    /// Drop `count` objections. Dropping more than were raised is an
    /// `OBJTN_ZERO` error and the count stays at zero.
    pub fn drop_objection(
        &self,
        phase: PhaseId,
        contributor: ComponentId,
        context: &str,
        count: u32,
    ) {
        let (remaining, underflow) = {
            let mut counts = self.counts.borrow_mut();
            let per_phase = counts.entry(phase).or_default();
            let entry = per_phase.entry(contributor).or_insert(0);
            let underflow = count > *entry;
            *entry = entry.saturating_sub(count);
            let remaining = *entry;
            if remaining == 0 {
                per_phase.remove(&contributor);
            }
            (remaining, underflow)
        };
        if underflow {
            self.reporter.error(
                "OBJTN_ZERO",
                &format!("Object '{context}' attempted to drop objection count below zero"),
                context,
            );
        } else if self.trace.get() {
            self.reporter.info(
                "OBJTN_TRC",
                &format!("'{context}' dropped {count} objection(s), count {remaining}"),
                context,
                Verbosity::None,
            );
        }
        self.changed.notify_waiters();
    }

    /// Outstanding objections from one contributor.
    pub fn count(&self, phase: PhaseId, contributor: ComponentId) -> u32 {
        self.counts
            .borrow()
            .get(&phase)
            .and_then(|per_phase| per_phase.get(&contributor))
            .copied()
            .unwrap_or(0)
    }

    /// Outstanding objections to ending `phase`.
    pub fn total(&self, phase: PhaseId) -> u32 {
        self.counts.borrow().get(&phase).map_or(0, |per_phase| {
            per_phase.values().fold(0u32, |sum, n| sum.saturating_add(*n))
        })
    }

    /// Outstanding objections across several phases.
    pub fn total_of(&self, phases: &[PhaseId]) -> u32 {
        phases
            .iter()
            .fold(0u32, |sum, phase| sum.saturating_add(self.total(*phase)))
    }

    /// Forget every objection to `phase`.
    pub fn clear(&self, phase: PhaseId) {
        let removed = self.counts.borrow_mut().remove(&phase).is_some();
        if removed {
            self.changed.notify_waiters();
        }
    }

    /// Resolve once no objection to any of `phases` remains.
    pub async fn wait_all_dropped(&self, phases: &[PhaseId]) {
        loop {
            let changed = self.changed.notified();
            if self.total_of(phases) == 0 {
                return;
            }
            changed.await;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use phasekit_report::MemorySink;

    use super::*;

    fn objections() -> (Objections, MemorySink) {
        let sink = MemorySink::new();
        let reporter = Rc::new(ReportServer::new(sink.clone()));
        (Objections::new(reporter), sink)
    }

    #[test]
    fn totals_sum_contributors() {
        let (obj, _) = objections();
        let phase = PhaseId::new();
        let (a, b) = (ComponentId::new(), ComponentId::new());
        obj.raise_objection(phase, a, "a", 2);
        obj.raise_objection(phase, b, "b", 1);
        assert_eq!(obj.total(phase), 3);
        assert_eq!(obj.count(phase, a), 2);

        obj.drop_objection(phase, a, "a", 2);
        assert_eq!(obj.total(phase), 1);
        assert_eq!(obj.count(phase, a), 0);
        assert_eq!(obj.total_of(&[phase, PhaseId::new()]), 1);
    }

    #[test]
    fn underflow_is_an_error_clamped_to_zero() {
        let (obj, sink) = objections();
        let phase = PhaseId::new();
        let a = ComponentId::new();
        obj.raise_objection(phase, a, "a", 1);
        obj.drop_objection(phase, a, "a", 3);
        assert_eq!(obj.total(phase), 0);
        assert_eq!(sink.count_id("OBJTN_ZERO"), 1);
    }

    #[test]
    fn trace_reports_raise_and_drop() {
        let (obj, sink) = objections();
        obj.set_trace(true);
        let phase = PhaseId::new();
        let a = ComponentId::new();
        obj.raise_objection(phase, a, "env.a", 1);
        obj.drop_objection(phase, a, "env.a", 1);
        assert_eq!(sink.count_id("OBJTN_TRC"), 2);
    }

    #[test]
    fn clear_forgets_a_phase() {
        let (obj, _) = objections();
        let phase = PhaseId::new();
        obj.raise_objection(phase, ComponentId::new(), "a", 4);
        obj.clear(phase);
        assert_eq!(obj.total(phase), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_resolves_after_last_drop() {
        let (obj, _) = objections();
        let obj = Rc::new(obj);
        let phase = PhaseId::new();
        let a = ComponentId::new();
        obj.raise_objection(phase, a, "a", 1);

        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let dropper = Rc::clone(&obj);
                tokio::task::spawn_local(async move {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    dropper.drop_objection(phase, a, "a", 1);
                });
                let start = tokio::time::Instant::now();
                obj.wait_all_dropped(&[phase]).await;
                assert!(start.elapsed() >= Duration::from_millis(50));
            })
            .await;
    }
}
