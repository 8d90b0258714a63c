//! Phase state-change notifications.

use std::cell::RefCell;
use std::rc::Rc;

use phasekit_types::{PhaseState, PhaseStateChange};

/// Receives every phase node state transition.
pub trait PhaseListener {
    /// Called after a node changed state.
    fn phase_state_change(&self, change: &PhaseStateChange);
}

/// A listener that keeps every change it sees. Clones share the record.
#[derive(Debug, Clone, Default)]
pub struct RecordingListener {
    changes: Rc<RefCell<Vec<PhaseStateChange>>>,
}

impl RecordingListener {
    /// An empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every change so far.
    pub fn changes(&self) -> Vec<PhaseStateChange> {
        self.changes.borrow().clone()
    }

    /// States a node went through, by full name.
    pub fn states_of(&self, full_name: &str) -> Vec<PhaseState> {
        self.changes
            .borrow()
            .iter()
            .filter(|c| c.name == full_name)
            .map(|c| c.state)
            .collect()
    }

    /// Full names of nodes in the order they entered `state`.
    pub fn entered(&self, state: PhaseState) -> Vec<String> {
        self.changes
            .borrow()
            .iter()
            .filter(|c| c.state == state)
            .map(|c| c.name.clone())
            .collect()
    }
}

impl PhaseListener for RecordingListener {
    fn phase_state_change(&self, change: &PhaseStateChange) {
        self.changes.borrow_mut().push(change.clone());
    }
}

#[cfg(test)]
mod tests {
    use phasekit_types::PhaseId;

    use super::*;

    fn change(name: &str, prev_state: PhaseState, state: PhaseState) -> PhaseStateChange {
        PhaseStateChange {
            phase: PhaseId::new(),
            name: name.to_owned(),
            prev_state,
            state,
            jump_to: None,
        }
    }

    #[test]
    fn records_are_shared_between_clones() {
        let listener = RecordingListener::new();
        let clone = listener.clone();
        clone.phase_state_change(&change(
            "common.build",
            PhaseState::Scheduled,
            PhaseState::Syncing,
        ));
        clone.phase_state_change(&change(
            "common.build",
            PhaseState::Syncing,
            PhaseState::Started,
        ));
        clone.phase_state_change(&change(
            "common.connect",
            PhaseState::Syncing,
            PhaseState::Started,
        ));

        assert_eq!(listener.changes().len(), 3);
        assert_eq!(
            listener.states_of("common.build"),
            vec![PhaseState::Syncing, PhaseState::Started]
        );
        assert_eq!(
            listener.entered(PhaseState::Started),
            vec!["common.build", "common.connect"]
        );
    }
}
