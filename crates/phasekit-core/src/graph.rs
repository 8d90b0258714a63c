//! The phase graph: an arena of phase nodes linked by predecessor and
//! successor edges, organized into schedules and domains.
//!
//! Every schedule or domain is a begin node paired with a terminal end
//! node; the phases it contains sit between the two. Nested schedules are
//! placed inside their parent exactly like phases, using the begin node
//! for incoming edges and the end node for outgoing ones.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::rc::Rc;

use phasekit_types::{PhaseId, PhaseState, PhaseType, Traversal};

use crate::error::PhaseError;
use crate::phase::{BuiltinPhase, PhaseImp, PhaseImpRegistry};

/// Name of the domain holding the nine common phases.
pub const COMMON_DOMAIN: &str = "common";
/// Name of the default run-time domain.
pub const UVM_DOMAIN: &str = "uvm";
/// Name of the run-time schedule inside every run-time domain.
pub const RUNTIME_SCHEDULE: &str = "uvm_sched";

/// A jump recorded on a node, taken when the node finishes its window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingJump {
    /// The node execution relocates to.
    pub target: PhaseId,
    /// Whether the target comes after the jumping node.
    pub forward: bool,
}

/// One node of the phase graph.
#[derive(Debug, Clone)]
pub struct PhaseNode {
    id: PhaseId,
    name: String,
    kind: PhaseType,
    imp: Option<Rc<PhaseImp>>,
    parent: Option<PhaseId>,
    end_node: Option<PhaseId>,
    predecessors: Vec<PhaseId>,
    successors: Vec<PhaseId>,
    pub(crate) state: PhaseState,
    pub(crate) run_count: u32,
    pub(crate) sync: Vec<PhaseId>,
    pub(crate) jump: Option<PendingJump>,
    pub(crate) ready_to_end_count: u32,
    /// Bumped on every scheduling so stale executions can tell they were
    /// superseded.
    pub(crate) epoch: u32,
}

impl PhaseNode {
    fn new(name: &str, kind: PhaseType, imp: Option<Rc<PhaseImp>>) -> Self {
        Self {
            id: PhaseId::new(),
            name: name.to_owned(),
            kind,
            imp,
            parent: None,
            end_node: None,
            predecessors: Vec::new(),
            successors: Vec::new(),
            state: PhaseState::Uninitialized,
            run_count: 0,
            sync: Vec::new(),
            jump: None,
            ready_to_end_count: 0,
            epoch: 0,
        }
    }

    /// The node id.
    pub const fn id(&self) -> PhaseId {
        self.id
    }

    /// The node's own name (`build`, `uvm_sched`, `common_end`).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Structural role.
    pub const fn kind(&self) -> PhaseType {
        self.kind
    }

    /// The implementation run by a [`PhaseType::Node`].
    pub fn imp(&self) -> Option<&Rc<PhaseImp>> {
        self.imp.as_ref()
    }

    /// Traversal of the implementation, if the node has one.
    pub fn traversal(&self) -> Option<Traversal> {
        self.imp.as_ref().map(|imp| imp.traversal())
    }

    /// Current state.
    pub const fn state(&self) -> PhaseState {
        self.state
    }

    /// How many times the node has started executing.
    pub const fn run_count(&self) -> u32 {
        self.run_count
    }

    /// Ready-to-end iterations in the current window.
    pub const fn ready_to_end_count(&self) -> u32 {
        self.ready_to_end_count
    }

    /// The schedule or domain containing the node.
    pub const fn parent(&self) -> Option<PhaseId> {
        self.parent
    }

    /// Nodes that must be done before this one starts.
    pub fn predecessors(&self) -> &[PhaseId] {
        &self.predecessors
    }

    /// Nodes scheduled when this one is done.
    pub fn successors(&self) -> &[PhaseId] {
        &self.successors
    }

    /// Nodes in other domains this one rendezvous with.
    pub fn sync_partners(&self) -> &[PhaseId] {
        &self.sync
    }

    /// The jump this node will take, if one was requested.
    pub const fn pending_jump(&self) -> Option<PendingJump> {
        self.jump
    }
}

/// Where [`PhaseGraph::add`] puts a new node.
///
/// With no anchor the node goes at the end of the schedule. `with` makes
/// it parallel to an existing node, `after` and `before` insert it into
/// the chain, and both together place it between two nodes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Placement {
    /// Run in parallel with this node.
    pub with: Option<PhaseId>,
    /// Start after this node.
    pub after: Option<PhaseId>,
    /// Finish before this node.
    pub before: Option<PhaseId>,
}

impl Placement {
    /// At the end of the schedule.
    pub const fn end() -> Self {
        Self {
            with: None,
            after: None,
            before: None,
        }
    }

    /// Parallel to `node`.
    pub const fn with(node: PhaseId) -> Self {
        Self {
            with: Some(node),
            after: None,
            before: None,
        }
    }

    /// Right after `node`.
    pub const fn after(node: PhaseId) -> Self {
        Self {
            with: None,
            after: Some(node),
            before: None,
        }
    }

    /// Right before `node`.
    pub const fn before(node: PhaseId) -> Self {
        Self {
            with: None,
            after: None,
            before: Some(node),
        }
    }

    /// Between `after` and `before`.
    pub const fn between(after: PhaseId, before: PhaseId) -> Self {
        Self {
            with: None,
            after: Some(after),
            before: Some(before),
        }
    }
}

/// The phase graph of one root.
#[derive(Debug, Clone)]
pub struct PhaseGraph {
    nodes: BTreeMap<PhaseId, PhaseNode>,
    domains: BTreeMap<String, PhaseId>,
    common: PhaseId,
    uvm: PhaseId,
}

impl PhaseGraph {
    /// Build the common domain and the default run-time domain.
    pub fn new(imps: &mut PhaseImpRegistry) -> Self {
        let mut graph = Self {
            nodes: BTreeMap::new(),
            domains: BTreeMap::new(),
            common: PhaseId::new(),
            uvm: PhaseId::new(),
        };

        let common = graph.new_container(COMMON_DOMAIN, PhaseType::Domain);
        graph.domains.insert(COMMON_DOMAIN.to_owned(), common);
        graph.common = common;
        let common_end = graph.end_of(common);
        let mut run = common;
        for phase in BuiltinPhase::COMMON {
            let node = graph.new_node(imps.builtin(phase));
            graph.place(common, node, None, None, Some(common_end));
            if phase == BuiltinPhase::Run {
                run = node;
            }
        }

        let uvm = graph.new_container(UVM_DOMAIN, PhaseType::Domain);
        graph.domains.insert(UVM_DOMAIN.to_owned(), uvm);
        graph.uvm = uvm;
        graph.fill_runtime_domain(uvm, imps);
        graph.place(common, uvm, Some(run), None, None);

        graph
    }

    // -----------------------------------------------------------------------
    // Lookup
    // -----------------------------------------------------------------------

    /// A node by id.
    pub fn node(&self, id: PhaseId) -> Option<&PhaseNode> {
        self.nodes.get(&id)
    }

    pub(crate) fn node_mut(&mut self, id: PhaseId) -> Option<&mut PhaseNode> {
        self.nodes.get_mut(&id)
    }

    fn require(&self, id: PhaseId) -> Result<&PhaseNode, PhaseError> {
        self.nodes.get(&id).ok_or(PhaseError::UnknownNode { id })
    }

    /// Every node, in id order.
    pub fn nodes(&self) -> impl Iterator<Item = &PhaseNode> {
        self.nodes.values()
    }

    /// State of a node (`Uninitialized` for unknown ids).
    pub fn state(&self, id: PhaseId) -> PhaseState {
        self.node(id).map_or(PhaseState::Uninitialized, PhaseNode::state)
    }

    /// The common domain.
    pub const fn common_domain(&self) -> PhaseId {
        self.common
    }

    /// The default run-time domain.
    pub const fn uvm_domain(&self) -> PhaseId {
        self.uvm
    }

    /// A domain by name.
    pub fn domain(&self, name: &str) -> Option<PhaseId> {
        self.domains.get(name).copied()
    }

    /// Every domain, by name.
    pub fn domains(&self) -> impl Iterator<Item = (&str, PhaseId)> {
        self.domains.iter().map(|(name, id)| (name.as_str(), *id))
    }

    /// The end node of a schedule or domain; other nodes are their own
    /// end.
    pub fn end_of(&self, id: PhaseId) -> PhaseId {
        self.node(id).and_then(|n| n.end_node).unwrap_or(id)
    }

    /// The domain a node belongs to: the nearest domain among the node
    /// itself and its enclosing schedules.
    pub fn domain_of(&self, id: PhaseId) -> Option<PhaseId> {
        let mut current = self.node(id);
        while let Some(node) = current {
            if node.kind == PhaseType::Domain {
                return Some(node.id);
            }
            current = node.parent.and_then(|p| self.node(p));
        }
        None
    }

    /// Dotted name from the enclosing domain down: `common.build`,
    /// `uvm.uvm_sched.main`, `uvm`.
    pub fn full_name(&self, id: PhaseId) -> String {
        let mut names = Vec::new();
        let mut current = self.node(id);
        while let Some(node) = current {
            names.push(node.name.as_str());
            if node.kind == PhaseType::Domain {
                break;
            }
            current = node.parent.and_then(|p| self.node(p));
        }
        names.reverse();
        names.join(".")
    }

    fn matches_name(&self, id: PhaseId, name: &str) -> bool {
        self.node(id)
            .is_some_and(|node| node.name == name || self.full_name(id) == name)
    }

    /// Every node between a schedule's begin and end markers, including
    /// nested schedules and their contents.
    pub fn transitive_children(&self, scope: PhaseId) -> Vec<PhaseId> {
        let end = self.end_of(scope);
        let mut seen = BTreeSet::from([scope]);
        let mut order = Vec::new();
        let mut queue: VecDeque<PhaseId> = self.successors_of(scope).into();
        while let Some(id) = queue.pop_front() {
            if id == end || !seen.insert(id) {
                continue;
            }
            order.push(id);
            queue.extend(self.successors_of(id));
        }
        order
    }

    /// Find a node inside `scope` by name or full name.
    pub fn find_in(&self, scope: PhaseId, name: &str) -> Option<PhaseId> {
        self.transitive_children(scope)
            .into_iter()
            .find(|id| self.matches_name(*id, name))
    }

    /// Find a node anywhere in the graph by name or full name.
    pub fn find_by_name(&self, name: &str) -> Option<PhaseId> {
        if self.matches_name(self.common, name) {
            return Some(self.common);
        }
        self.find_in(self.common, name)
    }

    /// Find a phase reachable from `from`: predecessors are searched
    /// first, then successors.
    pub fn find_reachable(&self, from: PhaseId, name: &str) -> Option<PhaseId> {
        let is_target = |id: &PhaseId| {
            self.node(*id).is_some_and(|n| n.kind == PhaseType::Node)
                && self.matches_name(*id, name)
        };
        self.walk(from, |n| &n.predecessors)
            .into_iter()
            .find(is_target)
            .or_else(|| self.walk(from, |n| &n.successors).into_iter().find(is_target))
    }

    /// Whether `later` can be reached from `earlier` along successor
    /// edges.
    pub fn is_before(&self, earlier: PhaseId, later: PhaseId) -> bool {
        earlier != later && self.walk(earlier, |n| &n.successors).contains(&later)
    }

    /// Whether `later` comes after `earlier`.
    pub fn is_after(&self, later: PhaseId, earlier: PhaseId) -> bool {
        self.is_before(earlier, later)
    }

    /// Breadth-first walk along one edge direction, excluding `from`.
    fn walk(&self, from: PhaseId, edges: impl Fn(&PhaseNode) -> &[PhaseId]) -> Vec<PhaseId> {
        let mut seen = BTreeSet::from([from]);
        let mut order = Vec::new();
        let mut queue = VecDeque::from([from]);
        while let Some(id) = queue.pop_front() {
            let Some(node) = self.node(id) else {
                continue;
            };
            for next in edges(node) {
                if seen.insert(*next) {
                    order.push(*next);
                    queue.push_back(*next);
                }
            }
        }
        order
    }

    fn successors_of(&self, id: PhaseId) -> Vec<PhaseId> {
        self.node(id).map(|n| n.successors.clone()).unwrap_or_default()
    }

    fn predecessors_of(&self, id: PhaseId) -> Vec<PhaseId> {
        self.node(id)
            .map(|n| n.predecessors.clone())
            .unwrap_or_default()
    }

    /// Nodes converging on the same successors as `id`, plus its sync
    /// partners. Their objections hold `id` open too.
    pub fn siblings(&self, id: PhaseId) -> Vec<PhaseId> {
        let mut siblings = Vec::new();
        for succ in self.successors_of(id) {
            for pred in self.predecessors_of(succ) {
                if pred != id && !siblings.contains(&pred) {
                    siblings.push(pred);
                }
            }
        }
        if let Some(node) = self.node(id) {
            for partner in &node.sync {
                if !siblings.contains(partner) {
                    siblings.push(*partner);
                }
            }
        }
        siblings
    }

    // -----------------------------------------------------------------------
    // Construction
    // -----------------------------------------------------------------------

    fn insert(&mut self, node: PhaseNode) -> PhaseId {
        let id = node.id;
        self.nodes.insert(id, node);
        id
    }

    fn new_node(&mut self, imp: Rc<PhaseImp>) -> PhaseId {
        let name = imp.name().to_owned();
        self.insert(PhaseNode::new(&name, PhaseType::Node, Some(imp)))
    }

    /// A begin marker of `kind` joined to a `{name}_end` terminal.
    fn new_container(&mut self, name: &str, kind: PhaseType) -> PhaseId {
        let end = self.insert(PhaseNode::new(
            &format!("{name}_end"),
            PhaseType::Terminal,
            None,
        ));
        let mut begin = PhaseNode::new(name, kind, None);
        begin.end_node = Some(end);
        let begin = self.insert(begin);
        self.link(begin, end);
        begin
    }

    /// Put the run-time schedule inside an empty domain.
    fn fill_runtime_domain(&mut self, domain: PhaseId, imps: &mut PhaseImpRegistry) {
        let schedule = self.new_container(RUNTIME_SCHEDULE, PhaseType::Schedule);
        let schedule_end = self.end_of(schedule);
        for phase in BuiltinPhase::RUNTIME {
            let node = self.new_node(imps.builtin(phase));
            self.place(schedule, node, None, None, Some(schedule_end));
        }
        let domain_end = self.end_of(domain);
        self.place(domain, schedule, None, None, Some(domain_end));
    }

    fn link(&mut self, from: PhaseId, to: PhaseId) {
        if let Some(node) = self.nodes.get_mut(&from)
            && !node.successors.contains(&to)
        {
            node.successors.push(to);
        }
        if let Some(node) = self.nodes.get_mut(&to)
            && !node.predecessors.contains(&from)
        {
            node.predecessors.push(from);
        }
    }

    fn unlink(&mut self, from: PhaseId, to: PhaseId) {
        if let Some(node) = self.nodes.get_mut(&from) {
            node.successors.retain(|id| *id != to);
        }
        if let Some(node) = self.nodes.get_mut(&to) {
            node.predecessors.retain(|id| *id != from);
        }
    }

    /// Splice `begin` (and its end node) into `schedule` with resolved
    /// anchors. Anchors that are containers use their end node on the
    /// outgoing side.
    fn place(
        &mut self,
        schedule: PhaseId,
        begin: PhaseId,
        with: Option<PhaseId>,
        after: Option<PhaseId>,
        before: Option<PhaseId>,
    ) {
        let end = self.end_of(begin);
        for id in [begin, end] {
            if let Some(node) = self.nodes.get_mut(&id) {
                node.parent = Some(schedule);
            }
        }

        match (with, after, before) {
            (Some(with), _, _) => {
                for pred in self.predecessors_of(with) {
                    self.link(pred, begin);
                }
                for succ in self.successors_of(self.end_of(with)) {
                    self.link(end, succ);
                }
            }
            (None, None, Some(before)) => {
                for pred in self.predecessors_of(before) {
                    self.unlink(pred, before);
                    self.link(pred, begin);
                }
                self.link(end, before);
            }
            (None, Some(after), None) => {
                let after = self.end_of(after);
                for succ in self.successors_of(after) {
                    self.unlink(after, succ);
                    self.link(end, succ);
                }
                self.link(after, begin);
            }
            (None, Some(after), Some(before)) => {
                let after = self.end_of(after);
                self.link(after, begin);
                self.link(end, before);
                self.unlink(after, before);
            }
            (None, None, None) => {}
        }
    }

    /// Check that `anchor` can be used to place nodes in `schedule`.
    fn check_anchor(&self, schedule: PhaseId, anchor: PhaseId) -> Result<(), PhaseError> {
        let node = self.require(anchor)?;
        if anchor == schedule || anchor == self.end_of(schedule) || node.parent == Some(schedule)
        {
            return Ok(());
        }
        Err(PhaseError::NotInSchedule {
            name: self.full_name(anchor),
            schedule: self.full_name(schedule),
        })
    }

    /// Validate a placement and splice the node or container `begin` into
    /// `schedule`.
    fn add_begin(
        &mut self,
        schedule: PhaseId,
        begin: PhaseId,
        placement: Placement,
    ) -> Result<PhaseId, PhaseError> {
        let target = self.require(schedule)?;
        if !matches!(target.kind, PhaseType::Schedule | PhaseType::Domain) {
            return Err(PhaseError::NotASchedule {
                name: target.name.clone(),
            });
        }
        let schedule_end = self.end_of(schedule);

        let Placement {
            mut with,
            mut after,
            mut before,
        } = placement;
        if with == Some(schedule) {
            with = None;
            after = Some(schedule);
            before = Some(schedule_end);
        }
        if with.is_none() && after.is_none() && before.is_none() {
            before = Some(schedule_end);
        }
        for anchor in [with, after, before].into_iter().flatten() {
            self.check_anchor(schedule, anchor)?;
        }
        if with.is_some() {
            after = None;
            before = None;
        }
        if let (Some(a), Some(b)) = (after, before)
            && !self.is_before(self.end_of(a), b)
        {
            return Err(PhaseError::BadPlacement {
                after: self.full_name(a),
                before: self.full_name(b),
            });
        }

        self.place(schedule, begin, with, after, before);
        Ok(begin)
    }

    /// Add a node running `imp` to `schedule`.
    pub(crate) fn add(
        &mut self,
        schedule: PhaseId,
        imp: Rc<PhaseImp>,
        placement: Placement,
    ) -> Result<PhaseId, PhaseError> {
        self.require(schedule)?;
        let node = self.new_node(imp);
        self.add_begin(schedule, node, placement).inspect_err(|_| {
            self.nodes.remove(&node);
        })
    }

    /// Create an empty named schedule and add it to `schedule`.
    pub(crate) fn add_schedule(
        &mut self,
        schedule: PhaseId,
        name: &str,
        placement: Placement,
    ) -> Result<PhaseId, PhaseError> {
        self.require(schedule)?;
        let begin = self.new_container(name, PhaseType::Schedule);
        let end = self.end_of(begin);
        self.add_begin(schedule, begin, placement).inspect_err(|_| {
            self.nodes.remove(&begin);
            self.nodes.remove(&end);
        })
    }

    /// Create a domain with its own run-time schedule, parallel to `run`.
    pub(crate) fn create_domain(
        &mut self,
        name: &str,
        imps: &mut PhaseImpRegistry,
    ) -> Result<PhaseId, PhaseError> {
        if self.domains.contains_key(name) {
            return Err(PhaseError::DuplicateDomain {
                name: name.to_owned(),
            });
        }
        let run = self
            .find_in(self.common, BuiltinPhase::Run.name())
            .ok_or(PhaseError::UnknownNode { id: self.common })?;
        let domain = self.new_container(name, PhaseType::Domain);
        self.fill_runtime_domain(domain, imps);
        self.place(self.common, domain, Some(run), None, None);
        self.domains.insert(name.to_owned(), domain);
        Ok(domain)
    }

    // -----------------------------------------------------------------------
    // Cross-domain synchronization
    // -----------------------------------------------------------------------

    /// Phase nodes owned directly by `domain` (not by a nested domain).
    fn own_phases(&self, domain: PhaseId) -> Vec<PhaseId> {
        self.transitive_children(domain)
            .into_iter()
            .filter(|id| {
                self.node(*id).is_some_and(|n| n.kind == PhaseType::Node)
                    && self.domain_of(*id) == Some(domain)
            })
            .collect()
    }

    fn require_domain(&self, id: PhaseId) -> Result<(), PhaseError> {
        let node = self.require(id)?;
        if node.kind == PhaseType::Domain {
            Ok(())
        } else {
            Err(PhaseError::NotASchedule {
                name: node.name.clone(),
            })
        }
    }

    fn same_named_pairs(&self, a: PhaseId, b: PhaseId) -> Vec<(PhaseId, PhaseId)> {
        let theirs = self.own_phases(b);
        self.own_phases(a)
            .into_iter()
            .filter_map(|mine| {
                let name = self.node(mine)?.name.clone();
                let partner = theirs
                    .iter()
                    .copied()
                    .find(|t| self.node(*t).is_some_and(|n| n.name == name))?;
                Some((mine, partner))
            })
            .collect()
    }

    /// Make every phase of domain `a` rendezvous with the same-named phase
    /// of domain `b`. Returns the number of pairs.
    pub(crate) fn sync(&mut self, a: PhaseId, b: PhaseId) -> Result<usize, PhaseError> {
        self.require_domain(a)?;
        self.require_domain(b)?;
        let pairs = self.same_named_pairs(a, b);
        for (x, y) in &pairs {
            for (from, to) in [(x, y), (y, x)] {
                if let Some(node) = self.nodes.get_mut(from)
                    && !node.sync.contains(to)
                {
                    node.sync.push(*to);
                }
            }
        }
        Ok(pairs.len())
    }

    /// Undo [`Self::sync`].
    pub(crate) fn unsync(&mut self, a: PhaseId, b: PhaseId) -> Result<usize, PhaseError> {
        self.require_domain(a)?;
        self.require_domain(b)?;
        let pairs = self.same_named_pairs(a, b);
        for (x, y) in &pairs {
            for (from, to) in [(x, y), (y, x)] {
                if let Some(node) = self.nodes.get_mut(from) {
                    node.sync.retain(|id| id != to);
                }
            }
        }
        Ok(pairs.len())
    }

    // -----------------------------------------------------------------------
    // Jumps
    // -----------------------------------------------------------------------

    /// Record a jump from the running node `from` to the phase named
    /// `target`.
    pub(crate) fn request_jump(
        &mut self,
        from: PhaseId,
        target: &str,
    ) -> Result<PhaseId, PhaseError> {
        let state = self.require(from)?.state;
        if !state.can_jump() {
            return Err(PhaseError::NotActive {
                name: self.full_name(from),
                state,
            });
        }
        let to = self
            .find_reachable(from, target)
            .ok_or_else(|| PhaseError::BadJump {
                target: target.to_owned(),
                from: self.full_name(from),
            })?;
        self.set_jump(from, to);
        Ok(to)
    }

    pub(crate) fn set_jump(&mut self, from: PhaseId, target: PhaseId) {
        let forward = self.is_before(from, target);
        if let Some(node) = self.nodes.get_mut(&from) {
            node.jump = Some(PendingJump { target, forward });
        }
    }

    /// Active phases in `domain` that can reach a phase named `target`,
    /// paired with that phase.
    pub(crate) fn jump_candidates(&self, domain: PhaseId, target: &str) -> Vec<(PhaseId, PhaseId)> {
        self.transitive_children(domain)
            .into_iter()
            .filter(|id| {
                self.node(*id)
                    .is_some_and(|n| n.kind == PhaseType::Node && n.state.is_active())
            })
            .filter_map(|id| Some((id, self.find_reachable(id, target)?)))
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn graph() -> (PhaseGraph, PhaseImpRegistry) {
        let mut imps = PhaseImpRegistry::new();
        (PhaseGraph::new(&mut imps), imps)
    }

    fn names(graph: &PhaseGraph, ids: &[PhaseId]) -> Vec<String> {
        ids.iter()
            .map(|id| graph.node(*id).unwrap().name().to_owned())
            .collect()
    }

    fn chain(graph: &PhaseGraph, from: PhaseId, len: usize) -> Vec<String> {
        let mut out = Vec::new();
        let mut current = from;
        for _ in 0..len {
            let node = graph.node(current).unwrap();
            out.push(node.name().to_owned());
            match node.successors().first() {
                Some(next) => current = *next,
                None => break,
            }
        }
        out
    }

    #[test]
    fn common_phases_are_chained_in_order() {
        let (g, _) = graph();
        let build = g.find_by_name("build").unwrap();
        assert_eq!(
            chain(&g, build, 10),
            vec![
                "build",
                "connect",
                "end_of_elaboration",
                "start_of_simulation",
                "run",
                "extract",
                "check",
                "report",
                "final",
                "common_end"
            ]
        );
        let common = g.common_domain();
        assert_eq!(names(&g, g.node(common).unwrap().successors()), vec!["build"]);
    }

    #[test]
    fn runtime_domain_runs_parallel_to_run() {
        let (g, _) = graph();
        let run = g.find_by_name("run").unwrap();
        let uvm = g.uvm_domain();
        let start = g.find_by_name("start_of_simulation").unwrap();
        let extract = g.find_by_name("extract").unwrap();

        assert_eq!(g.node(start).unwrap().successors(), &[run, uvm]);
        let uvm_end = g.end_of(uvm);
        assert_eq!(g.node(uvm_end).unwrap().successors(), &[extract]);
        assert_eq!(g.node(extract).unwrap().predecessors(), &[run, uvm_end]);
        assert_eq!(g.siblings(run), vec![uvm_end]);
    }

    #[test]
    fn full_names_walk_to_the_domain() {
        let (g, _) = graph();
        let main = g.find_by_name("main").unwrap();
        assert_eq!(g.full_name(main), "uvm.uvm_sched.main");
        assert_eq!(g.full_name(g.find_by_name("build").unwrap()), "common.build");
        assert_eq!(g.full_name(g.uvm_domain()), "uvm");
        assert_eq!(g.domain_of(main), Some(g.uvm_domain()));
        assert_eq!(g.find_by_name("uvm.uvm_sched.main"), Some(main));
    }

    #[test]
    fn ordering_queries() {
        let (g, _) = graph();
        let build = g.find_by_name("build").unwrap();
        let main = g.find_by_name("main").unwrap();
        let report = g.find_by_name("report").unwrap();
        assert!(g.is_before(build, main));
        assert!(g.is_before(main, report));
        assert!(g.is_after(report, build));
        assert!(!g.is_before(report, build));
        assert!(!g.is_before(build, build));
    }

    #[test]
    fn find_reachable_prefers_predecessors() {
        let (mut g, mut imps) = graph();
        let other = g.create_domain("other", &mut imps).unwrap();
        let other_main = g.find_in(other, "main").unwrap();
        let other_reset = g.find_in(other, "reset").unwrap();
        assert_eq!(g.find_reachable(other_main, "reset"), Some(other_reset));
        let report = g.find_by_name("report").unwrap();
        assert_eq!(g.find_reachable(other_main, "report"), Some(report));
        assert_eq!(g.find_reachable(other_main, "nowhere"), None);
    }

    #[test]
    fn add_places_nodes() {
        let (mut g, mut imps) = graph();
        let common = g.common_domain();
        let connect = g.find_by_name("connect").unwrap();
        let eoe = g.find_by_name("end_of_elaboration").unwrap();

        let after = imps.register(PhaseImp::custom("after_connect", Traversal::BottomUp));
        let id = g.add(common, after, Placement::after(connect)).unwrap();
        assert_eq!(g.node(connect).unwrap().successors(), &[id]);
        assert_eq!(g.node(id).unwrap().successors(), &[eoe]);

        let with = imps.register(PhaseImp::custom("beside_eoe", Traversal::BottomUp));
        let beside = g.add(common, with, Placement::with(eoe)).unwrap();
        assert_eq!(g.node(beside).unwrap().predecessors(), &[id]);
        assert_eq!(g.siblings(beside), vec![eoe]);

        let last = imps.register(PhaseImp::custom("last", Traversal::BottomUp));
        let last = g.add(common, last, Placement::end()).unwrap();
        let final_phase = g.find_by_name("final").unwrap();
        assert_eq!(g.node(final_phase).unwrap().successors(), &[last]);
        assert_eq!(g.node(last).unwrap().successors(), &[g.end_of(common)]);
    }

    #[test]
    fn add_between_requires_order() {
        let (mut g, mut imps) = graph();
        let common = g.common_domain();
        let build = g.find_by_name("build").unwrap();
        let connect = g.find_by_name("connect").unwrap();
        let imp = imps.register(PhaseImp::custom("mid", Traversal::TopDown));

        let mid = g
            .add(common, Rc::clone(&imp), Placement::between(build, connect))
            .unwrap();
        assert!(!g.node(build).unwrap().successors().contains(&connect));
        assert_eq!(g.node(mid).unwrap().successors(), &[connect]);

        let err = g.add(common, imp, Placement::between(connect, build));
        assert!(matches!(err, Err(PhaseError::BadPlacement { .. })));
    }

    #[test]
    fn add_rejects_foreign_anchors() {
        let (mut g, mut imps) = graph();
        let main = g.find_by_name("main").unwrap();
        let imp = imps.register(PhaseImp::custom("x", Traversal::Task));
        let err = g.add(g.common_domain(), Rc::clone(&imp), Placement::after(main));
        assert!(matches!(err, Err(PhaseError::NotInSchedule { .. })));
        let err = g.add(main, imp, Placement::end());
        assert!(matches!(err, Err(PhaseError::NotASchedule { .. })));
    }

    #[test]
    fn add_schedule_nests_a_container() {
        let (mut g, mut imps) = graph();
        let common = g.common_domain();
        let check = g.find_by_name("check").unwrap();
        let sched = g.add_schedule(common, "post_checks", Placement::after(check)).unwrap();
        let imp = imps.register(PhaseImp::custom("scoreboard_flush", Traversal::BottomUp));
        let flush = g.add(sched, imp, Placement::end()).unwrap();
        assert_eq!(g.full_name(flush), "common.post_checks.scoreboard_flush");
        let report = g.find_by_name("report").unwrap();
        assert!(g.is_before(flush, report));
        assert!(g.is_after(flush, check));
    }

    #[test]
    fn domains_are_unique() {
        let (mut g, mut imps) = graph();
        assert!(g.create_domain("pwr", &mut imps).is_ok());
        assert!(matches!(
            g.create_domain("pwr", &mut imps),
            Err(PhaseError::DuplicateDomain { .. })
        ));
        let names: Vec<&str> = g.domains().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["common", "pwr", "uvm"]);
    }

    #[test]
    fn sync_pairs_same_named_phases() {
        let (mut g, mut imps) = graph();
        let pwr = g.create_domain("pwr", &mut imps).unwrap();
        assert_eq!(g.sync(g.uvm_domain(), pwr).unwrap(), 12);
        let main = g.find_in(g.uvm_domain(), "main").unwrap();
        let pwr_main = g.find_in(pwr, "main").unwrap();
        assert_eq!(g.node(main).unwrap().sync_partners(), &[pwr_main]);
        assert!(g.siblings(main).contains(&pwr_main));

        g.unsync(g.uvm_domain(), pwr).unwrap();
        assert!(g.node(main).unwrap().sync_partners().is_empty());
    }

    #[test]
    fn jumps_need_an_active_phase() {
        let (mut g, _) = graph();
        let main = g.find_by_name("main").unwrap();
        assert!(matches!(
            g.request_jump(main, "reset"),
            Err(PhaseError::NotActive { .. })
        ));
        g.node_mut(main).unwrap().state = PhaseState::Executing;
        assert!(matches!(
            g.request_jump(main, "nowhere"),
            Err(PhaseError::BadJump { .. })
        ));
        let reset = g.request_jump(main, "reset").unwrap();
        let jump = g.node(main).unwrap().pending_jump().unwrap();
        assert_eq!(jump.target, reset);
        assert!(!jump.forward);
    }
}
