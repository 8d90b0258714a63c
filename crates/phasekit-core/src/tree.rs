//! The component hierarchy.
//!
//! An arena of components rooted at an implicit top. Children keep their
//! insertion order; sibling names are unique.

use std::collections::BTreeMap;
use std::rc::Rc;

use phasekit_factory::wildcard::is_match;
use phasekit_types::{ComponentId, PhaseId};

use crate::component::Component;
use crate::phase::PhaseImp;

/// Name of the implicit top component.
pub const TOP_NAME: &str = "__top__";

/// A component's place in the hierarchy and its engine bookkeeping.
pub(crate) struct ComponentNode {
    name: String,
    full_name: String,
    type_name: String,
    parent: Option<ComponentId>,
    children: Vec<ComponentId>,
    pub(crate) behavior: Rc<dyn Component>,
    pub(crate) domain: PhaseId,
    pub(crate) build_done: bool,
    pub(crate) current_phase: Option<PhaseId>,
    /// Phase implementations replacing the graph's, keyed by phase name.
    pub(crate) phase_imps: BTreeMap<String, Rc<PhaseImp>>,
}

/// Why a component could not be added.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum InsertError {
    UnknownParent,
    NameTaken,
}

/// The component hierarchy of one root.
pub struct ComponentTree {
    top: ComponentId,
    nodes: BTreeMap<ComponentId, ComponentNode>,
    unnamed: u32,
}

impl core::fmt::Debug for ComponentTree {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ComponentTree")
            .field("top", &self.top)
            .field("components", &self.nodes.len())
            .finish_non_exhaustive()
    }
}

impl ComponentTree {
    pub(crate) fn new(top_behavior: Rc<dyn Component>, domain: PhaseId) -> Self {
        let top = ComponentId::new();
        let node = ComponentNode {
            name: TOP_NAME.to_owned(),
            full_name: String::new(),
            type_name: TOP_NAME.to_owned(),
            parent: None,
            children: Vec::new(),
            behavior: top_behavior,
            domain,
            build_done: false,
            current_phase: None,
            phase_imps: BTreeMap::new(),
        };
        Self {
            top,
            nodes: BTreeMap::from([(top, node)]),
            unnamed: 0,
        }
    }

    pub(crate) fn node(&self, id: ComponentId) -> Option<&ComponentNode> {
        self.nodes.get(&id)
    }

    pub(crate) fn node_mut(&mut self, id: ComponentId) -> Option<&mut ComponentNode> {
        self.nodes.get_mut(&id)
    }

    /// Give an empty name a generated one.
    pub(crate) fn choose_name(&mut self, name: &str) -> String {
        if name.is_empty() {
            let generated = format!("COMP_{}", self.unnamed);
            self.unnamed = self.unnamed.saturating_add(1);
            generated
        } else {
            name.to_owned()
        }
    }

    /// Add a component under `parent`, inheriting its domain.
    pub(crate) fn insert(
        &mut self,
        parent: ComponentId,
        name: &str,
        type_name: &str,
        behavior: Rc<dyn Component>,
    ) -> Result<ComponentId, InsertError> {
        if self.child_by_name(parent, name).is_some() {
            return Err(InsertError::NameTaken);
        }
        let parent_node = self.nodes.get(&parent).ok_or(InsertError::UnknownParent)?;
        let full_name = if parent == self.top {
            name.to_owned()
        } else {
            format!("{}.{name}", parent_node.full_name)
        };
        let id = ComponentId::new();
        let node = ComponentNode {
            name: name.to_owned(),
            full_name,
            type_name: type_name.to_owned(),
            parent: Some(parent),
            children: Vec::new(),
            behavior,
            domain: parent_node.domain,
            build_done: false,
            current_phase: None,
            phase_imps: BTreeMap::new(),
        };
        self.nodes.insert(id, node);
        if let Some(parent_node) = self.nodes.get_mut(&parent) {
            parent_node.children.push(id);
        }
        Ok(id)
    }

    /// The implicit top component.
    pub const fn top(&self) -> ComponentId {
        self.top
    }

    /// Number of components below the top.
    pub fn len(&self) -> usize {
        self.nodes.len().saturating_sub(1)
    }

    /// Whether nothing has been created below the top.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `id` is in the tree.
    pub fn contains(&self, id: ComponentId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Leaf name.
    pub fn name(&self, id: ComponentId) -> Option<&str> {
        self.node(id).map(|n| n.name.as_str())
    }

    /// Dotted hierarchical name; empty for the top.
    pub fn full_name(&self, id: ComponentId) -> Option<&str> {
        self.node(id).map(|n| n.full_name.as_str())
    }

    /// Name of the type that was instantiated.
    pub fn type_name(&self, id: ComponentId) -> Option<&str> {
        self.node(id).map(|n| n.type_name.as_str())
    }

    /// Parent, `None` for the top.
    pub fn parent(&self, id: ComponentId) -> Option<ComponentId> {
        self.node(id).and_then(|n| n.parent)
    }

    /// Children in insertion order.
    pub fn children(&self, id: ComponentId) -> &[ComponentId] {
        self.node(id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    /// The `index`-th child.
    pub fn child(&self, id: ComponentId, index: usize) -> Option<ComponentId> {
        self.children(id).get(index).copied()
    }

    /// Child of `parent` named `name`.
    pub fn child_by_name(&self, parent: ComponentId, name: &str) -> Option<ComponentId> {
        self.children(parent)
            .iter()
            .copied()
            .find(|c| self.name(*c) == Some(name))
    }

    /// The domain a component's phases run in.
    pub fn domain(&self, id: ComponentId) -> Option<PhaseId> {
        self.node(id).map(|n| n.domain)
    }

    /// The phase the component is currently in.
    pub fn current_phase(&self, id: ComponentId) -> Option<PhaseId> {
        self.node(id).and_then(|n| n.current_phase)
    }

    /// Assign `domain` to `id` and, with `hier`, to everything below it.
    pub(crate) fn set_domain(&mut self, id: ComponentId, domain: PhaseId, hier: bool) {
        let targets = if hier {
            self.subtree(id)
        } else {
            vec![id]
        };
        for target in targets {
            if let Some(node) = self.nodes.get_mut(&target) {
                node.domain = domain;
            }
        }
    }

    /// `id` followed by all its descendants, parents first.
    pub fn subtree(&self, id: ComponentId) -> Vec<ComponentId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if !self.contains(current) {
                continue;
            }
            out.push(current);
            stack.extend(self.children(current).iter().rev());
        }
        out
    }

    /// Every component below `id`, children before their parents.
    pub fn bottom_up(&self, id: ComponentId) -> Vec<ComponentId> {
        let mut out = Vec::new();
        for child in self.children(id) {
            out.extend(self.bottom_up(*child));
        }
        if self.contains(id) {
            out.push(id);
        }
        out
    }

    /// Components whose full name matches the glob `pattern`, children
    /// before parents. The top never matches.
    pub fn find_all(&self, pattern: &str) -> Vec<ComponentId> {
        self.bottom_up(self.top)
            .into_iter()
            .filter(|id| *id != self.top)
            .filter(|id| self.full_name(*id).is_some_and(|n| is_match(pattern, n)))
            .collect()
    }

    /// The component with exactly this full name.
    pub fn lookup(&self, full_name: &str) -> Option<ComponentId> {
        self.nodes
            .iter()
            .find(|(id, n)| **id != self.top && n.full_name == full_name)
            .map(|(id, _)| *id)
    }

    /// Indented dump of the hierarchy below the top.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for child in self.children(self.top) {
            self.render_into(*child, 0, &mut out);
        }
        out
    }

    fn render_into(&self, id: ComponentId, depth: usize, out: &mut String) {
        let Some(node) = self.node(id) else {
            return;
        };
        out.push_str(&"  ".repeat(depth));
        out.push_str(&format!("{} ({})\n", node.name, node.type_name));
        for child in &node.children {
            self.render_into(*child, depth.saturating_add(1), out);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    struct Nothing;

    impl Component for Nothing {}

    fn tree() -> ComponentTree {
        ComponentTree::new(Rc::new(Nothing), PhaseId::new())
    }

    fn add(tree: &mut ComponentTree, parent: ComponentId, name: &str) -> ComponentId {
        tree.insert(parent, name, "nothing", Rc::new(Nothing)).unwrap()
    }

    #[test]
    fn full_names_skip_the_top() {
        let mut t = tree();
        let top = t.top();
        let env = add(&mut t, top, "env");
        let agent = add(&mut t, env, "agent");
        assert_eq!(t.full_name(top), Some(""));
        assert_eq!(t.full_name(env), Some("env"));
        assert_eq!(t.full_name(agent), Some("env.agent"));
        assert_eq!(t.parent(agent), Some(env));
        assert_eq!(t.len(), 2);
    }

    #[test]
    fn sibling_names_are_unique() {
        let mut t = tree();
        let top = t.top();
        add(&mut t, top, "env");
        let again = t.insert(top, "env", "nothing", Rc::new(Nothing));
        assert_eq!(again.err(), Some(InsertError::NameTaken));
        assert_eq!(t.children(top).len(), 1);
    }

    #[test]
    fn unnamed_components_get_generated_names() {
        let mut t = tree();
        assert_eq!(t.choose_name(""), "COMP_0");
        assert_eq!(t.choose_name(""), "COMP_1");
        assert_eq!(t.choose_name("x"), "x");
    }

    #[test]
    fn children_keep_insertion_order() {
        let mut t = tree();
        let top = t.top();
        let b = add(&mut t, top, "b");
        let a = add(&mut t, top, "a");
        assert_eq!(t.children(top), &[b, a]);
        assert_eq!(t.child(top, 1), Some(a));
        assert_eq!(t.child_by_name(top, "a"), Some(a));
    }

    #[test]
    fn find_all_globs_children_first() {
        let mut t = tree();
        let top = t.top();
        let env = add(&mut t, top, "env");
        let a0 = add(&mut t, env, "agent0");
        let a1 = add(&mut t, env, "agent1");
        assert_eq!(t.find_all("env.agent*"), vec![a0, a1]);
        assert_eq!(t.find_all("*"), vec![a0, a1, env]);
        assert_eq!(t.lookup("env.agent1"), Some(a1));
        assert_eq!(t.lookup(""), None);
    }

    #[test]
    fn set_domain_hier() {
        let mut t = tree();
        let top = t.top();
        let env = add(&mut t, top, "env");
        let agent = add(&mut t, env, "agent");
        let domain = PhaseId::new();
        t.set_domain(env, domain, false);
        assert_eq!(t.domain(env), Some(domain));
        assert_ne!(t.domain(agent), Some(domain));
        t.set_domain(env, domain, true);
        assert_eq!(t.domain(agent), Some(domain));

        let late = add(&mut t, agent, "late");
        assert_eq!(t.domain(late), Some(domain));
    }

    #[test]
    fn render_indents_children() {
        let mut t = tree();
        let top = t.top();
        let env = add(&mut t, top, "env");
        add(&mut t, env, "agent");
        assert_eq!(t.render(), "env (nothing)\n  agent (nothing)\n");
    }
}
