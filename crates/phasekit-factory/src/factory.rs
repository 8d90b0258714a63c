//! The factory: type registry, override tables and aliases.
//!
//! Registration and override bookkeeping live here; the override search
//! and creation entry points are in [`crate::search`], debug traces and
//! the dump in [`crate::debug`].

use std::collections::BTreeMap;
use std::rc::Rc;

use phasekit_report::ReportServer;
use phasekit_types::Verbosity;
use serde::Serialize;

use crate::proxy::{Products, TypeHandle, is_named};
use crate::record::{OverrideRecord, TypePair};
use crate::wildcard::{has_wildcard, is_match};

/// Context attached to every factory report.
pub(crate) const CONTEXT: &str = "factory";

/// Which override table a record lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OverrideKind {
    /// Scoped to an instance path; consulted first.
    Instance,
    /// Applies to every instance of the original type.
    Type,
}

/// Position of a record in one of the override tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RecordRef {
    pub(crate) kind: OverrideKind,
    pub(crate) index: usize,
}

/// A type name that resolves to `orig` only under instance paths matching
/// `scope`.
pub(crate) struct InstAlias<P: Products> {
    pub(crate) alias: String,
    pub(crate) orig: TypeHandle<P>,
    pub(crate) scope: String,
}

impl<P: Products> InstAlias<P> {
    pub(crate) fn applies_to(&self, name: &str, full_inst_path: &str) -> bool {
        self.alias == name
            && if has_wildcard(&self.scope) {
                is_match(&self.scope, full_inst_path)
            } else {
                self.scope == full_inst_path
            }
    }
}

/// Build the full instance path for a creation request.
pub fn full_inst_path(parent_inst_path: &str, name: &str) -> String {
    if parent_inst_path.is_empty() {
        name.to_owned()
    } else if name.is_empty() {
        parent_inst_path.to_owned()
    } else {
        format!("{parent_inst_path}.{name}")
    }
}

/// Registry of creatable types plus the override and alias tables
/// consulted whenever something is created through it.
///
/// Every operation reports through the shared [`ReportServer`] and returns
/// a sentinel on failure; nothing here returns an error type.
pub struct Factory<P: Products> {
    pub(crate) reporter: Rc<ReportServer>,
    /// Registered type identities, in registration order.
    pub(crate) types: Vec<TypeHandle<P>>,
    /// Name lookup, including type aliases.
    pub(crate) type_names: BTreeMap<String, TypeHandle<P>>,
    pub(crate) inst_aliases: Vec<InstAlias<P>>,
    pub(crate) type_overrides: Vec<OverrideRecord<P>>,
    pub(crate) inst_overrides: Vec<OverrideRecord<P>>,
    /// Records followed during the current resolution call.
    pub(crate) trace: Vec<RecordRef>,
    /// Every match seen during a debug pass; `None` outside one.
    pub(crate) debug_matches: Option<Vec<RecordRef>>,
}

impl<P: Products> core::fmt::Debug for Factory<P> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Factory")
            .field("types", &self.types.len())
            .field("type_overrides", &self.type_overrides)
            .field("inst_overrides", &self.inst_overrides)
            .finish_non_exhaustive()
    }
}

impl<P: Products> Factory<P> {
    /// Create an empty factory reporting to `reporter`.
    pub fn new(reporter: Rc<ReportServer>) -> Self {
        Self {
            reporter,
            types: Vec::new(),
            type_names: BTreeMap::new(),
            inst_aliases: Vec::new(),
            type_overrides: Vec::new(),
            inst_overrides: Vec::new(),
            trace: Vec::new(),
            debug_matches: None,
        }
    }

    /// The report server this factory reports to.
    pub fn reporter(&self) -> &Rc<ReportServer> {
        &self.reporter
    }

    // -----------------------------------------------------------------------
    // Registration
    // -----------------------------------------------------------------------

    /// Register a type under its identity and, if it has one, its name.
    ///
    /// Overrides previously registered by this name get the handle bound.
    pub fn register(&mut self, handle: &TypeHandle<P>) {
        if self.is_type_registered(handle) {
            self.reporter.warning(
                "TPRGED",
                &format!(
                    "Object type '{}' already registered with factory.",
                    handle.display_name()
                ),
                CONTEXT,
            );
            return;
        }

        let name = handle.type_name().to_owned();
        if !is_named(&name) {
            self.reporter.warning(
                "TPRGBL",
                "Registering a type with a blank name; string-based lookup is unavailable for it.",
                CONTEXT,
            );
        } else if self.type_names.contains_key(&name) {
            self.reporter.warning(
                "TPRGED",
                &format!(
                    "Type name '{name}' already registered with factory. No string-based lookup \
                     support for multiple types with the same type name."
                ),
                CONTEXT,
            );
        } else {
            self.type_names.insert(name.clone(), handle.clone());
        }

        self.types.push(handle.clone());
        if is_named(&name) {
            self.bind_pending(&name, handle);
        }
        tracing::debug!(type_name = %handle.display_name(), "type registered");
    }

    /// Bind `handle` into every override side known only as `name`.
    fn bind_pending(&mut self, name: &str, handle: &TypeHandle<P>) {
        for record in self
            .type_overrides
            .iter_mut()
            .chain(self.inst_overrides.iter_mut())
        {
            for pair in [&mut record.orig, &mut record.ovrd] {
                if pair.handle.is_none() && pair.name == name {
                    pair.handle = Some(handle.clone());
                }
            }
        }
    }

    fn ensure_registered(&mut self, handle: &TypeHandle<P>) {
        if !self.is_type_registered(handle) {
            self.register(handle);
        }
    }

    /// Whether this exact type is registered.
    pub fn is_type_registered(&self, handle: &TypeHandle<P>) -> bool {
        self.types.iter().any(|t| t.same_type(handle))
    }

    /// Whether a type name (or type alias) is registered.
    pub fn is_type_name_registered(&self, name: &str) -> bool {
        self.type_names.contains_key(name)
    }

    /// Look a registered type up by name or type alias.
    pub fn find_wrapper_by_name(&self, name: &str) -> Option<TypeHandle<P>> {
        self.type_names.get(name).cloned()
    }

    /// Resolve a type name, honouring instance aliases scoped to
    /// `full_inst_path` before the global name table.
    pub fn resolve_type_name_by_inst(
        &self,
        name: &str,
        full_inst_path: &str,
    ) -> Option<TypeHandle<P>> {
        if !full_inst_path.is_empty()
            && let Some(alias) = self
                .inst_aliases
                .iter()
                .find(|a| a.applies_to(name, full_inst_path))
        {
            return Some(alias.orig.clone());
        }
        self.type_names.get(name).cloned()
    }

    /// Registered type overrides in priority order.
    pub fn type_overrides(&self) -> &[OverrideRecord<P>] {
        &self.type_overrides
    }

    /// Registered instance overrides in priority order.
    pub fn inst_overrides(&self) -> &[OverrideRecord<P>] {
        &self.inst_overrides
    }

    // -----------------------------------------------------------------------
    // Type overrides
    // -----------------------------------------------------------------------

    /// Make every request for `original` produce `override_type`, unless an
    /// instance override applies.
    ///
    /// With `replace` unset an existing override for `original` is kept.
    pub fn set_type_override_by_type(
        &mut self,
        original: &TypeHandle<P>,
        override_type: &TypeHandle<P>,
        replace: bool,
    ) {
        if original.same_type(override_type) {
            self.warn_same_type(original.display_name());
            return;
        }
        self.ensure_registered(original);
        self.ensure_registered(override_type);
        self.add_type_override(
            TypePair::from_handle(original),
            TypePair::from_handle(override_type),
            replace,
        );
    }

    /// Name-based variant of [`Self::set_type_override_by_type`].
    ///
    /// Either name may be unregistered; it is bound when the type
    /// registers.
    pub fn set_type_override_by_name(
        &mut self,
        original_type_name: &str,
        override_type_name: &str,
        replace: bool,
    ) {
        if !self.check_names(original_type_name, override_type_name) {
            return;
        }
        let orig = TypePair::from_name(
            original_type_name,
            self.find_wrapper_by_name(original_type_name),
        );
        let ovrd = TypePair::from_name(
            override_type_name,
            self.find_wrapper_by_name(override_type_name),
        );
        if let (Some(o), Some(v)) = (&orig.handle, &ovrd.handle)
            && o.same_type(v)
        {
            self.warn_same_type(original_type_name);
            return;
        }
        self.add_type_override(orig, ovrd, replace);
    }

    fn add_type_override(&mut self, orig: TypePair<P>, ovrd: TypePair<P>, replace: bool) {
        let mut replaced = false;
        for record in &mut self.type_overrides {
            if !record.orig.matches(orig.handle.as_ref(), &orig.name) {
                continue;
            }
            if !replace {
                self.reporter.info(
                    "TPREGD",
                    &format!(
                        "Original object type '{}' already registered to produce '{}'. Set \
                         'replace' to replace the existing entry.",
                        orig.display_name(),
                        record.ovrd.display_name()
                    ),
                    CONTEXT,
                    Verbosity::Medium,
                );
                return;
            }
            self.reporter.info(
                "TPREGR",
                &format!(
                    "Original object type '{}' already registered to produce '{}'. Replacing \
                     with override to produce type '{}'.",
                    orig.display_name(),
                    record.ovrd.display_name(),
                    ovrd.display_name()
                ),
                CONTEXT,
                Verbosity::Medium,
            );
            record.orig = orig.clone();
            record.ovrd = ovrd.clone();
            record.replace = true;
            replaced = true;
        }
        if !replaced {
            tracing::debug!(orig = %orig.display_name(), ovrd = %ovrd.display_name(), "type override added");
            self.type_overrides
                .push(OverrideRecord::type_override(orig, ovrd, replace));
        }
    }

    // -----------------------------------------------------------------------
    // Instance overrides
    // -----------------------------------------------------------------------

    /// Make requests for `original` at instance paths matching
    /// `full_inst_path` produce `override_type`.
    pub fn set_inst_override_by_type(
        &mut self,
        original: &TypeHandle<P>,
        override_type: &TypeHandle<P>,
        full_inst_path: &str,
    ) {
        if original.same_type(override_type) {
            self.warn_same_type(original.display_name());
            return;
        }
        self.ensure_registered(original);
        self.ensure_registered(override_type);
        self.add_inst_override(
            TypePair::from_handle(original),
            TypePair::from_handle(override_type),
            full_inst_path,
        );
    }

    /// Name-based variant of [`Self::set_inst_override_by_type`].
    pub fn set_inst_override_by_name(
        &mut self,
        original_type_name: &str,
        override_type_name: &str,
        full_inst_path: &str,
    ) {
        if !self.check_names(original_type_name, override_type_name) {
            return;
        }
        let orig = TypePair::from_name(
            original_type_name,
            self.find_wrapper_by_name(original_type_name),
        );
        let ovrd = TypePair::from_name(
            override_type_name,
            self.find_wrapper_by_name(override_type_name),
        );
        self.add_inst_override(orig, ovrd, full_inst_path);
    }

    fn add_inst_override(&mut self, orig: TypePair<P>, ovrd: TypePair<P>, full_inst_path: &str) {
        let exists = self.inst_overrides.iter().any(|r| {
            r.full_inst_path.as_deref() == Some(full_inst_path)
                && r.orig.matches(orig.handle.as_ref(), &orig.name)
                && r.ovrd.matches(ovrd.handle.as_ref(), &ovrd.name)
        });
        if exists {
            self.reporter.info(
                "DUPOVRD",
                &format!(
                    "Instance override for '{}' with type '{}' at '{full_inst_path}' already exists.",
                    orig.display_name(),
                    ovrd.display_name()
                ),
                CONTEXT,
                Verbosity::Medium,
            );
            return;
        }
        tracing::debug!(
            orig = %orig.display_name(),
            ovrd = %ovrd.display_name(),
            scope = full_inst_path,
            "instance override added"
        );
        self.inst_overrides
            .push(OverrideRecord::inst_override(orig, ovrd, full_inst_path));
    }

    // -----------------------------------------------------------------------
    // Aliases
    // -----------------------------------------------------------------------

    /// Make `alias_type_name` resolve to `original` everywhere.
    pub fn set_type_alias(&mut self, alias_type_name: &str, original: &TypeHandle<P>) {
        if !self.check_alias(alias_type_name, original) {
            return;
        }
        if let Some(existing) = self.type_names.get(alias_type_name) {
            if !existing.same_type(original) {
                self.reporter.warning(
                    "TPRGED",
                    &format!(
                        "Type name '{alias_type_name}' already registered with factory; alias \
                         to '{}' ignored.",
                        original.display_name()
                    ),
                    CONTEXT,
                );
            }
            return;
        }
        self.type_names
            .insert(alias_type_name.to_owned(), original.clone());
        self.bind_pending(alias_type_name, original);
    }

    /// Make `alias_type_name` resolve to `original` for instance paths
    /// matching `full_inst_path`.
    pub fn set_inst_alias(
        &mut self,
        alias_type_name: &str,
        original: &TypeHandle<P>,
        full_inst_path: &str,
    ) {
        if !self.check_alias(alias_type_name, original) {
            return;
        }
        self.inst_aliases.push(InstAlias {
            alias: alias_type_name.to_owned(),
            orig: original.clone(),
            scope: full_inst_path.to_owned(),
        });
    }

    // -----------------------------------------------------------------------
    // Validation helpers
    // -----------------------------------------------------------------------

    fn warn_same_type(&self, name: &str) {
        self.reporter.warning(
            "TYPDUP",
            &format!("Requested and override type '{name}' are the same; override ignored."),
            CONTEXT,
        );
    }

    fn check_names(&self, original: &str, override_name: &str) -> bool {
        if original.is_empty() || override_name.is_empty() {
            self.reporter.warning(
                "TYPNAM",
                "Override requested with a blank type name; ignored.",
                CONTEXT,
            );
            return false;
        }
        if original == override_name {
            self.warn_same_type(original);
            return false;
        }
        true
    }

    fn check_alias(&self, alias: &str, original: &TypeHandle<P>) -> bool {
        if alias.is_empty() {
            self.reporter
                .warning("TYPNAM", "Blank alias name; ignored.", CONTEXT);
            return false;
        }
        if !self.is_type_registered(original) {
            self.reporter.warning(
                "BDTYP",
                &format!(
                    "Cannot define alias '{alias}' of type '{}' because it is not registered \
                     with the factory.",
                    original.display_name()
                ),
                CONTEXT,
            );
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_inst_path_joins_with_dots() {
        assert_eq!(full_inst_path("", "n1"), "n1");
        assert_eq!(full_inst_path("top.env", ""), "top.env");
        assert_eq!(full_inst_path("top.env", "drv"), "top.env.drv");
    }
}
