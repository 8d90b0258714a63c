//! Override search and creation.

use crate::factory::{CONTEXT, Factory, OverrideKind, RecordRef, full_inst_path};
use crate::proxy::{Products, TypeHandle, display_type_name};
use crate::record::OverrideRecord;
use crate::wildcard::is_match;

impl<P: Products> Factory<P> {
    pub(crate) fn record(&self, r: RecordRef) -> Option<&OverrideRecord<P>> {
        match r.kind {
            OverrideKind::Instance => self.inst_overrides.get(r.index),
            OverrideKind::Type => self.type_overrides.get(r.index),
        }
    }

    fn record_mut(&mut self, r: RecordRef) -> Option<&mut OverrideRecord<P>> {
        match r.kind {
            OverrideKind::Instance => self.inst_overrides.get_mut(r.index),
            OverrideKind::Type => self.type_overrides.get_mut(r.index),
        }
    }

    /// Whether a record's original side names the requested type, directly
    /// or through a name that resolves to it at this path.
    fn orig_matches(
        &self,
        record: &OverrideRecord<P>,
        requested: Option<&TypeHandle<P>>,
        requested_name: &str,
        path: &str,
    ) -> bool {
        if record.orig.matches(requested, requested_name) {
            return true;
        }
        record.orig.handle.is_none()
            && requested.is_some_and(|req| {
                self.resolve_type_name_by_inst(&record.orig.name, path)
                    .is_some_and(|h| h.same_type(req))
            })
    }

    fn scope_matches(record: &OverrideRecord<P>, path: &str) -> bool {
        match record.full_inst_path.as_deref() {
            None => true,
            Some(scope) if record.has_wildcard => is_match(scope, path),
            Some(scope) => scope == path,
        }
    }

    /// One level of the override search.
    ///
    /// Instance overrides are consulted first and the first match wins.
    /// Among type overrides the first match is the candidate unless a
    /// `replace` record naming the type exactly is found, which wins and
    /// ends the scan.
    pub(crate) fn search(
        &mut self,
        requested: Option<&TypeHandle<P>>,
        requested_name: &str,
        path: &str,
    ) -> Option<TypeHandle<P>> {
        let looped = self.trace.iter().any(|&r| {
            self.record(r)
                .is_some_and(|rec| rec.orig.matches(requested, requested_name))
        });
        if looped {
            self.reporter.error(
                "OVRDLOOP",
                &format!(
                    "Recursive loop detected while finding override for '{}' at '{path}'.",
                    display_type_name(requested_name)
                ),
                CONTEXT,
            );
            return self.last_followed(path).or_else(|| requested.cloned());
        }

        let debug = self.debug_matches.is_some();

        let inst_matches: Vec<usize> = if path.is_empty() {
            Vec::new()
        } else {
            self.inst_overrides
                .iter()
                .enumerate()
                .filter(|(_, rec)| {
                    Self::scope_matches(rec, path)
                        && self.orig_matches(rec, requested, requested_name, path)
                })
                .map(|(i, _)| i)
                .collect()
        };

        let mut type_matches = Vec::new();
        let mut candidate = None;
        if inst_matches.is_empty() || debug {
            let mut locked = false;
            for (i, rec) in self.type_overrides.iter().enumerate() {
                if !self.orig_matches(rec, requested, requested_name, path) {
                    continue;
                }
                type_matches.push(i);
                if locked {
                    continue;
                }
                if candidate.is_none() {
                    candidate = Some(i);
                }
                if rec.replace && rec.orig.matches(requested, requested_name) {
                    candidate = Some(i);
                    locked = true;
                    if !debug {
                        break;
                    }
                }
            }
        }

        if let Some(seen) = self.debug_matches.as_mut() {
            seen.extend(inst_matches.iter().map(|&index| RecordRef {
                kind: OverrideKind::Instance,
                index,
            }));
            seen.extend(type_matches.iter().map(|&index| RecordRef {
                kind: OverrideKind::Type,
                index,
            }));
        }

        let selected = inst_matches
            .first()
            .map(|&index| RecordRef {
                kind: OverrideKind::Instance,
                index,
            })
            .or_else(|| {
                candidate.map(|index| RecordRef {
                    kind: OverrideKind::Type,
                    index,
                })
            });

        match selected {
            Some(r) => self.follow(r, path),
            None => requested.cloned(),
        }
    }

    /// The type the most recent applied record was overriding: the last
    /// type reached before a loop closes.
    fn last_followed(&self, path: &str) -> Option<TypeHandle<P>> {
        let record = self.trace.last().and_then(|&r| self.record(r))?;
        record
            .orig
            .handle
            .clone()
            .or_else(|| self.resolve_type_name_by_inst(&record.orig.name, path))
    }

    /// Apply a selected record and keep resolving from its override side.
    fn follow(&mut self, r: RecordRef, path: &str) -> Option<TypeHandle<P>> {
        self.trace.push(r);
        let debug = self.debug_matches.is_some();
        let record = self.record_mut(r)?;
        record.mark_used();
        if debug {
            record.selected = true;
        }
        let ovrd_handle = record.ovrd.handle.clone();
        let ovrd_name = record.ovrd.name.clone();
        let orig_name = record.orig.name.clone();

        let target = ovrd_handle.or_else(|| self.resolve_type_name_by_inst(&ovrd_name, path));
        if let Some(next) = target {
            tracing::trace!(from = %orig_name, to = %next.display_name(), path, "override applied");
            return self.search(Some(&next), next.type_name(), path);
        }
        self.reporter.error(
            "TYPNTF",
            &format!(
                "Cannot create override type '{}' for original type '{}' because it is not \
                 registered with the factory.",
                display_type_name(&ovrd_name),
                display_type_name(&orig_name)
            ),
            CONTEXT,
        );
        None
    }

    // -----------------------------------------------------------------------
    // Public search
    // -----------------------------------------------------------------------

    /// Resolve the type that a request for `requested` at
    /// `full_inst_path` produces, without creating anything.
    ///
    /// Returns `requested` itself when no override applies and `None` when
    /// the winning override names a type that cannot be resolved.
    pub fn find_override_by_type(
        &mut self,
        requested: &TypeHandle<P>,
        full_inst_path: &str,
    ) -> Option<TypeHandle<P>> {
        self.trace.clear();
        self.search(Some(requested), requested.type_name(), full_inst_path)
    }

    /// Name-based variant of [`Self::find_override_by_type`].
    ///
    /// The name is first resolved through instance aliases and the name
    /// table; an unregistered name can still resolve if an override names
    /// it as its original.
    pub fn find_override_by_name(
        &mut self,
        requested_type_name: &str,
        full_inst_path: &str,
    ) -> Option<TypeHandle<P>> {
        self.trace.clear();
        let requested = self.resolve_type_name_by_inst(requested_type_name, full_inst_path);
        self.search(requested.as_ref(), requested_type_name, full_inst_path)
    }

    /// Resolve the type to build for `requested` created as `name` under
    /// `parent_inst_path`.
    ///
    /// Callers that must not hold the factory while constructing use this
    /// and invoke the returned proxy themselves.
    pub fn resolve_by_type(
        &mut self,
        requested: &TypeHandle<P>,
        parent_inst_path: &str,
        name: &str,
    ) -> Option<TypeHandle<P>> {
        let path = full_inst_path(parent_inst_path, name);
        self.find_override_by_type(requested, &path)
    }

    /// Name-based variant of [`Self::resolve_by_type`]. Warns when the
    /// name resolves to nothing.
    pub fn resolve_by_name(
        &mut self,
        requested_type_name: &str,
        parent_inst_path: &str,
        name: &str,
    ) -> Option<TypeHandle<P>> {
        let path = full_inst_path(parent_inst_path, name);
        let known = self
            .resolve_type_name_by_inst(requested_type_name, &path)
            .is_some();
        let found = self.find_override_by_name(requested_type_name, &path);
        if found.is_none() && !known {
            self.reporter.warning(
                "BDTYP",
                &format!(
                    "Cannot create an object of type '{requested_type_name}' because it is not \
                     registered with the factory."
                ),
                CONTEXT,
            );
        }
        found
    }

    // -----------------------------------------------------------------------
    // Creation
    // -----------------------------------------------------------------------

    /// Create an object of `requested` (or its override) named `name`.
    pub fn create_object_by_type(
        &mut self,
        requested: &TypeHandle<P>,
        parent_inst_path: &str,
        name: &str,
    ) -> Option<P::Object> {
        let handle = self.resolve_by_type(requested, parent_inst_path, name)?;
        self.build_object(&handle, name)
    }

    /// Create an object of the type named `requested_type_name` (or its
    /// override).
    pub fn create_object_by_name(
        &mut self,
        requested_type_name: &str,
        parent_inst_path: &str,
        name: &str,
    ) -> Option<P::Object> {
        let handle = self.resolve_by_name(requested_type_name, parent_inst_path, name)?;
        self.build_object(&handle, name)
    }

    /// Create a component of `requested` (or its override) under `parent`.
    pub fn create_component_by_type(
        &mut self,
        requested: &TypeHandle<P>,
        parent_inst_path: &str,
        name: &str,
        parent: &P::Parent,
    ) -> Option<P::Component> {
        let handle = self.resolve_by_type(requested, parent_inst_path, name)?;
        self.build_component(&handle, name, parent)
    }

    /// Create a component of the type named `requested_type_name` (or its
    /// override) under `parent`.
    pub fn create_component_by_name(
        &mut self,
        requested_type_name: &str,
        parent_inst_path: &str,
        name: &str,
        parent: &P::Parent,
    ) -> Option<P::Component> {
        let handle = self.resolve_by_name(requested_type_name, parent_inst_path, name)?;
        self.build_component(&handle, name, parent)
    }

    fn build_object(&self, handle: &TypeHandle<P>, name: &str) -> Option<P::Object> {
        let object = handle.create_object(name);
        if object.is_none() {
            self.reporter.warning(
                "CRTOBJ",
                &format!("Type '{}' cannot create objects.", handle.display_name()),
                CONTEXT,
            );
        }
        object
    }

    fn build_component(
        &self,
        handle: &TypeHandle<P>,
        name: &str,
        parent: &P::Parent,
    ) -> Option<P::Component> {
        let component = handle.create_component(name, parent);
        if component.is_none() {
            self.reporter.warning(
                "CRTCOMP",
                &format!("Type '{}' cannot create components.", handle.display_name()),
                CONTEXT,
            );
        } else {
            tracing::debug!(name, type_name = %handle.display_name(), "component created");
        }
        component
    }
}
