//! Override records and the type identities they map between.

use crate::proxy::{Products, TypeHandle, display_type_name};
use crate::wildcard::has_wildcard;

/// One side of an override: a type handle, a type name, or both.
///
/// Overrides registered by name before the type itself is registered carry
/// only the name; the handle is bound when the type registers.
pub struct TypePair<P: Products> {
    /// The resolved type, if known.
    pub handle: Option<TypeHandle<P>>,
    /// The type name.
    pub name: String,
}

impl<P: Products> TypePair<P> {
    /// A pair for a known type.
    pub fn from_handle(handle: &TypeHandle<P>) -> Self {
        Self {
            name: handle.type_name().to_owned(),
            handle: Some(handle.clone()),
        }
    }

    /// A pair for a name, with the handle if the name is registered.
    pub fn from_name(name: &str, handle: Option<TypeHandle<P>>) -> Self {
        Self {
            handle,
            name: name.to_owned(),
        }
    }

    /// Whether this pair matches a request directly, by handle identity or
    /// by name. Aliases are not consulted.
    pub fn matches(&self, handle: Option<&TypeHandle<P>>, name: &str) -> bool {
        let by_handle = matches!((&self.handle, handle), (Some(a), Some(b)) if a.same_type(b));
        by_handle || (!self.name.is_empty() && !name.is_empty() && self.name == name)
    }

    /// Name used in dumps.
    pub fn display_name(&self) -> &str {
        display_type_name(&self.name)
    }
}

impl<P: Products> Clone for TypePair<P> {
    fn clone(&self) -> Self {
        Self {
            handle: self.handle.clone(),
            name: self.name.clone(),
        }
    }
}

impl<P: Products> core::fmt::Debug for TypePair<P> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TypePair")
            .field("name", &self.name)
            .field("bound", &self.handle.is_some())
            .finish()
    }
}

/// A registered original-to-override mapping.
pub struct OverrideRecord<P: Products> {
    /// Instance path scope; `None` for type-wide overrides.
    pub full_inst_path: Option<String>,
    /// The type being replaced.
    pub orig: TypePair<P>,
    /// The replacement type.
    pub ovrd: TypePair<P>,
    /// Whether this record supersedes earlier matches for the same type.
    pub replace: bool,
    /// How many times this record was selected during resolution.
    pub used: u32,
    /// Set when the most recent debug trace selected this record.
    pub selected: bool,
    /// Whether the scope contains glob metacharacters.
    pub has_wildcard: bool,
}

impl<P: Products> OverrideRecord<P> {
    /// A type-wide override.
    pub fn type_override(orig: TypePair<P>, ovrd: TypePair<P>, replace: bool) -> Self {
        Self {
            full_inst_path: None,
            orig,
            ovrd,
            replace,
            used: 0,
            selected: false,
            has_wildcard: false,
        }
    }

    /// An instance override scoped to `full_inst_path`.
    pub fn inst_override(orig: TypePair<P>, ovrd: TypePair<P>, full_inst_path: &str) -> Self {
        Self {
            full_inst_path: Some(full_inst_path.to_owned()),
            orig,
            ovrd,
            replace: false,
            used: 0,
            selected: false,
            has_wildcard: has_wildcard(full_inst_path),
        }
    }

    /// Scope string for dumps (`*` for type-wide overrides).
    pub fn scope(&self) -> &str {
        self.full_inst_path.as_deref().unwrap_or("*")
    }

    /// Count one selection.
    pub(crate) fn mark_used(&mut self) {
        self.used = self.used.saturating_add(1);
    }
}

impl<P: Products> core::fmt::Debug for OverrideRecord<P> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("OverrideRecord")
            .field("full_inst_path", &self.full_inst_path)
            .field("orig", &self.orig)
            .field("ovrd", &self.ovrd)
            .field("replace", &self.replace)
            .field("used", &self.used)
            .finish_non_exhaustive()
    }
}
