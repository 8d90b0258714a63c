//! Creation proxies: the lightweight per-type capability the factory
//! delegates to once it has decided which type to build.

use std::rc::Rc;

/// The product family a factory creates.
///
/// A factory is generic over its products so the factory crate does not
/// depend on any particular object or component model; the phasing engine
/// plugs in its own, and tests use plain values.
pub trait Products: 'static {
    /// What `create_object` produces.
    type Object;
    /// What `create_component` produces.
    type Component;
    /// What a component is created under.
    type Parent: ?Sized;
}

/// A proxy that knows how to instantiate one concrete type.
pub trait CreationProxy<P: Products> {
    /// The registered type name used for string-based lookup.
    fn type_name(&self) -> &str;

    /// Create an object with the given instance name.
    ///
    /// Proxies for component types return `None`.
    fn create_object(&self, _name: &str) -> Option<P::Object> {
        None
    }

    /// Create a component with the given name under `parent`.
    ///
    /// Proxies for plain object types return `None`.
    fn create_component(&self, _name: &str, _parent: &P::Parent) -> Option<P::Component> {
        None
    }
}

/// A shared handle to a registered proxy. Identity is the proxy
/// allocation: two handles are equal only if they point at the same proxy.
pub struct TypeHandle<P: Products> {
    proxy: Rc<dyn CreationProxy<P>>,
}

impl<P: Products> TypeHandle<P> {
    /// Wrap a proxy in a new handle (a new type identity).
    pub fn new(proxy: impl CreationProxy<P> + 'static) -> Self {
        Self {
            proxy: Rc::new(proxy),
        }
    }

    /// The proxy's type name.
    pub fn type_name(&self) -> &str {
        self.proxy.type_name()
    }

    /// Delegate object creation to the proxy.
    pub fn create_object(&self, name: &str) -> Option<P::Object> {
        self.proxy.create_object(name)
    }

    /// Delegate component creation to the proxy.
    pub fn create_component(&self, name: &str, parent: &P::Parent) -> Option<P::Component> {
        self.proxy.create_component(name, parent)
    }

    /// Whether two handles refer to the same type.
    pub fn same_type(&self, other: &Self) -> bool {
        core::ptr::addr_eq(Rc::as_ptr(&self.proxy), Rc::as_ptr(&other.proxy))
    }

    /// The display name used in dumps; blank names print as `<unknown>`.
    pub fn display_name(&self) -> &str {
        display_type_name(self.type_name())
    }
}

impl<P: Products> Clone for TypeHandle<P> {
    fn clone(&self) -> Self {
        Self {
            proxy: Rc::clone(&self.proxy),
        }
    }
}

impl<P: Products> PartialEq for TypeHandle<P> {
    fn eq(&self, other: &Self) -> bool {
        self.same_type(other)
    }
}

impl<P: Products> Eq for TypeHandle<P> {}

impl<P: Products> core::fmt::Debug for TypeHandle<P> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_tuple("TypeHandle").field(&self.type_name()).finish()
    }
}

/// Map a blank type name to `<unknown>`.
pub(crate) fn display_type_name(name: &str) -> &str {
    if name.is_empty() { "<unknown>" } else { name }
}

/// Whether a type name can be used for string-based lookup.
pub(crate) fn is_named(name: &str) -> bool {
    !name.is_empty() && name != "<unknown>"
}

type ObjectFn<P> = Box<dyn Fn(&str) -> <P as Products>::Object>;
type ComponentFn<P> = Box<dyn Fn(&str, &<P as Products>::Parent) -> <P as Products>::Component>;

/// A proxy built from closures.
///
/// Most registrations only need a name and a constructor:
///
/// ```ignore
/// let base = FnProxy::component("base_driver", |name, parent| build(name, parent));
/// factory.register(&base);
/// ```
pub struct FnProxy<P: Products> {
    type_name: String,
    object: Option<ObjectFn<P>>,
    component: Option<ComponentFn<P>>,
}

impl<P: Products> FnProxy<P> {
    /// A handle for an object type.
    pub fn object(
        type_name: impl Into<String>,
        create: impl Fn(&str) -> P::Object + 'static,
    ) -> TypeHandle<P> {
        TypeHandle::new(Self {
            type_name: type_name.into(),
            object: Some(Box::new(create)),
            component: None,
        })
    }

    /// A handle for a component type.
    pub fn component(
        type_name: impl Into<String>,
        create: impl Fn(&str, &P::Parent) -> P::Component + 'static,
    ) -> TypeHandle<P> {
        TypeHandle::new(Self {
            type_name: type_name.into(),
            object: None,
            component: Some(Box::new(create)),
        })
    }
}

impl<P: Products> CreationProxy<P> for FnProxy<P> {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn create_object(&self, name: &str) -> Option<P::Object> {
        self.object.as_ref().map(|create| create(name))
    }

    fn create_component(&self, name: &str, parent: &P::Parent) -> Option<P::Component> {
        self.component.as_ref().map(|create| create(name, parent))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Strings;

    impl Products for Strings {
        type Object = String;
        type Component = String;
        type Parent = str;
    }

    #[test]
    fn handles_compare_by_identity() {
        let a = FnProxy::<Strings>::object("thing", |n| n.to_owned());
        let b = FnProxy::<Strings>::object("thing", |n| n.to_owned());
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }

    #[test]
    fn object_proxy_does_not_create_components() {
        let h = FnProxy::<Strings>::object("thing", |n| format!("obj:{n}"));
        assert_eq!(h.create_object("x").as_deref(), Some("obj:x"));
        assert_eq!(h.create_component("x", "top"), None);
    }

    #[test]
    fn component_proxy_receives_parent() {
        let h = FnProxy::<Strings>::component("comp", |n, p| format!("{p}.{n}"));
        assert_eq!(h.create_component("drv", "env").as_deref(), Some("env.drv"));
        assert_eq!(h.create_object("drv"), None);
    }

    #[test]
    fn blank_names_display_as_unknown() {
        let h = FnProxy::<Strings>::object("", |n| n.to_owned());
        assert_eq!(h.display_name(), "<unknown>");
        assert!(!is_named(h.type_name()));
    }
}
