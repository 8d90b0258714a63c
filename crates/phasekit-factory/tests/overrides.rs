//! Override resolution scenarios.

#![allow(clippy::unwrap_used)]

use std::rc::Rc;

use phasekit_factory::{Factory, FnProxy, OverrideKind, Products, TypeHandle};
use phasekit_report::{MemorySink, ReportServer};

struct Toy;

impl Products for Toy {
    type Object = String;
    type Component = String;
    type Parent = str;
}

fn factory() -> (Factory<Toy>, MemorySink) {
    let sink = MemorySink::new();
    let reporter = Rc::new(ReportServer::new(sink.clone()));
    (Factory::new(reporter), sink)
}

/// A component type whose product records the type and the full path.
fn comp(type_name: &'static str) -> TypeHandle<Toy> {
    FnProxy::component(type_name, move |name, parent| {
        format!("{type_name}@{parent}.{name}")
    })
}

fn obj(type_name: &'static str) -> TypeHandle<Toy> {
    FnProxy::object(type_name, move |name| format!("{type_name}:{name}"))
}

fn resolved(f: &mut Factory<Toy>, requested: &TypeHandle<Toy>, path: &str) -> String {
    f.find_override_by_type(requested, path)
        .unwrap()
        .type_name()
        .to_owned()
}

#[test]
fn type_override_replaces_component_type() {
    let (mut f, sink) = factory();
    let base = comp("Base");
    let derived = comp("Derived");
    f.register(&base);
    f.register(&derived);
    f.set_type_override_by_type(&base, &derived, true);

    let made = f.create_component_by_type(&base, "", "n1", "top").unwrap();
    assert_eq!(made, "Derived@top.n1");
    assert_eq!(f.type_overrides()[0].used, 1);
    assert!(sink.messages().iter().all(|m| m.id != "OVRDLOOP"));
}

#[test]
fn no_override_returns_requested_type_silently() {
    let (mut f, sink) = factory();
    let base = comp("Base");
    f.register(&base);
    assert_eq!(resolved(&mut f, &base, "top.a"), "Base");
    assert!(sink.messages().is_empty());
}

#[test]
fn first_matching_instance_override_wins() {
    let (mut f, _sink) = factory();
    let base = comp("Base");
    let x = comp("X");
    let y = comp("Y");
    for t in [&base, &x, &y] {
        f.register(t);
    }
    f.set_inst_override_by_type(&base, &x, "top.a");
    f.set_inst_override_by_type(&base, &y, "top.*");

    assert_eq!(resolved(&mut f, &base, "top.a"), "X");
    assert_eq!(resolved(&mut f, &base, "top.b"), "Y");
    assert_eq!(resolved(&mut f, &base, "other.a"), "Base");
}

#[test]
fn instance_override_beats_type_override_in_any_order() {
    for inst_first in [true, false] {
        let (mut f, _sink) = factory();
        let base = comp("Base");
        let by_inst = comp("ByInst");
        let by_type = comp("ByType");
        if inst_first {
            f.set_inst_override_by_type(&base, &by_inst, "env.agent0.*");
            f.set_type_override_by_type(&base, &by_type, true);
        } else {
            f.set_type_override_by_type(&base, &by_type, true);
            f.set_inst_override_by_type(&base, &by_inst, "env.agent0.*");
        }
        assert_eq!(resolved(&mut f, &base, "env.agent0.drv"), "ByInst");
        assert_eq!(resolved(&mut f, &base, "env.agent1.drv"), "ByType");
    }
}

#[test]
fn override_cycle_terminates_with_one_error_per_call() {
    let (mut f, sink) = factory();
    let a = comp("A");
    let b = comp("B");
    f.set_type_override_by_type(&a, &b, true);
    f.set_type_override_by_type(&b, &a, true);

    assert_eq!(resolved(&mut f, &a, "top.x"), "B");
    assert_eq!(sink.count_id("OVRDLOOP"), 1);

    assert_eq!(resolved(&mut f, &b, "top.x"), "A");
    assert_eq!(sink.count_id("OVRDLOOP"), 2);
}

#[test]
fn instance_and_type_override_cycle_stops_before_the_repeat() {
    let (mut f, sink) = factory();
    let a = comp("A");
    let b = comp("B");
    f.set_inst_override_by_type(&a, &b, "top.*");
    f.set_type_override_by_type(&b, &a, true);

    assert_eq!(resolved(&mut f, &a, "top.x"), "B");
    assert_eq!(sink.count_id("OVRDLOOP"), 1);
}

#[test]
fn overrides_chain_transitively() {
    let (mut f, _sink) = factory();
    let a = comp("A");
    let b = comp("B");
    let c = comp("C");
    f.set_type_override_by_type(&a, &b, true);
    f.set_type_override_by_type(&b, &c, true);
    assert_eq!(resolved(&mut f, &a, "top"), "C");
}

#[test]
fn self_override_is_ignored_with_warning() {
    let (mut f, sink) = factory();
    let a = comp("A");
    f.register(&a);
    f.set_type_override_by_type(&a, &a, true);
    assert!(f.type_overrides().is_empty());
    assert_eq!(sink.count_id("TYPDUP"), 1);
    assert_eq!(resolved(&mut f, &a, "top"), "A");
}

#[test]
fn replace_false_keeps_existing_override() {
    let (mut f, sink) = factory();
    let a = comp("A");
    let b = comp("B");
    let c = comp("C");
    f.set_type_override_by_type(&a, &b, true);
    f.set_type_override_by_type(&a, &c, false);
    assert_eq!(resolved(&mut f, &a, "top"), "B");
    assert_eq!(f.type_overrides().len(), 1);
    assert!(sink.contains_id("TPREGD"));
}

#[test]
fn replace_true_mutates_in_place() {
    let (mut f, _sink) = factory();
    let a = comp("A");
    let b = comp("B");
    let c = comp("C");
    let d = comp("D");
    let e = comp("E");
    f.set_type_override_by_type(&a, &b, true);
    f.set_type_override_by_type(&d, &e, true);
    f.set_type_override_by_type(&a, &c, true);

    assert_eq!(f.type_overrides().len(), 2);
    assert_eq!(f.type_overrides()[0].ovrd.name, "C");
    assert_eq!(resolved(&mut f, &a, "top"), "C");
}

#[test]
fn later_replace_record_beats_earlier_name_match() {
    let (mut f, _sink) = factory();
    let a = comp("A");
    let b = comp("B");
    let c = comp("C");
    f.register(&a);
    f.register(&b);
    f.register(&c);
    f.set_inst_alias("a_alias", &a, "*");
    // Only matches A through the alias, so it is not an exact match.
    f.set_type_override_by_name("a_alias", "B", false);
    assert_eq!(resolved(&mut f, &a, "top"), "B");
    f.set_type_override_by_type(&a, &c, true);

    assert_eq!(f.type_overrides().len(), 2);
    assert_eq!(resolved(&mut f, &a, "top"), "C");
}

#[test]
fn name_override_before_registration_binds_later() {
    let (mut f, _sink) = factory();
    f.set_type_override_by_name("Base", "Derived", true);
    assert!(f.type_overrides()[0].orig.handle.is_none());

    let base = comp("Base");
    let derived = comp("Derived");
    f.register(&base);
    f.register(&derived);
    assert!(f.type_overrides()[0].orig.handle.is_some());
    assert!(f.type_overrides()[0].ovrd.handle.is_some());

    let made = f.create_component_by_name("Base", "env", "drv", "env").unwrap();
    assert_eq!(made, "Derived@env.drv");
}

#[test]
fn unresolvable_override_target_fails_creation() {
    let (mut f, sink) = factory();
    let base = comp("Base");
    f.register(&base);
    f.set_type_override_by_name("Base", "Ghost", true);

    assert!(f.create_component_by_type(&base, "", "n", "top").is_none());
    assert_eq!(sink.count_id("TYPNTF"), 1);
}

#[test]
fn unknown_name_warns_and_returns_none() {
    let (mut f, sink) = factory();
    assert!(f.create_object_by_name("nope", "", "x").is_none());
    assert_eq!(sink.count_id("BDTYP"), 1);
}

#[test]
fn duplicate_registrations_warn() {
    let (mut f, sink) = factory();
    let a = comp("A");
    let a_again = comp("A");
    f.register(&a);
    f.register(&a);
    f.register(&a_again);
    assert_eq!(sink.count_id("TPRGED"), 2);
    assert!(f.is_type_registered(&a_again));
    assert!(f.find_wrapper_by_name("A").unwrap().same_type(&a));
}

#[test]
fn blank_names_register_by_identity_only() {
    let (mut f, sink) = factory();
    let anon = obj("");
    f.register(&anon);
    assert!(f.is_type_registered(&anon));
    assert!(!f.is_type_name_registered(""));
    assert!(sink.contains_id("TPRGBL"));
}

#[test]
fn instance_alias_is_path_scoped() {
    let (mut f, _sink) = factory();
    let fast = comp("FastDriver");
    let slow = comp("SlowDriver");
    f.register(&fast);
    f.register(&slow);
    f.set_inst_alias("driver", &fast, "top.fast.*");
    f.set_type_alias("driver", &slow);

    let a = f.create_component_by_name("driver", "top.fast", "d0", "top.fast");
    let b = f.create_component_by_name("driver", "top.slow", "d0", "top.slow");
    assert_eq!(a.unwrap(), "FastDriver@top.fast.d0");
    assert_eq!(b.unwrap(), "SlowDriver@top.slow.d0");
}

#[test]
fn object_creation_by_type_and_name() {
    let (mut f, sink) = factory();
    let item = obj("Item");
    let fancy = obj("FancyItem");
    f.register(&item);
    f.register(&fancy);
    f.set_inst_override_by_name("Item", "FancyItem", "seq.*");

    assert_eq!(f.create_object_by_type(&item, "", "i0").unwrap(), "Item:i0");
    assert_eq!(
        f.create_object_by_name("Item", "seq", "i1").unwrap(),
        "FancyItem:i1"
    );
    // An object type cannot produce components.
    assert!(f.create_component_by_type(&item, "", "c", "top").is_none());
    assert!(sink.contains_id("CRTCOMP"));
}

#[test]
fn duplicate_instance_override_is_not_added() {
    let (mut f, sink) = factory();
    let a = comp("A");
    let b = comp("B");
    f.set_inst_override_by_type(&a, &b, "top.*");
    f.set_inst_override_by_type(&a, &b, "top.*");
    assert_eq!(f.inst_overrides().len(), 1);
    assert!(f.inst_overrides()[0].has_wildcard);
    assert!(sink.contains_id("DUPOVRD"));
}

#[test]
fn debug_trace_lists_ignored_matches() {
    let (mut f, sink) = factory();
    let base = comp("Base");
    let x = comp("X");
    let y = comp("Y");
    f.set_inst_override_by_type(&base, &x, "top.a");
    f.set_type_override_by_type(&base, &y, true);

    let trace = f.debug_create_by_type(&base, "top", "a");
    assert_eq!(trace.full_inst_path, "top.a");
    assert_eq!(trace.result.as_deref(), Some("X"));
    assert_eq!(trace.matches.len(), 2);
    assert_eq!(trace.matches[0].kind, OverrideKind::Instance);
    assert!(trace.matches[0].selected);
    assert!(!trace.matches[1].selected);
    assert_eq!(trace.chain(), vec!["X"]);
    assert!(sink.contains_id("FACTDBG"));

    // The dry run agrees with the real search.
    assert_eq!(resolved(&mut f, &base, "top.a"), "X");
}

#[test]
fn debug_trace_by_name_follows_chain() {
    let (mut f, _sink) = factory();
    let a = comp("A");
    let b = comp("B");
    let c = comp("C");
    f.set_type_override_by_type(&a, &b, true);
    f.set_type_override_by_type(&b, &c, true);

    let trace = f.debug_create_by_name("A", "", "n");
    assert_eq!(trace.chain(), vec!["B", "C"]);
    assert_eq!(trace.result.as_deref(), Some("C"));
    assert!(trace.render().contains("'C'"));
}

#[test]
fn print_tolerates_empty_tables() {
    let (f, sink) = factory();
    let dump = f.print(true);
    assert!(dump.contains("No instance or type overrides"));
    assert!(dump.contains("0 total"));
    assert!(sink.contains_id("FACTORY"));
}

#[test]
fn print_lists_overrides_and_types() {
    let (mut f, _sink) = factory();
    let a = comp("A");
    let b = comp("B");
    f.set_type_override_by_type(&a, &b, true);
    f.set_inst_override_by_type(&b, &a, "top.legacy");

    let dump = f.print(true);
    assert!(dump.contains("Instance Overrides:"));
    assert!(dump.contains("top.legacy"));
    assert!(dump.contains("Type Overrides:"));
    assert!(dump.contains("2 total"));

    let brief = f.print(false);
    assert!(!brief.contains("total"));
}
