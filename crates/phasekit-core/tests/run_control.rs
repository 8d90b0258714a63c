//! Integration tests for test selection, factory overrides at run start
//! and the run lifecycle.

#![allow(clippy::unwrap_used)]

use std::cell::RefCell;
use std::rc::Rc;

use phasekit_core::{
    ArgsSource, Component, PhaseContext, PhasekitConfig, Root, RunError, TEST_INSTANCE_NAME,
    component_type,
};
use phasekit_report::{MemorySink, ReportServer};
use phasekit_types::{CoreState, Severity};

fn new_root() -> (Root, MemorySink) {
    let sink = MemorySink::new();
    let root = Root::new(Rc::new(ReportServer::new(sink.clone())));
    (root, sink)
}

struct Quiet;

impl Component for Quiet {}

/// Records which test type was built.
struct Named {
    kind: &'static str,
    built: Rc<RefCell<Vec<String>>>,
}

impl Component for Named {
    fn build_phase(&self, ctx: &PhaseContext) {
        self.built
            .borrow_mut()
            .push(format!("{} {}", self.kind, ctx.full_name()));
    }
}

fn register_tests(root: &Root) -> Rc<RefCell<Vec<String>>> {
    let built = Rc::new(RefCell::new(Vec::new()));
    for kind in ["base_test", "smoke_test"] {
        let b = Rc::clone(&built);
        root.register_type(&component_type(kind, move |_, _| Named {
            kind,
            built: Rc::clone(&b),
        }));
    }
    built
}

#[tokio::test(start_paused = true)]
async fn runs_the_named_test() {
    let (root, sink) = new_root();
    let built = register_tests(&root);

    let summary = root.run_test("base_test").await.unwrap();

    assert_eq!(summary.state, CoreState::Finished);
    assert_eq!(summary.test_name, "base_test");
    assert_eq!(summary.test_type, "base_test");
    assert_eq!(*built.borrow(), vec!["base_test uvm_test_top"]);
    assert!(sink.contains_id("RNTST"));
    assert!(sink.contains_id("SUMMARY"));
    assert!(root.lookup(TEST_INSTANCE_NAME).is_some());
}

#[tokio::test(start_paused = true)]
async fn testname_argument_selects_the_test() {
    let (root, sink) = new_root();
    let built = register_tests(&root);
    root.set_config_source(ArgsSource::new(["+TESTNAME=smoke_test", "+TESTNAME=base_test"]));

    let summary = root.run_test("base_test").await.unwrap();

    assert_eq!(summary.test_name, "smoke_test");
    assert_eq!(*built.borrow(), vec!["smoke_test uvm_test_top"]);
    assert!(sink.contains_id("MULTTST"));
}

#[tokio::test(start_paused = true)]
async fn type_override_argument_replaces_the_test() {
    let (root, sink) = new_root();
    let built = register_tests(&root);
    root.set_config_source(ArgsSource::new(["+set_type_override=base_test,smoke_test"]));

    let summary = root.run_test("base_test").await.unwrap();

    assert_eq!(summary.test_name, "base_test");
    assert_eq!(summary.test_type, "smoke_test");
    assert_eq!(*built.borrow(), vec!["smoke_test uvm_test_top"]);
    let rntst = sink
        .messages()
        .into_iter()
        .find(|m| m.id == "RNTST")
        .unwrap();
    assert!(rntst.message.contains("via factory override"));
}

#[tokio::test(start_paused = true)]
async fn instance_override_argument_applies_by_path() {
    let (root, _) = new_root();
    let built = register_tests(&root);
    root.set_config_source(ArgsSource::new([
        "+set_inst_override=base_test,smoke_test,uvm_test_top",
    ]));

    let summary = root.run_test("base_test").await.unwrap();

    assert_eq!(summary.test_type, "smoke_test");
    assert_eq!(*built.borrow(), vec!["smoke_test uvm_test_top"]);
}

#[tokio::test(start_paused = true)]
async fn configured_default_test_is_used_when_none_is_given() {
    let sink = MemorySink::new();
    let config = PhasekitConfig::parse("test:\n  name: smoke_test\n").unwrap();
    let root = Root::from_config(&config, Rc::new(ReportServer::new(sink)));
    let built = register_tests(&root);

    let summary = root.run_test("").await.unwrap();

    assert_eq!(summary.test_name, "smoke_test");
    assert_eq!(*built.borrow(), vec!["smoke_test uvm_test_top"]);
}

#[tokio::test(start_paused = true)]
async fn unknown_test_is_fatal() {
    let (root, sink) = new_root();

    let summary = root.run_test("missing_test").await.unwrap();

    assert_eq!(summary.state, CoreState::Aborted);
    assert!(sink.contains_id("INVTST"));
    assert_eq!(summary.report.count(Severity::Fatal), 1);
}

#[tokio::test(start_paused = true)]
async fn existing_test_instance_is_fatal() {
    let (root, sink) = new_root();
    register_tests(&root);
    root.add_component(root.top(), TEST_INSTANCE_NAME, "quiet", Rc::new(Quiet))
        .unwrap();

    let summary = root.run_test("base_test").await.unwrap();

    assert_eq!(summary.state, CoreState::Aborted);
    assert!(sink.contains_id("TTINST"));
}

#[tokio::test(start_paused = true)]
async fn empty_hierarchy_is_fatal() {
    let (root, sink) = new_root();

    let summary = root.run_test("").await.unwrap();

    assert_eq!(summary.state, CoreState::Aborted);
    assert!(sink.contains_id("NOCOMP"));
}

#[tokio::test(start_paused = true)]
async fn prebuilt_hierarchy_runs_without_a_test() {
    let (root, sink) = new_root();
    root.add_component(root.top(), "env", "quiet", Rc::new(Quiet))
        .unwrap();

    let summary = root.run_test("").await.unwrap();

    assert_eq!(summary.state, CoreState::Finished);
    assert!(summary.test_name.is_empty());
    assert!(!sink.contains_id("RNTST"));
}

#[tokio::test(start_paused = true)]
async fn a_root_runs_once() {
    let (root, _) = new_root();
    register_tests(&root);
    root.run_test("base_test").await.unwrap();

    let again = root.run_test("base_test").await;

    assert!(matches!(
        again,
        Err(RunError::AlreadyRan {
            state: CoreState::Finished
        })
    ));
}

/// Reports errors in build until the quit count stops the run.
struct Noisy;

impl Component for Noisy {
    fn build_phase(&self, ctx: &PhaseContext) {
        ctx.error("NOISE", "first");
        ctx.error("NOISE", "second");
    }
}

#[tokio::test(start_paused = true)]
async fn reaching_the_quit_count_aborts() {
    let (root, sink) = new_root();
    root.set_config_source(ArgsSource::new(["+MAX_QUIT_COUNT=2"]));
    root.register_type(&component_type("noisy", |_, _| Noisy));

    let summary = root.run_test("noisy").await.unwrap();

    assert_eq!(summary.state, CoreState::Aborted);
    assert!(summary.report.quit_count_reached);
    assert_eq!(sink.count_id("NOISE"), 2);
    assert!(sink.contains_id("MAXQUITSET"));
}

#[tokio::test(start_paused = true)]
async fn topology_is_printed_as_a_report() {
    let (root, sink) = new_root();
    assert!(root.print_topology().is_empty());
    assert!(sink.contains_id("EMTCOMP"));

    let env = root
        .add_component(root.top(), "env", "quiet", Rc::new(Quiet))
        .unwrap();
    root.add_component(env, "agent", "quiet", Rc::new(Quiet))
        .unwrap();

    assert_eq!(root.print_topology(), "env (quiet)\n  agent (quiet)\n");
    assert!(sink.contains_id("UVMTOP"));
    assert_eq!(root.find("env.*"), root.lookup("env.agent"));
}
