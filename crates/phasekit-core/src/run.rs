//! Run control: starting a test, applying arguments and aborting.

use std::rc::Rc;
use std::time::Duration;

use phasekit_report::ReportSummary;
use phasekit_types::{CoreState, Verbosity};
use serde::Serialize;
use tokio::task::LocalSet;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::args::{parse_inst_override, parse_locked_number, parse_type_override};
use crate::component::ComponentHandle;
use crate::error::RunError;
use crate::root::Root;

const CONTEXT: &str = "root";

/// Leaf name of the component the test is created as.
pub const TEST_INSTANCE_NAME: &str = "uvm_test_top";

/// Outcome of [`Root::run_test`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// The requested test name (empty when none was given).
    pub test_name: String,
    /// The type actually created for the test after overrides.
    pub test_type: String,
    /// Core state at the end of the run.
    pub state: CoreState,
    /// Report counts at the end of the run.
    pub report: ReportSummary,
    /// Simulated time the run took, in milliseconds.
    pub sim_time_ms: u64,
}

impl RunSummary {
    /// Whether the run finished with no error or fatal report.
    pub fn passed(&self) -> bool {
        self.state == CoreState::Finished
            && self.report.count(phasekit_types::Severity::Error) == 0
            && self.report.count(phasekit_types::Severity::Fatal) == 0
    }
}

impl Root {
    /// Build the test named `test_name` (or the one selected by
    /// `+TESTNAME=` or the configured default) under the top component and
    /// run every phase to completion.
    ///
    /// Failures inside the run are reports; the returned summary says
    /// whether the run finished or aborted. A root runs once.
    pub async fn run_test(&self, test_name: &str) -> Result<RunSummary, RunError> {
        match self.core_state() {
            CoreState::Initialized => {}
            state @ (CoreState::PreRun | CoreState::Running) => {
                return Err(RunError::AlreadyRunning { state });
            }
            state => return Err(RunError::AlreadyRan { state }),
        }
        self.set_core_state(CoreState::PreRun);
        let started = Instant::now();
        LocalSet::new().run_until(self.run_test_inner(test_name)).await;
        Ok(self.summary(started.elapsed()))
    }

    async fn run_test_inner(&self, test_name: &str) {
        self.apply_args();
        let name = self.resolve_test_name(test_name);

        if !name.is_empty() {
            let top = self.top();
            if self
                .shared
                .tree
                .borrow()
                .child_by_name(top, TEST_INSTANCE_NAME)
                .is_some()
            {
                self.shared.reporter.fatal(
                    "TTINST",
                    &format!(
                        "An {TEST_INSTANCE_NAME} instance already exists; \
                         +TESTNAME={name} cannot create another"
                    ),
                    CONTEXT,
                );
                self.die();
                return;
            }
            if self
                .create_component_by_name(&name, top, TEST_INSTANCE_NAME)
                .is_none()
            {
                self.shared.reporter.fatal(
                    "INVTST",
                    &format!("Requested test from command line +TESTNAME={name} not found."),
                    CONTEXT,
                );
                self.die();
                return;
            }
        }

        let top = self.top();
        let test = self.shared.tree.borrow().child_by_name(top, TEST_INSTANCE_NAME);
        if self.children(top).is_empty() {
            self.shared.reporter.fatal(
                "NOCOMP",
                "No components instantiated. You must either instantiate at least one \
                 component before calling run_test or use +TESTNAME to specify a test",
                CONTEXT,
            );
            self.die();
            return;
        }

        let test_type = test.and_then(|id| self.type_name(id)).unwrap_or_default();
        if !name.is_empty() {
            let via = if test_type == name {
                String::new()
            } else {
                format!(" (via factory override for test \"{name}\")")
            };
            self.shared.reporter.info(
                "RNTST",
                &format!("Running test {test_type}{via}..."),
                CONTEXT,
                Verbosity::Low,
            );
        }
        *self.shared.test.borrow_mut() = Some((name, test_type));

        self.set_core_state(CoreState::Running);
        self.run_phases().await;
        if self.is_aborted() {
            return;
        }
        self.set_core_state(CoreState::PostRun);
        self.shared.reporter.summarize();
        self.set_core_state(CoreState::Finished);
    }

    fn summary(&self, elapsed: Duration) -> RunSummary {
        let (test_name, test_type) = self.shared.test.borrow().clone().unwrap_or_default();
        RunSummary {
            test_name,
            test_type,
            state: self.core_state(),
            report: self.shared.reporter.summary(),
            sim_time_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// `+TESTNAME=` wins over the argument, which wins over the
    /// configured default.
    fn resolve_test_name(&self, requested: &str) -> String {
        let from_args = self.shared.source.borrow().arg_values("+TESTNAME=");
        if let Some(first) = from_args.first() {
            if from_args.len() > 1 {
                self.shared.reporter.warning(
                    "MULTTST",
                    &format!(
                        "Multiple (={}) +TESTNAME arguments provided on the command line. \
                         '{first}' will be used.",
                        from_args.len()
                    ),
                    CONTEXT,
                );
            }
            return first.clone();
        }
        if !requested.is_empty() {
            return requested.to_owned();
        }
        self.shared.settings.default_test.borrow().clone()
    }

    /// Apply the command-line style settings of the config source.
    fn apply_args(&self) {
        let source = self.shared.source.borrow();
        let reporter = &self.shared.reporter;

        let verbosities = source.arg_values("+VERBOSITY=");
        if verbosities.len() > 1 {
            reporter.warning(
                "MULTVERB",
                &format!(
                    "Multiple (={}) +VERBOSITY arguments provided on the command line. '{}' \
                     will be used.",
                    verbosities.len(),
                    verbosities.first().map_or("", String::as_str)
                ),
                CONTEXT,
            );
        }
        if let Some(value) = verbosities.first() {
            match Verbosity::parse(value) {
                Some(level) => reporter.set_verbosity(level),
                None => reporter.warning(
                    "ILLVERB",
                    &format!("Illegal verbosity value '{value}', using the default"),
                    CONTEXT,
                ),
            }
        }

        let timeouts = source.arg_values("+TIMEOUT=");
        if timeouts.len() > 1 {
            reporter.warning(
                "MULTTIMOUT",
                &format!(
                    "Multiple (={}) +TIMEOUT arguments provided on the command line. '{}' will \
                     be used.",
                    timeouts.len(),
                    timeouts.first().map_or("", String::as_str)
                ),
                CONTEXT,
            );
        }
        if let Some(value) = timeouts.first() {
            match parse_locked_number(value) {
                Some((ms, overridable)) => {
                    reporter.info(
                        "TIMOUTSET",
                        &format!("'+TIMEOUT={value}' provided on the command line is being applied."),
                        CONTEXT,
                        Verbosity::None,
                    );
                    self.set_timeout(Some(Duration::from_millis(ms)), overridable);
                }
                None => reporter.warning(
                    "CMDLINE_PROC",
                    &format!("Illegal +TIMEOUT value '{value}'"),
                    CONTEXT,
                ),
            }
        }

        let quits = source.arg_values("+MAX_QUIT_COUNT=");
        if quits.len() > 1 {
            reporter.warning(
                "MULTMAXQUIT",
                &format!(
                    "Multiple (={}) +MAX_QUIT_COUNT arguments provided on the command line. \
                     '{}' will be used.",
                    quits.len(),
                    quits.first().map_or("", String::as_str)
                ),
                CONTEXT,
            );
        }
        if let Some(value) = quits.first() {
            match parse_locked_number(value).and_then(|(n, _)| u32::try_from(n).ok()) {
                Some(count) => {
                    reporter.info(
                        "MAXQUITSET",
                        &format!("'+MAX_QUIT_COUNT={value}' provided on the command line is being applied."),
                        CONTEXT,
                        Verbosity::None,
                    );
                    reporter.set_max_quit_count(count);
                }
                None => reporter.warning(
                    "CMDLINE_PROC",
                    &format!("Illegal +MAX_QUIT_COUNT value '{value}'"),
                    CONTEXT,
                ),
            }
        }

        if !source.arg_matches("+PHASE_TRACE").is_empty() {
            self.set_phase_trace(true);
        }
        if !source.arg_matches("+OBJECTION_TRACE").is_empty() {
            self.shared.objections.set_trace(true);
        }

        for value in source.arg_values("+set_type_override=") {
            match parse_type_override(&value) {
                Some(arg) => {
                    reporter.info(
                        "TYPEOVR",
                        &format!(
                            "Applying type override from the command line: +set_type_override={value}"
                        ),
                        CONTEXT,
                        Verbosity::None,
                    );
                    self.shared.factory.borrow_mut().set_type_override_by_name(
                        &arg.original,
                        &arg.override_type,
                        arg.replace,
                    );
                }
                None => reporter.warning(
                    "CMDLINE_PROC",
                    &format!(
                        "Invalid setting for +set_type_override={value}; the setting must be \
                         of the form <orig>,<ovrd>[,0|1]"
                    ),
                    CONTEXT,
                ),
            }
        }

        for value in source.arg_values("+set_inst_override=") {
            match parse_inst_override(&value) {
                Some(arg) => {
                    reporter.info(
                        "INSTOVR",
                        &format!(
                            "Applying instance override from the command line: +set_inst_override={value}"
                        ),
                        CONTEXT,
                        Verbosity::None,
                    );
                    self.shared.factory.borrow_mut().set_inst_override_by_name(
                        &arg.original,
                        &arg.override_type,
                        &arg.path,
                    );
                }
                None => reporter.warning(
                    "CMDLINE_PROC",
                    &format!(
                        "Invalid setting for +set_inst_override={value}; the setting must be \
                         of the form <orig>,<ovrd>,<path>"
                    ),
                    CONTEXT,
                ),
            }
        }
    }

    /// Abort the run: `pre_abort` bottom-up over the tree, report the
    /// summary, and stop every phase and task body. Repeated calls are
    /// ignored.
    pub fn die(&self) {
        let state = self.core_state();
        if state == CoreState::PreAbort || state.is_terminal() {
            return;
        }
        warn!(from = ?state, "aborting run");
        self.set_core_state(CoreState::PreAbort);

        let order = {
            let tree = self.shared.tree.borrow();
            tree.bottom_up(tree.top())
                .into_iter()
                .filter_map(|id| tree.node(id).map(|n| (id, Rc::clone(&n.behavior))))
                .collect::<Vec<_>>()
        };
        for (id, behavior) in order {
            behavior.pre_abort(&ComponentHandle::new(self.clone(), id));
        }

        self.shared.reporter.summarize();
        self.set_core_state(CoreState::Aborted);
        self.shared.abort.cancel();
        self.kill_all_tasks();
        self.shared.state_changed.notify_waiters();
        info!("run aborted");
    }

    /// Whether [`Self::die`] has been called.
    pub fn is_aborted(&self) -> bool {
        matches!(self.core_state(), CoreState::PreAbort | CoreState::Aborted)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use phasekit_report::{MemorySink, ReportServer};

    use super::*;
    use crate::args::ArgsSource;

    fn root_with(args: &[&str]) -> (Root, MemorySink) {
        let sink = MemorySink::new();
        let root = Root::new(Rc::new(ReportServer::new(sink.clone())));
        root.set_config_source(ArgsSource::new(args.iter().copied()));
        (root, sink)
    }

    #[test]
    fn testname_argument_wins_and_warns_on_repeats() {
        let (root, sink) = root_with(&["+TESTNAME=first", "+TESTNAME=second"]);
        assert_eq!(root.resolve_test_name("given"), "first");
        assert!(sink.contains_id("MULTTST"));
    }

    #[test]
    fn falls_back_to_argument_then_default() {
        let (root, _) = root_with(&[]);
        assert_eq!(root.resolve_test_name("given"), "given");
        *root.shared.settings.default_test.borrow_mut() = "configured".to_owned();
        assert_eq!(root.resolve_test_name(""), "configured");
    }

    #[test]
    fn applies_verbosity_timeout_and_quit_count() {
        let (root, sink) = root_with(&[
            "+VERBOSITY=HIGH",
            "+TIMEOUT=500,NO",
            "+MAX_QUIT_COUNT=3",
            "+PHASE_TRACE",
            "+OBJECTION_TRACE",
        ]);
        root.apply_args();
        assert_eq!(root.reporter().verbosity(), Verbosity::High);
        assert_eq!(root.phase_timeout(), Some(Duration::from_millis(500)));
        assert_eq!(root.reporter().max_quit_count(), 3);
        assert!(root.shared.settings.phase_trace.get());
        assert!(root.objections().trace());
        assert!(sink.contains_id("TIMOUTSET"));

        root.set_timeout(Some(Duration::from_secs(1)), true);
        assert_eq!(root.phase_timeout(), Some(Duration::from_millis(500)));
        assert!(sink.contains_id("NOTIMOUTOVR"));
    }

    #[test]
    fn malformed_arguments_are_warnings() {
        let (root, sink) = root_with(&[
            "+VERBOSITY=LOUD",
            "+TIMEOUT=soon",
            "+set_type_override=only_one",
            "+set_inst_override=a,b",
        ]);
        root.apply_args();
        assert!(sink.contains_id("ILLVERB"));
        assert_eq!(sink.count_id("CMDLINE_PROC"), 3);
        assert_eq!(root.reporter().severity_count(phasekit_types::Severity::Fatal), 0);
    }

    #[test]
    fn die_is_idempotent() {
        let (root, sink) = root_with(&[]);
        root.die();
        root.die();
        assert_eq!(root.core_state(), CoreState::Aborted);
        assert!(root.is_aborted());
        assert_eq!(sink.count_id("SUMMARY"), 1);
    }

    #[test]
    fn summary_serializes_with_snake_case_state() {
        let summary = RunSummary {
            test_name: "smoke".to_owned(),
            test_type: "smoke".to_owned(),
            state: CoreState::Finished,
            report: ReportSummary::default(),
            sim_time_ms: 42,
        };
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["state"], "finished");
        assert_eq!(json["sim_time_ms"], 42);
        assert!(summary.passed());
    }
}
