//! A small demonstration testbench.
//!
//! `demo_test` builds an environment with a producer and a consumer joined
//! by a shared queue. The producer holds `main` open while it sends; the
//! consumer drains the queue for the whole `run` phase and checks the
//! totals in `check`. `long_test` is the same bench sending more items,
//! meant to be selected with `+set_type_override=demo_test,long_test`.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use futures::future::LocalBoxFuture;
use phasekit_core::{Component, PhaseContext, Root, component_type};
use phasekit_types::Verbosity;

const SEND_INTERVAL: Duration = Duration::from_millis(10);
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Items in flight between producer and consumer, plus totals.
#[derive(Debug, Default)]
pub struct Traffic {
    queue: RefCell<VecDeque<u32>>,
    sent: Cell<u32>,
    received: Cell<u32>,
}

impl Traffic {
    /// Items sent so far.
    pub fn sent(&self) -> u32 {
        self.sent.get()
    }

    /// Items received so far.
    pub fn received(&self) -> u32 {
        self.received.get()
    }
}

struct Producer {
    traffic: Rc<Traffic>,
    items: u32,
}

impl Component for Producer {
    fn main_phase(&self, ctx: PhaseContext) -> LocalBoxFuture<'_, ()> {
        Box::pin(async move {
            ctx.raise_objection(1);
            for item in 0..self.items {
                self.traffic.queue.borrow_mut().push_back(item);
                self.traffic.sent.set(self.traffic.sent.get().saturating_add(1));
                tokio::time::sleep(SEND_INTERVAL).await;
            }
            ctx.info(
                "PRODUCED",
                &format!("sent {} items", self.items),
                Verbosity::Medium,
            );
            ctx.drop_objection(1);
        })
    }
}

struct Consumer {
    traffic: Rc<Traffic>,
}

impl Component for Consumer {
    fn run_phase(&self, _ctx: PhaseContext) -> LocalBoxFuture<'_, ()> {
        Box::pin(async move {
            loop {
                let next = self.traffic.queue.borrow_mut().pop_front();
                match next {
                    Some(_) => {
                        let received = self.traffic.received.get().saturating_add(1);
                        self.traffic.received.set(received);
                    }
                    None => tokio::time::sleep(POLL_INTERVAL).await,
                }
            }
        })
    }

    fn check_phase(&self, ctx: &PhaseContext) {
        let (sent, received) = (self.traffic.sent(), self.traffic.received());
        if sent == received {
            ctx.info(
                "CHECKED",
                &format!("received all {sent} items"),
                Verbosity::Low,
            );
        } else {
            ctx.error(
                "MISMATCH",
                &format!("sent {sent} items but received {received}"),
            );
        }
    }
}

struct DemoEnv {
    traffic: Rc<Traffic>,
    items: u32,
}

impl Component for DemoEnv {
    fn build_phase(&self, ctx: &PhaseContext) {
        let root = ctx.root();
        root.add_component(
            ctx.component(),
            "producer",
            "producer",
            Rc::new(Producer {
                traffic: Rc::clone(&self.traffic),
                items: self.items,
            }),
        );
        root.add_component(
            ctx.component(),
            "consumer",
            "consumer",
            Rc::new(Consumer {
                traffic: Rc::clone(&self.traffic),
            }),
        );
    }
}

struct DemoTest {
    traffic: Rc<Traffic>,
    items: u32,
}

impl Component for DemoTest {
    fn build_phase(&self, ctx: &PhaseContext) {
        ctx.root().add_component(
            ctx.component(),
            "env",
            "demo_env",
            Rc::new(DemoEnv {
                traffic: Rc::clone(&self.traffic),
                items: self.items,
            }),
        );
    }

    fn end_of_elaboration_phase(&self, ctx: &PhaseContext) {
        ctx.root().print_topology();
    }

    fn report_phase(&self, ctx: &PhaseContext) {
        ctx.info(
            "TRAFFIC",
            &format!(
                "{} sent, {} received",
                self.traffic.sent(),
                self.traffic.received()
            ),
            Verbosity::None,
        );
    }
}

/// Register `demo_test` and `long_test` with the root's factory. Both
/// tests share the returned traffic record.
pub fn register(root: &Root) -> Rc<Traffic> {
    let traffic = Rc::new(Traffic::default());
    for (type_name, items) in [("demo_test", 5), ("long_test", 20)] {
        let shared = Rc::clone(&traffic);
        root.register_type(&component_type(type_name, move |_, _| DemoTest {
            traffic: Rc::clone(&shared),
            items,
        }));
    }
    traffic
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use phasekit_core::ArgsSource;
    use phasekit_report::{MemorySink, ReportServer};
    use phasekit_types::CoreState;

    use super::*;

    fn root() -> (Root, MemorySink) {
        let sink = MemorySink::new();
        (Root::new(Rc::new(ReportServer::new(sink.clone()))), sink)
    }

    #[tokio::test(start_paused = true)]
    async fn demo_test_delivers_every_item() {
        let (root, sink) = root();
        let traffic = register(&root);

        let summary = root.run_test("demo_test").await.unwrap();

        assert_eq!(summary.state, CoreState::Finished);
        assert!(summary.passed());
        assert_eq!(traffic.sent(), 5);
        assert_eq!(traffic.received(), 5);
        assert!(sink.contains_id("CHECKED"));
        assert!(sink.contains_id("UVMTOP"));
    }

    #[tokio::test(start_paused = true)]
    async fn long_test_replaces_demo_test_by_override() {
        let (root, _) = root();
        let traffic = register(&root);
        root.set_config_source(ArgsSource::new(["+set_type_override=demo_test,long_test"]));

        let summary = root.run_test("demo_test").await.unwrap();

        assert_eq!(summary.test_type, "long_test");
        assert_eq!(traffic.sent(), 20);
        assert!(summary.passed());
    }
}
