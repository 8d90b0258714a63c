//! Reporting for the Phasekit framework.
//!
//! Every `report_*` call in the engine and the factory becomes a
//! [`ReportMessage`] handed to a [`ReportServer`]. The server filters
//! informational reports by verbosity, counts every delivered report by
//! severity and by id, and forwards it to an injected [`ReportSink`]. It
//! never decides to stop the run itself; the engine polls the counts at
//! its synchronization points.
//!
//! # Modules
//!
//! - [`server`] -- [`ReportServer`] and [`ReportSummary`]
//! - [`sink`] -- The [`ReportSink`] contract plus [`TracingSink`] and
//!   [`MemorySink`]
//!
//! [`ReportMessage`]: phasekit_types::ReportMessage

pub mod server;
pub mod sink;

pub use server::{ReportServer, ReportSummary};
pub use sink::{MemorySink, ReportSink, TracingSink};
