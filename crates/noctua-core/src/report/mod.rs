//! Structured reports exchanged with the model: the recon site analysis
//! and the scraper test outcome, each in a strict wire form and an
//! idiomatic internal form.

pub mod adapters;
pub mod recon;
pub mod test_report;

pub use recon::{recon_report_schema, ReconReport, ReconReportWire};
pub use test_report::{test_report_schema, TestReport, TestReportWire, TIMEOUT_EXIT_CODE};
