//! Plotting and HTML reporting for search results.
pub mod plots;
pub mod report;
pub mod summary;

pub use report::{Report, ReportSection};
pub use summary::build_fit_report;
