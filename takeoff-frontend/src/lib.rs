pub mod errors;
pub mod loader;
pub mod report;

pub use errors::FrontendError;
pub use loader::{TakeoffReport, TakeoffRequest, run_request, run_request_with};
pub use report::{ReportFormat, render, render_json, render_table};
