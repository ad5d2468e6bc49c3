#![deny(clippy::print_stdout, clippy::print_stderr)]

//! Orchestrator (§4.8): wires auth, report driving, pagination, and the
//! throttle controller into the top-level per-day crawl, and owns the
//! `AUTH_BLOCKED` restart loop and the debug-artifact capture contract.

mod artifacts;
mod error;
mod orchestrator;
mod summary;

pub use artifacts::ArtifactWriter;
pub use error::CoreError;
pub use error::CoreResult;
pub use orchestrator::Orchestrator;
pub use summary::RunSummary;
