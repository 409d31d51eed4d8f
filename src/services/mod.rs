//! Long-running services built on the stores and clients.
//!
//! The orchestrator expands the frontier; the intel scraper renders metrics
//! for targets the orchestrator has completed.

pub mod intel;
pub mod orchestrator;

pub use intel::{IntelConfig, IntelSummary, MetricsScraper};
pub use orchestrator::{Orchestrator, OrchestratorConfig, RunSummary, WorkerEvent};
