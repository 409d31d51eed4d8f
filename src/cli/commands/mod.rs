//! Subcommand implementations.

mod batch;
mod intel;
mod requeue;
mod run;
mod seed;
mod stats;

pub use batch::cmd_batch;
pub use intel::cmd_intel;
pub use requeue::cmd_requeue;
pub use run::cmd_run;
pub use seed::cmd_seed;
pub use stats::cmd_stats;
