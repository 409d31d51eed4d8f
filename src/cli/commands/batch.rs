//! One-shot processing of named targets.

use std::sync::Arc;

use console::style;

use crate::config::Settings;
use crate::services::orchestrator::Orchestrator;

use super::super::runtime::Runtime;

pub async fn cmd_batch(settings: Settings, targets: &[String]) -> anyhow::Result<()> {
    let runtime = Runtime::new(settings)?;
    let orchestrator = Orchestrator::new(
        runtime.discovery_engine(),
        runtime.queue.clone(),
        runtime.settings.orchestrator.clone(),
    )
    .with_egress(Arc::clone(&runtime.egress));

    let batch = orchestrator.run_batch(targets).await?;

    for name in &batch.skipped {
        println!("{} r/{} is not pending, skipped", style("→").yellow(), name);
    }
    let s = batch.summary;
    println!(
        "{} {} completed, {} failed, {} deferred, {} new targets",
        style("✓").green(),
        s.completed,
        s.failed,
        s.deferred,
        s.discovered
    );
    Ok(())
}
