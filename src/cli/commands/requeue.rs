//! Retrying failed targets.

use console::style;

use crate::config::Settings;
use crate::repository::QueueStore;

use super::super::runtime::Runtime;

pub async fn cmd_requeue(settings: Settings, limit: usize) -> anyhow::Result<()> {
    let runtime = Runtime::new(settings)?;
    let limit = if limit == 0 { usize::MAX } else { limit };
    let count = runtime.queue.requeue_failed(limit).await?;
    println!("{} {} failed targets moved back to pending", style("✓").green(), count);
    Ok(())
}
