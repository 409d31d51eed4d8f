//! Seeding the queue.

use console::style;

use crate::config::Settings;
use crate::discovery::Seeder;

use super::super::runtime::Runtime;

pub async fn cmd_seed(
    settings: Settings,
    targets: &[String],
    search: Option<&str>,
    limit: usize,
    lookup: bool,
) -> anyhow::Result<()> {
    let runtime = Runtime::new(settings)?;
    let seeder = Seeder::new(runtime.queue.clone(), runtime.platform.clone());

    let report = match search {
        Some(query) => {
            seeder
                .seed_search(query, &runtime.settings.discovery.filter, limit)
                .await?
        }
        None => {
            if targets.is_empty() {
                anyhow::bail!("give target names or --search <query>");
            }
            seeder.seed_names(targets, lookup).await?
        }
    };

    println!(
        "{} {} added, {} already known, {} rejected",
        style("✓").green(),
        report.inserted,
        report.already_known,
        report.rejected
    );
    Ok(())
}
