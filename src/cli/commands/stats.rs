//! Queue and record counts.

use console::style;
use serde_json::json;

use crate::config::Settings;
use crate::repository::{QueueStore, RecordStore};

use super::super::helpers::format_number;
use super::super::runtime::Runtime;

pub async fn cmd_stats(settings: Settings, as_json: bool) -> anyhow::Result<()> {
    let runtime = Runtime::new(settings)?;
    let queue = runtime.queue.stats().await?;
    let records = runtime.records.record_stats().await?;

    if as_json {
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({ "queue": queue, "records": records }))?
        );
        return Ok(());
    }

    println!("\n{}", style("Queue").bold());
    println!("{}", "-".repeat(40));
    println!("{:<14} {}", "Pending:", style(format_number(queue.pending)).yellow());
    println!("{:<14} {}", "Processing:", style(format_number(queue.processing)).cyan());
    println!("{:<14} {}", "Completed:", style(format_number(queue.completed)).green());
    println!("{:<14} {}", "Failed:", style(format_number(queue.failed)).red());
    println!("{:<14} {}", "Total:", format_number(queue.total));

    println!("\n{}", style("Records").bold());
    println!("{}", "-".repeat(40));
    println!("{:<14} {}", "Scraped:", format_number(records.records));
    println!("{:<14} {}", "Complete:", style(format_number(records.complete)).green());
    println!("{:<14} {}", "Partial:", style(format_number(records.partial)).yellow());
    println!("{:<14} {}", "Failed:", style(format_number(records.failed)).red());
    println!("{:<14} {}", "Authors:", format_number(records.authors));
    println!("{:<14} {}", "Posts:", format_number(records.posts));
    Ok(())
}
