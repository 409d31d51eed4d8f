//! Continuous frontier expansion.

use std::sync::Arc;

use console::style;
use tokio::sync::mpsc;

use crate::config::Settings;
use crate::repository::QueueStore;
use crate::services::orchestrator::{Orchestrator, WorkerEvent};

use super::super::helpers::{format_number, spinner};
use super::super::runtime::{shutdown_on_ctrl_c, Runtime};

pub async fn cmd_run(settings: Settings) -> anyhow::Result<()> {
    let runtime = Runtime::new(settings)?;
    let config = runtime.settings.orchestrator.clone();

    let stats = runtime.queue.stats().await?;
    if stats.total == 0 {
        println!(
            "{} Queue is empty. Add targets with {}",
            style("!").yellow(),
            style("frontier seed <names>").cyan()
        );
        return Ok(());
    }

    println!(
        "{} Crawling with {} workers ({} pending, min audience {})",
        style("→").cyan(),
        config.workers,
        format_number(stats.pending),
        runtime.settings.discovery.filter.min_audience
    );

    let (tx, mut rx) = mpsc::channel::<WorkerEvent>(256);
    let orchestrator = Orchestrator::new(runtime.discovery_engine(), runtime.queue.clone(), config)
        .with_egress(Arc::clone(&runtime.egress))
        .with_events(tx);

    let pb = spinner("Starting workers...");
    let display = {
        let pb = pb.clone();
        tokio::spawn(async move {
            let (mut done, mut failed, mut found) = (0usize, 0usize, 0usize);
            while let Some(event) = rx.recv().await {
                match event {
                    WorkerEvent::Started { target, .. } => {
                        pb.set_message(format!(
                            "r/{} | {} done, {} failed, {} discovered",
                            target, done, failed, found
                        ));
                        continue;
                    }
                    WorkerEvent::Completed { discovered, .. } => {
                        done += 1;
                        found += discovered;
                    }
                    WorkerEvent::Failed { target, error, .. } => {
                        failed += 1;
                        pb.println(format!("{} r/{}: {}", style("✗").red(), target, error));
                    }
                    WorkerEvent::Deferred { target, .. } => {
                        pb.println(format!("{} r/{} deferred", style("…").yellow(), target));
                    }
                    WorkerEvent::Idle { .. } => {
                        pb.set_message(format!(
                            "Queue idle | {} done, {} failed, {} discovered",
                            done, failed, found
                        ));
                        continue;
                    }
                    WorkerEvent::Recovered { count } => {
                        pb.println(format!("{} Recovered {} stale targets", style("↺").yellow(), count));
                    }
                    WorkerEvent::Rotated { egress } => {
                        pb.println(format!("{} Rotated egress ({})", style("↻").cyan(), egress));
                    }
                }
                pb.set_message(format!(
                    "{} done, {} failed, {} discovered",
                    done, failed, found
                ));
            }
        })
    };

    let shutdown = shutdown_on_ctrl_c();
    let summary = orchestrator.run(shutdown).await?;
    drop(orchestrator);
    let _ = display.await;
    pb.finish_and_clear();

    println!(
        "{} {} completed, {} failed, {} deferred, {} new targets, {} authors, {} posts saved",
        style("✓").green(),
        summary.completed,
        summary.failed,
        summary.deferred,
        summary.discovered,
        summary.authors,
        summary.posts_saved
    );
    Ok(())
}
