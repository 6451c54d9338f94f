use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::config::Config;
use crate::indexer::queue::IndexQueue;
use crate::indexer::watcher::FileWatcher;
use crate::indexer::WalkReport;

pub async fn index_project(
    project: &Path,
    mut config: Config,
    roots: Vec<PathBuf>,
    db: Option<String>,
    rebuild: bool,
    include: Option<String>,
    watch: bool,
) -> Result<()> {
    if include.is_some() {
        config.index.include = include;
    }

    let roots = if roots.is_empty() {
        vec![project.to_path_buf()]
    } else {
        roots
    };

    let dbs: Vec<String> = db.into_iter().collect();
    let indexer = super::open_indexer(project, &config, &dbs)?;
    let db_path = indexer.index().primary().path().to_path_buf();

    println!("Database: {}", db_path.display());
    for root in &roots {
        println!("Root: {}", root.display());
    }

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?,
    );
    spinner.set_message(if rebuild {
        "Rebuilding index..."
    } else {
        "Indexing..."
    });
    spinner.enable_steady_tick(Duration::from_millis(100));

    let report = indexer.walk(&roots, rebuild);
    spinner.finish_and_clear();
    let report = report?;

    print_report(&report);

    if !watch {
        return Ok(());
    }

    println!("\nWatching for changes. Press Ctrl+C to stop.");
    let watch_config = indexer.config().clone();
    let queue = IndexQueue::start(indexer);

    let mut watchers = JoinSet::new();
    for root in roots {
        let watcher = FileWatcher::new(queue.sender(), root, watch_config.clone())?;
        watchers.spawn(async move { watcher.watch().await });
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, stopping watchers");
                break;
            }
            joined = watchers.join_next() => match joined {
                Some(Ok(Ok(()))) => continue,
                Some(Ok(Err(e))) => warn!("Watcher stopped: {}", e),
                Some(Err(e)) => warn!("Watcher task failed: {}", e),
                None => break,
            }
        }
    }

    // Watchers hold job senders; the worker only drains once they are gone
    watchers.shutdown().await;
    queue.shutdown().await?;
    println!("Index saved to {}", db_path.display());

    Ok(())
}

fn print_report(report: &WalkReport) {
    println!("\nIndexing complete!");
    println!("  Files visited: {}", report.visited);
    println!("  Reindexed: {}", report.reindexed);
    println!("  Unchanged: {}", report.unchanged);
    if report.failed > 0 {
        println!("  Failed: {}", report.failed);
    }
    if report.pruned > 0 {
        println!("  Pruned: {}", report.pruned);
    }
    println!("  Symbols written: {}", report.symbols);
    println!("  Commits: {}", report.commits);
}
