// Single-worker job queue for background indexing

use std::path::PathBuf;

use anyhow::{anyhow, Result};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::Indexer;

/// Work the background indexer can be asked to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexJob {
    /// Reindex one file if stale (or always, with `force`)
    File { path: PathBuf, force: bool },
    /// Full walk over `roots`, pruning files that disappeared
    Walk { roots: Vec<PathBuf>, rebuild: bool },
    /// Forget one file
    Remove { path: PathBuf },
}

/// Cloneable handle for submitting jobs
#[derive(Clone)]
pub struct JobSender {
    tx: mpsc::UnboundedSender<IndexJob>,
}

impl JobSender {
    #[cfg(test)]
    pub(crate) fn from_channel(tx: mpsc::UnboundedSender<IndexJob>) -> Self {
        Self { tx }
    }

    pub fn submit(&self, job: IndexJob) -> Result<()> {
        debug!("Queueing {:?}", job);
        self.tx
            .send(job)
            .map_err(|_| anyhow!("index worker has stopped"))
    }
}

/// Runs submitted jobs one at a time, in submission order, on a dedicated
/// blocking thread that owns the indexer.
pub struct IndexQueue {
    sender: JobSender,
    worker: JoinHandle<Indexer>,
}

impl IndexQueue {
    /// Start the worker. Must be called from within a tokio runtime.
    pub fn start(indexer: Indexer) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<IndexJob>();

        let worker = tokio::task::spawn_blocking(move || {
            info!("Index worker started");
            while let Some(job) = rx.blocking_recv() {
                run_job(&indexer, job);
            }
            info!("Index worker stopped");
            indexer
        });

        Self {
            sender: JobSender { tx },
            worker,
        }
    }

    pub fn sender(&self) -> JobSender {
        self.sender.clone()
    }

    /// Stop accepting jobs, wait for queued ones and hand the indexer back.
    ///
    /// Outstanding `JobSender` clones keep the worker alive until dropped.
    pub async fn shutdown(self) -> Result<Indexer> {
        drop(self.sender);
        self.worker
            .await
            .map_err(|e| anyhow!("index worker panicked: {}", e))
    }
}

fn run_job(indexer: &Indexer, job: IndexJob) {
    match job {
        IndexJob::File { path, force } => match indexer.process_file(&path, force) {
            Ok(true) => debug!("Reindexed {}", path.display()),
            Ok(false) => debug!("Unchanged {}", path.display()),
            Err(e) if e.is_recoverable() => warn!("Skipping {}: {}", path.display(), e),
            Err(e) => error!("Failed to index {}: {}", path.display(), e),
        },
        IndexJob::Walk { roots, rebuild } => {
            if let Err(e) = indexer.walk(&roots, rebuild) {
                error!("Walk failed: {}", e);
            }
        }
        IndexJob::Remove { path } => match indexer.remove_file(&path) {
            Ok(true) => info!("Removed {} from index", path.display()),
            Ok(false) => debug!("{} was not indexed", path.display()),
            Err(e) => error!("Failed to remove {}: {}", path.display(), e),
        },
    }
}
