// Code indexing, incremental updates and file watching

pub mod extractor;
pub mod paths;
pub mod queue;
pub mod watcher;

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::Serialize;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::Config;
use crate::error::{IndexError, Result};
use crate::index::{FederatedIndex, Occurrence};
use extractor::Extractor;

/// Outcome of looking at one file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    /// Timestamp matched the index; nothing was written
    Unchanged,
    /// Occurrences were cleared and extracted again
    Reindexed { symbols: usize },
}

/// Summary of a directory walk
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WalkReport {
    pub visited: usize,
    pub reindexed: usize,
    pub unchanged: usize,
    pub failed: usize,
    pub pruned: usize,
    pub symbols: usize,
    /// Transactions committed, including the final one
    pub commits: usize,
}

/// Query result plus whether it fell back to the full listing
#[derive(Debug, Clone)]
pub struct QueryOutcome {
    pub occurrences: Vec<Occurrence>,
    pub fallback: bool,
}

/// Drives the extractor over files and stores results in the federation
pub struct Indexer {
    index: FederatedIndex,
    extractor: Extractor,
    config: Config,
    include: Option<Regex>,
}

impl Indexer {
    pub fn new(index: FederatedIndex, config: Config) -> Result<Self> {
        let include = config.include_regex()?;
        let extractor = Extractor::new(config.extractor.options());

        Ok(Self {
            index,
            extractor,
            config,
            include,
        })
    }

    /// Open the first path as the writable index and the rest read-only
    pub fn open<P: AsRef<Path>>(paths: &[P], config: Config) -> Result<Self> {
        let index = FederatedIndex::open(paths, config.staleness.policy)?;
        Self::new(index, config)
    }

    /// Switch to a different set of index files
    pub fn set_db<P: AsRef<Path>>(&mut self, paths: &[P]) -> Result<()> {
        self.index.commit()?;
        self.index = FederatedIndex::open(paths, self.config.staleness.policy)?;
        Ok(())
    }

    pub fn index(&self) -> &FederatedIndex {
        &self.index
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Index one file if it is stale or `force` is set, then commit.
    ///
    /// Returns whether the file was (re)extracted.
    pub fn process_file(&self, path: &Path, force: bool) -> Result<bool> {
        let key = paths::normalize_path(path);
        let outcome = self.index_key(&key, force);
        self.index.commit()?;

        match outcome? {
            FileState::Unchanged => Ok(false),
            FileState::Reindexed { symbols } => {
                info!("Indexed {}: {} symbols", key, symbols);
                Ok(true)
            }
        }
    }

    /// Forget one file and commit
    pub fn remove_file(&self, path: &Path) -> Result<bool> {
        let key = paths::normalize_path(path);
        let removed = self.index.remove_file(&key)?;
        self.index.commit()?;
        Ok(removed)
    }

    fn index_key(&self, key: &str, force: bool) -> Result<FileState> {
        let file = Path::new(key);
        let mtime = paths::modified_time(file)?;
        if !file.is_file() {
            return Err(IndexError::io(
                file,
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a regular file"),
            ));
        }

        if !self.index.update_file_time(key, mtime)? && !force {
            debug!("Unchanged: {}", key);
            return Ok(FileState::Unchanged);
        }

        // An unreadable file keeps no record, so the next pass retries it
        let source = match std::fs::read_to_string(file) {
            Ok(source) => source,
            Err(e) => {
                self.index.remove_file(key)?;
                return Err(IndexError::io(file, e));
            }
        };

        // Stale occurrences go first so a failed parse leaves nothing behind
        self.index.clear_file(key)?;

        let tree = extractor::parse(&source, key)?;
        if self.config.extractor.skip_files_with_errors && tree.root_node().has_error() {
            return Err(IndexError::Parse {
                path: key.to_string(),
            });
        }

        let package = paths::package_for(
            file,
            &self.config.index.package_marker,
            self.config.index.package_includes_module,
        );

        let mut count = 0;
        for symbol in self.extractor.symbols(&tree, &source) {
            self.index
                .add(&symbol.name, &symbol.scope, &package, key, symbol.row, symbol.col)?;
            count += 1;
        }

        debug!("Reindexed {}: {} symbols (package '{}')", key, count, package);
        Ok(FileState::Reindexed { symbols: count })
    }

    /// Whether a file passes the extension and include filters
    pub fn should_index(&self, path: &Path) -> bool {
        if !self.config.has_source_extension(path) {
            return false;
        }
        match &self.include {
            Some(include) => include.is_match(&paths::normalize_path(path)),
            None => true,
        }
    }

    /// Source files under `roots`, with excluded directories pruned
    fn source_files<P: AsRef<Path>>(&self, roots: &[P]) -> Vec<PathBuf> {
        let mut files = Vec::new();

        for root in roots {
            let walker = WalkDir::new(root).into_iter().filter_entry(|entry| {
                !(entry.depth() > 0
                    && entry.file_type().is_dir()
                    && self
                        .config
                        .is_excluded_dir(&entry.file_name().to_string_lossy()))
            });

            for entry in walker {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        warn!("Skipping unreadable entry: {}", e);
                        continue;
                    }
                };
                if entry.file_type().is_file() && self.should_index(entry.path()) {
                    files.push(entry.into_path());
                }
            }
        }

        files
    }

    /// Walk `roots`, reindex stale files and prune files no longer present.
    ///
    /// Per-file read and parse failures are logged and counted; storage
    /// errors abort the walk.
    pub fn walk<P: AsRef<Path>>(&self, roots: &[P], rebuild: bool) -> Result<WalkReport> {
        let mut report = WalkReport::default();
        let mut visited = HashSet::new();
        let mut pending = 0;

        let files = self.source_files(roots);
        report.visited = files.len();

        for file in files {
            let key = paths::normalize_path(&file);
            visited.insert(key.clone());

            match self.index_key(&key, rebuild) {
                Ok(FileState::Unchanged) => report.unchanged += 1,
                Ok(FileState::Reindexed { symbols }) => {
                    report.reindexed += 1;
                    report.symbols += symbols;
                    pending += 1;
                }
                Err(e) if e.is_recoverable() => {
                    warn!("Skipping {}: {}", key, e);
                    report.failed += 1;
                }
                Err(e) => return Err(e),
            }

            if pending >= self.config.index.batch_size {
                self.index.commit()?;
                report.commits += 1;
                pending = 0;
            }
        }

        report.pruned = self.index.remove_other_files(&visited)?;
        self.index.commit()?;
        report.commits += 1;

        info!(
            "Walk complete: {} files, {} reindexed, {} unchanged, {} failed, {} pruned",
            report.visited, report.reindexed, report.unchanged, report.failed, report.pruned
        );

        Ok(report)
    }

    pub fn query_occurrences(
        &self,
        symbol: &str,
        scope: &str,
        package: &str,
    ) -> Result<Vec<Occurrence>> {
        self.index.occurrences(symbol, scope, package)
    }

    pub fn query_all(&self) -> Result<Vec<Occurrence>> {
        self.index.all()
    }

    /// Exact query, degrading to every symbol when nothing matches
    pub fn query_or_all(&self, symbol: &str, scope: &str, package: &str) -> Result<QueryOutcome> {
        let occurrences = self.query_occurrences(symbol, scope, package)?;
        if !occurrences.is_empty() {
            return Ok(QueryOutcome {
                occurrences,
                fallback: false,
            });
        }

        debug!("No match for '{}', listing all symbols", symbol);
        Ok(QueryOutcome {
            occurrences: self.query_all()?,
            fallback: true,
        })
    }
}
