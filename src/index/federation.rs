// One writable index plus any number of read-only ones, queried as a union

use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};

use tracing::info;

use super::{IndexDatabase, IndexStats, Occurrence, StalenessPolicy};
use crate::error::Result;

/// A federation of index files.
///
/// Writes go to the primary only. Reads run against the primary and every
/// secondary, and the merged result is ordered by (symbol, file, row).
#[derive(Debug)]
pub struct FederatedIndex {
    primary: IndexDatabase,
    secondaries: Vec<IndexDatabase>,
}

impl FederatedIndex {
    /// Open `paths[0]` as the writable primary and attach the rest read-only.
    ///
    /// A secondary that is missing or has an incompatible schema fails the
    /// whole call.
    pub fn open<P: AsRef<Path>>(paths: &[P], policy: StalenessPolicy) -> Result<Self> {
        let (first, rest) = match paths.split_first() {
            Some(split) => split,
            None => {
                return Err(crate::error::IndexError::SchemaMismatch {
                    path: PathBuf::new(),
                    reason: "no primary index path given".to_string(),
                })
            }
        };

        let primary = IndexDatabase::open(first, policy)?;
        let secondaries = rest
            .iter()
            .map(IndexDatabase::open_read_only)
            .collect::<Result<Vec<_>>>()?;

        info!(
            "Index federation ready: primary {} + {} secondary",
            primary.path().display(),
            secondaries.len()
        );

        Ok(Self {
            primary,
            secondaries,
        })
    }

    /// The writable index
    pub fn primary(&self) -> &IndexDatabase {
        &self.primary
    }

    pub fn secondaries(&self) -> &[IndexDatabase] {
        &self.secondaries
    }

    fn members(&self) -> impl Iterator<Item = &IndexDatabase> {
        std::iter::once(&self.primary).chain(self.secondaries.iter())
    }

    fn merged<F>(&self, mut query: F) -> Result<Vec<Occurrence>>
    where
        F: FnMut(&IndexDatabase) -> Result<Vec<Occurrence>>,
    {
        let mut results = Vec::new();
        for db in self.members() {
            results.extend(query(db)?);
        }
        // Stable: equal keys keep primary-first order
        results.sort_by(|a, b| a.order_key().cmp(&b.order_key()));
        Ok(results)
    }

    pub fn occurrences(&self, symbol: &str, scope: &str, package: &str) -> Result<Vec<Occurrence>> {
        self.merged(|db| db.occurrences(symbol, scope, package))
    }

    pub fn all(&self) -> Result<Vec<Occurrence>> {
        self.merged(IndexDatabase::all)
    }

    pub fn indexed_files(&self) -> Result<BTreeSet<String>> {
        let mut files = BTreeSet::new();
        for db in self.members() {
            files.extend(db.indexed_files()?);
        }
        Ok(files)
    }

    pub fn add(
        &self,
        symbol: &str,
        scope: &str,
        package: &str,
        path: &str,
        row: u32,
        col: u32,
    ) -> Result<()> {
        self.primary.add(symbol, scope, package, path, row, col)
    }

    pub fn clear_file(&self, path: &str) -> Result<usize> {
        self.primary.clear_file(path)
    }

    pub fn update_file_time(&self, path: &str, time: f64) -> Result<bool> {
        self.primary.update_file_time(path, time)
    }

    pub fn remove_file(&self, path: &str) -> Result<bool> {
        self.primary.remove_file(path)
    }

    pub fn remove_other_files(&self, keep: &HashSet<String>) -> Result<usize> {
        self.primary.remove_other_files(keep)
    }

    pub fn commit(&self) -> Result<()> {
        self.primary.commit()
    }

    /// Per-member statistics, labelled by index path
    pub fn stats(&self) -> Result<Vec<(PathBuf, IndexStats)>> {
        self.members()
            .map(|db| Ok((db.path().to_path_buf(), db.get_stats()?)))
            .collect()
    }
}
