// Index storage and schema

pub mod db;
pub mod federation;
pub mod schema;

use serde::{Deserialize, Serialize};

pub use db::IndexDatabase;
pub use federation::FederatedIndex;

/// One symbol occurrence as returned by queries.
///
/// Field names are stable: formatting code and JSON consumers rely on them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occurrence {
    pub symbol: String,
    pub scope: String,
    pub package: String,
    pub row: u32,
    pub col: u32,
    pub file: String,
}

impl Occurrence {
    /// Sort key shared by every query path: symbol, then file, then row
    pub fn order_key(&self) -> (&str, &str, u32) {
        (&self.symbol, &self.file, self.row)
    }
}

/// A tracked source file and its last observed modification time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub path: String,
    pub timestamp: f64,
}

/// How `update_file_time` decides that a file needs re-extraction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StalenessPolicy {
    /// Reindex only when the on-disk time is later than the stored one
    #[default]
    Newer,
    /// Reindex whenever the on-disk time differs from the stored one
    Changed,
}

impl StalenessPolicy {
    pub fn is_stale(self, stored: f64, observed: f64) -> bool {
        match self {
            StalenessPolicy::Newer => stored < observed,
            StalenessPolicy::Changed => stored != observed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StalenessPolicy::Newer => "newer",
            StalenessPolicy::Changed => "changed",
        }
    }
}

/// Index statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    pub total_files: usize,
    pub total_symbols: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staleness_policies() {
        assert!(StalenessPolicy::Newer.is_stale(1.0, 2.0));
        assert!(!StalenessPolicy::Newer.is_stale(2.0, 1.0));
        assert!(!StalenessPolicy::Newer.is_stale(2.0, 2.0));

        assert!(StalenessPolicy::Changed.is_stale(1.0, 2.0));
        assert!(StalenessPolicy::Changed.is_stale(2.0, 1.0));
        assert!(!StalenessPolicy::Changed.is_stale(2.0, 2.0));
    }

    #[test]
    fn test_policy_from_toml() {
        #[derive(Deserialize)]
        struct Wrapper {
            policy: StalenessPolicy,
        }

        let w: Wrapper = toml::from_str("policy = \"changed\"").unwrap();
        assert_eq!(w.policy, StalenessPolicy::Changed);
        assert_eq!(StalenessPolicy::default().as_str(), "newer");
    }
}
