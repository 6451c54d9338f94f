// Error taxonomy for the index and indexer layers

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, IndexError>;

#[derive(Debug, Error)]
pub enum IndexError {
    /// Source text could not be parsed into a usable tree
    #[error("failed to parse {path}")]
    Parse { path: String },

    /// A source file could not be read or stat'ed
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An occurrence was added before its file record existed
    #[error("no file record for {path}; update_file_time must run before add")]
    MissingFileRecord { path: String },

    /// A database lacks the tables or columns symdb expects
    #[error("incompatible index at {}: {reason}", path.display())]
    SchemaMismatch { path: PathBuf, reason: String },

    #[error("attempted to write to a read-only index")]
    ReadOnly,

    #[error("invalid include pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),
}

impl IndexError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Per-file failures that a crawl should log and skip
    pub fn is_recoverable(&self) -> bool {
        matches!(self, IndexError::Parse { .. } | IndexError::Io { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_classification() {
        let parse = IndexError::Parse {
            path: "a.py".to_string(),
        };
        assert!(parse.is_recoverable());

        let io = IndexError::io(
            "missing.py",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(io.is_recoverable());
        assert!(io.to_string().contains("missing.py"));

        let missing = IndexError::MissingFileRecord {
            path: "a.py".to_string(),
        };
        assert!(!missing.is_recoverable());
        assert!(!IndexError::ReadOnly.is_recoverable());
    }
}
