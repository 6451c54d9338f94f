use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};
use tracing::{debug, info};

use super::schema::{init_schema, verify_schema};
use super::{FileRecord, IndexStats, Occurrence, StalenessPolicy};
use crate::error::{IndexError, Result};

/// Type alias for connection pool
pub type ConnectionPool = Pool<SqliteConnectionManager>;

const OCCURRENCE_COLUMNS: &str = "s.symbol, s.scope, s.package, s.\"row\", s.col, f.path";

/// One index file on disk.
///
/// A writable handle keeps a single pooled connection so that a batch of
/// writes stays inside one transaction until `commit` is called.
#[derive(Debug, Clone)]
pub struct IndexDatabase {
    pool: ConnectionPool,
    db_path: PathBuf,
    read_only: bool,
    policy: StalenessPolicy,
}

impl IndexDatabase {
    /// Create or open a writable database
    pub fn open(db_path: impl AsRef<Path>, policy: StalenessPolicy) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();

        info!("Opening index at: {}", db_path.display());

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| IndexError::io(parent, e))?;
            }
        }

        let manager = SqliteConnectionManager::file(&db_path)
            .with_init(|conn| conn.execute_batch("PRAGMA foreign_keys = ON;"));

        // A single connection: pending transactions must survive between calls
        let pool = Pool::builder()
            .max_size(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .build(manager)?;

        {
            let conn = pool.get()?;
            init_schema(&conn)?;
        }

        Ok(Self {
            pool,
            db_path,
            read_only: false,
            policy,
        })
    }

    /// Open an existing database for reading only.
    ///
    /// Fails immediately if the file is missing or its schema is not a
    /// symdb index.
    pub fn open_read_only(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();

        info!("Attaching read-only index: {}", db_path.display());

        if !db_path.is_file() {
            return Err(IndexError::io(
                &db_path,
                std::io::Error::new(std::io::ErrorKind::NotFound, "index file not found"),
            ));
        }

        let flags = OpenFlags::SQLITE_OPEN_READ_ONLY
            | OpenFlags::SQLITE_OPEN_NO_MUTEX
            | OpenFlags::SQLITE_OPEN_URI;

        {
            let conn = Connection::open_with_flags(&db_path, flags)?;
            verify_schema(&conn, &db_path)?;
        }

        let manager = SqliteConnectionManager::file(&db_path).with_flags(flags);
        let pool = Pool::builder().max_size(4).build(manager)?;

        Ok(Self {
            pool,
            db_path,
            read_only: true,
            policy: StalenessPolicy::default(),
        })
    }

    /// Get a connection from the pool
    pub fn get_conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn policy(&self) -> StalenessPolicy {
        self.policy
    }

    /// Connection for a write, opening the batch transaction if needed
    fn writer(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        if self.is_read_only() {
            return Err(IndexError::ReadOnly);
        }
        let conn = self.get_conn()?;
        if conn.is_autocommit() {
            conn.execute_batch("BEGIN")?;
        }
        Ok(conn)
    }

    /// Insert one occurrence. The file record must already exist.
    pub fn add(
        &self,
        symbol: &str,
        scope: &str,
        package: &str,
        path: &str,
        row: u32,
        col: u32,
    ) -> Result<()> {
        let conn = self.writer()?;

        let inserted = conn
            .prepare_cached(
                "INSERT INTO symbols (file_id, symbol, scope, package, \"row\", col)
                 SELECT id, ?1, ?2, ?3, ?5, ?6 FROM files WHERE path = ?4",
            )?
            .execute(params![symbol, scope, package, path, row, col])?;

        if inserted == 0 {
            return Err(IndexError::MissingFileRecord {
                path: path.to_string(),
            });
        }

        Ok(())
    }

    /// Delete every occurrence of a file, keeping its file record
    pub fn clear_file(&self, path: &str) -> Result<usize> {
        let conn = self.writer()?;
        let removed = conn.execute(
            "DELETE FROM symbols WHERE file_id = (SELECT id FROM files WHERE path = ?1)",
            [path],
        )?;
        debug!("Cleared {} occurrences of {}", removed, path);
        Ok(removed)
    }

    /// Record the observed modification time of a file.
    ///
    /// Returns true when the file is new or stale under the configured
    /// policy, i.e. when it must be (re)extracted.
    pub fn update_file_time(&self, path: &str, time: f64) -> Result<bool> {
        let conn = self.writer()?;

        let stored: Option<f64> = conn
            .query_row("SELECT timestamp FROM files WHERE path = ?1", [path], |row| {
                row.get(0)
            })
            .optional()?;

        match stored {
            None => {
                conn.execute(
                    "INSERT INTO files (path, timestamp) VALUES (?1, ?2)",
                    params![path, time],
                )?;
                Ok(true)
            }
            Some(stored) if self.policy.is_stale(stored, time) => {
                conn.execute(
                    "UPDATE files SET timestamp = ?2 WHERE path = ?1",
                    params![path, time],
                )?;
                Ok(true)
            }
            Some(_) => Ok(false),
        }
    }

    /// Drop a file record and, by cascade, its occurrences
    pub fn remove_file(&self, path: &str) -> Result<bool> {
        let conn = self.writer()?;
        let removed = conn.execute("DELETE FROM files WHERE path = ?1", [path])?;
        Ok(removed > 0)
    }

    /// Drop every file not listed in `keep`. Returns the number removed.
    pub fn remove_other_files(&self, keep: &HashSet<String>) -> Result<usize> {
        let conn = self.writer()?;

        let paths = {
            let mut stmt = conn.prepare("SELECT path FROM files")?;
            let rows = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };

        let mut removed = 0;
        let mut delete = conn.prepare_cached("DELETE FROM files WHERE path = ?1")?;
        for path in paths.iter().filter(|p| !keep.contains(*p)) {
            debug!("Pruning {}", path);
            removed += delete.execute([path])?;
        }

        Ok(removed)
    }

    /// Make pending writes durable
    pub fn commit(&self) -> Result<()> {
        if self.is_read_only() {
            return Ok(());
        }
        let conn = self.get_conn()?;
        if !conn.is_autocommit() {
            conn.execute_batch("COMMIT")?;
        }
        Ok(())
    }

    /// Exact symbol match, glob match on scope and package
    pub fn occurrences(&self, symbol: &str, scope: &str, package: &str) -> Result<Vec<Occurrence>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {OCCURRENCE_COLUMNS}
             FROM symbols s JOIN files f ON s.file_id = f.id
             WHERE s.symbol = ?1 AND s.scope GLOB ?2 AND s.package GLOB ?3
             ORDER BY s.symbol, f.path, s.\"row\""
        ))?;

        let found = stmt
            .query_map([symbol, scope, package], row_to_occurrence)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(found)
    }

    /// Every occurrence, in query order
    pub fn all(&self) -> Result<Vec<Occurrence>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {OCCURRENCE_COLUMNS}
             FROM symbols s JOIN files f ON s.file_id = f.id
             ORDER BY s.symbol, f.path, s.\"row\""
        ))?;

        let found = stmt
            .query_map([], row_to_occurrence)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(found)
    }

    /// Paths with at least one occurrence
    pub fn indexed_files(&self) -> Result<BTreeSet<String>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(
            "SELECT DISTINCT f.path FROM files f JOIN symbols s ON s.file_id = f.id",
        )?;

        let paths = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<BTreeSet<_>>>()?;

        Ok(paths)
    }

    pub fn file_records(&self) -> Result<Vec<FileRecord>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare("SELECT path, timestamp FROM files ORDER BY path")?;
        let records = stmt
            .query_map([], |row| {
                Ok(FileRecord {
                    path: row.get(0)?,
                    timestamp: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(records)
    }

    /// Get index statistics
    pub fn get_stats(&self) -> Result<IndexStats> {
        let conn = self.get_conn()?;

        let total_files: i64 = conn.query_row("SELECT COUNT(*) FROM files", [], |row| row.get(0))?;
        let total_symbols: i64 =
            conn.query_row("SELECT COUNT(*) FROM symbols", [], |row| row.get(0))?;

        Ok(IndexStats {
            total_files: total_files as usize,
            total_symbols: total_symbols as usize,
        })
    }
}

/// Convert database row to Occurrence
fn row_to_occurrence(row: &Row) -> rusqlite::Result<Occurrence> {
    Ok(Occurrence {
        symbol: row.get(0)?,
        scope: row.get(1)?,
        package: row.get(2)?,
        row: row.get(3)?,
        col: row.get(4)?,
        file: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn open(dir: &Path) -> IndexDatabase {
        IndexDatabase::open(dir.join("test.db"), StalenessPolicy::Newer).unwrap()
    }

    fn stored_time(db: &IndexDatabase, path: &str) -> Option<f64> {
        db.file_records()
            .unwrap()
            .into_iter()
            .find(|r| r.path == path)
            .map(|r| r.timestamp)
    }

    fn keep(paths: &[&str]) -> HashSet<String> {
        paths.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn test_create_database() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("nested").join("test.db");

        let db = IndexDatabase::open(&db_path, StalenessPolicy::Newer).unwrap();
        assert!(db_path.exists());
        assert!(!db.is_read_only());
        assert_eq!(db.get_stats().unwrap(), IndexStats::default());
    }

    #[test]
    fn test_add_and_query() {
        let dir = tempdir().unwrap();
        let db = open(dir.path());

        assert!(db.update_file_time("a.py", 1.0).unwrap());
        db.add("foo", "", "pkg", "a.py", 3, 0).unwrap();
        db.add("foo", "C", "pkg", "a.py", 1, 4).unwrap();
        db.add("bar", "", "pkg", "a.py", 0, 0).unwrap();
        db.commit().unwrap();

        let found = db.occurrences("foo", "*", "*").unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].row, 1);
        assert_eq!(found[0].scope, "C");
        assert_eq!(found[1].row, 3);
        assert_eq!(found[1].file, "a.py");

        let all = db.all().unwrap();
        let names: Vec<_> = all.iter().map(|o| o.symbol.as_str()).collect();
        assert_eq!(names, vec!["bar", "foo", "foo"]);
    }

    #[test]
    fn test_add_without_file_record_is_rejected() {
        let dir = tempdir().unwrap();
        let db = open(dir.path());

        let err = db.add("foo", "", "", "ghost.py", 0, 0).unwrap_err();
        assert!(matches!(err, IndexError::MissingFileRecord { .. }));
        db.commit().unwrap();
        assert!(db.all().unwrap().is_empty());
    }

    #[test]
    fn test_glob_filtering() {
        let dir = tempdir().unwrap();
        let db = open(dir.path());

        db.update_file_time("a.py", 1.0).unwrap();
        db.add("x", "Outer.Inner", "pkg", "a.py", 2, 8).unwrap();
        db.add("x", "Other.Inner", "pkg", "a.py", 7, 8).unwrap();
        db.commit().unwrap();

        let found = db.occurrences("x", "Outer.*", "*").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].scope, "Outer.Inner");

        assert_eq!(db.occurrences("x", "O?her.*", "p?g").unwrap().len(), 1);
        assert!(db.occurrences("x", "*", "other").unwrap().is_empty());
    }

    #[test]
    fn test_update_file_time_newer_policy() {
        let dir = tempdir().unwrap();
        let db = open(dir.path());

        assert!(db.update_file_time("a.py", 10.0).unwrap());
        assert!(!db.update_file_time("a.py", 10.0).unwrap());
        assert!(!db.update_file_time("a.py", 5.0).unwrap());
        assert_eq!(stored_time(&db, "a.py"), Some(10.0));
        assert!(db.update_file_time("a.py", 11.5).unwrap());
        assert_eq!(stored_time(&db, "a.py"), Some(11.5));
    }

    #[test]
    fn test_update_file_time_changed_policy() {
        let dir = tempdir().unwrap();
        let db = IndexDatabase::open(dir.path().join("t.db"), StalenessPolicy::Changed).unwrap();

        assert!(db.update_file_time("a.py", 10.0).unwrap());
        assert!(!db.update_file_time("a.py", 10.0).unwrap());
        assert!(db.update_file_time("a.py", 5.0).unwrap());
        assert_eq!(stored_time(&db, "a.py"), Some(5.0));
    }

    #[test]
    fn test_clear_file_keeps_record() {
        let dir = tempdir().unwrap();
        let db = open(dir.path());

        db.update_file_time("a.py", 1.0).unwrap();
        db.add("foo", "", "", "a.py", 0, 0).unwrap();
        assert_eq!(db.clear_file("a.py").unwrap(), 1);
        db.commit().unwrap();

        assert!(db.all().unwrap().is_empty());
        assert_eq!(stored_time(&db, "a.py"), Some(1.0));
        assert!(db.indexed_files().unwrap().is_empty());
    }

    #[test]
    fn test_remove_other_files() {
        let dir = tempdir().unwrap();
        let db = open(dir.path());

        for path in ["a.py", "b.py"] {
            db.update_file_time(path, 1.0).unwrap();
            db.add("foo", "", "", path, 0, 0).unwrap();
        }
        db.commit().unwrap();

        assert_eq!(db.remove_other_files(&keep(&["a.py"])).unwrap(), 1);
        db.commit().unwrap();

        let files = db.indexed_files().unwrap();
        assert_eq!(files.into_iter().collect::<Vec<_>>(), vec!["a.py".to_string()]);
        assert!(db.all().unwrap().iter().all(|o| o.file == "a.py"));
        assert_eq!(db.get_stats().unwrap().total_symbols, 1);
        assert_eq!(db.get_stats().unwrap().total_files, 1);
    }

    #[test]
    fn test_remove_file_cascades() {
        let dir = tempdir().unwrap();
        let db = open(dir.path());

        db.update_file_time("a.py", 1.0).unwrap();
        db.add("foo", "", "", "a.py", 0, 0).unwrap();
        assert!(db.remove_file("a.py").unwrap());
        assert!(!db.remove_file("a.py").unwrap());
        db.commit().unwrap();

        assert_eq!(db.get_stats().unwrap(), IndexStats::default());
    }

    #[test]
    fn test_uncommitted_writes_are_not_durable() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");

        {
            let db = IndexDatabase::open(&db_path, StalenessPolicy::Newer).unwrap();
            db.update_file_time("a.py", 1.0).unwrap();
            db.add("kept", "", "", "a.py", 0, 0).unwrap();
            db.commit().unwrap();
            db.add("lost", "", "", "a.py", 1, 0).unwrap();
        }

        let db = IndexDatabase::open(&db_path, StalenessPolicy::Newer).unwrap();
        let names: Vec<_> = db.all().unwrap().into_iter().map(|o| o.symbol).collect();
        assert_eq!(names, vec!["kept".to_string()]);
    }

    #[test]
    fn test_read_only_rejects_writes() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("shared.db");
        {
            let db = IndexDatabase::open(&db_path, StalenessPolicy::Newer).unwrap();
            db.update_file_time("a.py", 1.0).unwrap();
            db.add("foo", "", "", "a.py", 0, 0).unwrap();
            db.commit().unwrap();
        }

        let ro = IndexDatabase::open_read_only(&db_path).unwrap();
        assert!(ro.is_read_only());
        assert!(matches!(
            ro.update_file_time("b.py", 1.0),
            Err(IndexError::ReadOnly)
        ));
        assert_eq!(ro.occurrences("foo", "*", "*").unwrap().len(), 1);
    }

    #[test]
    fn test_read_only_missing_file() {
        let dir = tempdir().unwrap();
        let err = IndexDatabase::open_read_only(dir.path().join("nope.db")).unwrap_err();
        assert!(matches!(err, IndexError::Io { .. }));
    }

    #[test]
    fn test_read_only_schema_mismatch() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("foreign.db");
        {
            let conn = Connection::open(&db_path).unwrap();
            conn.execute("CREATE TABLE notes (body TEXT)", []).unwrap();
        }

        let err = IndexDatabase::open_read_only(&db_path).unwrap_err();
        assert!(matches!(err, IndexError::SchemaMismatch { .. }));
    }
}
