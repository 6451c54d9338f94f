// CLI command implementations

pub mod file;
pub mod forget;
pub mod index;
pub mod query;
pub mod stats;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use regex::{Captures, Regex};

use crate::config::{resolve_path, Config};
use crate::indexer::Indexer;

/// Expand `$VAR`, `${VAR}` and a leading `~` in a user-supplied path.
///
/// Unknown variables are left as written.
pub fn expand_path(raw: &str) -> Result<PathBuf> {
    let vars = Regex::new(r"\$\{(\w+)\}|\$(\w+)")?;
    let expanded = vars.replace_all(raw, |caps: &Captures| {
        let name = caps
            .get(1)
            .or_else(|| caps.get(2))
            .map(|m| m.as_str())
            .unwrap_or_default();
        std::env::var(name).unwrap_or_else(|_| caps[0].to_string())
    });

    let expanded = match expanded.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') || rest.starts_with('\\') => {
            match std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE")) {
                Ok(home) => format!("{}{}", home, rest),
                Err(_) => expanded.into_owned(),
            }
        }
        _ => expanded.into_owned(),
    };

    Ok(PathBuf::from(expanded))
}

/// A configured database path, expanded then resolved against the project
fn configured_path(project: &Path, raw: &str) -> Result<PathBuf> {
    Ok(resolve_path(project, &expand_path(raw)?))
}

/// Index paths for a command: explicit `--db` values win, otherwise the
/// configured primary plus configured secondaries.
pub fn database_paths(project: &Path, config: &Config, dbs: &[String]) -> Result<Vec<PathBuf>> {
    let mut paths = if dbs.is_empty() {
        vec![configured_path(project, &config.database.path)?]
    } else {
        dbs.iter()
            .map(|db| expand_path(db))
            .collect::<Result<Vec<_>>>()?
    };

    for secondary in &config.database.secondary {
        let secondary = configured_path(project, secondary)?;
        if !paths.contains(&secondary) {
            paths.push(secondary);
        }
    }

    Ok(paths)
}

/// Open the indexer over the resolved federation
pub fn open_indexer(project: &Path, config: &Config, dbs: &[String]) -> Result<Indexer> {
    let paths = database_paths(project, config, dbs)?;
    Indexer::open(&paths, config.clone())
        .with_context(|| format!("Failed to open index {}", paths[0].display()))
}
