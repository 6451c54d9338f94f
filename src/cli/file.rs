use std::path::Path;

use anyhow::Result;

use crate::config::Config;

pub fn index_file(
    project: &Path,
    config: &Config,
    path: &Path,
    db: Option<String>,
    force: bool,
) -> Result<()> {
    let dbs: Vec<String> = db.into_iter().collect();
    let indexer = super::open_indexer(project, config, &dbs)?;

    if indexer.process_file(path, force)? {
        println!("Reindexed {}", path.display());
    } else {
        println!("{} is up to date", path.display());
    }

    Ok(())
}
