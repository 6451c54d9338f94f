use std::path::Path;

use anyhow::Result;

use crate::config::Config;

pub fn forget_file(project: &Path, config: &Config, path: &Path, db: Option<String>) -> Result<()> {
    let dbs: Vec<String> = db.into_iter().collect();
    let indexer = super::open_indexer(project, config, &dbs)?;

    if indexer.remove_file(path)? {
        println!("Removed {} from the index", path.display());
    } else {
        println!("{} was not indexed", path.display());
    }

    Ok(())
}
