use std::path::Path;

use anyhow::Result;

use crate::config::Config;
use crate::index::IndexDatabase;

pub fn show_stats(project: &Path, config: &Config, dbs: &[String], verbose: bool) -> Result<()> {
    let indexer = super::open_indexer(project, config, dbs)?;
    let index = indexer.index();

    println!("symdb statistics");
    println!("Project: {}", project.display());
    println!("Staleness policy: {}", index.primary().policy().as_str());

    for (path, stats) in index.stats()? {
        let role = if path == index.primary().path() {
            "primary"
        } else {
            "secondary"
        };

        println!("\n{} ({})", path.display(), role);
        println!("  Total files: {}", stats.total_files);
        println!("  Total symbols: {}", stats.total_symbols);
        match get_db_size(&path) {
            Ok(size) => println!("  Index size: {:.2} MB", size),
            Err(_) => println!("  Index size: unknown"),
        }
    }

    if verbose {
        print_file_records(index.primary())?;
        for secondary in index.secondaries() {
            print_file_records(secondary)?;
        }
    }

    Ok(())
}

fn print_file_records(db: &IndexDatabase) -> Result<()> {
    let records = db.file_records()?;
    println!("\nFiles in {}:", db.path().display());
    if records.is_empty() {
        println!("  (none)");
    }
    for record in records {
        println!("  {:.3}  {}", record.timestamp, record.path);
    }
    Ok(())
}

fn get_db_size(db_path: &Path) -> Result<f64> {
    let metadata = std::fs::metadata(db_path)?;
    let size_bytes = metadata.len() as f64;
    Ok(size_bytes / (1024.0 * 1024.0))
}
