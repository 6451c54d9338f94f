use std::path::Path;

use anyhow::{bail, Result};
use serde_json::json;

use crate::config::Config;
use crate::index::Occurrence;
use crate::indexer::QueryOutcome;

pub fn query_index(
    project: &Path,
    config: &Config,
    symbol: &str,
    scope: &str,
    package: &str,
    dbs: &[String],
    format: &str,
    no_fallback: bool,
) -> Result<()> {
    if format != "text" && format != "json" {
        bail!("Unknown format '{}', expected text or json", format);
    }

    let indexer = super::open_indexer(project, config, dbs)?;

    let outcome = if no_fallback {
        QueryOutcome {
            occurrences: indexer.query_occurrences(symbol, scope, package)?,
            fallback: false,
        }
    } else {
        indexer.query_or_all(symbol, scope, package)?
    };

    match format {
        "json" => {
            let output = json!({
                "symbol": symbol,
                "scope": scope,
                "package": package,
                "fallback": outcome.fallback,
                "count": outcome.occurrences.len(),
                "occurrences": outcome.occurrences,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        _ => print_text(symbol, &outcome),
    }

    Ok(())
}

fn print_text(symbol: &str, outcome: &QueryOutcome) {
    if outcome.fallback {
        println!("No occurrences of '{}'; listing all indexed symbols.", symbol);
    }

    if outcome.occurrences.is_empty() {
        println!("No symbols indexed.");
        return;
    }

    for occurrence in &outcome.occurrences {
        println!("{}", format_occurrence(occurrence));
    }
}

fn format_occurrence(occurrence: &Occurrence) -> String {
    let mut line = format!(
        "{}:{}:{}: {}",
        occurrence.file, occurrence.row, occurrence.col, occurrence.symbol
    );
    if !occurrence.scope.is_empty() {
        line.push_str(&format!(" in {}", occurrence.scope));
    }
    if !occurrence.package.is_empty() {
        line.push_str(&format!(" [{}]", occurrence.package));
    }
    line
}
