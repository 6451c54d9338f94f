use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod cli;
mod config;
mod error;
mod index;
mod indexer;

use config::{Config, LoggingConfig};

#[derive(Parser)]
#[command(name = "symdb")]
#[command(version = "0.1.0")]
#[command(about = "Incremental symbol definition index for Python sources", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Project directory holding .symdb.toml
    #[arg(short, long, global = true, default_value = ".")]
    project: PathBuf,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Walk source roots and bring the index up to date
    Index {
        /// Directories or files to index (defaults to the project directory)
        roots: Vec<PathBuf>,

        /// Index database (overrides the configured path)
        #[arg(long)]
        db: Option<String>,

        /// Reindex every file regardless of timestamps
        #[arg(short, long)]
        rebuild: bool,

        /// Only index files whose normalized path matches this regex
        #[arg(short, long)]
        include: Option<String>,

        /// Keep running and reindex files as they change
        #[arg(short, long)]
        watch: bool,
    },

    /// Reindex a single file if it is stale
    File {
        path: PathBuf,

        #[arg(long)]
        db: Option<String>,

        /// Reindex even if the stored timestamp is current
        #[arg(short, long)]
        force: bool,
    },

    /// Look up where a symbol is defined
    Query {
        symbol: String,

        /// Glob over the enclosing scope, e.g. "C.*"
        #[arg(short, long, default_value = "*")]
        scope: String,

        /// Glob over the package
        #[arg(long, default_value = "*")]
        package: String,

        /// Index databases; the first is writable, the rest are read-only
        #[arg(long)]
        db: Vec<String>,

        /// Output format: text, json
        #[arg(short, long, default_value = "text")]
        format: String,

        /// Print nothing instead of every symbol when there is no match
        #[arg(long)]
        no_fallback: bool,
    },

    /// Drop a file and its symbols from the index
    Forget {
        path: PathBuf,

        #[arg(long)]
        db: Option<String>,
    },

    /// Show index statistics
    Stats {
        #[arg(long)]
        db: Vec<String>,
    },
}

fn init_logging(debug: bool, verbose: bool, logging: &LoggingConfig) {
    let default_level = if debug {
        "debug"
    } else if verbose {
        "info"
    } else {
        logging.level.as_str()
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if logging.format == "pretty" {
        builder.pretty().init();
    } else {
        builder.compact().init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::from_project_dir(&cli.project);
    init_logging(cli.debug, cli.verbose, &config.logging);

    info!("symdb v0.1.0 starting in {}", cli.project.display());

    match cli.command {
        Commands::Index {
            roots,
            db,
            rebuild,
            include,
            watch,
        } => {
            cli::index::index_project(&cli.project, config, roots, db, rebuild, include, watch)
                .await?;
        }

        Commands::File { path, db, force } => {
            cli::file::index_file(&cli.project, &config, &path, db, force)?;
        }

        Commands::Query {
            symbol,
            scope,
            package,
            db,
            format,
            no_fallback,
        } => {
            cli::query::query_index(
                &cli.project,
                &config,
                &symbol,
                &scope,
                &package,
                &db,
                &format,
                no_fallback,
            )?;
        }

        Commands::Forget { path, db } => {
            cli::forget::forget_file(&cli.project, &config, &path, db)?;
        }

        Commands::Stats { db } => {
            cli::stats::show_stats(&cli.project, &config, &db, cli.verbose)?;
        }
    }

    Ok(())
}
