mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use commands::migrate::{self, MigrateOptions};
use kit_core::{init_logging, LoggingConfig};
use kit_migrate::{DEFAULT_MIGRATIONS_DIR, DEFAULT_MIGRATIONS_TABLE};

#[derive(Parser, Debug)]
#[command(name = "kit-migrate")]
#[command(about = "Apply and revert file-based SQL migrations")]
#[command(version)]
struct Cli {
    /// Directory holding the migration files
    #[arg(long, global = true, default_value = DEFAULT_MIGRATIONS_DIR)]
    migrations_dir: PathBuf,

    /// Ledger table recording applied migrations
    #[arg(long, global = true, default_value = DEFAULT_MIGRATIONS_TABLE)]
    table: String,

    /// Debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Log as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Commands {
    /// Create a new, empty migration file
    Create {
        /// Human readable name, turned into the file name slug
        name: Option<String>,
    },

    /// Apply pending migrations (the default)
    Up,

    /// Revert the most recently applied migration
    Down,
}

impl Cli {
    fn options(&self) -> MigrateOptions {
        MigrateOptions {
            migrations_dir: self.migrations_dir.clone(),
            table: self.table.clone(),
        }
    }

    fn logging(&self) -> LoggingConfig {
        let config = if self.verbose {
            LoggingConfig::verbose()
        } else {
            LoggingConfig::default()
        };
        config.with_json(self.json)
    }
}

async fn dispatch(cli: Cli) -> anyhow::Result<()> {
    let options = cli.options();

    match cli.command.unwrap_or(Commands::Up) {
        Commands::Create { name } => {
            migrate::create(&options, name.as_deref())?;
        }
        Commands::Up => migrate::up(&options).await?,
        Commands::Down => migrate::down(&options).await?,
    }

    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // --help and --version land here too
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    if let Err(e) = init_logging(&cli.logging()) {
        eprintln!("{}", e);
    }

    match dispatch(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
