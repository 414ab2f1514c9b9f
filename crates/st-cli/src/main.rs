use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use st_cli::commands::{export, replay, report, reset, run, status, sweep};
use st_cli::{Cli, Commands, Config};
use st_store::{AggregateStore, SqliteStore};

type Store = Arc<AggregateStore<SqliteStore>>;

/// Load config and open the store, ensuring the parent directory exists.
fn open_store(config_path: Option<&Path>) -> Result<(Store, Config)> {
    let config = Config::load_from(config_path).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");

    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent).context("failed to create database directory")?;
    }

    let substrate = SqliteStore::open(&config.database_path)
        .with_context(|| format!("failed to open {}", config.database_path.display()))?;
    Ok((Arc::new(AggregateStore::new(substrate)), config))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // stdout carries command output; logs go to stderr.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    let Some(command) = &cli.command else {
        use clap::CommandFactory;
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };

    let (store, config) = open_store(cli.config.as_deref())?;
    let mut stdout = std::io::stdout().lock();

    match command {
        Commands::Run => {
            let input = tokio::io::BufReader::new(tokio::io::stdin());
            run::run(store, config.engine_config(), input).await?;
        }
        Commands::Replay { file } => {
            let input =
                std::fs::read_to_string(file).with_context(|| format!("failed to read {}", file.display()))?;
            let stats = replay::run(store, config.engine_config(), &input).await?;
            writeln!(stdout, "{stats}")?;
        }
        Commands::Report { period, json } => {
            report::run(&mut stdout, store, &config.icon_template, *period, *json).await?;
        }
        Commands::Export { output } => {
            export::run(&mut stdout, store, &config.icon_template, output.as_deref(), Utc::now()).await?;
        }
        Commands::Reset { yes } => {
            reset::run(&mut stdout, &store, *yes).await?;
        }
        Commands::Sweep => {
            sweep::run(&mut stdout, &store, config.retention_days, Utc::now()).await?;
        }
        Commands::Status => {
            status::run(&mut stdout, &store, &config.database_path, Utc::now()).await?;
        }
    }

    Ok(())
}
