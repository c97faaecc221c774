//! Futures paper trader - main entry point
//!
//! This binary provides two subcommands:
//! - replay: Replay recorded ticks through the paper exchange
//! - journal: Summarize a trade journal written by a previous run

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "futures-paper-trader")]
#[command(about = "Futures paper trading with TP/SL brackets", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replay a tick file through the paper exchange
    Replay {
        /// Path to configuration file
        #[arg(short, long, default_value = "configs/paper.json")]
        config: String,

        /// CSV with columns timestamp,symbol,price[,signal]
        #[arg(short, long, default_value = "data/ticks_sample.csv")]
        ticks: String,

        /// Trade journal path (overrides config file)
        #[arg(short, long)]
        journal: Option<String>,
    },

    /// Summarize a JSON or SQLite trade journal
    Journal {
        /// Journal file (.json, or .db/.sqlite for SQLite)
        #[arg(short, long, default_value = "trades_demo.json")]
        path: String,
    },
}

fn setup_logging(verbose: bool, command_name: &str) -> Result<()> {
    std::fs::create_dir_all("logs")?;

    // {command}_{date}.log
    let log_filename = format!(
        "{}_{}.log",
        command_name,
        chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
    );
    let log_path = PathBuf::from("logs").join(&log_filename);

    // Filter out noisy external crates
    let level = if verbose { "debug" } else { "info" };
    let filter_str = format!(
        "{},hyper=warn,hyper_util=warn,reqwest=warn,rustls=warn,h2=warn",
        level
    );
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter_str));

    let file_appender = tracing_appender::rolling::never("logs", &log_filename);

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(true);

    // Same format, no ANSI colors
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(file_appender)
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    info!("Logging initialized");
    info!("Log file: {}", log_path.display());
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let command_name = match &cli.command {
        Commands::Replay { .. } => "replay",
        Commands::Journal { .. } => "journal",
    };
    setup_logging(cli.verbose, command_name)?;

    match cli.command {
        Commands::Replay {
            config,
            ticks,
            journal,
        } => commands::replay::run(config, ticks, journal),

        Commands::Journal { path } => commands::journal::run(path),
    }
}
