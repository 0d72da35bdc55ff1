//! Accumulation breakout trader - main entry point
//!
//! This binary provides three subcommands:
//! - backtest: Detect zones and simulate breakout trades over history
//! - live: Run live trading (dry-run or real)
//! - download: Download historical futures klines into the CSV cache

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "zonebreak")]
#[command(about = "Accumulation zone breakout trading with backtesting and live trading", long_about = None)]
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
    /// Run a zone-detection backtest over cached history
    Backtest {
        /// Path to configuration file
        #[arg(short, long, default_value = "configs/default.json")]
        config: String,

        /// Initial capital
        #[arg(long)]
        capital: Option<f64>,

        /// Days of history to simulate
        #[arg(long)]
        days: Option<u32>,
    },

    /// Run live trading
    Live {
        /// Path to configuration file
        #[arg(short, long, default_value = "configs/default.json")]
        config: String,

        /// Dry-run mode (no real orders)
        #[arg(long)]
        dry_run: bool,

        /// Live trading mode (CAUTION - REAL MONEY!)
        #[arg(long)]
        live: bool,
    },

    /// Download historical futures data
    Download {
        /// Symbols to download (comma-separated). E.g., "BTCUSDT,ETHUSDT"
        #[arg(short, long, default_value = "BTCUSDT,ETHUSDT")]
        symbols: String,

        /// Timeframe intervals (comma-separated). E.g., "5m,15m,1h"
        #[arg(short, long, default_value = "5m")]
        timeframes: String,

        /// Number of days of history to fetch
        #[arg(short, long, default_value = "30")]
        days: u32,

        /// Output directory
        #[arg(short, long, default_value = "data")]
        output: String,
    },
}

fn setup_logging(verbose: bool, command_name: &str) -> Result<()> {
    std::fs::create_dir_all("logs")?;

    let log_filename = format!(
        "{}_{}.log",
        command_name,
        chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
    );
    let log_path = PathBuf::from("logs").join(&log_filename);

    // filter out noisy external crates
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
        Commands::Backtest { .. } => "backtest",
        Commands::Live { .. } => "live",
        Commands::Download { .. } => "download",
    };

    setup_logging(cli.verbose, command_name)?;

    match cli.command {
        Commands::Backtest {
            config,
            capital,
            days,
        } => commands::backtest::run(config, capital, days),

        Commands::Live {
            config,
            dry_run,
            live,
        } => commands::live::run(config, dry_run, live),

        Commands::Download {
            symbols,
            timeframes,
            days,
            output,
        } => commands::download::run(symbols, timeframes, days, output),
    }
}
