use anyhow::Result;
use chrono::NaiveDate;
use clap::{CommandFactory, Parser, Subcommand};
use fisc::core::log::init_logging;
use fisc::core::rate::CurrencyPair;
use rust_decimal::Decimal;
use std::path::PathBuf;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

impl From<Commands> for fisc::AppCommand {
    fn from(cmd: Commands) -> fisc::AppCommand {
        match cmd {
            Commands::Rate { date, pair, manual } => fisc::AppCommand::Rate { pair, date, manual },
            Commands::Convert {
                amount,
                symbol,
                date,
                manual,
            } => fisc::AppCommand::Convert {
                amount,
                symbol,
                date,
                manual,
            },
            Commands::Preload { start, end, pair } => fisc::AppCommand::Preload { pair, start, end },
            Commands::Tax {
                operations,
                output,
                manual,
            } => fisc::AppCommand::Tax {
                operations,
                output,
                manual,
            },
            Commands::Cache { action } => fisc::AppCommand::Cache(action.into()),
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Show the exchange rate of a pair on a date
    Rate {
        /// Date as YYYY-MM-DD
        date: NaiveDate,
        #[arg(short, long, default_value = "USD/EUR")]
        pair: CurrencyPair,
        /// Prompt for a rate when no source has one
        #[arg(short, long)]
        manual: bool,
    },
    /// Value a crypto amount in USD and EUR
    Convert {
        amount: Decimal,
        symbol: String,
        /// Date as YYYY-MM-DD
        date: NaiveDate,
        /// Prompt for a price when no oracle has one
        #[arg(short, long)]
        manual: bool,
    },
    /// Fill the rate cache for a date range
    Preload {
        start: NaiveDate,
        end: NaiveDate,
        #[arg(short, long, default_value = "USD/EUR")]
        pair: CurrencyPair,
    },
    /// Compute the flat-tax report for a YAML operations file
    Tax {
        operations: PathBuf,
        /// Also write the report rows as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Prompt for a rate when no source has one
        #[arg(short, long)]
        manual: bool,
    },
    /// Inspect or maintain the rate cache
    Cache {
        #[command(subcommand)]
        action: CacheCommand,
    },
}

#[derive(Subcommand)]
enum CacheCommand {
    /// Show cache statistics
    Stats,
    /// Remove every cached rate
    Clear,
    /// Remove expired rates only
    Cleanup,
}

impl From<CacheCommand> for fisc::CacheAction {
    fn from(cmd: CacheCommand) -> fisc::CacheAction {
        match cmd {
            CacheCommand::Stats => fisc::CacheAction::Stats,
            CacheCommand::Clear => fisc::CacheAction::Clear,
            CacheCommand::Cleanup => fisc::CacheAction::Cleanup,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => match cli.config_path.as_deref() {
            Some(path) => fisc::cli::setup::setup_at_path(path),
            None => fisc::cli::setup::setup(),
        },
        Some(cmd) => fisc::run_command(cmd.into(), cli.config_path.as_deref()).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}
