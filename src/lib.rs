pub mod cli;
pub mod core;
pub mod providers;
pub mod store;

use crate::core::config::AppConfig;
use crate::core::rate::CurrencyPair;
use anyhow::Result;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::path::PathBuf;
use tracing::{debug, info};

pub use cli::cache::CacheAction;

/// Commands that need a loaded configuration.
#[derive(Debug, Clone)]
pub enum AppCommand {
    Rate {
        pair: CurrencyPair,
        date: NaiveDate,
        manual: bool,
    },
    Convert {
        amount: Decimal,
        symbol: String,
        date: NaiveDate,
        manual: bool,
    },
    Preload {
        pair: CurrencyPair,
        start: NaiveDate,
        end: NaiveDate,
    },
    Tax {
        operations: PathBuf,
        output: Option<PathBuf>,
        manual: bool,
    },
    Cache(CacheAction),
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("fisc starting...");

    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");

    match command {
        AppCommand::Rate { pair, date, manual } => cli::rate::run(&config, &pair, date, manual).await,
        AppCommand::Convert {
            amount,
            symbol,
            date,
            manual,
        } => cli::convert::run(&config, amount, &symbol, date, manual).await,
        AppCommand::Preload { pair, start, end } => {
            cli::preload::run(&config, &pair, start, end).await
        }
        AppCommand::Tax {
            operations,
            output,
            manual,
        } => cli::tax::run(&config, &operations, output.as_deref(), manual).await,
        AppCommand::Cache(action) => cli::cache::run(&config, action),
    }
}
