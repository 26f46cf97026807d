use super::ui;
use crate::core::config::AppConfig;
use crate::core::rate::{CurrencyPair, ExchangeRate};
use crate::core::resolver::ManualRate;
use crate::providers;
use anyhow::Result;
use chrono::NaiveDate;
use comfy_table::Cell;

pub fn display_rate(rate: &ExchangeRate) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Pair"),
        ui::header_cell("Date"),
        ui::header_cell("Rate"),
        ui::header_cell("Source"),
        ui::header_cell("Retrieved"),
    ]);
    table.add_row(vec![
        Cell::new(&rate.currency_pair),
        Cell::new(rate.date),
        ui::rate_cell(rate.rate),
        Cell::new(&rate.source),
        Cell::new(rate.retrieved_at.format("%Y-%m-%d %H:%M:%S UTC")),
    ]);
    table.to_string()
}

/// Resolves and prints the rate of `pair` on `date`. With `manual`, the user
/// is asked for a rate when no source has one.
pub async fn run(config: &AppConfig, pair: &CurrencyPair, date: NaiveDate, manual: bool) -> Result<()> {
    let mut resolver = providers::build_resolver(config)?;

    let prompt = |pair: &CurrencyPair, date: NaiveDate| {
        ui::prompt_decimal(&format!("No {pair} rate found for {date}. Enter it manually"))
    };
    let ask: Option<ManualRate> = if manual { Some(&prompt) } else { None };

    let rate = resolver.get_rate_with_validation(pair, date, ask).await?;
    println!("{}", display_rate(&rate));
    Ok(())
}
