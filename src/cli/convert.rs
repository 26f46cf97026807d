use super::ui;
use crate::core::config::AppConfig;
use crate::core::conversion::ManualPrice;
use crate::providers;
use anyhow::Result;
use chrono::NaiveDate;
use comfy_table::Cell;
use rust_decimal::Decimal;

/// Values `amount` of `symbol` in USD and EUR on `date`.
pub async fn run(
    config: &AppConfig,
    amount: Decimal,
    symbol: &str,
    date: NaiveDate,
    manual: bool,
) -> Result<()> {
    if amount <= Decimal::ZERO {
        anyhow::bail!("Amount must be positive, got {amount}");
    }
    let mut pipeline = providers::build_pipeline(config)?;

    let prompt = |symbol: &str, date: NaiveDate| {
        ui::prompt_decimal(&format!("No USD price found for {symbol} on {date}. Enter it manually"))
    };
    let ask: Option<ManualPrice> = if manual { Some(&prompt) } else { None };

    let (usd, price) = pipeline
        .convert_crypto_to_usd(amount, symbol, date, ask)
        .await?;
    let (eur, rate) = pipeline.convert_usd_to_eur(usd, date).await?;

    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Amount"),
        ui::header_cell("Price (USD)"),
        ui::header_cell("Value (USD)"),
        ui::header_cell("USD/EUR"),
        ui::header_cell("Rate source"),
        ui::header_cell("Value (EUR)"),
    ]);
    table.add_row(vec![
        Cell::new(format!("{} {}", amount.normalize(), symbol.to_uppercase())),
        ui::rate_cell(price),
        ui::amount_cell(usd),
        ui::rate_cell(rate.rate),
        Cell::new(&rate.source),
        ui::amount_cell(eur),
    ]);

    println!(
        "Valuation on {}\n\n{}",
        ui::style_text(&date.to_string(), ui::StyleType::Title),
        table
    );
    if pipeline.is_stablecoin(symbol) {
        println!(
            "{}",
            ui::style_text("Stablecoin valued at 1 USD", ui::StyleType::Subtle)
        );
    }
    Ok(())
}
