use super::ui;
use crate::core::config::AppConfig;
use crate::core::rate::CurrencyPair;
use crate::core::report::{RecordedValuations, TaxReportBuilder, TaxReportRow, TaxReportSummary};
use crate::core::resolver::ManualRate;
use crate::core::tax::{FiatOperation, OperationType};
use crate::providers;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use comfy_table::Cell;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use tracing::debug;

/// One line of an operations file: the fiat operation and the USD value of
/// the whole portfolio just before it.
#[derive(Debug, Deserialize)]
pub struct OperationRecord {
    pub date: NaiveDate,
    #[serde(rename = "type")]
    pub kind: OperationType,
    pub amount: Decimal,
    /// Milliseconds since the Unix epoch; defaults to midnight UTC of `date`
    pub timestamp: Option<i64>,
    pub portfolio_value_usd: Decimal,
}

/// Reads a YAML list of [`OperationRecord`]s. Operations without a timestamp
/// keep their file order within a day.
pub fn load_operations(path: &Path) -> Result<(Vec<FiatOperation>, RecordedValuations)> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read operations file: {}", path.display()))?;
    let records: Vec<OperationRecord> = serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse operations file: {}", path.display()))?;

    let mut operations = Vec::with_capacity(records.len());
    let mut valuations = RecordedValuations::new();
    let mut seen = HashSet::new();
    for (idx, record) in records.into_iter().enumerate() {
        let timestamp = match record.timestamp {
            Some(ts) => ts,
            None => {
                let midnight = record
                    .date
                    .and_hms_opt(0, 0, 0)
                    .context("Invalid operation date")?
                    .and_utc()
                    .timestamp_millis();
                midnight + idx as i64
            }
        };
        if !seen.insert(timestamp) {
            anyhow::bail!(
                "Duplicate timestamp {timestamp} in operations file (operation {})",
                idx + 1
            );
        }
        if record.portfolio_value_usd < Decimal::ZERO {
            anyhow::bail!(
                "Negative portfolio value for the operation of {}",
                record.date
            );
        }
        valuations.insert(timestamp, record.portfolio_value_usd);
        operations.push(FiatOperation {
            date: record.date,
            kind: record.kind,
            amount: record.amount,
            timestamp,
        });
    }
    debug!("Loaded {} fiat operations", operations.len());
    Ok((operations, valuations))
}

pub fn display_report(rows: &[TaxReportRow]) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Date"),
        ui::header_cell("Type"),
        ui::header_cell("Amount (EUR)"),
        ui::header_cell("Portfolio (USD)"),
        ui::header_cell("USD/EUR"),
        ui::header_cell("Portfolio (EUR)"),
        ui::header_cell("Acquisition cost"),
        ui::header_cell("Gain"),
        ui::header_cell("Cumulative gains"),
    ]);

    for row in rows {
        let kind = if row.exceeds_portfolio {
            Cell::new(format!("{} (!)", row.kind)).fg(comfy_table::Color::Yellow)
        } else {
            Cell::new(row.kind)
        };
        table.add_row(vec![
            Cell::new(row.date),
            kind,
            ui::amount_cell(row.amount_eur),
            ui::amount_cell(row.portfolio_value_usd),
            ui::rate_cell(row.exchange_rate),
            ui::format_optional_cell(row.portfolio_value_eur, |v| format!("{v:.2}")),
            ui::amount_cell(row.acquisition_cost),
            ui::gain_cell(row.taxable_gain),
            ui::gain_cell(row.cumulative_gains),
        ]);
    }

    let summary = TaxReportSummary::from_rows(rows);
    let mut output = format!(
        "{}\n\n{}\n\n",
        ui::style_text("Flat-tax report", ui::StyleType::Title),
        table
    );
    output.push_str(&format!(
        "{} {:.2}\n{} {:.2}\n{} {}",
        ui::style_text("Total deposits (EUR):", ui::StyleType::TotalLabel),
        summary.total_deposits,
        ui::style_text("Total withdrawals (EUR):", ui::StyleType::TotalLabel),
        summary.total_withdrawals,
        ui::style_text("Taxable gains (EUR):", ui::StyleType::TotalLabel),
        ui::style_text(
            &format!("{:.2}", summary.total_gains),
            ui::StyleType::TotalValue
        ),
    ));
    if rows.iter().any(|row| row.exceeds_portfolio) {
        output.push_str(&format!(
            "\n{}",
            ui::style_text(
                "(!) withdrawal larger than the declared portfolio value",
                ui::StyleType::Subtle
            )
        ));
    }
    output
}

/// Builds the flat-tax report for an operations file. Rows are also written
/// as JSON to `output` when given.
pub async fn run(
    config: &AppConfig,
    operations_file: &Path,
    output: Option<&Path>,
    manual: bool,
) -> Result<()> {
    let (operations, valuations) = load_operations(operations_file)?;
    if operations.is_empty() {
        println!("No operations in {}", operations_file.display());
        return Ok(());
    }

    let mut pipeline = providers::build_pipeline(config)?;
    let prompt = |pair: &CurrencyPair, date: NaiveDate| {
        ui::prompt_decimal(&format!("No {pair} rate found for {date}. Enter it manually"))
    };
    let mut builder = TaxReportBuilder::new(&mut pipeline);
    if manual {
        let ask: ManualRate = &prompt;
        builder = builder.with_manual_rate(ask);
    }
    let rows = builder.build(&operations, &valuations).await?;

    println!("{}", display_report(&rows));

    if let Some(path) = output {
        let json = serde_json::to_string_pretty(&rows)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        println!("Report written to {}", path.display());
    }
    Ok(())
}
