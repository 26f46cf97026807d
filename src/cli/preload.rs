use super::ui;
use crate::core::config::AppConfig;
use crate::core::rate::CurrencyPair;
use crate::core::resolver::PreloadStats;
use crate::providers;
use anyhow::Result;
use chrono::NaiveDate;
use comfy_table::Cell;

pub fn display_stats(stats: &PreloadStats) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![ui::header_cell("Outcome"), ui::header_cell("Days")]);
    for (label, count) in [
        ("Requested", stats.requested_dates),
        ("Already cached", stats.cache_hits),
        ("Primary source", stats.primary_success),
        ("Fallback sources", stats.fallback_success),
        ("Failed", stats.failures),
    ] {
        table.add_row(vec![Cell::new(label), Cell::new(count)]);
    }
    table.to_string()
}

/// Warms the rate cache for every day from `start` to `end`.
pub async fn run(config: &AppConfig, pair: &CurrencyPair, start: NaiveDate, end: NaiveDate) -> Result<()> {
    if end < start {
        anyhow::bail!("End date {end} is before start date {start}");
    }
    let mut resolver = providers::build_resolver(config)?;

    let days = (end - start).num_days() as u64 + 1;
    let pb = ui::new_progress_bar(days, true);
    pb.set_message(format!("Preloading {pair}"));
    let stats = resolver
        .preload_rates_for_date_range(pair, start, end, |day| {
            pb.set_message(format!("{pair} {day}"));
            pb.inc(1);
        })
        .await;
    pb.finish_and_clear();

    println!("{}", display_stats(&stats));
    if !stats.errors.is_empty() {
        ui::print_separator();
        for error in &stats.errors {
            println!("{}", ui::style_text(error, ui::StyleType::Error));
        }
    }
    Ok(())
}
