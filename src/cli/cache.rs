use super::ui;
use crate::core::config::AppConfig;
use crate::providers;
use crate::store::CacheStats;
use anyhow::Result;
use comfy_table::Cell;

/// Housekeeping actions on the rate cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheAction {
    Stats,
    Clear,
    Cleanup,
}

pub fn display_stats(stats: &CacheStats) -> String {
    let mut summary = ui::new_styled_table();
    summary.set_header(vec![ui::header_cell("Cache"), ui::header_cell("")]);
    summary.add_row(vec![
        Cell::new("File"),
        Cell::new(stats.cache_file.display()),
    ]);
    summary.add_row(vec![
        Cell::new("Size (bytes)"),
        Cell::new(stats.cache_file_size),
    ]);
    summary.add_row(vec![
        Cell::new("Validity (s)"),
        Cell::new(stats.cache_duration.as_secs()),
    ]);
    summary.add_row(vec![Cell::new("Entries"), Cell::new(stats.total_entries)]);
    summary.add_row(vec![Cell::new("Valid"), Cell::new(stats.valid_entries)]);
    summary.add_row(vec![Cell::new("Expired"), Cell::new(stats.expired_entries)]);

    let mut output = summary.to_string();
    if !stats.sources.is_empty() {
        let mut sources = ui::new_styled_table();
        sources.set_header(vec![ui::header_cell("Source"), ui::header_cell("Entries")]);
        for (source, count) in &stats.sources {
            sources.add_row(vec![Cell::new(source), Cell::new(count)]);
        }
        output.push_str("\n\n");
        output.push_str(&sources.to_string());
    }
    output
}

pub fn run(config: &AppConfig, action: CacheAction) -> Result<()> {
    let mut resolver = providers::build_resolver(config)?;
    match action {
        CacheAction::Stats => println!("{}", display_stats(&resolver.get_cache_stats())),
        CacheAction::Clear => {
            resolver.clear_cache()?;
            println!("Exchange rate cache cleared");
        }
        CacheAction::Cleanup => {
            let removed = resolver.cleanup_expired_cache()?;
            println!("Removed {removed} expired cache entries");
        }
    }
    Ok(())
}
