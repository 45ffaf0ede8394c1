use anyhow::Result;
use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};
use request_history::redaction::SensitiveApiKey;
use request_history::{HistoryStats, RequestHistory};
use tracing::info;

use super::hours_ago;

/// Execute the stats command
///
/// Displays aggregate statistics for one owner key
pub async fn execute(history: &RequestHistory, owner: &str, hours: Option<u32>, json: bool) -> Result<()> {
    info!(owner = %SensitiveApiKey::new(owner), "Loading request history statistics");

    let stats = history.query.stats(owner, hours.map(hours_ago), None).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("Request History Statistics");
    println!("==========================\n");

    display_summary(&stats, owner, hours);
    display_models(&stats);
    display_statuses(&stats);

    Ok(())
}

fn display_summary(stats: &HistoryStats, owner: &str, hours: Option<u32>) {
    let window = hours
        .map(|h| format!("last {} hours", h))
        .unwrap_or_else(|| "all time".to_string());

    let error_rate = if stats.total_requests > 0 {
        stats.error_count as f64 / stats.total_requests as f64 * 100.0
    } else {
        0.0
    };

    println!("Summary ({}):", window);
    println!("  Owner:             {}", SensitiveApiKey::new(owner));
    println!("  Requests:          {}", stats.total_requests);
    println!("  Success:           {}", stats.success_count);
    println!("  Error:             {} ({:.1}%)", stats.error_count, error_rate);
    println!("  Pending:           {}", stats.pending_count);
    println!("  Total Tokens:      {}", stats.total_tokens);
    println!("  Avg Duration:      {:.0} ms", stats.avg_duration_ms);
    println!();
}

fn display_models(stats: &HistoryStats) {
    if stats.by_model.is_empty() {
        return;
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec![
        Cell::new("MODEL").fg(Color::Cyan),
        Cell::new("REQUESTS").fg(Color::Cyan),
        Cell::new("TOTAL TOKENS").fg(Color::Cyan),
        Cell::new("AVG DURATION").fg(Color::Cyan),
    ]);

    for model in &stats.by_model {
        table.add_row(vec![
            Cell::new(&model.model),
            Cell::new(model.count),
            Cell::new(model.total_tokens),
            Cell::new(format!("{:.0} ms", model.avg_duration_ms)),
        ]);
    }

    println!("By Model:");
    println!("{}\n", table);
}

fn display_statuses(stats: &HistoryStats) {
    if stats.by_status.is_empty() {
        return;
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec![
        Cell::new("STATUS").fg(Color::Cyan),
        Cell::new("REQUESTS").fg(Color::Cyan),
    ]);

    for (status, count) in &stats.by_status {
        table.add_row(vec![Cell::new(status), Cell::new(count)]);
    }

    println!("By Status:");
    println!("{}", table);
}
