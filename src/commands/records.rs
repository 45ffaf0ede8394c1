use anyhow::{bail, Result};
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};
use request_history::redaction::SensitiveApiKey;
use request_history::{HistoryFilter, HistoryRecord, RecordStatus, RequestHistory};

use super::{format_timestamp, hours_ago};

fn status_cell(status: RecordStatus) -> Cell {
    let color = match status {
        RecordStatus::Pending => Color::Yellow,
        RecordStatus::Success => Color::Green,
        RecordStatus::Error => Color::Red,
    };
    Cell::new(status.as_str()).fg(color)
}

/// Execute the list command
pub async fn list(history: &RequestHistory, filter: HistoryFilter, hours: Option<u32>, json: bool) -> Result<()> {
    let filter = HistoryFilter {
        start_time: hours.map(hours_ago),
        ..filter
    };
    let records = history.query.list(&filter).await;

    if json {
        let values: Vec<_> = records.iter().map(HistoryRecord::to_json).collect();
        println!("{}", serde_json::to_string_pretty(&values)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("{}", "No records found".yellow());
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec![
        Cell::new("REQUEST ID").fg(Color::Cyan),
        Cell::new("STARTED").fg(Color::Cyan),
        Cell::new("OWNER").fg(Color::Cyan),
        Cell::new("MODEL").fg(Color::Cyan),
        Cell::new("STATUS").fg(Color::Cyan),
        Cell::new("CODE").fg(Color::Cyan),
        Cell::new("TOKENS").fg(Color::Cyan),
        Cell::new("DURATION").fg(Color::Cyan),
    ]);

    for record in &records {
        let owner = record
            .owner_name
            .clone()
            .or_else(|| {
                record
                    .owner_key
                    .as_deref()
                    .map(|k| SensitiveApiKey::new(k).to_string())
            })
            .unwrap_or_else(|| "-".to_string());

        table.add_row(vec![
            Cell::new(&record.request_id),
            Cell::new(format_timestamp(record.start_time)),
            Cell::new(owner),
            Cell::new(&record.model),
            status_cell(record.status),
            Cell::new(record.status_code.map(|c| c.to_string()).unwrap_or_else(|| "-".to_string())),
            Cell::new(record.tokens.map(|t| t.total_tokens.to_string()).unwrap_or_else(|| "-".to_string())),
            Cell::new(
                record
                    .duration_ms()
                    .map(|d| format!("{} ms", d))
                    .unwrap_or_else(|| "-".to_string()),
            ),
        ]);
    }

    println!("{}", table);
    println!(
        "Showing {} record(s) from offset {}",
        records.len(),
        filter.effective_offset()
    );
    Ok(())
}

/// Execute the show command
pub async fn show(history: &RequestHistory, request_id: &str) -> Result<()> {
    match history.query.get(request_id).await {
        Some(record) => {
            println!("{}", serde_json::to_string_pretty(&record.to_json())?);
            Ok(())
        }
        None => bail!("Record {} not found", request_id),
    }
}

/// Execute the delete command
pub async fn delete(history: &RequestHistory, request_id: &str) -> Result<()> {
    if history.query.delete(request_id).await {
        println!("{} {}", "✓ Deleted".green(), request_id);
        Ok(())
    } else {
        bail!("Record {} was not deleted (missing or store error)", request_id)
    }
}

/// Execute the clear command
pub async fn clear(
    history: &RequestHistory,
    owner: Option<String>,
    older_than_days: Option<u32>,
    yes: bool,
) -> Result<()> {
    if owner.is_none() && older_than_days.is_none() && !yes {
        bail!("Refusing to clear every record without --yes");
    }

    let before = older_than_days.map(|days| hours_ago(days.saturating_mul(24)));
    let removed = history.query.clear(owner.as_deref(), before).await;

    println!("{} {} record(s)", "✓ Cleared".green(), removed);
    Ok(())
}
