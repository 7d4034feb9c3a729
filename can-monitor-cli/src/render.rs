//! Terminal rendering of the presentation rows

use can_monitor_core::{DisplayRow, InfoMessage, PresentationTable};
use std::fmt::Write as _;

/// Render the message table as fixed-width text
pub fn render_table(presentation: &PresentationTable, period_mode: bool, with_names: bool) -> String {
    let mut out = String::new();
    let time_header = if period_mode { "Period (ms)" } else { "Time (ms)" };

    let _ = write!(
        out,
        "{:<13} {:<10} {:>3}  {:<24} {:>8} {:>12}",
        "Type", "ID", "Len", "Data", "Count", time_header
    );
    if with_names {
        let _ = write!(out, "  Name");
    }
    out.push('\n');
    out.push_str(&"─".repeat(if with_names { 96 } else { 76 }));
    out.push('\n');

    for row in presentation.rows() {
        out.push_str(&render_row(row, with_names));
        out.push('\n');
    }
    out
}

fn render_row(row: &DisplayRow, with_names: bool) -> String {
    let mut line = format!(
        "{:<13} {:<10} {:>3}  {:<24} {:>8} {:>12}",
        row.type_string, row.id_string, row.length, row.data_string, row.count, row.time_string
    );
    if with_names {
        let _ = write!(line, "  {}", row.name.as_deref().unwrap_or("-"));
    }
    line
}

/// Render operator messages, one per line
pub fn render_info(messages: &[InfoMessage]) -> String {
    messages
        .iter()
        .map(|message| message.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}
