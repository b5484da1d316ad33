use anyhow::Result;
use std::io::Write;

use crate::state::HistoryEntry;

/// Export history to CSV, newest first
pub fn export_csv<W: Write>(entries: &[HistoryEntry], mut writer: W) -> Result<()> {
    writeln!(writer, "timestamp,download_mbps,upload_mbps,latency_ms")?;

    for entry in entries {
        writeln!(
            writer,
            "{},{:.2},{:.2},{}",
            escape_csv(&entry.timestamp.to_rfc3339()),
            finite_or_zero(entry.download_mbps),
            finite_or_zero(entry.upload_mbps),
            entry.latency_ms.map(|ms| ms.to_string()).unwrap_or_default()
        )?;
    }

    Ok(())
}

fn finite_or_zero(v: f64) -> f64 {
    if v.is_finite() { v } else { 0.0 }
}

/// Escape a string for CSV (quote if contains comma, quote, or newline)
fn escape_csv(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}
