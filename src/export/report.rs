use chrono::Local;
use std::io::Write;

use crate::state::HistoryEntry;

/// Mbps with one decimal, ties rounded up; non-finite values render as 0.0
pub fn format_mbps(mbps: f64) -> String {
    if mbps.is_finite() {
        // `{:.1}` alone rounds exact ties to even (12.25 -> 12.2)
        format!("{:.1}", (mbps * 10.0).round() / 10.0)
    } else {
        "0.0".to_string()
    }
}

/// Latency in whole ms, or an em dash when unknown
pub fn format_latency(latency_ms: Option<u64>) -> String {
    match latency_ms {
        Some(ms) => ms.to_string(),
        None => "\u{2014}".to_string(),
    }
}

/// One history line: `<time> • Down <d> Mbps • Up <u> Mbps • Latency <l> ms`
///
/// The timestamp is shown in local time.
pub fn history_line(entry: &HistoryEntry) -> String {
    format!(
        "{} \u{2022} Down {} Mbps \u{2022} Up {} Mbps \u{2022} Latency {} ms",
        entry
            .timestamp
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M:%S"),
        format_mbps(entry.download_mbps),
        format_mbps(entry.upload_mbps),
        format_latency(entry.latency_ms)
    )
}

/// Print the history, newest first
pub fn generate_report<W: Write>(entries: &[HistoryEntry], mut writer: W) -> std::io::Result<()> {
    if entries.is_empty() {
        writeln!(writer, "No measurements recorded yet.")?;
        return Ok(());
    }
    for entry in entries {
        writeln!(writer, "{}", history_line(entry))?;
    }
    Ok(())
}
