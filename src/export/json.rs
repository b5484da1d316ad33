use anyhow::Result;
use std::io::Write;

use crate::state::HistoryEntry;

/// Export history as a pretty-printed JSON array, newest first
pub fn export_json<W: Write>(entries: &[HistoryEntry], mut writer: W) -> Result<()> {
    serde_json::to_writer_pretty(&mut writer, entries)?;
    writeln!(writer)?;
    Ok(())
}

/// Export a single finished run
pub fn export_entry_json<W: Write>(entry: &HistoryEntry, mut writer: W) -> Result<()> {
    serde_json::to_writer_pretty(&mut writer, entry)?;
    writeln!(writer)?;
    Ok(())
}
