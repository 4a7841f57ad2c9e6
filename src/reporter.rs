use std::io::Write;

use anyhow::{Context, Result};

use crate::types::AlertRecord;

/// Emit a published alert as a single JSON line.
pub fn report_alert(out: &mut dyn Write, record: &AlertRecord) -> Result<()> {
    let json = serde_json::to_string(record).context("failed to serialize alert record")?;
    writeln!(out, "{json}").context("failed to write alert record")?;
    out.flush().context("failed to flush alert record")?;
    Ok(())
}
