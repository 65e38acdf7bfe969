//! Excel workbooks via the `xlsx2csv` CLI.
//!
//! Every sheet becomes a `--- Sheet: {name} ---` header followed by one line
//! per row, cells separated by single spaces.

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use ragmem_core::defaults::EXTRACTION_CMD_TIMEOUT_SECS;
use ragmem_core::{Error, ExtractionAdapter, Result};

use super::{run_cmd_with_timeout, tool_available, write_temp};

/// Line xlsx2csv prints before each sheet when run with `--all`.
const SHEET_DELIMITER: &str = "--------";

pub struct SpreadsheetAdapter {
    timeout_secs: u64,
}

impl SpreadsheetAdapter {
    pub fn new() -> Self {
        Self {
            timeout_secs: EXTRACTION_CMD_TIMEOUT_SECS,
        }
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

impl Default for SpreadsheetAdapter {
    fn default() -> Self {
        Self::new()
    }
}

/// Rewrite tab-separated `xlsx2csv --all` output into sheet blocks.
///
/// Sheet headers look like `-------- 1 - Budget`.
fn reformat_sheets(raw: &str) -> String {
    let mut text = String::with_capacity(raw.len());
    for line in raw.lines() {
        if let Some(header) = line.strip_prefix(SHEET_DELIMITER) {
            let header = header.trim();
            let name = header
                .split_once(" - ")
                .map(|(_, name)| name)
                .unwrap_or(header);
            text.push_str(&format!("--- Sheet: {} ---\n", name));
            continue;
        }
        let row = line
            .split('\t')
            .map(str::trim)
            .collect::<Vec<_>>()
            .join(" ");
        text.push_str(row.trim_end());
        text.push('\n');
    }
    text
}

#[async_trait]
impl ExtractionAdapter for SpreadsheetAdapter {
    fn extensions(&self) -> &'static [&'static str] {
        &["xlsx"]
    }

    async fn extract(&self, data: &[u8], file_name: &str) -> Result<String> {
        if !data.starts_with(b"PK\x03\x04") {
            return Err(Error::Parse(format!(
                "{} is not a valid xlsx archive",
                file_name
            )));
        }
        let tmpfile = write_temp(data, "xlsx")?;

        debug!(
            subsystem = "jobs",
            component = "extraction",
            adapter = "spreadsheet",
            file_name,
            "Converting with xlsx2csv"
        );
        let raw = run_cmd_with_timeout(
            "xlsx2csv",
            Command::new("xlsx2csv")
                .arg("--all")
                .arg("--delimiter")
                .arg("tab")
                .arg(tmpfile.path()),
            self.timeout_secs,
        )
        .await?;
        Ok(reformat_sheets(&raw))
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(tool_available("xlsx2csv", "--version").await)
    }

    fn name(&self) -> &str {
        "spreadsheet"
    }
}
