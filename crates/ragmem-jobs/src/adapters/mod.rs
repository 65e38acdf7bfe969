//! Extraction adapters, one per family of file formats.

pub mod pandoc;
pub mod pdf_text;
pub mod spreadsheet;
pub mod text_native;

pub use pandoc::PandocAdapter;
pub use pdf_text::PdfTextAdapter;
pub use spreadsheet::SpreadsheetAdapter;
pub use text_native::TextNativeAdapter;

use std::io::{ErrorKind, Write};
use std::time::Duration;

use tempfile::NamedTempFile;
use tokio::process::Command;

use ragmem_core::{Error, Result};

/// Run an external tool with a timeout, returning its stdout.
///
/// A missing binary or a timeout is `Error::Extraction`; a non-zero exit means
/// the tool rejected the input and is `Error::Parse`.
pub(crate) async fn run_cmd_with_timeout(
    program: &str,
    cmd: &mut Command,
    timeout_secs: u64,
) -> Result<String> {
    cmd.kill_on_drop(true);
    let output = tokio::time::timeout(Duration::from_secs(timeout_secs), cmd.output())
        .await
        .map_err(|_| {
            Error::Extraction(format!("{} timed out after {}s", program, timeout_secs))
        })?
        .map_err(|e| match e.kind() {
            ErrorKind::NotFound => Error::Extraction(format!("{} is not installed", program)),
            _ => Error::Extraction(format!("failed to run {}: {}", program, e)),
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::Parse(format!(
            "{} failed ({}): {}",
            program,
            output.status,
            stderr.trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Copy `data` into a temp file so command-line tools can read it.
pub(crate) fn write_temp(data: &[u8], extension: &str) -> Result<NamedTempFile> {
    let mut tmpfile = tempfile::Builder::new()
        .prefix("ragmem-")
        .suffix(&format!(".{}", extension))
        .tempfile()
        .map_err(|e| Error::Internal(format!("Failed to create temp file: {}", e)))?;
    tmpfile
        .write_all(data)
        .map_err(|e| Error::Internal(format!("Failed to write temp file: {}", e)))?;
    Ok(tmpfile)
}

/// True when `program --version` (or `flag`) runs successfully.
pub(crate) async fn tool_available(program: &str, flag: &str) -> bool {
    match Command::new(program).arg(flag).output().await {
        Ok(output) => output.status.success(),
        Err(_) => false,
    }
}
