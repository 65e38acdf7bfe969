//! PDF text layer via `pdftotext` (poppler-utils).

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use ragmem_core::defaults::EXTRACTION_CMD_TIMEOUT_SECS;
use ragmem_core::{Error, ExtractionAdapter, Result};

use super::{run_cmd_with_timeout, tool_available, write_temp};

/// Extracts the text layer of a PDF. Scanned PDFs without one yield empty
/// text, which ingestion reports as a failure.
pub struct PdfTextAdapter {
    timeout_secs: u64,
}

impl PdfTextAdapter {
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

impl Default for PdfTextAdapter {
    fn default() -> Self {
        Self::new()
    }
}

/// Reject data that lacks the `%PDF` header before spawning anything.
fn check_magic(data: &[u8], file_name: &str) -> Result<()> {
    if data.starts_with(b"%PDF") {
        Ok(())
    } else {
        Err(Error::Parse(format!(
            "{} is not a valid PDF (missing %PDF header)",
            file_name
        )))
    }
}

#[async_trait]
impl ExtractionAdapter for PdfTextAdapter {
    fn extensions(&self) -> &'static [&'static str] {
        &["pdf"]
    }

    async fn extract(&self, data: &[u8], file_name: &str) -> Result<String> {
        check_magic(data, file_name)?;
        let tmpfile = write_temp(data, "pdf")?;

        debug!(
            subsystem = "jobs",
            component = "extraction",
            adapter = "pdf_text",
            file_name,
            "Running pdftotext"
        );
        run_cmd_with_timeout(
            "pdftotext",
            Command::new("pdftotext")
                .arg("-enc")
                .arg("UTF-8")
                .arg(tmpfile.path())
                .arg("-"),
            self.timeout_secs,
        )
        .await
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(tool_available("pdftotext", "-v").await)
    }

    fn name(&self) -> &str {
        "pdf_text"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_non_pdf_is_parse_error() {
        let err = PdfTextAdapter::new()
            .extract(b"hello world", "fake.pdf")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Parse(ref m) if m.contains("fake.pdf")));
    }

    #[tokio::test]
    async fn test_empty_is_parse_error() {
        let err = PdfTextAdapter::new().extract(b"", "empty.pdf").await.unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }

    #[test]
    fn test_magic_accepts_header() {
        assert!(check_magic(b"%PDF-1.7\n", "a.pdf").is_ok());
    }

    #[tokio::test]
    async fn test_health_check_does_not_error() {
        assert!(PdfTextAdapter::new().health_check().await.is_ok());
        assert_eq!(PdfTextAdapter::default().name(), "pdf_text");
    }
}
