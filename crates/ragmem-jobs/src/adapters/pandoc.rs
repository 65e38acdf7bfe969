//! Word documents via `pandoc -t plain`.

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use ragmem_core::defaults::EXTRACTION_CMD_TIMEOUT_SECS;
use ragmem_core::{Error, ExtractionAdapter, Result};

use super::{run_cmd_with_timeout, tool_available, write_temp};

/// Zip local-file header; every docx starts with it.
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

pub struct PandocAdapter {
    timeout_secs: u64,
}

impl PandocAdapter {
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

impl Default for PandocAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExtractionAdapter for PandocAdapter {
    fn extensions(&self) -> &'static [&'static str] {
        &["docx"]
    }

    async fn extract(&self, data: &[u8], file_name: &str) -> Result<String> {
        if !data.starts_with(ZIP_MAGIC) {
            return Err(Error::Parse(format!(
                "{} is not a valid docx archive",
                file_name
            )));
        }
        let tmpfile = write_temp(data, "docx")?;

        debug!(
            subsystem = "jobs",
            component = "extraction",
            adapter = "pandoc",
            file_name,
            "Converting with pandoc"
        );
        run_cmd_with_timeout(
            "pandoc",
            Command::new("pandoc")
                .arg("-f")
                .arg("docx")
                .arg("-t")
                .arg("plain")
                .arg("--wrap=none")
                .arg(tmpfile.path()),
            self.timeout_secs,
        )
        .await
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(tool_available("pandoc", "--version").await)
    }

    fn name(&self) -> &str {
        "pandoc"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_non_zip_is_parse_error() {
        let err = PandocAdapter::new()
            .extract(b"plain text pretending", "report.docx")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Parse(ref m) if m.contains("report.docx")));
    }

    #[test]
    fn test_extensions() {
        assert_eq!(PandocAdapter::new().extensions(), &["docx"]);
        assert_eq!(PandocAdapter::default().name(), "pandoc");
    }
}
