//! Plain text, markdown and CSV.

use async_trait::async_trait;

use ragmem_core::{ExtractionAdapter, Result};

/// Reads bytes as UTF-8, replacing invalid sequences.
///
/// A leading byte-order mark is stripped.
pub struct TextNativeAdapter;

#[async_trait]
impl ExtractionAdapter for TextNativeAdapter {
    fn extensions(&self) -> &'static [&'static str] {
        &["txt", "md", "csv"]
    }

    async fn extract(&self, data: &[u8], _file_name: &str) -> Result<String> {
        let data = data.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(data);
        Ok(String::from_utf8_lossy(data).into_owned())
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    fn name(&self) -> &str {
        "text_native"
    }
}
