//! Extraction adapter registry for dispatching file processing.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, instrument};

use ragmem_core::{Error, ExtractionAdapter, Result, TextExtractor};

use crate::adapters::{PandocAdapter, PdfTextAdapter, SpreadsheetAdapter, TextNativeAdapter};

/// Registry mapping file extensions to their adapters.
pub struct ExtractionRegistry {
    adapters: HashMap<&'static str, Arc<dyn ExtractionAdapter>>,
}

impl ExtractionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            adapters: HashMap::new(),
        }
    }

    /// Registry with every built-in adapter: text, PDF, docx, and xlsx.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(TextNativeAdapter));
        registry.register(Arc::new(PdfTextAdapter::new()));
        registry.register(Arc::new(PandocAdapter::new()));
        registry.register(Arc::new(SpreadsheetAdapter::new()));
        registry
    }

    /// Register an adapter for all of its extensions, replacing earlier ones.
    pub fn register(&mut self, adapter: Arc<dyn ExtractionAdapter>) {
        for ext in adapter.extensions() {
            self.adapters.insert(ext, adapter.clone());
        }
    }

    /// Check if an adapter handles the given extension.
    pub fn has_adapter(&self, file_type: &str) -> bool {
        self.adapters.contains_key(file_type.to_lowercase().as_str())
    }

    /// Registered extensions, sorted.
    pub fn available_extensions(&self) -> Vec<&'static str> {
        let mut exts: Vec<_> = self.adapters.keys().copied().collect();
        exts.sort_unstable();
        exts
    }

    /// Extract text from in-memory data using the adapter for `file_type`.
    pub async fn extract_bytes(&self, file_type: &str, data: &[u8], file_name: &str) -> Result<String> {
        let file_type = file_type.to_lowercase();
        let adapter = self
            .adapters
            .get(file_type.as_str())
            .ok_or_else(|| Error::UnsupportedFormat(file_type.clone()))?;
        adapter.extract(data, file_name).await
    }

    /// Run health checks on all registered adapters, keyed by adapter name.
    pub async fn health_check_all(&self) -> BTreeMap<String, bool> {
        let mut results = BTreeMap::new();
        for adapter in self.adapters.values() {
            if results.contains_key(adapter.name()) {
                continue;
            }
            let healthy = adapter.health_check().await.unwrap_or(false);
            results.insert(adapter.name().to_string(), healthy);
        }
        results
    }
}

impl Default for ExtractionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TextExtractor for ExtractionRegistry {
    #[instrument(skip(self), fields(subsystem = "jobs", component = "extraction", op = "extract"))]
    async fn extract(&self, file_path: &Path, file_type: &str) -> Result<String> {
        if !self.has_adapter(file_type) {
            return Err(Error::UnsupportedFormat(file_type.to_string()));
        }
        let start = Instant::now();
        let data = tokio::fs::read(file_path)
            .await
            .map_err(|e| Error::Parse(format!("cannot read {}: {}", file_path.display(), e)))?;
        let file_name = file_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let text = self.extract_bytes(file_type, &data, &file_name).await?;
        debug!(
            bytes = data.len(),
            chars = text.chars().count(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Text extracted"
        );
        Ok(text)
    }
}
