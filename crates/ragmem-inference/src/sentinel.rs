//! Zero-vector sentinel for failed embeddings.
//!
//! Query-time retrieval never fails on a provider outage: the embedding step
//! yields all-zero vectors instead, which similarity search treats as "no
//! match". Callers that must not store such vectors check [`is_sentinel`].

use std::time::{Duration, Instant};

use tracing::warn;

use ragmem_core::{EmbeddingBackend, Vector};

/// An all-zero vector of the given dimension.
pub fn sentinel_vector(dimension: usize) -> Vector {
    Vector::from(vec![0.0f32; dimension])
}

/// True when every component of the vector is zero.
pub fn is_sentinel(vector: &Vector) -> bool {
    vector.as_slice().iter().all(|x| *x == 0.0)
}

/// Embed `texts`, substituting sentinels on failure, timeout, or a short batch.
///
/// Always returns exactly one vector per input text.
pub async fn embed_or_sentinel(
    backend: &dyn EmbeddingBackend,
    texts: &[String],
    timeout: Duration,
) -> Vec<Vector> {
    if texts.is_empty() {
        return vec![];
    }
    let start = Instant::now();
    let fallback = || {
        texts
            .iter()
            .map(|_| sentinel_vector(backend.dimension()))
            .collect()
    };

    match tokio::time::timeout(timeout, backend.embed_texts(texts)).await {
        Ok(Ok(vectors)) if vectors.len() == texts.len() => vectors,
        Ok(Ok(vectors)) => {
            warn!(
                subsystem = "inference",
                component = "sentinel",
                op = "embed",
                expected = texts.len(),
                received = vectors.len(),
                "Embedding batch size mismatch, using zero vectors"
            );
            fallback()
        }
        Ok(Err(e)) => {
            warn!(
                subsystem = "inference",
                component = "sentinel",
                op = "embed",
                model = backend.model_name(),
                error = %e,
                duration_ms = start.elapsed().as_millis() as u64,
                "Embedding failed, using zero vectors"
            );
            fallback()
        }
        Err(_) => {
            warn!(
                subsystem = "inference",
                component = "sentinel",
                op = "embed",
                model = backend.model_name(),
                timeout_ms = timeout.as_millis() as u64,
                "Embedding timed out, using zero vectors"
            );
            fallback()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockInferenceBackend;

    fn texts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_sentinel_detection() {
        assert!(is_sentinel(&sentinel_vector(8)));
        assert!(!is_sentinel(&Vector::from(vec![0.0, 0.1, 0.0])));
    }

    #[tokio::test]
    async fn test_success_passes_through() {
        let backend = MockInferenceBackend::new().with_dimension(16);
        let vectors = embed_or_sentinel(&backend, &texts(&["a b", "c d"]), Duration::from_secs(1)).await;
        assert_eq!(vectors.len(), 2);
        assert!(vectors.iter().all(|v| !is_sentinel(v)));
    }

    #[tokio::test]
    async fn test_failure_yields_sentinels() {
        let backend = MockInferenceBackend::new().with_dimension(16).failing();
        let vectors = embed_or_sentinel(&backend, &texts(&["x", "y", "z"]), Duration::from_secs(1)).await;
        assert_eq!(vectors.len(), 3);
        assert!(vectors.iter().all(is_sentinel));
        assert_eq!(vectors[0].as_slice().len(), 16);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_yields_sentinels() {
        let backend = MockInferenceBackend::new()
            .with_dimension(4)
            .with_latency_ms(5_000);
        let vectors = embed_or_sentinel(&backend, &texts(&["slow"]), Duration::from_millis(100)).await;
        assert_eq!(vectors.len(), 1);
        assert!(is_sentinel(&vectors[0]));
    }

    #[tokio::test]
    async fn test_empty_input_skips_provider() {
        let backend = MockInferenceBackend::new();
        let vectors = embed_or_sentinel(&backend, &[], Duration::from_secs(1)).await;
        assert!(vectors.is_empty());
        assert_eq!(backend.embed_call_count(), 0);
    }
}
