//! Scriptable in-process backend for tests.
//!
//! Embeddings are a normalized bag of hashed words, so texts sharing words
//! land close together without a model. Generation returns a canned reply
//! and records the rendered prompt for later assertions.
//!
//! ```rust,ignore
//! let backend = MockInferenceBackend::new()
//!     .with_dimension(8)
//!     .with_fixed_response("From the handbook.");
//! let reply = backend.complete(&[ConversationTurn::user("hi")], 0.7).await?;
//! assert_eq!(backend.last_prompt().as_deref(), Some("user: hi"));
//! ```

use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;

use ragmem_core::{
    ConversationTurn, EmbeddingBackend, Error, GenerationBackend, InferenceBackend, Result, Role,
    Vector,
};

/// One recorded backend call.
#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    Embed { texts: Vec<String> },
    Generate { prompt: String, temperature: f32 },
}

#[derive(Debug, Clone)]
struct Script {
    dimension: usize,
    reply: String,
    replies_by_question: HashMap<String, String>,
    pinned_vectors: HashMap<String, Vec<f32>>,
    latency: Duration,
    failure_rate: f64,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            dimension: 384,
            reply: "Mock response".to_string(),
            replies_by_question: HashMap::new(),
            pinned_vectors: HashMap::new(),
            latency: Duration::ZERO,
            failure_rate: 0.0,
        }
    }
}

/// Embedding and generation backend with scripted behavior.
///
/// Clones share the call log.
#[derive(Clone, Default)]
pub struct MockInferenceBackend {
    script: Arc<Script>,
    calls: Arc<Mutex<Vec<MockCall>>>,
}

impl MockInferenceBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dimension(mut self, dimension: usize) -> Self {
        Arc::make_mut(&mut self.script).dimension = dimension;
        self
    }

    /// Reply used when no question-specific reply matches.
    pub fn with_fixed_response(mut self, reply: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.script).reply = reply.into();
        self
    }

    /// Reply with `reply` when the last user turn is exactly `question`.
    pub fn with_response_mapping(
        mut self,
        question: impl Into<String>,
        reply: impl Into<String>,
    ) -> Self {
        Arc::make_mut(&mut self.script)
            .replies_by_question
            .insert(question.into(), reply.into());
        self
    }

    /// Embed `text` as exactly `vector`.
    pub fn with_vector_mapping(mut self, text: impl Into<String>, vector: Vec<f32>) -> Self {
        Arc::make_mut(&mut self.script)
            .pinned_vectors
            .insert(text.into(), vector);
        self
    }

    pub fn with_latency_ms(mut self, millis: u64) -> Self {
        Arc::make_mut(&mut self.script).latency = Duration::from_millis(millis);
        self
    }

    /// Fail each call with probability `rate`, clamped to [0, 1].
    pub fn with_failure_rate(mut self, rate: f64) -> Self {
        Arc::make_mut(&mut self.script).failure_rate = rate.clamp(0.0, 1.0);
        self
    }

    pub fn failing(self) -> Self {
        self.with_failure_rate(1.0)
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.lock_calls().clone()
    }

    pub fn embed_call_count(&self) -> usize {
        self.lock_calls()
            .iter()
            .filter(|c| matches!(c, MockCall::Embed { .. }))
            .count()
    }

    pub fn generate_call_count(&self) -> usize {
        self.lock_calls()
            .iter()
            .filter(|c| matches!(c, MockCall::Generate { .. }))
            .count()
    }

    /// Temperatures of every generation call, oldest first.
    pub fn temperatures(&self) -> Vec<f32> {
        self.lock_calls()
            .iter()
            .filter_map(|c| match c {
                MockCall::Generate { temperature, .. } => Some(*temperature),
                MockCall::Embed { .. } => None,
            })
            .collect()
    }

    /// Prompt of the latest generation call, one `role: content` line per turn.
    pub fn last_prompt(&self) -> Option<String> {
        self.lock_calls().iter().rev().find_map(|c| match c {
            MockCall::Generate { prompt, .. } => Some(prompt.clone()),
            MockCall::Embed { .. } => None,
        })
    }

    fn lock_calls(&self) -> MutexGuard<'_, Vec<MockCall>> {
        self.calls.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn record(&self, call: MockCall) -> bool {
        self.lock_calls().push(call);
        if !self.script.latency.is_zero() {
            tokio::time::sleep(self.script.latency).await;
        }
        match self.script.failure_rate {
            r if r >= 1.0 => true,
            r if r > 0.0 => rand::thread_rng().gen_bool(r),
            _ => false,
        }
    }
}

#[async_trait]
impl EmbeddingBackend for MockInferenceBackend {
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vector>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let failed = self
            .record(MockCall::Embed {
                texts: texts.to_vec(),
            })
            .await;
        if failed {
            return Err(Error::Embedding("simulated failure".to_string()));
        }

        Ok(texts
            .iter()
            .map(|text| match self.script.pinned_vectors.get(text) {
                Some(pinned) => Vector::from(pinned.clone()),
                None => Vector::from(hashed_embedding(text, self.script.dimension)),
            })
            .collect())
    }

    fn dimension(&self) -> usize {
        self.script.dimension
    }

    fn model_name(&self) -> &str {
        "mock-embed"
    }
}

#[async_trait]
impl GenerationBackend for MockInferenceBackend {
    async fn complete(&self, messages: &[ConversationTurn], temperature: f32) -> Result<String> {
        let prompt = messages
            .iter()
            .map(|m| format!("{}: {}", m.role, m.content))
            .collect::<Vec<_>>()
            .join("\n");
        if self.record(MockCall::Generate { prompt, temperature }).await {
            return Err(Error::Inference("simulated failure".to_string()));
        }

        let question = messages.iter().rev().find(|m| m.role == Role::User);
        let reply = question
            .and_then(|q| self.script.replies_by_question.get(&q.content))
            .unwrap_or(&self.script.reply);
        Ok(reply.clone())
    }

    fn model_name(&self) -> &str {
        "mock-gen"
    }
}

#[async_trait]
impl InferenceBackend for MockInferenceBackend {
    async fn health_check(&self) -> Result<bool> {
        Ok(self.script.failure_rate < 1.0)
    }
}

/// Unit-length bag-of-words vector; each lowercased word bumps one bucket.
pub fn hashed_embedding(text: &str, dimension: usize) -> Vec<f32> {
    let mut buckets = vec![0.0f32; dimension];
    if dimension == 0 {
        return buckets;
    }
    for word in text.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        word.to_lowercase().hash(&mut hasher);
        buckets[(hasher.finish() % dimension as u64) as usize] += 1.0;
    }
    let norm = buckets.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        buckets.iter_mut().for_each(|x| *x /= norm);
    }
    buckets
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn dot(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[tokio::test]
    async fn test_embeddings_have_configured_dimension_and_repeat() {
        let backend = MockInferenceBackend::new().with_dimension(64);
        let first = backend.embed_texts(&texts(&["quantum computing"])).await.unwrap();
        let second = backend.embed_texts(&texts(&["quantum computing"])).await.unwrap();
        assert_eq!(first[0].as_slice().len(), 64);
        assert_eq!(first, second);
        assert_eq!(backend.embed_call_count(), 2);
    }

    #[test]
    fn test_shared_words_score_higher() {
        let query = hashed_embedding("vacation policy", 256);
        let related = hashed_embedding("the vacation policy for staff", 256);
        let unrelated = hashed_embedding("expense receipts", 256);
        assert!(dot(&query, &related) > dot(&query, &unrelated));
        let norm = dot(&related, &related).sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
        assert!(hashed_embedding("", 8).iter().all(|x| *x == 0.0));
    }

    #[tokio::test]
    async fn test_pinned_vector_wins() {
        let backend = MockInferenceBackend::new()
            .with_dimension(3)
            .with_vector_mapping("north", vec![0.0, 1.0, 0.0]);
        let vectors = backend.embed_texts(&texts(&["north"])).await.unwrap();
        assert_eq!(vectors[0].as_slice(), &[0.0, 1.0, 0.0]);
    }

    #[tokio::test]
    async fn test_reply_selection_and_prompt_log() {
        let backend = MockInferenceBackend::new()
            .with_fixed_response("fallback")
            .with_response_mapping("hello", "world");

        let turns = vec![ConversationTurn::system("be brief"), ConversationTurn::user("hello")];
        assert_eq!(backend.complete(&turns, 0.2).await.unwrap(), "world");
        assert_eq!(
            backend.complete(&[ConversationTurn::user("other")], 0.4).await.unwrap(),
            "fallback"
        );

        assert_eq!(backend.generate_call_count(), 2);
        assert_eq!(backend.temperatures(), vec![0.2, 0.4]);
        assert_eq!(backend.last_prompt().as_deref(), Some("user: other"));
        assert_eq!(
            backend.calls()[0],
            MockCall::Generate {
                prompt: "system: be brief\nuser: hello".to_string(),
                temperature: 0.2
            }
        );
    }

    #[tokio::test]
    async fn test_failing_backend() {
        let backend = MockInferenceBackend::new().failing();
        assert!(matches!(
            backend.embed_texts(&texts(&["x"])).await,
            Err(Error::Embedding(_))
        ));
        assert!(matches!(
            backend.complete(&[ConversationTurn::user("hi")], 0.7).await,
            Err(Error::Inference(_))
        ));
        assert!(!backend.health_check().await.unwrap());
        // Empty input never reaches the script.
        assert!(backend.embed_texts(&[]).await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_latency_is_simulated() {
        let backend = MockInferenceBackend::new().with_latency_ms(50);
        let start = tokio::time::Instant::now();
        backend.embed_texts(&texts(&["test"])).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(50));
    }
}
