//! Chat orchestration: retrieve, assemble, generate.
//!
//! [`ChatOrchestrator::converse`] never fails. Retrieval problems degrade to
//! an empty context and generation problems to an apology, and the path
//! taken is recorded in [`ChatReply::stage_trace`].

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use ragmem_core::defaults::{
    CHAT_MEMORY_LIMIT, CHAT_TEMPERATURE, CHAT_TEMPERATURE_MAX, HISTORY_WINDOW,
    RETRIEVAL_TIMEOUT_SECS, TOP_K, TOP_K_MAX,
};
use ragmem_core::{
    ConversationTurn, Error, GenerationBackend, Memory, MemoryQuery, Result, RetrievalIndex,
    SearchRequest, SearchResult,
};

use crate::context::{assemble, build_messages, Source};
use crate::memory_store::MemoryStore;

// =============================================================================
// SETTINGS
// =============================================================================

/// Tunables for [`ChatOrchestrator`].
#[derive(Debug, Clone, PartialEq)]
pub struct ChatSettings {
    /// Conversation turns kept in the prompt.
    pub history_window: usize,
    /// Upper bound on document and memory retrieval.
    pub retrieval_timeout: Duration,
    /// Memories pulled into each conversation.
    pub memory_limit: usize,
    /// Used when a request carries no temperature.
    pub default_temperature: f32,
    /// Used when a request carries no `top_k`.
    pub top_k: usize,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            history_window: HISTORY_WINDOW,
            retrieval_timeout: Duration::from_secs(RETRIEVAL_TIMEOUT_SECS),
            memory_limit: CHAT_MEMORY_LIMIT,
            default_temperature: CHAT_TEMPERATURE,
            top_k: TOP_K,
        }
    }
}

// =============================================================================
// REQUEST / REPLY
// =============================================================================

/// One chat turn from a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub query: String,
    pub user_id: Uuid,
    #[serde(default)]
    pub history: Vec<ConversationTurn>,
    /// Restrict retrieval to these documents.
    #[serde(default)]
    pub document_ids: Option<Vec<Uuid>>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub top_k: Option<usize>,
    #[serde(default = "default_true")]
    pub use_retrieval: bool,
    #[serde(default = "default_true")]
    pub use_memory: bool,
    /// Free-form clarification appended to the context.
    #[serde(default)]
    pub extra_prompt: Option<String>,
}

fn default_true() -> bool {
    true
}

impl ChatRequest {
    pub fn new(user_id: Uuid, query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            user_id,
            history: Vec::new(),
            document_ids: None,
            temperature: None,
            top_k: None,
            use_retrieval: true,
            use_memory: true,
            extra_prompt: None,
        }
    }

    pub fn with_history(mut self, history: Vec<ConversationTurn>) -> Self {
        self.history = history;
        self
    }

    pub fn with_documents(mut self, document_ids: Vec<Uuid>) -> Self {
        self.document_ids = Some(document_ids);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }

    pub fn with_extra_prompt(mut self, extra: impl Into<String>) -> Self {
        self.extra_prompt = Some(extra.into());
        self
    }

    pub fn without_retrieval(mut self) -> Self {
        self.use_retrieval = false;
        self
    }

    pub fn without_memory(mut self) -> Self {
        self.use_memory = false;
        self
    }

    /// Reject malformed requests before any work runs.
    pub fn validate(&self) -> Result<()> {
        if self.query.trim().is_empty() {
            return Err(Error::InvalidInput("query is empty".into()));
        }
        if let Some(t) = self.temperature {
            if !t.is_finite() || !(0.0..=CHAT_TEMPERATURE_MAX).contains(&t) {
                return Err(Error::InvalidInput(format!(
                    "temperature must be within [0, {}], got {}",
                    CHAT_TEMPERATURE_MAX, t
                )));
            }
        }
        if let Some(k) = self.top_k {
            if k == 0 || k > TOP_K_MAX {
                return Err(Error::InvalidInput(format!(
                    "top_k must be within [1, {}], got {}",
                    TOP_K_MAX, k
                )));
            }
        }
        Ok(())
    }
}

/// Stages a conversation passes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatStage {
    Start,
    Retrieve,
    RetrieveFailed,
    Assemble,
    Generate,
    GenerateFailed,
    Done,
}

impl fmt::Display for ChatStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => write!(f, "start"),
            Self::Retrieve => write!(f, "retrieve"),
            Self::RetrieveFailed => write!(f, "retrieve_failed"),
            Self::Assemble => write!(f, "assemble"),
            Self::Generate => write!(f, "generate"),
            Self::GenerateFailed => write!(f, "generate_failed"),
            Self::Done => write!(f, "done"),
        }
    }
}

/// Result of a conversation turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatReply {
    pub reply: String,
    pub sources: Vec<Source>,
    pub memories: Vec<Memory>,
    pub stage_trace: Vec<ChatStage>,
}

impl ChatReply {
    pub fn degraded(&self) -> bool {
        self.stage_trace
            .iter()
            .any(|s| matches!(s, ChatStage::RetrieveFailed | ChatStage::GenerateFailed))
    }
}

/// Text returned in place of a reply when generation fails.
pub fn apology(error: &Error) -> String {
    format!("Sorry, I could not generate a reply: {}", error)
}

// =============================================================================
// ORCHESTRATOR
// =============================================================================

/// Top-level chat entry point.
pub struct ChatOrchestrator {
    index: Arc<dyn RetrievalIndex>,
    memories: Arc<MemoryStore>,
    generator: Arc<dyn GenerationBackend>,
    settings: ChatSettings,
}

impl ChatOrchestrator {
    pub fn new(
        index: Arc<dyn RetrievalIndex>,
        memories: Arc<MemoryStore>,
        generator: Arc<dyn GenerationBackend>,
    ) -> Self {
        Self {
            index,
            memories,
            generator,
            settings: ChatSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: ChatSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &ChatSettings {
        &self.settings
    }

    /// Answer one chat turn.
    #[instrument(skip(self, request), fields(
        subsystem = "service",
        component = "orchestrator",
        op = "converse",
        user_id = %request.user_id,
    ))]
    pub async fn converse(&self, request: &ChatRequest) -> ChatReply {
        let start = Instant::now();
        let mut trace = vec![ChatStage::Start, ChatStage::Retrieve];

        let (documents, memories) = tokio::join!(
            self.retrieve_documents(request),
            self.retrieve_memories(request)
        );
        let results = documents.unwrap_or_else(|e| {
            warn!(error = %e, "Document retrieval failed, continuing without sources");
            trace.push(ChatStage::RetrieveFailed);
            Vec::new()
        });
        let memories = memories.unwrap_or_else(|e| {
            warn!(error = %e, "Memory retrieval failed, continuing without memories");
            if !trace.contains(&ChatStage::RetrieveFailed) {
                trace.push(ChatStage::RetrieveFailed);
            }
            Vec::new()
        });

        trace.push(ChatStage::Assemble);
        let assembled = assemble(
            &results,
            &memories,
            &request.history,
            request.extra_prompt.as_deref(),
            self.settings.history_window,
        );
        let messages = build_messages(&assembled.context, &assembled.history, &request.query);

        trace.push(ChatStage::Generate);
        let temperature = self.effective_temperature(request.temperature);
        let reply = match self.generator.complete(&messages, temperature).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "Generation failed, replying with apology");
                trace.push(ChatStage::GenerateFailed);
                apology(&e)
            }
        };
        trace.push(ChatStage::Done);

        if !trace.contains(&ChatStage::GenerateFailed) {
            let mut turns = assembled.history;
            turns.push(ConversationTurn::user(request.query.as_str()));
            turns.push(ConversationTurn::assistant(reply.as_str()));
            if let Err(e) = self
                .memories
                .extract_from_conversation(request.user_id, &turns)
                .await
            {
                warn!(error = %e, "Memory extraction failed");
            }
        }

        info!(
            source_count = assembled.sources.len(),
            memory_count = memories.len(),
            temperature,
            degraded = trace.contains(&ChatStage::RetrieveFailed)
                || trace.contains(&ChatStage::GenerateFailed),
            duration_ms = start.elapsed().as_millis() as u64,
            "Chat reply ready"
        );

        ChatReply {
            reply,
            sources: assembled.sources,
            memories,
            stage_trace: trace,
        }
    }

    /// Like [`converse`](Self::converse), but gives up with
    /// [`Error::Cancelled`] once `cancel` fires.
    pub async fn converse_with_cancel(
        &self,
        request: &ChatRequest,
        cancel: &CancellationToken,
    ) -> Result<ChatReply> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!(
                    subsystem = "service",
                    component = "orchestrator",
                    user_id = %request.user_id,
                    "Conversation cancelled"
                );
                Err(Error::Cancelled)
            }
            reply = self.converse(request) => Ok(reply),
        }
    }

    async fn retrieve_documents(&self, request: &ChatRequest) -> Result<Vec<SearchResult>> {
        if !request.use_retrieval {
            return Ok(vec![]);
        }
        let mut search = SearchRequest::new(request.query.as_str(), request.user_id)
            .with_top_k(request.top_k.unwrap_or(self.settings.top_k).min(TOP_K_MAX));
        if let Some(ids) = &request.document_ids {
            search = search.with_documents(ids.clone());
        }

        let results = tokio::time::timeout(self.settings.retrieval_timeout, self.index.search(&search))
            .await
            .map_err(|_| {
                Error::Internal(format!(
                    "retrieval timed out after {}s",
                    self.settings.retrieval_timeout.as_secs()
                ))
            })??;
        debug!(
            backend = self.index.backend_name(),
            result_count = results.len(),
            "Documents retrieved"
        );
        Ok(results)
    }

    async fn retrieve_memories(&self, request: &ChatRequest) -> Result<Vec<Memory>> {
        if !request.use_memory || self.settings.memory_limit == 0 {
            return Ok(vec![]);
        }
        let query = MemoryQuery::default()
            .with_query(request.query.as_str())
            .with_limit(self.settings.memory_limit);
        tokio::time::timeout(
            self.settings.retrieval_timeout,
            self.memories.retrieve(request.user_id, &query),
        )
        .await
        .map_err(|_| Error::Internal("memory retrieval timed out".into()))?
    }

    fn effective_temperature(&self, requested: Option<f32>) -> f32 {
        let t = requested.unwrap_or(self.settings.default_temperature);
        if t.is_finite() {
            t.clamp(0.0, CHAT_TEMPERATURE_MAX)
        } else {
            self.settings.default_temperature
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragmem_db::InMemoryStore;
    use ragmem_inference::MockInferenceBackend;
    use ragmem_search::KeywordIndex;

    fn orchestrator(generator: MockInferenceBackend) -> (ChatOrchestrator, Arc<MockInferenceBackend>) {
        let store = Arc::new(InMemoryStore::new());
        let generator = Arc::new(generator);
        let orchestrator = ChatOrchestrator::new(
            Arc::new(KeywordIndex::new(store.clone())),
            Arc::new(MemoryStore::new(store)),
            generator.clone(),
        );
        (orchestrator, generator)
    }

    #[test]
    fn test_request_validation() {
        let user = Uuid::now_v7();
        assert!(ChatRequest::new(user, "hello").validate().is_ok());
        assert!(matches!(
            ChatRequest::new(user, "  ").validate(),
            Err(Error::InvalidInput(_))
        ));
        assert!(ChatRequest::new(user, "hi").with_temperature(2.5).validate().is_err());
        assert!(ChatRequest::new(user, "hi").with_temperature(-0.1).validate().is_err());
        assert!(ChatRequest::new(user, "hi").with_temperature(2.0).validate().is_ok());
        assert!(ChatRequest::new(user, "hi").with_top_k(0).validate().is_err());
    }

    #[test]
    fn test_request_deserializes_with_defaults() {
        let json = format!(r#"{{"query":"hi","user_id":"{}"}}"#, Uuid::nil());
        let request: ChatRequest = serde_json::from_str(&json).unwrap();
        assert!(request.use_retrieval);
        assert!(request.use_memory);
        assert!(request.history.is_empty());
        assert_eq!(request.temperature, None);
    }

    #[tokio::test]
    async fn test_happy_path_trace() {
        let (orchestrator, _) = orchestrator(MockInferenceBackend::new().with_fixed_response("Hello!"));
        let reply = orchestrator
            .converse(&ChatRequest::new(Uuid::now_v7(), "hello there"))
            .await;
        assert_eq!(reply.reply, "Hello!");
        assert_eq!(
            reply.stage_trace,
            vec![
                ChatStage::Start,
                ChatStage::Retrieve,
                ChatStage::Assemble,
                ChatStage::Generate,
                ChatStage::Done
            ]
        );
        assert!(!reply.degraded());
    }

    #[tokio::test]
    async fn test_generation_failure_becomes_apology() {
        let (orchestrator, _) = orchestrator(MockInferenceBackend::new().failing());
        let reply = orchestrator
            .converse(&ChatRequest::new(Uuid::now_v7(), "hello"))
            .await;
        assert_eq!(
            reply.reply,
            "Sorry, I could not generate a reply: Inference error: simulated failure"
        );
        assert!(reply.stage_trace.contains(&ChatStage::GenerateFailed));
        assert_eq!(reply.stage_trace.last(), Some(&ChatStage::Done));
    }

    #[tokio::test]
    async fn test_temperature_is_clamped() {
        let (orchestrator, generator) = orchestrator(MockInferenceBackend::new());
        let mut request = ChatRequest::new(Uuid::now_v7(), "hello");
        request.temperature = Some(9.0);
        orchestrator.converse(&request).await;

        request.temperature = None;
        orchestrator.converse(&request).await;

        assert_eq!(generator.temperatures(), vec![2.0, CHAT_TEMPERATURE]);
    }

    #[tokio::test]
    async fn test_cancelled_before_generation_finishes() {
        let (orchestrator, _) = orchestrator(MockInferenceBackend::new().with_latency_ms(5_000));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = orchestrator
            .converse_with_cancel(&ChatRequest::new(Uuid::now_v7(), "hello"), &cancel)
            .await;
        assert!(matches!(result, Err(Error::Cancelled)));
    }
}
