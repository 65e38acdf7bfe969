//! HTTP client for `/embeddings`, `/chat/completions` and `/models`.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use ragmem_core::defaults::{
    EMBED_DIMENSION, EMBED_MODEL, GEN_MAX_TOKENS, GEN_MODEL, INFERENCE_TIMEOUT_SECS,
    OPENAI_BASE_URL,
};
use ragmem_core::{
    env, ConversationTurn, EmbeddingBackend, Error, GenerationBackend, InferenceBackend, Result,
    Vector,
};

use super::error::{to_ragmem_error, OpenAIErrorCode, Operation};
use super::types::*;

/// `/models` must answer within this long to count as healthy.
const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// Endpoint, credentials and models for one provider.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenAIConfig {
    pub base_url: String,
    /// Sent as a bearer token. Local servers usually need none.
    pub api_key: Option<String>,
    pub embed_model: String,
    pub gen_model: String,
    /// Length of every vector `embed_model` returns.
    pub embed_dimension: usize,
    /// Whole-request timeout.
    pub timeout_seconds: u64,
    pub max_tokens: u32,
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            base_url: OPENAI_BASE_URL.to_string(),
            api_key: None,
            embed_model: EMBED_MODEL.to_string(),
            gen_model: GEN_MODEL.to_string(),
            embed_dimension: EMBED_DIMENSION,
            timeout_seconds: INFERENCE_TIMEOUT_SECS,
            max_tokens: GEN_MAX_TOKENS,
        }
    }
}

impl OpenAIConfig {
    /// Read `OPENAI_*` variables, keeping defaults for unset ones.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            base_url: env::var_or("OPENAI_BASE_URL", OPENAI_BASE_URL),
            api_key: env::var("OPENAI_API_KEY"),
            embed_model: env::var_or("OPENAI_EMBED_MODEL", EMBED_MODEL),
            gen_model: env::var_or("OPENAI_GEN_MODEL", GEN_MODEL),
            embed_dimension: env::parse_or("OPENAI_EMBED_DIM", EMBED_DIMENSION)?,
            timeout_seconds: env::parse_or("OPENAI_TIMEOUT", INFERENCE_TIMEOUT_SECS)?,
            max_tokens: env::parse_or("OPENAI_MAX_TOKENS", GEN_MAX_TOKENS)?,
        })
    }
}

/// Embedding and generation over one OpenAI-format endpoint.
pub struct OpenAIBackend {
    client: Client,
    config: OpenAIConfig,
}

impl OpenAIBackend {
    pub fn new(config: OpenAIConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| Error::Config(format!("cannot build HTTP client: {}", e)))?;

        info!(
            subsystem = "inference",
            component = "openai",
            base_url = %config.base_url,
            embed_model = %config.embed_model,
            gen_model = %config.gen_model,
            embed_dimension = config.embed_dimension,
            authenticated = config.api_key.is_some(),
            "OpenAI-format backend ready"
        );

        Ok(Self { client, config })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(OpenAIConfig::from_env()?)
    }

    pub fn config(&self) -> &OpenAIConfig {
        &self.config
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), endpoint)
    }

    fn request(&self, method: Method, endpoint: &str) -> RequestBuilder {
        let builder = self.client.request(method, self.url(endpoint));
        match &self.config.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    /// POST `body` and decode a 2xx reply; every failure becomes the provider error for `op`.
    async fn post_json<B, T>(&self, op: Operation, endpoint: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let provider_error = |detail: String| match op {
            Operation::Embedding => Error::Embedding(detail),
            Operation::Generation => Error::Inference(detail),
        };

        let response = self
            .request(Method::POST, endpoint)
            .json(body)
            .send()
            .await
            .map_err(|e| provider_error(format!("{} unreachable: {}", endpoint, e)))?;

        if !response.status().is_success() {
            return Err(Self::rejection(op, response).await);
        }

        response
            .json()
            .await
            .map_err(|e| provider_error(format!("unreadable {} reply: {}", endpoint, e)))
    }

    async fn rejection(op: Operation, response: Response) -> Error {
        let status = response.status().as_u16();
        let text = response.text().await.unwrap_or_default();
        let (message, error_type) = match serde_json::from_str::<ErrorEnvelope>(&text) {
            Ok(body) => (body.error.message, body.error.error_type.unwrap_or_default()),
            Err(_) if text.trim().is_empty() => ("no error body".to_string(), String::new()),
            Err(_) => (text, String::new()),
        };
        let code = OpenAIErrorCode::from_response(status, &error_type);
        to_ragmem_error(op, status, code, &message)
    }
}

#[async_trait]
impl EmbeddingBackend for OpenAIBackend {
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vector>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        let start = Instant::now();

        debug!(
            subsystem = "inference",
            component = "openai",
            op = "embed",
            model = %self.config.embed_model,
            batch_size = texts.len(),
            "Embedding texts"
        );

        let reply: EmbeddingResponse = self
            .post_json(
                Operation::Embedding,
                "/embeddings",
                &EmbeddingRequest::floats(&self.config.embed_model, texts),
            )
            .await?;

        let vectors: Vec<Vector> = reply
            .into_ordered()
            .into_iter()
            .map(Vector::from)
            .collect();

        debug!(
            subsystem = "inference",
            component = "openai",
            op = "embed",
            result_count = vectors.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Embeddings generated"
        );
        Ok(vectors)
    }

    fn dimension(&self) -> usize {
        self.config.embed_dimension
    }

    fn model_name(&self) -> &str {
        &self.config.embed_model
    }
}

#[async_trait]
impl GenerationBackend for OpenAIBackend {
    async fn complete(&self, messages: &[ConversationTurn], temperature: f32) -> Result<String> {
        let start = Instant::now();
        debug!(
            subsystem = "inference",
            component = "openai",
            op = "complete",
            model = %self.config.gen_model,
            message_count = messages.len(),
            temperature,
            "Requesting chat completion"
        );

        let request = ChatCompletionRequest {
            model: &self.config.gen_model,
            messages: messages.iter().map(WireMessage::from).collect(),
            temperature,
            max_tokens: Some(self.config.max_tokens),
        };

        let reply: ChatCompletionResponse = self
            .post_json(Operation::Generation, "/chat/completions", &request)
            .await?;

        let usage = reply.usage;
        let content = reply
            .into_first_content()
            .ok_or_else(|| Error::Inference("response contained no choices".to_string()))?;

        debug!(
            subsystem = "inference",
            component = "openai",
            op = "complete",
            response_len = content.len(),
            prompt_tokens = usage.map(|u| u.prompt_tokens),
            completion_tokens = usage.map(|u| u.completion_tokens),
            duration_ms = start.elapsed().as_millis() as u64,
            "Chat completion finished"
        );
        Ok(content)
    }

    fn model_name(&self) -> &str {
        &self.config.gen_model
    }
}

#[async_trait]
impl InferenceBackend for OpenAIBackend {
    async fn health_check(&self) -> Result<bool> {
        let outcome = self
            .request(Method::GET, "/models")
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await;

        let healthy = match outcome {
            Ok(resp) if resp.status().is_success() => true,
            Ok(resp) => {
                warn!(
                    subsystem = "inference",
                    component = "openai",
                    op = "health_check",
                    status = resp.status().as_u16(),
                    "Provider rejected /models"
                );
                false
            }
            Err(e) => {
                warn!(
                    subsystem = "inference",
                    component = "openai",
                    op = "health_check",
                    error = %e,
                    "Provider unreachable"
                );
                false
            }
        };
        debug!(subsystem = "inference", component = "openai", healthy, "Health check done");
        Ok(healthy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = OpenAIConfig::default();
        assert_eq!(config.base_url, OPENAI_BASE_URL);
        assert_eq!(config.embed_model, "text-embedding-v2");
        assert_eq!(config.gen_model, "qwen-plus");
        assert_eq!(config.embed_dimension, 1536);
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_dimension_and_model_accessors() {
        let config = OpenAIConfig {
            embed_model: "test-embed".to_string(),
            gen_model: "test-gen".to_string(),
            embed_dimension: 512,
            ..Default::default()
        };
        let backend = OpenAIBackend::new(config).unwrap();
        assert_eq!(backend.dimension(), 512);
        assert_eq!(EmbeddingBackend::model_name(&backend), "test-embed");
        assert_eq!(GenerationBackend::model_name(&backend), "test-gen");
    }

    #[test]
    fn test_url_joining_trims_trailing_slash() {
        let config = OpenAIConfig {
            base_url: "http://localhost:8080/v1/".to_string(),
            ..Default::default()
        };
        let backend = OpenAIBackend::new(config).unwrap();
        assert_eq!(backend.url("/embeddings"), "http://localhost:8080/v1/embeddings");
    }
}
