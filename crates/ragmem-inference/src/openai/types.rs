//! Wire types for the OpenAI-compatible endpoints.
//!
//! Requests borrow from the caller; responses keep only the fields the
//! backend reads.

use serde::{Deserialize, Serialize};

use ragmem_core::{ConversationTurn, Role};

// =============================================================================
// EMBEDDINGS
// =============================================================================

/// `POST /embeddings` body.
#[derive(Debug, Serialize)]
pub struct EmbeddingRequest<'a> {
    pub model: &'a str,
    pub input: &'a [String],
    pub encoding_format: &'static str,
}

impl<'a> EmbeddingRequest<'a> {
    pub fn floats(model: &'a str, input: &'a [String]) -> Self {
        Self {
            model,
            input,
            encoding_format: "float",
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct EmbeddingResponse {
    pub data: Vec<EmbeddingData>,
}

impl EmbeddingResponse {
    /// Vectors in input order. Providers may return them shuffled.
    pub fn into_ordered(mut self) -> Vec<Vec<f32>> {
        self.data.sort_by_key(|d| d.index);
        self.data.into_iter().map(|d| d.embedding).collect()
    }
}

#[derive(Debug, Deserialize)]
pub struct EmbeddingData {
    pub embedding: Vec<f32>,
    pub index: usize,
}

// =============================================================================
// CHAT COMPLETIONS
// =============================================================================

/// One prompt message as sent on the wire.
#[derive(Debug, Serialize)]
pub struct WireMessage<'a> {
    pub role: Role,
    pub content: &'a str,
}

impl<'a> From<&'a ConversationTurn> for WireMessage<'a> {
    fn from(turn: &'a ConversationTurn) -> Self {
        Self {
            role: turn.role,
            content: &turn.content,
        }
    }
}

/// `POST /chat/completions` body. Streaming is never requested.
#[derive(Debug, Serialize)]
pub struct ChatCompletionRequest<'a> {
    pub model: &'a str,
    pub messages: Vec<WireMessage<'a>>,
    pub temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct ChatCompletionResponse {
    pub choices: Vec<ChatChoice>,
    #[serde(default)]
    pub usage: Option<TokenUsage>,
}

impl ChatCompletionResponse {
    /// Content of the first choice, if the provider sent any.
    pub fn into_first_content(self) -> Option<String> {
        self.choices.into_iter().next().and_then(|c| c.message.content)
    }
}

#[derive(Debug, Deserialize)]
pub struct ChatChoice {
    pub message: ReplyMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReplyMessage {
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

// =============================================================================
// ERRORS
// =============================================================================

/// Error envelope shared by OpenAI and DashScope.
#[derive(Debug, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    pub message: String,
    #[serde(rename = "type", default)]
    pub error_type: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_request_shape() {
        let input = vec!["hello".to_string(), "world".to_string()];
        let json = serde_json::to_value(EmbeddingRequest::floats("text-embedding-v2", &input)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "model": "text-embedding-v2",
                "input": ["hello", "world"],
                "encoding_format": "float"
            })
        );
    }

    #[test]
    fn test_embeddings_are_reordered_by_index() {
        let body = r#"{"data":[{"embedding":[2.0],"index":1},{"embedding":[1.0],"index":0}]}"#;
        let parsed: EmbeddingResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.into_ordered(), vec![vec![1.0], vec![2.0]]);
    }

    #[test]
    fn test_chat_request_roles_are_lowercase() {
        let turns = vec![
            ConversationTurn::system("be brief"),
            ConversationTurn::user("hi"),
        ];
        let request = ChatCompletionRequest {
            model: "qwen-plus",
            messages: turns.iter().map(WireMessage::from).collect(),
            temperature: 0.7,
            max_tokens: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "hi");
        assert!(json.get("max_tokens").is_none());
    }

    #[test]
    fn test_dashscope_error_shape() {
        let body = r#"{"error":{"message":"Invalid API-key","type":"invalid_request_error","code":"invalid_api_key"}}"#;
        let parsed: ErrorEnvelope = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.error.message, "Invalid API-key");
        assert_eq!(parsed.error.error_type.as_deref(), Some("invalid_request_error"));
    }

    #[test]
    fn test_null_content_yields_none() {
        let body = r#"{"choices":[{"index":0,"message":{"role":"assistant","content":null},"finish_reason":"stop"}]}"#;
        let parsed: ChatCompletionResponse = serde_json::from_str(body).unwrap();
        assert!(parsed.usage.is_none());
        assert!(parsed.into_first_content().is_none());
    }
}
