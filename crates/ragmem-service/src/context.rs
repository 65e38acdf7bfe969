//! Context assembly and prompt construction.
//!
//! Both functions here are pure: they only format what retrieval and the
//! memory store already produced.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use ragmem_core::defaults::NO_CONTEXT_MARKER;
use ragmem_core::{ConversationTurn, Memory, SearchResult};

/// Instructions sent ahead of every conversation.
pub const SYSTEM_PROMPT: &str = "You are a knowledge assistant. Answer the user's question using the \
provided context. If the context does not contain the answer, say so explicitly instead of guessing. \
Keep answers accurate and concise, and cite the titles of the sources you used.";

/// A retrieved chunk as cited in a reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub chunk_id: Uuid,
    pub document_id: Uuid,
    pub title: String,
    pub content: String,
    pub score: f32,
}

impl From<&SearchResult> for Source {
    fn from(result: &SearchResult) -> Self {
        Self {
            chunk_id: result.chunk_id,
            document_id: result.document_id,
            title: result.title.clone(),
            content: result.content.clone(),
            score: result.score,
        }
    }
}

/// Output of [`assemble`].
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledContext {
    pub context: String,
    /// Retrieved items in retrieval order.
    pub sources: Vec<Source>,
    /// The last `history_window` turns.
    pub history: Vec<ConversationTurn>,
}

/// Merge retrieval results, memories, and an optional clarification into one
/// context string, and truncate history to its last `history_window` turns.
pub fn assemble(
    results: &[SearchResult],
    memories: &[Memory],
    history: &[ConversationTurn],
    extra_prompt: Option<&str>,
    history_window: usize,
) -> AssembledContext {
    let mut blocks = Vec::with_capacity(results.len() + memories.len() + 1);

    for (i, result) in results.iter().enumerate() {
        blocks.push(format!(
            "[source {}] {}\n{}\n(score: {:.3})",
            i + 1,
            result.title,
            result.content,
            result.score
        ));
    }
    for memory in memories {
        blocks.push(format!("[memory: {}]\n{}", memory.category, memory.content));
    }
    if results.is_empty() && memories.is_empty() {
        blocks.insert(0, NO_CONTEXT_MARKER.to_string());
    }
    if let Some(extra) = extra_prompt.map(str::trim).filter(|e| !e.is_empty()) {
        blocks.push(format!("[clarification]\n{}", extra));
    }

    AssembledContext {
        context: blocks.join("\n\n"),
        sources: results.iter().map(Source::from).collect(),
        history: truncate_history(history, history_window),
    }
}

/// Keep the last `window` turns.
pub fn truncate_history(history: &[ConversationTurn], window: usize) -> Vec<ConversationTurn> {
    let skip = history.len().saturating_sub(window);
    history[skip..].to_vec()
}

/// Prompt messages: instructions, context, history, then the query.
pub fn build_messages(
    context: &str,
    history: &[ConversationTurn],
    query: &str,
) -> Vec<ConversationTurn> {
    let mut messages = Vec::with_capacity(history.len() + 3);
    messages.push(ConversationTurn::system(SYSTEM_PROMPT));
    messages.push(ConversationTurn::system(format!("Context:\n{}", context)));
    messages.extend(history.iter().cloned());
    messages.push(ConversationTurn::user(query));
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use ragmem_core::{MemorySource, Role};

    fn result(title: &str, content: &str, score: f32) -> SearchResult {
        SearchResult {
            chunk_id: Uuid::now_v7(),
            document_id: Uuid::now_v7(),
            title: title.to_string(),
            content: content.to_string(),
            score,
            created_at: Utc::now(),
        }
    }

    fn memory(category: &str, content: &str) -> Memory {
        let now = Utc::now();
        Memory {
            id: Uuid::now_v7(),
            user_id: Uuid::nil(),
            content: content.to_string(),
            importance: 0.5,
            category: category.to_string(),
            tags: vec![],
            source: MemorySource::Manual,
            access_count: 0,
            last_accessed: None,
            expires_at: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn turns(n: usize) -> Vec<ConversationTurn> {
        (0..n)
            .map(|i| {
                if i % 2 == 0 {
                    ConversationTurn::user(format!("question {}", i))
                } else {
                    ConversationTurn::assistant(format!("answer {}", i))
                }
            })
            .collect()
    }

    #[test]
    fn test_block_formats() {
        let results = vec![
            result("handbook.pdf", "Leave accrues monthly.", 0.91234),
            result("faq.md", "Ask HR for details.", 0.7),
        ];
        let memories = vec![memory("preferences", "Works in the Berlin office")];

        let assembled = assemble(&results, &memories, &[], Some("Only 2024 policy"), 10);
        assert_eq!(
            assembled.context,
            "[source 1] handbook.pdf\nLeave accrues monthly.\n(score: 0.912)\n\n\
             [source 2] faq.md\nAsk HR for details.\n(score: 0.700)\n\n\
             [memory: preferences]\nWorks in the Berlin office\n\n\
             [clarification]\nOnly 2024 policy"
        );
        assert_eq!(assembled.sources.len(), 2);
        assert_eq!(assembled.sources[0].title, "handbook.pdf");
        assert_eq!(assembled.sources[1].chunk_id, results[1].chunk_id);
    }

    #[test]
    fn test_empty_context_uses_marker() {
        let assembled = assemble(&[], &[], &[], None, 10);
        assert_eq!(assembled.context, NO_CONTEXT_MARKER);
        assert!(assembled.sources.is_empty());

        let with_extra = assemble(&[], &[], &[], Some("be brief"), 10);
        assert_eq!(
            with_extra.context,
            format!("{}\n\n[clarification]\nbe brief", NO_CONTEXT_MARKER)
        );
    }

    #[test]
    fn test_memories_alone_skip_marker() {
        let assembled = assemble(&[], &[memory("general", "Uses vim")], &[], None, 10);
        assert_eq!(assembled.context, "[memory: general]\nUses vim");
    }

    #[test]
    fn test_history_truncation_keeps_latest_turns() {
        let history = turns(14);
        let assembled = assemble(&[], &[], &history, None, 10);
        assert_eq!(assembled.history.len(), 10);
        assert_eq!(assembled.history[0].content, "question 4");
        assert_eq!(assembled.history[9].content, "answer 13");

        assert_eq!(truncate_history(&turns(3), 10).len(), 3);
        assert!(truncate_history(&turns(3), 0).is_empty());
    }

    #[test]
    fn test_build_messages_order() {
        let history = turns(2);
        let messages = build_messages("ctx", &history, "What changed?");
        assert_eq!(messages.len(), 5);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[0].content, SYSTEM_PROMPT);
        assert_eq!(messages[1].content, "Context:\nctx");
        assert_eq!(messages[2], history[0]);
        assert_eq!(messages[3].role, Role::Assistant);
        assert_eq!(messages[4], ConversationTurn::user("What changed?"));
    }
}
