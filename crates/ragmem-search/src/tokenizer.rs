//! Query tokenization for keyword retrieval.
//!
//! Tokens are produced in one pass:
//! 1. Lowercase
//! 2. Punctuation and symbols become spaces
//! 3. Split on whitespace
//! 4. Split again wherever a CJK run meets a non-CJK run
//! 5. Drop single-character tokens and stop words
//! 6. Deduplicate, keeping first occurrence
//!
//! CJK runs are not segmented further, so `机器学习` stays one token and
//! matches as a substring.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_script::{Script, UnicodeScript};

static PUNCT_OR_SYMBOL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\p{P}\p{S}]").expect("punctuation pattern is valid"));

static STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        // English
        "the", "and", "or", "but", "an", "is", "are", "was", "were", "be", "been", "being",
        "to", "of", "in", "on", "at", "for", "with", "by", "from", "as", "it", "its", "this",
        "that", "these", "those", "what", "which", "who", "whom", "how", "why", "when",
        "where", "do", "does", "did", "can", "could", "should", "would", "will", "shall",
        "may", "might", "me", "my", "we", "our", "you", "your", "he", "she", "they", "them",
        "their", "his", "her", "not", "no", "if", "then", "so", "about", "into", "than",
        "there", "here", "have", "has", "had", "any", "all", "some", "please", "tell",
        // Chinese function words
        "什么", "怎么", "怎样", "如何", "为什么", "哪些", "哪个", "这个", "那个", "这些",
        "那些", "我们", "你们", "他们", "她们", "以及", "或者", "但是", "因为", "所以",
        "如果", "可以", "是否", "一个", "没有", "的话", "关于", "请问",
    ]
    .into_iter()
    .collect()
});

/// True for Han, Hiragana, Katakana, and Hangul characters.
pub fn is_cjk(ch: char) -> bool {
    matches!(
        ch.script(),
        Script::Han | Script::Hiragana | Script::Katakana | Script::Hangul
    )
}

/// True if the text contains any CJK character.
pub fn has_cjk(text: &str) -> bool {
    text.chars().any(is_cjk)
}

/// Split a whitespace-free piece at every CJK / non-CJK transition.
fn split_script_runs(piece: &str) -> Vec<&str> {
    let mut runs = Vec::new();
    let mut start = 0;
    let mut current: Option<bool> = None;

    for (idx, ch) in piece.char_indices() {
        let cjk = is_cjk(ch);
        match current {
            Some(prev) if prev != cjk => {
                runs.push(&piece[start..idx]);
                start = idx;
            }
            _ => {}
        }
        current = Some(cjk);
    }
    if start < piece.len() {
        runs.push(&piece[start..]);
    }
    runs
}

/// Tokenize a query for keyword matching.
pub fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    let cleaned = PUNCT_OR_SYMBOL.replace_all(&lowered, " ");

    let mut seen = HashSet::new();
    let mut tokens = Vec::new();
    for piece in cleaned.split_whitespace() {
        for run in split_script_runs(piece) {
            if run.chars().count() <= 1 || STOP_WORDS.contains(run) {
                continue;
            }
            if seen.insert(run) {
                tokens.push(run.to_string());
            }
        }
    }
    tokens
}

/// Stop-word check, exposed for callers that build their own token lists.
pub fn is_stop_word(token: &str) -> bool {
    STOP_WORDS.contains(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latin_query() {
        assert_eq!(
            tokenize("What is the Vacation policy?"),
            vec!["vacation", "policy"]
        );
    }

    #[test]
    fn test_punctuation_and_symbols_split() {
        assert_eq!(
            tokenize("rust/tokio + async-await!"),
            vec!["rust", "tokio", "async", "await"]
        );
    }

    #[test]
    fn test_cjk_latin_transitions() {
        assert_eq!(
            tokenize("Rust语言的ownership机制"),
            vec!["rust", "语言的", "ownership", "机制"]
        );
    }

    #[test]
    fn test_cjk_punctuation() {
        assert_eq!(tokenize("年假政策，报销流程。"), vec!["年假政策", "报销流程"]);
    }

    #[test]
    fn test_japanese_and_korean_runs() {
        assert_eq!(tokenize("東京カメラ tower 서울"), vec!["東京カメラ", "tower", "서울"]);
    }

    #[test]
    fn test_single_chars_dropped() {
        assert_eq!(tokenize("a b c 的 x1"), vec!["x1"]);
    }

    #[test]
    fn test_chinese_stop_words_dropped() {
        assert_eq!(tokenize("什么 预算 如何"), vec!["预算"]);
    }

    #[test]
    fn test_deduplicates_preserving_order() {
        assert_eq!(tokenize("Beta alpha BETA beta"), vec!["beta", "alpha"]);
    }

    #[test]
    fn test_all_dropped_yields_empty() {
        assert!(tokenize("the of and ? !").is_empty());
        assert!(tokenize("").is_empty());
    }

    #[test]
    fn test_cjk_detection() {
        assert!(is_cjk('中'));
        assert!(is_cjk('カ'));
        assert!(is_cjk('한'));
        assert!(!is_cjk('a'));
        assert!(has_cjk("hello 世界"));
        assert!(!has_cjk("hello world"));
    }
}
