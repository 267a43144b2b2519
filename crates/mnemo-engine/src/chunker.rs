// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Sliding-window chunking over the tokenizer capability.

use mnemo_core::{MnemoError, TextTokenizer};

/// One chunk of normalized source text.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Detokenized, trimmed window content.
    pub content: String,
    /// Number of tokens in the window.
    pub token_count: usize,
}

/// Trim and collapse internal whitespace runs to single spaces.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Split `text` into overlapping token windows.
///
/// Window size is `chunk_tokens` with stride
/// `max(1, chunk_tokens - overlap_tokens)`; the last window ends at
/// the total token count. Windows that detokenize to empty text are
/// skipped. Empty input yields an empty sequence; input at or under
/// one window yields a single chunk.
pub async fn chunk_text(
    tokenizer: &dyn TextTokenizer,
    text: &str,
    chunk_tokens: usize,
    overlap_tokens: usize,
) -> Result<Vec<Chunk>, MnemoError> {
    let normalized = normalize_whitespace(text);
    if normalized.is_empty() {
        return Ok(Vec::new());
    }

    let ids = tokenizer.tokenize(&normalized).await?;
    if ids.len() <= chunk_tokens {
        return Ok(vec![Chunk {
            content: normalized,
            token_count: ids.len(),
        }]);
    }

    let stride = chunk_tokens.saturating_sub(overlap_tokens).max(1);
    let mut chunks = Vec::new();
    let mut start = 0usize;
    loop {
        let end = (start + chunk_tokens).min(ids.len());
        let window = &ids[start..end];
        let decoded = tokenizer.decode(window).await?;
        let trimmed = decoded.trim();
        if !trimmed.is_empty() {
            chunks.push(Chunk {
                content: trimmed.to_string(),
                token_count: window.len(),
            });
        }
        if end >= ids.len() {
            break;
        }
        start += stride;
    }
    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Whitespace tokenizer over a growing vocabulary.
    struct WordTokenizer {
        vocab: Mutex<(Vec<String>, HashMap<String, u32>)>,
    }

    impl WordTokenizer {
        fn new() -> Self {
            Self {
                vocab: Mutex::new((Vec::new(), HashMap::new())),
            }
        }
    }

    #[async_trait]
    impl TextTokenizer for WordTokenizer {
        async fn tokenize(&self, text: &str) -> Result<Vec<u32>, MnemoError> {
            let mut vocab = self.vocab.lock().unwrap();
            let mut ids = Vec::new();
            for word in text.split_whitespace() {
                let next = vocab.0.len() as u32;
                let id = *vocab.1.entry(word.to_string()).or_insert(next);
                if id == next {
                    vocab.0.push(word.to_string());
                }
                ids.push(id);
            }
            Ok(ids)
        }

        async fn decode(&self, ids: &[u32]) -> Result<String, MnemoError> {
            let vocab = self.vocab.lock().unwrap();
            let words: Vec<&str> = ids
                .iter()
                .filter_map(|&id| vocab.0.get(id as usize).map(String::as_str))
                .collect();
            Ok(words.join(" "))
        }
    }

    fn doc(n: usize) -> String {
        (0..n).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ")
    }

    #[tokio::test]
    async fn empty_input_yields_no_chunks() {
        let tok = WordTokenizer::new();
        let chunks = chunk_text(&tok, "   \n\t ", 220, 40).await.unwrap();
        assert!(chunks.is_empty());
    }

    #[tokio::test]
    async fn short_input_is_a_single_normalized_chunk() {
        let tok = WordTokenizer::new();
        let chunks = chunk_text(&tok, "  hello   world \n again ", 220, 40)
            .await
            .unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "hello world again");
        assert_eq!(chunks[0].token_count, 3);
    }

    #[tokio::test]
    async fn long_input_windows_with_overlap() {
        let tok = WordTokenizer::new();
        let chunks = chunk_text(&tok, &doc(600), 220, 40).await.unwrap();

        // stride 180: [0,220) [180,400) [360,580) [540,600)
        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[0].token_count, 220);
        assert_eq!(chunks[3].token_count, 60);
        assert!(chunks[0].content.starts_with("w0 "));
        assert!(chunks[1].content.starts_with("w180 "));
        assert!(chunks[3].content.ends_with("w599"));
    }

    #[tokio::test]
    async fn consecutive_chunks_share_exactly_the_overlap() {
        let tok = WordTokenizer::new();
        let chunks = chunk_text(&tok, &doc(600), 220, 40).await.unwrap();

        for pair in chunks.windows(2) {
            let left: Vec<&str> = pair[0].content.split_whitespace().collect();
            let right: Vec<&str> = pair[1].content.split_whitespace().collect();
            let shared: Vec<&&str> = left.iter().filter(|w| right.contains(w)).collect();
            assert_eq!(shared.len(), 40, "consecutive windows share the overlap");
        }

        // Concatenation without overlap covers every token.
        let mut covered: Vec<&str> = Vec::new();
        for chunk in &chunks {
            for word in chunk.content.split_whitespace() {
                if !covered.contains(&word) {
                    covered.push(word);
                }
            }
        }
        assert_eq!(covered.len(), 600);
    }

    #[tokio::test]
    async fn degenerate_overlap_still_advances() {
        let tok = WordTokenizer::new();
        // overlap >= chunk forces stride 1; must terminate and cover.
        let chunks = chunk_text(&tok, &doc(5), 3, 5).await.unwrap();
        assert_eq!(chunks.len(), 3);
        assert!(chunks.last().unwrap().content.ends_with("w4"));
    }
}
