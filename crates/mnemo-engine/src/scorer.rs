// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Multi-signal candidate scoring.
//!
//! Each candidate gets four partial scores (vector, lexical, recency,
//! importance) blended into a base, which validity scales down and a
//! negative flag penalizes:
//!
//! ```text
//! base  = 0.6*vector + 0.2*lexical + 0.1*importance + 0.1*recency
//! score = max(0, base * clamp01(validity) - (negative ? 0.25 : 0))
//! ```

use std::collections::HashSet;

use mnemo_core::types::{MemoryRecord, ScoredMemory};
use mnemo_core::{clamp01, cosine_similarity};

use crate::expand::word_tokens;

/// Fixed penalty applied to records flagged negative.
pub const NEGATIVE_PENALTY: f64 = 0.25;

/// Lexical bonus when the raw query appears as a substring.
const SUBSTRING_BONUS: f64 = 0.3;

/// Lexical bonus when the full-text index matched this record.
const FTS_HIT_BONUS: f64 = 0.4;

const VECTOR_WEIGHT: f64 = 0.6;
const LEXICAL_WEIGHT: f64 = 0.2;
const IMPORTANCE_WEIGHT: f64 = 0.1;
const RECENCY_WEIGHT: f64 = 0.1;

/// Score a candidate set against the canonical query.
///
/// `fts_hits` is the set of ids known to have matched the lexical
/// index; ages are measured from `updated_at` against `now_ms`.
pub fn score_candidates(
    query: &str,
    query_embedding: Option<&[f32]>,
    records: Vec<MemoryRecord>,
    fts_hits: &HashSet<String>,
    now_ms: i64,
) -> Vec<ScoredMemory> {
    let query_tokens: HashSet<String> = word_tokens(query).into_iter().collect();
    let query_lower = query.to_lowercase();

    records
        .into_iter()
        .map(|record| {
            let vector_score = match (query_embedding, record.embedding.as_deref()) {
                (Some(q), Some(e)) => cosine_similarity(q, e).max(0.0),
                _ => 0.0,
            };

            let mut lexical = token_overlap(&query_tokens, &record.content);
            if !query_lower.is_empty() && record.content.to_lowercase().contains(&query_lower) {
                lexical += SUBSTRING_BONUS;
            }
            lexical = lexical.min(1.0);
            let lexical_score = if fts_hits.contains(&record.id) {
                (lexical + FTS_HIT_BONUS).min(1.0)
            } else {
                lexical
            };

            let age_ms = (now_ms - record.updated_at).max(0) as f64;
            let age_hours = age_ms / 3_600_000.0;
            let age_days = age_ms / 86_400_000.0;
            let recency_score = (24.0 / age_hours.max(1.0)).min(1.0);
            let importance_score = clamp01(record.importance) * 0.99_f64.powf(age_days);

            let base = VECTOR_WEIGHT * vector_score
                + LEXICAL_WEIGHT * lexical_score
                + IMPORTANCE_WEIGHT * importance_score
                + RECENCY_WEIGHT * recency_score;
            let penalty = if record.is_negative { NEGATIVE_PENALTY } else { 0.0 };
            let score = (base * clamp01(record.validity_score) - penalty).max(0.0);

            ScoredMemory {
                record,
                vector_score,
                lexical_score,
                recency_score,
                importance_score,
                score,
            }
        })
        .collect()
}

/// Share of query tokens that also appear in the content.
fn token_overlap(query_tokens: &HashSet<String>, content: &str) -> f64 {
    if query_tokens.is_empty() {
        return 0.0;
    }
    let content_tokens: HashSet<String> = word_tokens(content).into_iter().collect();
    let matched = query_tokens
        .iter()
        .filter(|t| content_tokens.contains(*t))
        .count();
    matched as f64 / query_tokens.len() as f64
}
