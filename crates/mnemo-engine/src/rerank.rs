// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Maximal Marginal Relevance reranking.
//!
//! Greedy selection of a diverse top-K: each step picks the candidate
//! maximizing `lambda*score - (1-lambda)*max_sim(selected)`, where
//! `max_sim` is the largest pairwise embedding cosine against the
//! already-selected set (0 when either vector is missing).

use std::cmp::Ordering;

use mnemo_core::cosine_similarity;
use mnemo_core::types::ScoredMemory;

/// Select up to `limit` diverse items from a scored candidate list.
///
/// Candidate sets at or under the limit pass through in input order.
/// The selection is returned re-sorted for stable presentation:
/// score desc, then `updated_at` desc, then id asc.
pub fn mmr_rerank(items: Vec<ScoredMemory>, limit: usize, lambda: f64) -> Vec<ScoredMemory> {
    if items.len() <= limit {
        return items;
    }

    let mut sorted = items;
    sorted.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));

    let mut selected: Vec<usize> = Vec::with_capacity(limit);
    let mut remaining: Vec<usize> = (0..sorted.len()).collect();

    while selected.len() < limit && !remaining.is_empty() {
        let mut best_pos = 0usize;
        let mut best_value = f64::NEG_INFINITY;
        for (pos, &idx) in remaining.iter().enumerate() {
            let max_sim = if selected.is_empty() {
                0.0
            } else {
                selected
                    .iter()
                    .map(|&sel| pair_similarity(&sorted[idx], &sorted[sel]))
                    .fold(f64::NEG_INFINITY, f64::max)
            };
            let value = lambda * sorted[idx].score - (1.0 - lambda) * max_sim;
            // Strict > keeps the earlier-in-sorted-order candidate on ties.
            if value > best_value {
                best_value = value;
                best_pos = pos;
            }
        }
        selected.push(remaining.remove(best_pos));
    }

    let mut slots: Vec<Option<ScoredMemory>> = sorted.into_iter().map(Some).collect();
    let mut picked: Vec<ScoredMemory> = selected
        .into_iter()
        .filter_map(|idx| slots[idx].take())
        .collect();
    presentation_sort(&mut picked);
    picked
}

/// Stable presentation order: score desc, updated_at desc, id asc.
pub fn presentation_sort(items: &mut [ScoredMemory]) {
    items.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.record.updated_at.cmp(&a.record.updated_at))
            .then_with(|| a.record.id.cmp(&b.record.id))
    });
}

fn pair_similarity(a: &ScoredMemory, b: &ScoredMemory) -> f64 {
    match (a.record.embedding.as_deref(), b.record.embedding.as_deref()) {
        (Some(ea), Some(eb)) => cosine_similarity(ea, eb),
        _ => 0.0,
    }
}
