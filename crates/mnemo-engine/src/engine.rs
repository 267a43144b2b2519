// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The public memory engine facade.
//!
//! One [`MemoryEngine`] owns the storage handle, the capability
//! objects, the classifier state, and the query-embedding cache for
//! the life of the process. Every public operation goes through it;
//! callers only ever see immutable record snapshots.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use lru::LruCache;
use tracing::debug;
use uuid::Uuid;

use mnemo_config::MemoryConfig;
use mnemo_core::types::{
    EmbeddingInput, EngineStatus, ListOptions, MemoryKind, MemoryRecord, MemoryScope,
    RecallOptions, RememberOptions, ScoredMemory,
};
use mnemo_core::{clamp01, Embedder, MnemoError, TextTokenizer};
use mnemo_storage::MemoryStore;

use crate::chunker;
use crate::classifier::KindClassifier;
use crate::expand::expand_query;
use crate::rerank::mmr_rerank;
use crate::scorer::score_candidates;

/// Results returned by recall when the caller does not say otherwise.
const DEFAULT_RECALL_RESULTS: usize = 8;

/// Importance boost applied to every returned record.
const RECALL_BOOST: f64 = 0.04;

/// Score decays applied to sibling-expanded chunks.
const SIBLING_VECTOR_DECAY: f64 = 0.08;
const SIBLING_LEXICAL_DECAY: f64 = 0.05;
const SIBLING_SCORE_DECAY: f64 = 0.10;

/// Default validity assigned by `mark_invalid`.
const DEFAULT_INVALID_SCORE: f64 = 0.2;

/// The retrieval-augmented memory engine.
pub struct MemoryEngine {
    store: Arc<MemoryStore>,
    embedder: Arc<dyn Embedder>,
    tokenizer: Arc<dyn TextTokenizer>,
    classifier: KindClassifier,
    config: MemoryConfig,
    query_cache: Mutex<LruCache<String, Vec<f32>>>,
}

impl MemoryEngine {
    /// Build an engine over an open store and capability objects.
    pub fn new(
        store: Arc<MemoryStore>,
        embedder: Arc<dyn Embedder>,
        tokenizer: Arc<dyn TextTokenizer>,
        config: MemoryConfig,
    ) -> Self {
        let classifier = KindClassifier::new(store.clone(), embedder.clone());
        let capacity =
            NonZeroUsize::new(config.query_cache_size.max(1)).expect("capacity is non-zero");
        Self {
            store,
            embedder,
            tokenizer,
            classifier,
            config,
            query_cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// The underlying store handle.
    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    /// Persist a memory: chunk, embed, dedup, classify, insert.
    ///
    /// Chunks of one call share a parent id. A chunk whose embedding
    /// matches an existing row (same scope, cosine at or above the
    /// dedup threshold) merges into that row in place. Returns the
    /// first new row, or the first merged row when nothing new was
    /// inserted.
    pub async fn remember(
        &self,
        content: &str,
        opts: RememberOptions,
    ) -> Result<MemoryRecord, MnemoError> {
        if content.trim().is_empty() {
            return Err(MnemoError::EmptyContent);
        }

        let chunks = chunker::chunk_text(
            self.tokenizer.as_ref(),
            content,
            self.config.chunk_tokens,
            self.config.overlap_tokens,
        )
        .await?;
        if chunks.is_empty() {
            return Err(MnemoError::EmptyMemoryChunks);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let output = self.embedder.embed(EmbeddingInput { texts }).await?;
        if output.embeddings.len() != chunks.len() {
            return Err(MnemoError::Internal(format!(
                "embedder returned {} vectors for {} chunks",
                output.embeddings.len(),
                chunks.len()
            )));
        }

        let now = Utc::now().timestamp_millis();
        let parent_id = Uuid::new_v4().to_string();
        let mut new_rows: Vec<MemoryRecord> = Vec::new();
        let mut merged_ids: Vec<String> = Vec::new();

        for (idx, (chunk, embedding)) in
            chunks.iter().zip(output.embeddings.into_iter()).enumerate()
        {
            let kind = match opts.kind {
                Some(kind) => kind,
                None => self.classifier.classify(&embedding, Some(opts.scope)).await?.kind,
            };

            let duplicate = self
                .store
                .find_semantic_duplicate(&embedding, opts.scope, self.config.dedup_threshold)
                .await?;
            match duplicate {
                Some(existing) => {
                    debug!(id = %existing.id, "merging duplicate chunk");
                    self.store
                        .merge_into_existing(
                            &existing.id,
                            &chunk.content,
                            kind,
                            Some(&embedding),
                            chunk.token_count as i64,
                            opts.importance,
                            now,
                        )
                        .await?;
                    merged_ids.push(existing.id);
                }
                None => {
                    new_rows.push(MemoryRecord {
                        id: Uuid::new_v4().to_string(),
                        parent_id: parent_id.clone(),
                        chunk_index: idx as i64,
                        content: chunk.content.clone(),
                        kind,
                        scope: opts.scope,
                        importance: clamp01(opts.importance),
                        token_count: chunk.token_count as i64,
                        recall_count: 0,
                        last_recalled_at: None,
                        validity_score: clamp01(opts.validity_score),
                        is_negative: opts.is_negative,
                        created_at: now,
                        updated_at: now,
                        embedding: Some(embedding),
                    });
                }
            }
        }

        if let Some(first) = new_rows.first().cloned() {
            self.store.insert_rows(new_rows).await?;
            return Ok(first);
        }
        if let Some(id) = merged_ids.first() {
            return self
                .store
                .get(id)
                .await?
                .ok_or_else(|| MnemoError::Internal("merged row disappeared".to_string()));
        }
        Err(MnemoError::EmptyMemoryChunks)
    }

    /// Hybrid recall returning bare records.
    pub async fn recall(
        &self,
        query: &str,
        opts: RecallOptions,
    ) -> Result<Vec<MemoryRecord>, MnemoError> {
        Ok(self
            .recall_scored(query, opts)
            .await?
            .into_iter()
            .map(|scored| scored.record)
            .collect())
    }

    /// Hybrid recall with partial and final scores attached.
    ///
    /// Candidate generation unions ANN and FTS hits over every query
    /// expansion, scores against the canonical (first) expansion,
    /// truncates to the recall width, MMR-reranks, expands siblings
    /// with decayed scores, reranks again, and bumps recall metrics on
    /// whatever is returned.
    pub async fn recall_scored(
        &self,
        query: &str,
        opts: RecallOptions,
    ) -> Result<Vec<ScoredMemory>, MnemoError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(MnemoError::EmptyQuery);
        }

        let limit = opts.limit.unwrap_or(DEFAULT_RECALL_RESULTS).max(1);
        let corpus = self.store.corpus_size().await?;
        let recall_limit = opts
            .recall_limit
            .or(self.config.recall_limit)
            .unwrap_or(dynamic_recall_width(corpus));
        let k = recall_limit.max(limit * 8);

        let expansions = expand_query(query);
        let embeddings = self.embed_queries(&expansions).await?;
        let canonical = embeddings.first().cloned().unwrap_or_default();

        let mut candidate_ids: Vec<String> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut fts_hits: HashSet<String> = HashSet::new();
        for (i, expansion) in expansions.iter().enumerate() {
            if let Some(embedding) = embeddings.get(i) {
                for (id, _) in self.store.ann_search(embedding, k, opts.scope).await? {
                    if seen.insert(id.clone()) {
                        candidate_ids.push(id);
                    }
                }
            }
            for id in self.store.fts_search(expansion, k).await? {
                fts_hits.insert(id.clone());
                if seen.insert(id.clone()) {
                    candidate_ids.push(id);
                }
            }
        }

        let mut records = self.store.get_many(&candidate_ids).await?;
        if let Some(scope) = opts.scope {
            records.retain(|record| record.scope == scope);
        }

        let now = Utc::now().timestamp_millis();
        let query_embedding = (!canonical.is_empty()).then_some(canonical.as_slice());
        let mut scored = score_candidates(query, query_embedding, records, &fts_hits, now);
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        scored.truncate(recall_limit);

        let mut pool = mmr_rerank(scored, limit, self.config.mmr_lambda);

        // Pull in adjacent chunks of each survivor, slightly decayed.
        let mut present: HashSet<String> =
            pool.iter().map(|item| item.record.id.clone()).collect();
        let survivors = pool.clone();
        for item in &survivors {
            let lo = (item.record.chunk_index - 1).max(0);
            let hi = item.record.chunk_index + 1;
            for sibling in self.store.siblings(&item.record.parent_id, lo, hi).await? {
                if !present.insert(sibling.id.clone()) {
                    continue;
                }
                pool.push(ScoredMemory {
                    vector_score: (item.vector_score - SIBLING_VECTOR_DECAY).max(0.0),
                    lexical_score: (item.lexical_score - SIBLING_LEXICAL_DECAY).max(0.0),
                    recency_score: item.recency_score,
                    importance_score: item.importance_score,
                    score: (item.score - SIBLING_SCORE_DECAY).max(0.0),
                    record: sibling,
                });
            }
        }

        let results = mmr_rerank(pool, limit, self.config.mmr_lambda);

        let ids: Vec<String> = results.iter().map(|item| item.record.id.clone()).collect();
        self.store
            .bump_recall_metrics(ids, RECALL_BOOST, Utc::now().timestamp_millis())
            .await?;
        Ok(results)
    }

    /// Render recall results as a context block, one line per parent.
    ///
    /// Chunks group by parent (keeping the group's best score), join in
    /// chunk order, and emit as `- (kind/scope|score=X.XXX) <text>`
    /// lines, greedily packed until the next line would exceed
    /// `max_chars`.
    pub async fn build_context(
        &self,
        query: &str,
        limit: usize,
        max_chars: usize,
    ) -> Result<String, MnemoError> {
        let scored = self
            .recall_scored(
                query,
                RecallOptions {
                    limit: Some(limit),
                    recall_limit: Some((6 * limit).max(30)),
                    scope: None,
                },
            )
            .await?;

        let mut groups: Vec<(String, f64, Vec<ScoredMemory>)> = Vec::new();
        for item in scored {
            match groups
                .iter_mut()
                .find(|(parent, _, _)| *parent == item.record.parent_id)
            {
                Some((_, best, members)) => {
                    *best = (*best).max(item.score);
                    members.push(item);
                }
                None => groups.push((item.record.parent_id.clone(), item.score, vec![item])),
            }
        }
        for (_, _, members) in &mut groups {
            members.sort_by_key(|member| member.record.chunk_index);
        }
        groups.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));

        let mut context = String::new();
        for (_, best, members) in groups {
            let first = &members[0].record;
            let joined = members
                .iter()
                .map(|member| member.record.content.as_str())
                .collect::<Vec<_>>()
                .join(" ");
            let line = format!("- ({}/{}|score={best:.3}) {joined}", first.kind, first.scope);
            let projected = if context.is_empty() {
                line.len()
            } else {
                context.len() + 1 + line.len()
            };
            if projected > max_chars {
                break;
            }
            if !context.is_empty() {
                context.push('\n');
            }
            context.push_str(&line);
        }
        Ok(context)
    }

    /// Delete one record. Unknown ids are a no-op success.
    pub async fn forget(&self, id: &str) -> Result<(), MnemoError> {
        self.store.delete(id).await
    }

    /// Delete every chunk of a parent. Returns rows removed.
    pub async fn forget_parent(&self, parent_id: &str) -> Result<usize, MnemoError> {
        self.store.delete_parent(parent_id).await
    }

    /// Load the full record, or `None` for unknown ids.
    pub async fn open(&self, id: &str) -> Result<Option<MemoryRecord>, MnemoError> {
        self.store.get(id).await
    }

    /// Paginated summaries (no embeddings), newest update first.
    pub async fn list(&self, opts: ListOptions) -> Result<Vec<MemoryRecord>, MnemoError> {
        let limit = opts.limit.unwrap_or(30).clamp(1, 200) as i64;
        self.store
            .list(opts.scope, opts.kind, opts.query, limit, opts.offset as i64)
            .await
    }

    /// Row counts for every kind, zero-filled.
    pub async fn count_by_kind(
        &self,
        scope: Option<MemoryScope>,
        query: Option<String>,
    ) -> Result<HashMap<MemoryKind, u64>, MnemoError> {
        use strum::IntoEnumIterator;
        let mut counts: HashMap<MemoryKind, u64> =
            MemoryKind::iter().map(|kind| (kind, 0)).collect();
        for (kind, count) in self.store.count_by_kind(scope, query).await? {
            *counts.entry(MemoryKind::from_str_value(&kind)).or_insert(0) += count as u64;
        }
        Ok(counts)
    }

    /// Set a record's validity and flag it negative.
    pub async fn mark_invalid(&self, id: &str, score: Option<f64>) -> Result<(), MnemoError> {
        let score = score.unwrap_or(DEFAULT_INVALID_SCORE).max(0.0);
        self.store
            .mark_invalid(id, score, Utc::now().timestamp_millis())
            .await
    }

    /// Read-only engine status.
    pub async fn status(&self) -> Result<EngineStatus, MnemoError> {
        Ok(EngineStatus {
            path: self.store.path().to_string(),
            ann: self.store.ann().clone(),
            corpus_size: self.store.corpus_size().await?,
        })
    }

    /// Embed query expansions through the LRU cache, one call for all
    /// misses.
    async fn embed_queries(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, MnemoError> {
        let mut results: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
        if let Ok(mut cache) = self.query_cache.lock() {
            for (i, text) in texts.iter().enumerate() {
                if let Some(hit) = cache.get(text) {
                    results[i] = Some(hit.clone());
                }
            }
        }

        let missing: Vec<(usize, String)> = texts
            .iter()
            .enumerate()
            .filter(|(i, _)| results[*i].is_none())
            .map(|(i, text)| (i, text.clone()))
            .collect();
        if !missing.is_empty() {
            let output = self
                .embedder
                .embed(EmbeddingInput {
                    texts: missing.iter().map(|(_, text)| text.clone()).collect(),
                })
                .await?;
            if let Ok(mut cache) = self.query_cache.lock() {
                for ((_, text), embedding) in missing.iter().zip(output.embeddings.iter()) {
                    cache.put(text.clone(), embedding.clone());
                }
            }
            for ((i, _), embedding) in missing.into_iter().zip(output.embeddings.into_iter()) {
                results[i] = Some(embedding);
            }
        }

        Ok(results
            .into_iter()
            .map(|slot| slot.unwrap_or_default())
            .collect())
    }
}

/// Candidate width sized to the corpus when the caller has no
/// preference.
fn dynamic_recall_width(corpus: u64) -> usize {
    if corpus > 50_000 {
        200
    } else if corpus > 5_000 {
        100
    } else {
        50
    }
}
