// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Kind classification from embeddings.
//!
//! Two signals decide a memory's kind: cosine similarity against a
//! table of prototype embeddings (static exemplars plus an online
//! learned queue per kind), and the kind density of the memory's ANN
//! neighborhood. A confident prototype match short-circuits; otherwise
//! the two signals blend, and anything under the confidence floor
//! comes back `unclassified`.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use tokio::sync::OnceCell;
use tracing::debug;

use mnemo_core::types::{EmbeddingInput, MemoryKind, MemoryScope};
use mnemo_core::{cosine_similarity, Embedder, MnemoError};
use mnemo_storage::MemoryStore;

/// Kinds the classifier can assign. `Unclassified` is only ever an
/// output of low confidence, never a target.
const CLASSIFIABLE: [MemoryKind; 5] = [
    MemoryKind::Identity,
    MemoryKind::Task,
    MemoryKind::Knowledge,
    MemoryKind::Reference,
    MemoryKind::Note,
];

/// Bound on each kind's learned-prototype queue.
const LEARNED_CAPACITY: usize = 64;

/// Neighborhood size for the density signal.
const DENSITY_NEIGHBORS: usize = 20;

/// Prototype score that wins outright, given enough margin.
const PROTOTYPE_FLOOR: f64 = 0.52;
const PROTOTYPE_MARGIN: f64 = 0.045;

/// Below this prototype score the density signal is distrusted.
const DENSITY_GATE: f64 = 0.35;
const GATED_FACTOR: f64 = 0.25;

const PROTO_WEIGHT: f64 = 0.9;
const DENSITY_WEIGHT: f64 = 0.1;

/// Confidence floor under which the result is `unclassified`.
const MIN_CONFIDENCE: f64 = 0.28;

/// Confidence above which the embedding joins the learned queue.
const LEARN_THRESHOLD: f64 = 0.93;

/// Static exemplars, embedded once per process on first use.
const PROTOTYPES: &[(MemoryKind, &[&str])] = &[
    (
        MemoryKind::Identity,
        &[
            "my name is Alex",
            "I am a software engineer",
            "I live in Berlin",
            "my email address is alex@example.com",
            "I prefer to be called Lex",
            "I work for a small startup",
            "my birthday is in October",
        ],
    ),
    (
        MemoryKind::Task,
        &[
            "todo finish the quarterly report",
            "remind me to renew the certificate",
            "need to fix the login bug tomorrow",
            "deadline for the migration is next friday",
            "schedule a meeting with the infra team",
            "working on implementing the export feature",
            "must deploy the release before the demo",
        ],
    ),
    (
        MemoryKind::Knowledge,
        &[
            "the capital of France is Paris",
            "TCP connections begin with a three way handshake",
            "rust ownership prevents data races",
            "postgres uses multiversion concurrency control",
            "water boils around one hundred degrees celsius",
            "binary search runs in logarithmic time",
        ],
    ),
    (
        MemoryKind::Reference,
        &[
            "see docs at https://example.com",
            "the repository is hosted on github",
            "full manual available from the project website",
            "refer to RFC 793 for details",
            "api reference lives under the developer portal",
            "linked spec document describes the protocol",
        ],
    ),
    (
        MemoryKind::Note,
        &[
            "quick note from the standup",
            "random thought about the roadmap",
            "observation the build felt slower today",
            "note to self revisit this later",
            "jotting down an idea for the demo",
            "something felt off during the review",
        ],
    ),
];

/// A classification decision with its confidence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub kind: MemoryKind,
    pub confidence: f64,
}

impl Classification {
    fn unclassified(confidence: f64) -> Self {
        Self {
            kind: MemoryKind::Unclassified,
            confidence,
        }
    }
}

/// Prototype + neighbor-density kind classifier with online learning.
///
/// Process-wide state (the prototype embedding cache and the learned
/// queues) lives here and is deliberately not persisted; it rebuilds
/// on the next warm-up.
pub struct KindClassifier {
    store: Arc<MemoryStore>,
    embedder: Arc<dyn Embedder>,
    prototypes: OnceCell<Vec<(MemoryKind, Vec<Vec<f32>>)>>,
    learned: Mutex<HashMap<MemoryKind, VecDeque<Vec<f32>>>>,
}

impl KindClassifier {
    pub fn new(store: Arc<MemoryStore>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            store,
            embedder,
            prototypes: OnceCell::new(),
            learned: Mutex::new(HashMap::new()),
        }
    }

    /// Classify an embedding, optionally restricting the density
    /// neighborhood to one scope.
    pub async fn classify(
        &self,
        embedding: &[f32],
        scope: Option<MemoryScope>,
    ) -> Result<Classification, MnemoError> {
        if embedding.is_empty() {
            return Ok(Classification::unclassified(0.0));
        }

        let proto_scores = self.prototype_scores(embedding).await?;

        // Confident prototype match short-circuits.
        let (top_kind, top) = proto_scores
            .iter()
            .copied()
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .unwrap_or((MemoryKind::Unclassified, 0.0));
        let second = proto_scores
            .iter()
            .filter(|(kind, _)| *kind != top_kind)
            .map(|(_, score)| *score)
            .fold(0.0, f64::max);
        if top >= PROTOTYPE_FLOOR && (top - second) >= PROTOTYPE_MARGIN {
            if top > LEARN_THRESHOLD {
                self.learn(top_kind, embedding);
            }
            return Ok(Classification {
                kind: top_kind,
                confidence: top,
            });
        }

        // Blend prototypes with gated neighborhood density.
        let density = self.density_scores(embedding, scope).await?;
        let mut winner = Classification::unclassified(0.0);
        let mut first = true;
        for (kind, proto) in proto_scores {
            let d = density.get(&kind).copied().unwrap_or(0.0);
            let gated = if proto >= DENSITY_GATE { d } else { GATED_FACTOR * d };
            let combined = PROTO_WEIGHT * proto + DENSITY_WEIGHT * gated;
            // Strict > ties break in enum order.
            if first || combined > winner.confidence {
                winner = Classification {
                    kind,
                    confidence: combined,
                };
                first = false;
            }
        }

        if winner.confidence > LEARN_THRESHOLD && winner.kind != MemoryKind::Unclassified {
            self.learn(winner.kind, embedding);
        }
        if winner.confidence < MIN_CONFIDENCE {
            return Ok(Classification::unclassified(winner.confidence));
        }
        Ok(winner)
    }

    /// Max cosine against each kind's static and learned prototypes,
    /// floored at 0, in [`CLASSIFIABLE`] order.
    async fn prototype_scores(
        &self,
        embedding: &[f32],
    ) -> Result<Vec<(MemoryKind, f64)>, MnemoError> {
        let table = self.prototype_embeddings().await?;
        let learned = match self.learned.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let mut scores = Vec::with_capacity(CLASSIFIABLE.len());
        for kind in CLASSIFIABLE {
            let mut best = 0.0f64;
            if let Some((_, vectors)) = table.iter().find(|(k, _)| *k == kind) {
                for vector in vectors {
                    best = best.max(cosine_similarity(embedding, vector));
                }
            }
            if let Some(queue) = learned.get(&kind) {
                for vector in queue {
                    best = best.max(cosine_similarity(embedding, vector));
                }
            }
            scores.push((kind, best.max(0.0)));
        }
        Ok(scores)
    }

    /// Per-kind average neighbor score over the ANN neighborhood.
    ///
    /// Averaging (not summing) keeps a majority class from swallowing
    /// every borderline memory. Kinds with no neighbors are absent.
    async fn density_scores(
        &self,
        embedding: &[f32],
        scope: Option<MemoryScope>,
    ) -> Result<HashMap<MemoryKind, f64>, MnemoError> {
        let neighbors = self
            .store
            .ann_search(embedding, DENSITY_NEIGHBORS, scope)
            .await?;
        if neighbors.is_empty() {
            return Ok(HashMap::new());
        }

        let distance_by_id: HashMap<&str, f64> = neighbors
            .iter()
            .map(|(id, distance)| (id.as_str(), *distance))
            .collect();
        let ids: Vec<String> = neighbors.iter().map(|(id, _)| id.clone()).collect();
        let rows = self.store.get_many(&ids).await?;

        let mut sums: HashMap<MemoryKind, (f64, usize)> = HashMap::new();
        for row in rows {
            if !CLASSIFIABLE.contains(&row.kind) {
                continue;
            }
            let Some(distance) = distance_by_id.get(row.id.as_str()) else {
                continue;
            };
            let strength = 1.0 / (1.0 + distance.max(0.0));
            let entry = sums.entry(row.kind).or_insert((0.0, 0));
            entry.0 += strength;
            entry.1 += 1;
        }

        Ok(sums
            .into_iter()
            .map(|(kind, (sum, count))| (kind, sum / count as f64))
            .collect())
    }

    /// Embed the static exemplars once and cache for process lifetime.
    async fn prototype_embeddings(
        &self,
    ) -> Result<&Vec<(MemoryKind, Vec<Vec<f32>>)>, MnemoError> {
        self.prototypes
            .get_or_try_init(|| async {
                let texts: Vec<String> = PROTOTYPES
                    .iter()
                    .flat_map(|(_, exemplars)| exemplars.iter().map(|s| s.to_string()))
                    .collect();
                let output = self.embedder.embed(EmbeddingInput { texts }).await?;
                let mut vectors = output.embeddings.into_iter();
                let mut table = Vec::with_capacity(PROTOTYPES.len());
                for (kind, exemplars) in PROTOTYPES {
                    let kind_vectors: Vec<Vec<f32>> = exemplars
                        .iter()
                        .map(|_| vectors.next().unwrap_or_default())
                        .collect();
                    table.push((*kind, kind_vectors));
                }
                debug!("prototype embeddings cached");
                Ok(table)
            })
            .await
    }

    /// Push an embedding into a kind's bounded learned queue.
    fn learn(&self, kind: MemoryKind, embedding: &[f32]) {
        let mut learned = match self.learned.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let queue = learned.entry(kind).or_default();
        if queue.len() >= LEARNED_CAPACITY {
            queue.pop_front();
        }
        queue.push_back(embedding.to_vec());
        debug!(kind = %kind, learned = queue.len(), "learned prototype added");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mnemo_config::StorageConfig;
    use mnemo_core::types::{EmbeddingOutput, MemoryRecord, EMBEDDING_DIM};
    use tempfile::tempdir;

    /// Embedder that maps every exemplar of a kind onto one axis, so
    /// prototype cosines are exactly 0 or 1 in tests.
    struct AxisEmbedder;

    fn axis_vec(axis: usize) -> Vec<f32> {
        let mut v = vec![0.0f32; EMBEDDING_DIM];
        v[axis % EMBEDDING_DIM] = 1.0;
        v
    }

    fn kind_axis(kind: MemoryKind) -> usize {
        CLASSIFIABLE.iter().position(|k| *k == kind).unwrap()
    }

    #[async_trait]
    impl Embedder for AxisEmbedder {
        async fn embed(&self, input: EmbeddingInput) -> Result<EmbeddingOutput, MnemoError> {
            let embeddings = input
                .texts
                .iter()
                .map(|text| {
                    let kind = PROTOTYPES
                        .iter()
                        .find(|(_, exemplars)| exemplars.contains(&text.as_str()))
                        .map(|(kind, _)| *kind);
                    match kind {
                        Some(kind) => axis_vec(kind_axis(kind)),
                        None => vec![0.0; EMBEDDING_DIM],
                    }
                })
                .collect();
            Ok(EmbeddingOutput {
                embeddings,
                dimensions: EMBEDDING_DIM,
            })
        }
    }

    async fn classifier(dir: &tempfile::TempDir, name: &str) -> KindClassifier {
        let config = StorageConfig {
            database_path: dir.path().join(name).to_str().unwrap().to_string(),
            vector_index: true,
        };
        let store = Arc::new(MemoryStore::open(&config).await.unwrap());
        KindClassifier::new(store, Arc::new(AxisEmbedder))
    }

    fn task_row(id: &str, embedding: Vec<f32>) -> MemoryRecord {
        MemoryRecord {
            id: id.to_string(),
            parent_id: id.to_string(),
            chunk_index: 0,
            content: format!("row {id}"),
            kind: MemoryKind::Task,
            scope: mnemo_core::types::MemoryScope::Global,
            importance: 0.5,
            token_count: 2,
            recall_count: 0,
            last_recalled_at: None,
            validity_score: 1.0,
            is_negative: false,
            created_at: 1_000,
            updated_at: 1_000,
            embedding: Some(embedding),
        }
    }

    #[tokio::test]
    async fn empty_embedding_is_unclassified_at_zero() {
        let dir = tempdir().unwrap();
        let clf = classifier(&dir, "empty.db").await;
        let result = clf.classify(&[], None).await.unwrap();
        assert_eq!(result.kind, MemoryKind::Unclassified);
        assert_eq!(result.confidence, 0.0);
    }

    #[tokio::test]
    async fn strong_prototype_match_short_circuits_and_learns() {
        let dir = tempdir().unwrap();
        let clf = classifier(&dir, "proto.db").await;

        let result = clf
            .classify(&axis_vec(kind_axis(MemoryKind::Reference)), None)
            .await
            .unwrap();
        assert_eq!(result.kind, MemoryKind::Reference);
        assert!((result.confidence - 1.0).abs() < 1e-6);

        // Confidence above the learn threshold populated the queue.
        let learned = clf.learned.lock().unwrap();
        assert_eq!(learned.get(&MemoryKind::Reference).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unmatched_embedding_with_empty_corpus_is_unclassified() {
        let dir = tempdir().unwrap();
        let clf = classifier(&dir, "unmatched.db").await;

        let result = clf.classify(&axis_vec(42), None).await.unwrap();
        assert_eq!(result.kind, MemoryKind::Unclassified);
        assert!(result.confidence < MIN_CONFIDENCE);
    }

    #[tokio::test]
    async fn density_tips_a_borderline_prototype_score() {
        let dir = tempdir().unwrap();
        let clf = classifier(&dir, "density.db").await;

        // Neighborhood of task rows around axis 42.
        let rows: Vec<MemoryRecord> = (0..5)
            .map(|i| task_row(&format!("t{i}"), axis_vec(42)))
            .collect();
        clf.store.insert_rows(rows).await.unwrap();

        // proto(task) = 0.5: under the short-circuit floor, over the
        // density gate.
        let mut query = vec![0.0f32; EMBEDDING_DIM];
        query[kind_axis(MemoryKind::Task)] = 0.5;
        query[42] = (1.0f32 - 0.25).sqrt();

        let result = clf.classify(&query, None).await.unwrap();
        assert_eq!(result.kind, MemoryKind::Task);
        // combined = 0.9*0.5 + 0.1*avg(1/(1+d)); neighbors are not at
        // distance 0, so just require the density lift over 0.9*proto.
        assert!(result.confidence > 0.45);
        assert!(result.confidence >= MIN_CONFIDENCE);
    }

    #[tokio::test]
    async fn learned_queue_is_bounded() {
        let dir = tempdir().unwrap();
        let clf = classifier(&dir, "bounded.db").await;

        for i in 0..(LEARNED_CAPACITY + 6) {
            clf.learn(MemoryKind::Note, &axis_vec(i));
        }
        let learned = clf.learned.lock().unwrap();
        assert_eq!(learned.get(&MemoryKind::Note).unwrap().len(), LEARNED_CAPACITY);
    }

    #[tokio::test]
    async fn learned_prototypes_extend_the_static_table() {
        let dir = tempdir().unwrap();
        let clf = classifier(&dir, "learned.db").await;

        clf.learn(MemoryKind::Note, &axis_vec(99));
        let result = clf.classify(&axis_vec(99), None).await.unwrap();
        assert_eq!(result.kind, MemoryKind::Note, "learned vector matches itself");
        assert!((result.confidence - 1.0).abs() < 1e-6);
    }
}
