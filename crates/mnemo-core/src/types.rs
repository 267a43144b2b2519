// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared across the mnemo crates.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// Embedding dimensions for all-MiniLM-L6-v2.
pub const EMBEDDING_DIM: usize = 384;

/// Semantic category of a memory.
///
/// The enum is closed: `"auto"` is an engine directive, never a stored
/// value, and anything outside these six variants is rejected at parse.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MemoryKind {
    Identity,
    Task,
    Knowledge,
    Reference,
    Note,
    Unclassified,
}

impl MemoryKind {
    /// Convert to string for SQLite storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryKind::Identity => "identity",
            MemoryKind::Task => "task",
            MemoryKind::Knowledge => "knowledge",
            MemoryKind::Reference => "reference",
            MemoryKind::Note => "note",
            MemoryKind::Unclassified => "unclassified",
        }
    }

    /// Parse from SQLite string. Unknown values map to `Unclassified`
    /// so a half-migrated row never poisons a scan.
    pub fn from_str_value(s: &str) -> Self {
        match s {
            "identity" => MemoryKind::Identity,
            "task" => MemoryKind::Task,
            "knowledge" => MemoryKind::Knowledge,
            "reference" => MemoryKind::Reference,
            "note" => MemoryKind::Note,
            _ => MemoryKind::Unclassified,
        }
    }
}

/// Coarse retention domain for a memory.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MemoryScope {
    Session,
    Project,
    Global,
}

impl MemoryScope {
    /// Convert to string for SQLite storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryScope::Session => "session",
            MemoryScope::Project => "project",
            MemoryScope::Global => "global",
        }
    }

    /// Parse from SQLite string. Unknown values map to `Global`.
    pub fn from_str_value(s: &str) -> Self {
        match s {
            "session" => MemoryScope::Session,
            "project" => MemoryScope::Project,
            _ => MemoryScope::Global,
        }
    }
}

/// A single persistent memory row.
///
/// All chunks produced by one `remember` call share a `parent_id`;
/// `chunk_index` is the chunk's 0-based position inside that parent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Unique identifier (UUID v4, string-encoded).
    pub id: String,
    /// Id shared by all chunks of the originating `remember` call.
    pub parent_id: String,
    /// 0-based position inside the parent.
    pub chunk_index: i64,
    /// Trimmed, whitespace-collapsed content.
    pub content: String,
    /// Semantic category.
    pub kind: MemoryKind,
    /// Retention domain.
    pub scope: MemoryScope,
    /// Importance in [0, 1]. Defaults to 0.5 on write.
    pub importance: f64,
    /// Token count as reported by the tokenizer.
    pub token_count: i64,
    /// Number of retrievals that returned this record.
    pub recall_count: i64,
    /// Epoch-ms of the most recent retrieval, if any.
    pub last_recalled_at: Option<i64>,
    /// Validity in [0, 1]; down-weights the final score multiplicatively.
    pub validity_score: f64,
    /// If true, a fixed penalty is subtracted from the final score.
    pub is_negative: bool,
    /// Epoch-ms creation timestamp.
    pub created_at: i64,
    /// Epoch-ms last-update timestamp.
    pub updated_at: i64,
    /// 384-dim unit-norm embedding, if one was computed.
    #[serde(skip)]
    pub embedding: Option<Vec<f32>>,
}

/// A memory with the partial and final scores from hybrid retrieval.
#[derive(Debug, Clone)]
pub struct ScoredMemory {
    /// The underlying record.
    pub record: MemoryRecord,
    /// Cosine similarity against the query embedding, floored at 0.
    pub vector_score: f64,
    /// Token-overlap score with substring and FTS-hit bonuses.
    pub lexical_score: f64,
    /// Freshness signal decaying with age.
    pub recency_score: f64,
    /// Stored importance with slow daily decay.
    pub importance_score: f64,
    /// Final combined score.
    pub score: f64,
}

/// Input for an embedding capability.
#[derive(Debug, Clone)]
pub struct EmbeddingInput {
    pub texts: Vec<String>,
}

/// Output from an embedding capability.
#[derive(Debug, Clone)]
pub struct EmbeddingOutput {
    pub embeddings: Vec<Vec<f32>>,
    pub dimensions: usize,
}

/// State of the approximate-nearest-neighbor index.
///
/// `Disabled` is terminal within a process: vector search returns
/// empty, dedup probes always miss, and classifier density falls back
/// to the prototype-only path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnStatus {
    pub enabled: bool,
    pub message: String,
}

/// Read-only status payload returned by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineStatus {
    /// Absolute path of the database file.
    pub path: String,
    /// Vector index state.
    pub ann: AnnStatus,
    /// Total number of stored memory rows.
    pub corpus_size: u64,
}

/// Options accepted by `remember`.
#[derive(Debug, Clone)]
pub struct RememberOptions {
    /// Explicit kind, or `None` to classify each chunk automatically.
    pub kind: Option<MemoryKind>,
    pub scope: MemoryScope,
    pub importance: f64,
    pub validity_score: f64,
    pub is_negative: bool,
}

impl Default for RememberOptions {
    fn default() -> Self {
        Self {
            kind: None,
            scope: MemoryScope::Global,
            importance: 0.5,
            validity_score: 1.0,
            is_negative: false,
        }
    }
}

/// Options accepted by `recall` and `recall_scored`.
#[derive(Debug, Clone, Default)]
pub struct RecallOptions {
    /// Number of results to return after reranking. Defaults to 8.
    pub limit: Option<usize>,
    /// Candidate width before reranking. Defaults to a corpus-sized width.
    pub recall_limit: Option<usize>,
    /// Restrict candidates to one scope.
    pub scope: Option<MemoryScope>,
}

/// Options accepted by `list`.
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    pub scope: Option<MemoryScope>,
    pub kind: Option<MemoryKind>,
    /// Case-insensitive substring filter on content.
    pub query: Option<String>,
    /// Page size, clamped to [1, 200]. Defaults to 30.
    pub limit: Option<usize>,
    pub offset: usize,
}

/// Convert an f32 vector to bytes for SQLite BLOB storage.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    vec.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Convert a SQLite BLOB back to an f32 vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes(chunk.try_into().unwrap()))
        .collect()
}

/// Compute cosine similarity between two equal-length vectors.
///
/// Falls back to 0.0 on a length mismatch or a zero-norm side; the
/// stored vectors are unit-norm, so this is normally a dot product.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += f64::from(*x) * f64::from(*y);
        norm_a += f64::from(*x) * f64::from(*x);
        norm_b += f64::from(*y) * f64::from(*y);
    }
    if norm_a <= 0.0 || norm_b <= 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Clamp a score into [0, 1].
pub fn clamp01(v: f64) -> f64 {
    v.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn kind_string_roundtrip() {
        for kind in MemoryKind::iter() {
            assert_eq!(MemoryKind::from_str_value(kind.as_str()), kind);
            assert_eq!(kind.to_string(), kind.as_str());
        }
    }

    #[test]
    fn kind_rejects_out_of_enum_input() {
        // The chat-path value "conversation" is not part of the enum.
        assert!(MemoryKind::from_str("conversation").is_err());
        assert!(MemoryKind::from_str("auto").is_err());
        assert_eq!(MemoryKind::from_str("reference").unwrap(), MemoryKind::Reference);
    }

    #[test]
    fn unknown_stored_kind_maps_to_unclassified() {
        assert_eq!(MemoryKind::from_str_value("conversation"), MemoryKind::Unclassified);
    }

    #[test]
    fn scope_string_roundtrip() {
        for scope in MemoryScope::iter() {
            assert_eq!(MemoryScope::from_str_value(scope.as_str()), scope);
        }
        assert_eq!(MemoryScope::from_str_value("weird"), MemoryScope::Global);
    }

    #[test]
    fn blob_roundtrip_384_dim() {
        let original: Vec<f32> = (0..EMBEDDING_DIM).map(|i| i as f32 / 384.0).collect();
        let blob = vec_to_blob(&original);
        assert_eq!(blob.len(), EMBEDDING_DIM * 4);
        let recovered = blob_to_vec(&blob);
        assert_eq!(recovered.len(), EMBEDDING_DIM);
        for (a, b) in original.iter().zip(recovered.iter()) {
            assert!((a - b).abs() < f32::EPSILON);
        }
    }

    #[test]
    fn cosine_identical_vectors() {
        let v = vec![0.6f32, 0.8, 0.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_orthogonal_vectors() {
        let a = vec![1.0f32, 0.0];
        let b = vec![0.0f32, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-9);
    }

    #[test]
    fn cosine_mismatched_lengths_is_zero() {
        let a = vec![1.0f32, 0.0];
        let b = vec![1.0f32, 0.0, 0.0];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }

    #[test]
    fn remember_defaults() {
        let opts = RememberOptions::default();
        assert!(opts.kind.is_none());
        assert_eq!(opts.scope, MemoryScope::Global);
        assert!((opts.importance - 0.5).abs() < f64::EPSILON);
        assert!((opts.validity_score - 1.0).abs() < f64::EPSILON);
        assert!(!opts.is_negative);
    }
}
