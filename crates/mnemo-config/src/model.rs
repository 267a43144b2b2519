// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the mnemo memory engine.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject
//! unrecognized config keys at startup with an actionable error.

use serde::{Deserialize, Serialize};

/// Top-level mnemo configuration.
///
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MnemoConfig {
    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Chunking, dedup, and retrieval settings.
    #[serde(default)]
    pub memory: MemoryConfig,
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the single-file database inside the home directory.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Whether to attempt loading the vector index extension.
    /// When false the engine starts in the ANN-disabled degraded mode.
    #[serde(default = "default_true")]
    pub vector_index: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            vector_index: true,
        }
    }
}

/// Chunking, dedup, and retrieval configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MemoryConfig {
    /// Token window size for chunking.
    #[serde(default = "default_chunk_tokens")]
    pub chunk_tokens: usize,

    /// Token overlap between consecutive chunks.
    #[serde(default = "default_overlap_tokens")]
    pub overlap_tokens: usize,

    /// Exact-cosine threshold above which a write merges into an
    /// existing row instead of creating a new one.
    #[serde(default = "default_dedup_threshold")]
    pub dedup_threshold: f64,

    /// Preferred candidate width for recall. `None` sizes the width
    /// from the corpus (50 / 100 / 200).
    #[serde(default)]
    pub recall_limit: Option<usize>,

    /// Diversity/relevance trade-off for MMR reranking.
    #[serde(default = "default_mmr_lambda")]
    pub mmr_lambda: f64,

    /// Capacity of the query-embedding LRU cache.
    #[serde(default = "default_query_cache_size")]
    pub query_cache_size: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            chunk_tokens: default_chunk_tokens(),
            overlap_tokens: default_overlap_tokens(),
            dedup_threshold: default_dedup_threshold(),
            recall_limit: None,
            mmr_lambda: default_mmr_lambda(),
            query_cache_size: default_query_cache_size(),
        }
    }
}

fn default_database_path() -> String {
    "memory.db".to_string()
}

fn default_true() -> bool {
    true
}

fn default_chunk_tokens() -> usize {
    220
}

fn default_overlap_tokens() -> usize {
    40
}

fn default_dedup_threshold() -> f64 {
    0.95
}

fn default_mmr_lambda() -> f64 {
    0.75
}

fn default_query_cache_size() -> usize {
    512
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_engine_constants() {
        let config = MnemoConfig::default();
        assert_eq!(config.memory.chunk_tokens, 220);
        assert_eq!(config.memory.overlap_tokens, 40);
        assert!((config.memory.dedup_threshold - 0.95).abs() < f64::EPSILON);
        assert!((config.memory.mmr_lambda - 0.75).abs() < f64::EPSILON);
        assert_eq!(config.memory.query_cache_size, 512);
        assert!(config.memory.recall_limit.is_none());
        assert!(config.storage.vector_index);
    }

    #[test]
    fn empty_json_deserializes_to_defaults() {
        let config: MnemoConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.storage.database_path, "memory.db");
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let result = serde_json::from_str::<MnemoConfig>(r#"{"memroy": {}}"#);
        assert!(result.is_err(), "typo'd section should be rejected");
    }

    #[test]
    fn partial_section_fills_remaining_defaults() {
        let config: MnemoConfig =
            serde_json::from_str(r#"{"memory": {"chunk_tokens": 128}}"#).unwrap();
        assert_eq!(config.memory.chunk_tokens, 128);
        assert_eq!(config.memory.overlap_tokens, 40);
    }
}
