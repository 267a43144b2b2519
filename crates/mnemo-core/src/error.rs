// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the mnemo memory engine.

use thiserror::Error;

/// The primary error type used across all mnemo crates.
///
/// Index degradation (ANN or FTS unavailable) is deliberately *not* an
/// error variant: the engine keeps running in degraded mode and reports
/// it through `status()` instead.
#[derive(Debug, Error)]
pub enum MnemoError {
    /// Memory content was empty after trimming.
    #[error("memory content is empty")]
    EmptyContent,

    /// Recall query was empty after trimming.
    #[error("query is empty")]
    EmptyQuery,

    /// Chunking produced no rows to insert and no merge occurred.
    #[error("no memory chunks were produced")]
    EmptyMemoryChunks,

    /// A required capability is missing (e.g. no embedder wired in).
    #[error("not configured: {0}")]
    NotConfigured(String),

    /// Storage backend errors (database connection, query failure).
    /// Surfaced only after the enclosing transaction rolled back.
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}
