// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core types, errors, and capability traits for the mnemo memory engine.
//!
//! This crate carries everything the storage and engine layers share:
//! the [`MemoryRecord`] data model, the closed kind/scope enums, the
//! [`MnemoError`] taxonomy, and the [`Embedder`]/[`TextTokenizer`]
//! capability traits.

pub mod error;
pub mod traits;
pub mod types;

pub use error::MnemoError;
pub use traits::{Embedder, TextTokenizer};
pub use types::{
    blob_to_vec, clamp01, cosine_similarity, vec_to_blob, AnnStatus, EmbeddingInput,
    EmbeddingOutput, EngineStatus, ListOptions, MemoryKind, MemoryRecord, MemoryScope,
    RecallOptions, RememberOptions, ScoredMemory, EMBEDDING_DIM,
};
