// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding capability for vector generation.

use async_trait::async_trait;

use crate::error::MnemoError;
use crate::types::{EmbeddingInput, EmbeddingOutput};

/// Capability for generating vector embeddings from text.
///
/// Implementations must return unit-norm vectors of
/// [`crate::types::EMBEDDING_DIM`] dimensions, one per input text, in
/// input order.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generates embeddings for the given input.
    async fn embed(&self, input: EmbeddingInput) -> Result<EmbeddingOutput, MnemoError>;
}
