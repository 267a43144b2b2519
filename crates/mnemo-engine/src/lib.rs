// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The mnemo memory engine.
//!
//! A local, embedded retrieval-augmented memory store: text goes in
//! through chunking, embedding, semantic dedup, and kind
//! classification; it comes back out through hybrid recall (vector +
//! lexical + recency + importance) with MMR diversity reranking and
//! sibling expansion.
//!
//! ## Architecture
//!
//! - **Chunker**: overlapping token windows over normalized text
//! - **Query expander**: alias-table expansion of recall queries
//! - **Scorer**: multi-signal candidate scoring
//! - **Reranker**: Maximal Marginal Relevance selection
//! - **KindClassifier**: prototypes + neighbor density + online learning
//! - **OnnxEmbedder**: local all-MiniLM-L6-v2 embedding/tokenizer adapter
//! - **MemoryEngine**: the public facade over all of the above

pub mod chunker;
pub mod classifier;
pub mod embedder;
pub mod engine;
pub mod expand;
pub mod rerank;
pub mod scorer;

pub use classifier::{Classification, KindClassifier};
pub use embedder::OnnxEmbedder;
pub use engine::MemoryEngine;
