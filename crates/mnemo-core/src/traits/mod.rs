// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Capability traits consumed by the memory engine.
//!
//! The engine is built against these seams so embedding and
//! tokenization backends can be swapped (or stubbed in tests) without
//! touching storage or retrieval code.

pub mod embedding;
pub mod tokenizer;

pub use embedding::Embedder;
pub use tokenizer::TextTokenizer;
