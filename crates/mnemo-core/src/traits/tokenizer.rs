// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tokenizer capability used for chunking.

use async_trait::async_trait;

use crate::error::MnemoError;

/// Capability for converting text to token ids and back.
///
/// `tokenize` must not add special tokens and `decode` must skip them,
/// so that decoding a token window yields plain content text.
#[async_trait]
pub trait TextTokenizer: Send + Sync {
    /// Encode text into a token-id sequence.
    async fn tokenize(&self, text: &str) -> Result<Vec<u32>, MnemoError>;

    /// Decode a token-id sequence back into text.
    async fn decode(&self, ids: &[u32]) -> Result<String, MnemoError>;
}
