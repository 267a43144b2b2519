// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed configuration model for the mnemo memory engine.
//!
//! Only the model lives here: front-ends own the loading and merging of
//! config files and hand the engine a finished [`MnemoConfig`].

pub mod model;

pub use model::{MemoryConfig, MnemoConfig, StorageConfig};
