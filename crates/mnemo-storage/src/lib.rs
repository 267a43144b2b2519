// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence layer for the mnemo memory engine.
//!
//! One database file carries the record table, the FTS5 index, and the
//! sqlite-vec ANN index. All writes are serialized through
//! tokio-rusqlite's single background thread; both secondary indexes
//! are best-effort and their absence degrades retrieval rather than
//! failing it.

pub mod database;
pub mod queries;
pub mod schema;
pub mod store;

pub use database::Database;
pub use store::MemoryStore;
