// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedded versioned migrations tracked by `PRAGMA user_version`.
//!
//! Each entry in [`MIGRATIONS`] is applied in its own transaction and
//! bumps `user_version` to its 1-based index. Migrations are additive
//! only: columns are added with constant defaults and backfilled,
//! never dropped or rewritten.
//!
//! The FTS5 and vec0 virtual tables are *not* part of the migration
//! chain — they are best-effort and created at open time so their
//! absence cannot block the primary table.

/// Schema version the current binary expects.
pub const SCHEMA_VERSION: i64 = 2;

/// Versioned migration scripts, index 0 == version 1.
const MIGRATIONS: &[&str] = &[
    // v1: base record table.
    "CREATE TABLE IF NOT EXISTS memories (
        id TEXT PRIMARY KEY NOT NULL,
        content TEXT NOT NULL,
        kind TEXT NOT NULL DEFAULT 'unclassified',
        scope TEXT NOT NULL DEFAULT 'global',
        importance REAL NOT NULL DEFAULT 0.5,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL,
        embedding BLOB
    );
    CREATE INDEX IF NOT EXISTS idx_memories_scope_updated
        ON memories(scope, updated_at DESC);",
    // v2: chunk lineage and recall metadata, backfilled additively.
    "ALTER TABLE memories ADD COLUMN parent_id TEXT NOT NULL DEFAULT '';
    ALTER TABLE memories ADD COLUMN chunk_index INTEGER NOT NULL DEFAULT 0;
    ALTER TABLE memories ADD COLUMN token_count INTEGER NOT NULL DEFAULT 0;
    ALTER TABLE memories ADD COLUMN recall_count INTEGER NOT NULL DEFAULT 0;
    ALTER TABLE memories ADD COLUMN last_recalled_at INTEGER;
    ALTER TABLE memories ADD COLUMN validity_score REAL NOT NULL DEFAULT 1.0;
    ALTER TABLE memories ADD COLUMN is_negative INTEGER NOT NULL DEFAULT 0;
    UPDATE memories SET parent_id = id WHERE parent_id = '';
    CREATE INDEX IF NOT EXISTS idx_memories_parent_chunk
        ON memories(parent_id, chunk_index ASC);
    CREATE INDEX IF NOT EXISTS idx_memories_validity
        ON memories(validity_score DESC);",
];

/// Best-effort full-text index over `(content, id)`.
pub const FTS_DDL: &str =
    "CREATE VIRTUAL TABLE IF NOT EXISTS memories_fts USING fts5(content, id UNINDEXED);";

/// Best-effort sqlite-vec index over `(memory_id, embedding, scope)`.
pub const VEC_DDL: &str = "CREATE VIRTUAL TABLE IF NOT EXISTS memory_vectors \
     USING vec0(memory_id TEXT PRIMARY KEY, embedding FLOAT[384], scope TEXT);";

/// Run all pending migrations against the given connection.
pub fn migrate(conn: &mut rusqlite::Connection) -> rusqlite::Result<()> {
    let current = schema_version(conn)?;
    for (idx, sql) in MIGRATIONS.iter().enumerate() {
        let version = (idx + 1) as i64;
        if version <= current {
            continue;
        }
        let tx = conn.transaction()?;
        tx.execute_batch(sql)?;
        tx.pragma_update(None, "user_version", version)?;
        tx.commit()?;
    }
    Ok(())
}

/// Read the monotonic schema version (`0` for a fresh database).
pub fn schema_version(conn: &rusqlite::Connection) -> rusqlite::Result<i64> {
    conn.pragma_query_value(None, "user_version", |row| row.get(0))
}
