// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Memory row CRUD, merge, and recall-metric updates.
//!
//! Every write runs in one transaction on the single writer thread.
//! FTS and vec0 upkeep happens inside the same transaction but is
//! best-effort: a failed index row is logged and skipped, never
//! allowed to abort the primary insert.

use rusqlite::params;
use tracing::warn;

use mnemo_core::types::{MemoryKind, MemoryRecord, MemoryScope};
use mnemo_core::{blob_to_vec, vec_to_blob, MnemoError};

use crate::database::{map_tr_err, Database};
use crate::queries::search::{fts_delete, fts_insert, vec_delete, vec_insert};

const COLUMNS: &str = "id, parent_id, chunk_index, content, kind, scope, importance, \
     token_count, recall_count, last_recalled_at, validity_score, is_negative, \
     created_at, updated_at, embedding";

/// Convert a rusqlite Row (selected with [`COLUMNS`]) to a record.
fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<MemoryRecord> {
    let kind: String = row.get(4)?;
    let scope: String = row.get(5)?;
    let embedding: Option<Vec<u8>> = row.get(14)?;
    Ok(MemoryRecord {
        id: row.get(0)?,
        parent_id: row.get(1)?,
        chunk_index: row.get(2)?,
        content: row.get(3)?,
        kind: MemoryKind::from_str_value(&kind),
        scope: MemoryScope::from_str_value(&scope),
        importance: row.get(6)?,
        token_count: row.get(7)?,
        recall_count: row.get(8)?,
        last_recalled_at: row.get(9)?,
        validity_score: row.get(10)?,
        is_negative: row.get(11)?,
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
        embedding: embedding.map(|blob| blob_to_vec(&blob)),
    })
}

/// Insert a batch of rows atomically, maintaining both indexes.
pub async fn insert_memory_rows(db: &Database, rows: Vec<MemoryRecord>) -> Result<(), MnemoError> {
    if rows.is_empty() {
        return Ok(());
    }
    let fts = db.fts_enabled();
    let ann = db.ann().enabled;

    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            for record in &rows {
                tx.execute(
                    "INSERT INTO memories (id, parent_id, chunk_index, content, kind, scope,
                        importance, token_count, recall_count, last_recalled_at,
                        validity_score, is_negative, created_at, updated_at, embedding)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
                    params![
                        record.id,
                        record.parent_id,
                        record.chunk_index,
                        record.content,
                        record.kind.as_str(),
                        record.scope.as_str(),
                        record.importance,
                        record.token_count,
                        record.recall_count,
                        record.last_recalled_at,
                        record.validity_score,
                        record.is_negative,
                        record.created_at,
                        record.updated_at,
                        record.embedding.as_deref().map(vec_to_blob),
                    ],
                )?;

                if fts {
                    if let Err(e) = fts_insert(&tx, &record.id, &record.content) {
                        warn!(id = %record.id, error = %e, "skipping FTS entry");
                    }
                }
                if ann {
                    if let Some(embedding) = record.embedding.as_deref() {
                        if let Err(e) = vec_insert(&tx, &record.id, embedding, record.scope.as_str())
                        {
                            warn!(id = %record.id, error = %e, "skipping vector entry");
                        }
                    }
                }
            }
            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Load one record by id.
pub async fn get_memory(db: &Database, id: &str) -> Result<Option<MemoryRecord>, MnemoError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            use rusqlite::OptionalExtension;
            let record = conn
                .query_row(
                    &format!("SELECT {COLUMNS} FROM memories WHERE id = ?1"),
                    params![id],
                    row_to_record,
                )
                .optional()?;
            Ok(record)
        })
        .await
        .map_err(map_tr_err)
}

/// Batch-load records by id (order is not preserved).
pub async fn get_memories_by_ids(
    db: &Database,
    ids: &[String],
) -> Result<Vec<MemoryRecord>, MnemoError> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let ids = ids.to_vec();
    db.connection()
        .call(move |conn| {
            let placeholders: Vec<String> = (1..=ids.len()).map(|i| format!("?{i}")).collect();
            let sql = format!(
                "SELECT {COLUMNS} FROM memories WHERE id IN ({})",
                placeholders.join(", ")
            );
            let mut stmt = conn.prepare(&sql)?;
            let refs: Vec<&dyn rusqlite::types::ToSql> = ids
                .iter()
                .map(|id| id as &dyn rusqlite::types::ToSql)
                .collect();
            let records = stmt
                .query_map(refs.as_slice(), row_to_record)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(records)
        })
        .await
        .map_err(map_tr_err)
}

/// Paginated summaries (embedding omitted), newest update first.
pub async fn list_memories(
    db: &Database,
    scope: Option<MemoryScope>,
    kind: Option<MemoryKind>,
    query: Option<String>,
    limit: i64,
    offset: i64,
) -> Result<Vec<MemoryRecord>, MnemoError> {
    db.connection()
        .call(move |conn| {
            let mut sql = format!(
                "SELECT {} FROM memories",
                COLUMNS.replace(", embedding", ", NULL")
            );
            let mut clauses: Vec<&str> = Vec::new();
            let mut values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

            if let Some(scope) = scope {
                clauses.push("scope = ?");
                values.push(Box::new(scope.as_str().to_string()));
            }
            if let Some(kind) = kind {
                clauses.push("kind = ?");
                values.push(Box::new(kind.as_str().to_string()));
            }
            if let Some(q) = query {
                clauses.push("content LIKE ?");
                values.push(Box::new(format!("%{q}%")));
            }
            if !clauses.is_empty() {
                sql.push_str(" WHERE ");
                sql.push_str(&clauses.join(" AND "));
            }
            sql.push_str(" ORDER BY updated_at DESC LIMIT ? OFFSET ?");
            values.push(Box::new(limit));
            values.push(Box::new(offset));

            let mut stmt = conn.prepare(&sql)?;
            let refs: Vec<&dyn rusqlite::types::ToSql> =
                values.iter().map(|v| v.as_ref()).collect();
            let records = stmt
                .query_map(refs.as_slice(), row_to_record)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(records)
        })
        .await
        .map_err(map_tr_err)
}

/// Per-kind row counts under the given filters (absent kinds omitted).
pub async fn count_by_kind(
    db: &Database,
    scope: Option<MemoryScope>,
    query: Option<String>,
) -> Result<Vec<(String, i64)>, MnemoError> {
    db.connection()
        .call(move |conn| {
            let mut sql = String::from("SELECT kind, COUNT(*) FROM memories");
            let mut clauses: Vec<&str> = Vec::new();
            let mut values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

            if let Some(scope) = scope {
                clauses.push("scope = ?");
                values.push(Box::new(scope.as_str().to_string()));
            }
            if let Some(q) = query {
                clauses.push("content LIKE ?");
                values.push(Box::new(format!("%{q}%")));
            }
            if !clauses.is_empty() {
                sql.push_str(" WHERE ");
                sql.push_str(&clauses.join(" AND "));
            }
            sql.push_str(" GROUP BY kind");

            let mut stmt = conn.prepare(&sql)?;
            let refs: Vec<&dyn rusqlite::types::ToSql> =
                values.iter().map(|v| v.as_ref()).collect();
            let counts = stmt
                .query_map(refs.as_slice(), |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<rusqlite::Result<Vec<(String, i64)>>>()?;
            Ok(counts)
        })
        .await
        .map_err(map_tr_err)
}

/// Total number of stored rows.
pub async fn corpus_size(db: &Database) -> Result<u64, MnemoError> {
    db.connection()
        .call(|conn| {
            let n: i64 = conn.query_row("SELECT COUNT(*) FROM memories", [], |row| row.get(0))?;
            Ok(n as u64)
        })
        .await
        .map_err(map_tr_err)
}

/// Delete a row and its index entries. Idempotent.
pub async fn delete_memory(db: &Database, id: &str) -> Result<(), MnemoError> {
    let id = id.to_string();
    let fts = db.fts_enabled();
    let ann = db.ann().enabled;
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM memories WHERE id = ?1", params![id])?;
            if fts {
                if let Err(e) = fts_delete(&tx, &id) {
                    warn!(id = %id, error = %e, "skipping FTS delete");
                }
            }
            if ann {
                if let Err(e) = vec_delete(&tx, &id) {
                    warn!(id = %id, error = %e, "skipping vector delete");
                }
            }
            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Delete every chunk of a parent in one transaction.
///
/// Returns the number of rows removed.
pub async fn delete_parent(db: &Database, parent_id: &str) -> Result<usize, MnemoError> {
    let parent_id = parent_id.to_string();
    let fts = db.fts_enabled();
    let ann = db.ann().enabled;
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let ids: Vec<String> = {
                let mut stmt =
                    tx.prepare("SELECT id FROM memories WHERE parent_id = ?1")?;
                let rows = stmt
                    .query_map(params![parent_id], |row| row.get(0))?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows
            };
            for id in &ids {
                tx.execute("DELETE FROM memories WHERE id = ?1", params![id])?;
                if fts {
                    if let Err(e) = fts_delete(&tx, id) {
                        warn!(id = %id, error = %e, "skipping FTS delete");
                    }
                }
                if ann {
                    if let Err(e) = vec_delete(&tx, id) {
                        warn!(id = %id, error = %e, "skipping vector delete");
                    }
                }
            }
            tx.commit()?;
            Ok(ids.len())
        })
        .await
        .map_err(map_tr_err)
}

/// Fold a duplicate write into an existing row.
///
/// Overwrites content, kind, embedding, and token count; nudges
/// importance toward the incoming value and validity upward; replaces
/// both index entries. Never creates a new row.
#[allow(clippy::too_many_arguments)]
pub async fn merge_into_existing(
    db: &Database,
    target_id: &str,
    content: &str,
    kind: MemoryKind,
    embedding: Option<&[f32]>,
    token_count: i64,
    importance_input: f64,
    now: i64,
) -> Result<(), MnemoError> {
    let target_id = target_id.to_string();
    let content = content.to_string();
    let embedding = embedding.map(|e| e.to_vec());
    let fts = db.fts_enabled();
    let ann = db.ann().enabled;

    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "UPDATE memories SET
                    content = ?2,
                    kind = ?3,
                    embedding = ?4,
                    token_count = ?5,
                    importance = MIN(1.0, 0.9 * importance + 0.1 * ?6),
                    validity_score = MIN(1.0, validity_score + 0.01),
                    updated_at = ?7
                 WHERE id = ?1",
                params![
                    target_id,
                    content,
                    kind.as_str(),
                    embedding.as_deref().map(vec_to_blob),
                    token_count,
                    importance_input,
                    now,
                ],
            )?;

            let scope: String = tx.query_row(
                "SELECT scope FROM memories WHERE id = ?1",
                params![target_id],
                |row| row.get(0),
            )?;

            if fts {
                let replaced = fts_delete(&tx, &target_id)
                    .and_then(|()| fts_insert(&tx, &target_id, &content));
                if let Err(e) = replaced {
                    warn!(id = %target_id, error = %e, "skipping FTS replace on merge");
                }
            }
            if ann {
                if let Some(embedding) = embedding.as_deref() {
                    let replaced = vec_delete(&tx, &target_id)
                        .and_then(|()| vec_insert(&tx, &target_id, embedding, &scope));
                    if let Err(e) = replaced {
                        warn!(id = %target_id, error = %e, "skipping vector replace on merge");
                    }
                }
            }
            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Record that these rows were just returned by a retrieval.
pub async fn bump_recall_metrics(
    db: &Database,
    ids: Vec<String>,
    boost: f64,
    now: i64,
) -> Result<(), MnemoError> {
    if ids.is_empty() {
        return Ok(());
    }
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            for id in &ids {
                tx.execute(
                    "UPDATE memories SET
                        recall_count = recall_count + 1,
                        last_recalled_at = ?2,
                        updated_at = ?2,
                        importance = MIN(1.0, 0.98 * importance + ?3)
                     WHERE id = ?1",
                    params![id, now, boost],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Flag a record as invalid and negative.
pub async fn mark_invalid(
    db: &Database,
    id: &str,
    score: f64,
    now: i64,
) -> Result<(), MnemoError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE memories SET
                    validity_score = MAX(0.0, ?2),
                    is_negative = 1,
                    updated_at = ?3
                 WHERE id = ?1",
                params![id, score, now],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Chunks of `parent_id` with `chunk_index` in `[lo, hi]`, ascending.
pub async fn sibling_chunks(
    db: &Database,
    parent_id: &str,
    lo: i64,
    hi: i64,
) -> Result<Vec<MemoryRecord>, MnemoError> {
    let parent_id = parent_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM memories
                 WHERE parent_id = ?1 AND chunk_index >= ?2 AND chunk_index <= ?3
                 ORDER BY chunk_index ASC"
            ))?;
            let records = stmt
                .query_map(params![parent_id, lo, hi], row_to_record)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(records)
        })
        .await
        .map_err(map_tr_err)
}
