// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Index-backed candidate generation: FTS5 match, vec0 k-NN, and the
//! exact-cosine dedup probe.
//!
//! Both indexes are best-effort. Read failures log and return empty;
//! the sync insert/delete helpers are called inside write transactions
//! and their errors are swallowed by the caller per row.

use tracing::warn;

use mnemo_core::types::{MemoryRecord, MemoryScope};
use mnemo_core::{cosine_similarity, vec_to_blob, MnemoError};

use crate::database::{map_tr_err, Database};
use crate::queries::memories;

/// Candidate count for the semantic-duplicate probe.
const DEDUP_PROBE_K: usize = 12;

/// Build a safe FTS5 MATCH expression from raw user text.
///
/// Tokens are double-quoted and OR-joined so FTS5 operators in the
/// input cannot cause syntax errors. Returns `None` when no tokens
/// survive.
pub fn sanitize_fts_query(raw: &str) -> Option<String> {
    let tokens: Vec<String> = raw
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{t}\""))
        .collect();
    if tokens.is_empty() {
        None
    } else {
        Some(tokens.join(" OR "))
    }
}

/// Full-text search returning matching row ids, best first.
pub async fn fts_search(db: &Database, query: &str, limit: usize) -> Result<Vec<String>, MnemoError> {
    if !db.fts_enabled() {
        return Ok(Vec::new());
    }
    let Some(match_expr) = sanitize_fts_query(query) else {
        return Ok(Vec::new());
    };

    db.connection()
        .call(move |conn| {
            let result = (|| -> rusqlite::Result<Vec<String>> {
                let mut stmt = conn.prepare(
                    "SELECT id FROM memories_fts WHERE memories_fts MATCH ?1
                     ORDER BY rank LIMIT ?2",
                )?;
                let ids = stmt
                    .query_map(rusqlite::params![match_expr, limit as i64], |row| row.get(0))?
                    .collect::<rusqlite::Result<Vec<String>>>()?;
                Ok(ids)
            })();
            match result {
                Ok(ids) => Ok(ids),
                Err(e) => {
                    warn!(error = %e, "FTS query failed, returning no lexical hits");
                    Ok(Vec::new())
                }
            }
        })
        .await
        .map_err(map_tr_err)
}

/// k-NN over the vec0 index, `(id, distance)` ascending.
///
/// Returns empty when the index is disabled or the query vector is
/// empty. `scope` restricts candidates via the vec0 metadata column.
pub async fn ann_search(
    db: &Database,
    embedding: &[f32],
    k: usize,
    scope: Option<MemoryScope>,
) -> Result<Vec<(String, f64)>, MnemoError> {
    if !db.ann().enabled || embedding.is_empty() || k == 0 {
        return Ok(Vec::new());
    }
    let blob = vec_to_blob(embedding);

    db.connection()
        .call(move |conn| {
            let result = (|| -> rusqlite::Result<Vec<(String, f64)>> {
                let mut hits = Vec::new();
                match scope {
                    Some(scope) => {
                        let mut stmt = conn.prepare(
                            "SELECT memory_id, distance FROM memory_vectors
                             WHERE embedding MATCH ?1 AND k = ?2 AND scope = ?3
                             ORDER BY distance",
                        )?;
                        let rows = stmt.query_map(
                            rusqlite::params![blob, k as i64, scope.as_str()],
                            |row| Ok((row.get(0)?, row.get(1)?)),
                        )?;
                        for row in rows {
                            hits.push(row?);
                        }
                    }
                    None => {
                        let mut stmt = conn.prepare(
                            "SELECT memory_id, distance FROM memory_vectors
                             WHERE embedding MATCH ?1 AND k = ?2
                             ORDER BY distance",
                        )?;
                        let rows = stmt
                            .query_map(rusqlite::params![blob, k as i64], |row| {
                                Ok((row.get(0)?, row.get(1)?))
                            })?;
                        for row in rows {
                            hits.push(row?);
                        }
                    }
                }
                Ok(hits)
            })();
            match result {
                Ok(hits) => Ok(hits),
                Err(e) => {
                    warn!(error = %e, "vector query failed, returning no neighbors");
                    Ok(Vec::new())
                }
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Probe for a semantic duplicate of `embedding` within `scope`.
///
/// The ANN metric is not guaranteed to be cosine, so candidates are
/// re-scored with exact cosine against their stored embeddings; the
/// best one wins iff it clears `threshold`.
pub async fn find_semantic_duplicate(
    db: &Database,
    embedding: &[f32],
    scope: MemoryScope,
    threshold: f64,
) -> Result<Option<MemoryRecord>, MnemoError> {
    let hits = ann_search(db, embedding, DEDUP_PROBE_K, Some(scope)).await?;
    if hits.is_empty() {
        return Ok(None);
    }

    let ids: Vec<String> = hits.into_iter().map(|(id, _)| id).collect();
    let candidates = memories::get_memories_by_ids(db, &ids).await?;

    let mut best: Option<(f64, MemoryRecord)> = None;
    for candidate in candidates {
        let Some(stored) = candidate.embedding.as_deref() else {
            continue;
        };
        let similarity = cosine_similarity(embedding, stored);
        if best.as_ref().is_none_or(|(s, _)| similarity > *s) {
            best = Some((similarity, candidate));
        }
    }

    Ok(best.and_then(|(similarity, record)| (similarity >= threshold).then_some(record)))
}

// --- sync helpers used inside write transactions ---

/// Insert one row into the FTS index.
pub(crate) fn fts_insert(
    conn: &rusqlite::Connection,
    id: &str,
    content: &str,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO memories_fts (content, id) VALUES (?1, ?2)",
        rusqlite::params![content, id],
    )?;
    Ok(())
}

/// Remove one row from the FTS index.
pub(crate) fn fts_delete(conn: &rusqlite::Connection, id: &str) -> rusqlite::Result<()> {
    conn.execute(
        "DELETE FROM memories_fts WHERE id = ?1",
        rusqlite::params![id],
    )?;
    Ok(())
}

/// Insert one vector into the vec0 index. UPSERT is not supported on
/// vec0, so replacement is delete-then-insert.
pub(crate) fn vec_insert(
    conn: &rusqlite::Connection,
    id: &str,
    embedding: &[f32],
    scope: &str,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO memory_vectors (memory_id, embedding, scope) VALUES (?1, ?2, ?3)",
        rusqlite::params![id, vec_to_blob(embedding), scope],
    )?;
    Ok(())
}

/// Remove one vector from the vec0 index.
pub(crate) fn vec_delete(conn: &rusqlite::Connection, id: &str) -> rusqlite::Result<()> {
    conn.execute(
        "DELETE FROM memory_vectors WHERE memory_id = ?1",
        rusqlite::params![id],
    )?;
    Ok(())
}
