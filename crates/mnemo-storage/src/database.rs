// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and
//! index bring-up.
//!
//! All writes are serialized through tokio-rusqlite's single background
//! thread. Do NOT create additional Connection instances for writes.

use tokio_rusqlite::Connection;
use tracing::{debug, warn};

use mnemo_core::types::AnnStatus;
use mnemo_core::MnemoError;

use crate::schema;

/// Helper to convert tokio_rusqlite errors into MnemoError::Storage.
pub fn map_tr_err(e: tokio_rusqlite::Error) -> MnemoError {
    MnemoError::Storage {
        source: Box::new(e),
    }
}

/// Register the sqlite-vec extension globally, once per process.
///
/// Must run before any `Connection::open` that needs vec0 support.
fn register_vector_extension() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        // SAFETY: `sqlite3_vec_init` is a valid SQLite extension entry
        // point statically linked from the sqlite-vec crate; registering
        // it as an auto-extension is the documented way to enable vec0
        // on every connection.
        unsafe {
            type ExtEntryPoint = unsafe extern "C" fn(
                *mut rusqlite::ffi::sqlite3,
                *mut *const std::os::raw::c_char,
                *const rusqlite::ffi::sqlite3_api_routines,
            ) -> i32;

            rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute::<
                *const (),
                ExtEntryPoint,
            >(
                sqlite_vec::sqlite3_vec_init as *const (),
            )));
        }
    });
}

/// A single-file memory database.
///
/// Opening applies PRAGMAs, runs migrations, brings up the FTS5 and
/// vec0 indexes (best-effort), and rebuilds the vector index from the
/// stored embeddings. The wrapped connection IS the single writer.
pub struct Database {
    conn: Connection,
    path: String,
    ann: AnnStatus,
    fts_enabled: bool,
}

impl Database {
    /// Open (or create) the database at `path`.
    ///
    /// `vector_index = false` skips the extension entirely and starts
    /// in the ANN-disabled degraded mode.
    pub async fn open(path: &str, vector_index: bool) -> Result<Self, MnemoError> {
        if vector_index {
            register_vector_extension();
        }

        let conn = Connection::open(path).await.map_err(map_tr_err)?;

        let (ann, fts_enabled) = conn
            .call(move |conn| {
                conn.execute_batch(
                    "PRAGMA journal_mode = WAL;
                     PRAGMA synchronous = NORMAL;
                     PRAGMA busy_timeout = 5000;
                     PRAGMA foreign_keys = ON;",
                )?;

                schema::migrate(conn)?;

                let fts_enabled = match conn.execute_batch(schema::FTS_DDL) {
                    Ok(()) => true,
                    Err(e) => {
                        warn!(error = %e, "FTS index unavailable, lexical recall degraded");
                        false
                    }
                };

                let ann = if !vector_index {
                    AnnStatus {
                        enabled: false,
                        message: "vector index disabled by configuration".to_string(),
                    }
                } else {
                    match conn.execute_batch(schema::VEC_DDL) {
                        Ok(()) => {
                            let loaded = rebuild_vector_index(conn)?;
                            AnnStatus {
                                enabled: true,
                                message: format!("vector index ready ({loaded} embeddings loaded)"),
                            }
                        }
                        Err(e) => AnnStatus {
                            enabled: false,
                            message: format!("vector index unavailable: {e}"),
                        },
                    }
                };

                Ok((ann, fts_enabled))
            })
            .await
            .map_err(map_tr_err)?;

        debug!(path, ann_enabled = ann.enabled, fts_enabled, "database opened");

        Ok(Self {
            conn,
            path: path.to_string(),
            ann,
            fts_enabled,
        })
    }

    /// Returns the underlying connection for query modules.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Absolute (as-opened) path of the database file.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Vector index state, fixed for the life of this handle.
    pub fn ann(&self) -> &AnnStatus {
        &self.ann
    }

    /// Whether the FTS5 index came up at open.
    pub fn fts_enabled(&self) -> bool {
        self.fts_enabled
    }

    /// Checkpoint the WAL and flush before shutdown.
    pub async fn close(&self) -> Result<(), MnemoError> {
        self.conn
            .call(|conn| {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        debug!("WAL checkpoint complete");
        Ok(())
    }
}

/// Drop and repopulate the vec0 table from stored embeddings.
///
/// Individual row failures are skipped; the index is best-effort.
fn rebuild_vector_index(conn: &rusqlite::Connection) -> rusqlite::Result<usize> {
    conn.execute("DELETE FROM memory_vectors", [])?;

    let mut stmt =
        conn.prepare("SELECT id, scope, embedding FROM memories WHERE embedding IS NOT NULL")?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, Vec<u8>>(2)?,
        ))
    })?;

    let mut loaded = 0usize;
    for row in rows {
        let (id, scope, blob) = row?;
        match conn.execute(
            "INSERT INTO memory_vectors (memory_id, embedding, scope) VALUES (?1, ?2, ?3)",
            rusqlite::params![id, blob, scope],
        ) {
            Ok(_) => loaded += 1,
            Err(e) => warn!(id = %id, error = %e, "skipping embedding during index rebuild"),
        }
    }
    Ok(loaded)
}
