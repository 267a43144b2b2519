// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The persistent memory store.
//!
//! Wraps a [`Database`] handle and delegates all operations to the
//! typed query modules. One store handle lives for the process; all
//! callers share it behind an `Arc`.

use mnemo_config::StorageConfig;
use mnemo_core::types::{AnnStatus, MemoryKind, MemoryRecord, MemoryScope};
use mnemo_core::MnemoError;

use crate::database::{map_tr_err, Database};
use crate::queries;

/// SQLite-backed store for memory rows, FTS entries, and vectors.
pub struct MemoryStore {
    db: Database,
}

impl MemoryStore {
    /// Open the store described by `config`.
    pub async fn open(config: &StorageConfig) -> Result<Self, MnemoError> {
        let db = Database::open(&config.database_path, config.vector_index).await?;
        Ok(Self { db })
    }

    /// Wrap an already-open database handle.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Path of the backing database file.
    pub fn path(&self) -> &str {
        self.db.path()
    }

    /// Vector index state.
    pub fn ann(&self) -> &AnnStatus {
        self.db.ann()
    }

    /// Verify the writer thread and database are alive.
    pub async fn health_check(&self) -> Result<(), MnemoError> {
        self.db
            .connection()
            .call(|conn| {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    /// Checkpoint and release the store.
    pub async fn close(&self) -> Result<(), MnemoError> {
        self.db.close().await
    }

    // --- row operations ---

    /// Insert a batch of rows atomically (with index upkeep).
    pub async fn insert_rows(&self, rows: Vec<MemoryRecord>) -> Result<(), MnemoError> {
        queries::memories::insert_memory_rows(&self.db, rows).await
    }

    /// Load one record by id.
    pub async fn get(&self, id: &str) -> Result<Option<MemoryRecord>, MnemoError> {
        queries::memories::get_memory(&self.db, id).await
    }

    /// Batch-load records by id (order not preserved).
    pub async fn get_many(&self, ids: &[String]) -> Result<Vec<MemoryRecord>, MnemoError> {
        queries::memories::get_memories_by_ids(&self.db, ids).await
    }

    /// Paginated summaries without embeddings, newest update first.
    pub async fn list(
        &self,
        scope: Option<MemoryScope>,
        kind: Option<MemoryKind>,
        query: Option<String>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<MemoryRecord>, MnemoError> {
        queries::memories::list_memories(&self.db, scope, kind, query, limit, offset).await
    }

    /// Per-kind counts under the given filters (absent kinds omitted).
    pub async fn count_by_kind(
        &self,
        scope: Option<MemoryScope>,
        query: Option<String>,
    ) -> Result<Vec<(String, i64)>, MnemoError> {
        queries::memories::count_by_kind(&self.db, scope, query).await
    }

    /// Total number of stored rows.
    pub async fn corpus_size(&self) -> Result<u64, MnemoError> {
        queries::memories::corpus_size(&self.db).await
    }

    /// Delete one row plus its index entries. Idempotent.
    pub async fn delete(&self, id: &str) -> Result<(), MnemoError> {
        queries::memories::delete_memory(&self.db, id).await
    }

    /// Delete every chunk of a parent. Returns rows removed.
    pub async fn delete_parent(&self, parent_id: &str) -> Result<usize, MnemoError> {
        queries::memories::delete_parent(&self.db, parent_id).await
    }

    /// Fold a duplicate write into an existing row.
    #[allow(clippy::too_many_arguments)]
    pub async fn merge_into_existing(
        &self,
        target_id: &str,
        content: &str,
        kind: MemoryKind,
        embedding: Option<&[f32]>,
        token_count: i64,
        importance_input: f64,
        now: i64,
    ) -> Result<(), MnemoError> {
        queries::memories::merge_into_existing(
            &self.db,
            target_id,
            content,
            kind,
            embedding,
            token_count,
            importance_input,
            now,
        )
        .await
    }

    /// Record that these rows were just returned by a retrieval.
    pub async fn bump_recall_metrics(
        &self,
        ids: Vec<String>,
        boost: f64,
        now: i64,
    ) -> Result<(), MnemoError> {
        queries::memories::bump_recall_metrics(&self.db, ids, boost, now).await
    }

    /// Flag a record as invalid and negative.
    pub async fn mark_invalid(&self, id: &str, score: f64, now: i64) -> Result<(), MnemoError> {
        queries::memories::mark_invalid(&self.db, id, score, now).await
    }

    /// Chunks of `parent_id` with index in `[lo, hi]`, ascending.
    pub async fn siblings(
        &self,
        parent_id: &str,
        lo: i64,
        hi: i64,
    ) -> Result<Vec<MemoryRecord>, MnemoError> {
        queries::memories::sibling_chunks(&self.db, parent_id, lo, hi).await
    }

    // --- index-backed search ---

    /// Full-text candidate ids, best first.
    pub async fn fts_search(&self, query: &str, limit: usize) -> Result<Vec<String>, MnemoError> {
        queries::search::fts_search(&self.db, query, limit).await
    }

    /// k-NN candidates `(id, distance)` ascending; empty when disabled.
    pub async fn ann_search(
        &self,
        embedding: &[f32],
        k: usize,
        scope: Option<MemoryScope>,
    ) -> Result<Vec<(String, f64)>, MnemoError> {
        queries::search::ann_search(&self.db, embedding, k, scope).await
    }

    /// Exact-cosine duplicate probe within a scope.
    pub async fn find_semantic_duplicate(
        &self,
        embedding: &[f32],
        scope: MemoryScope,
        threshold: f64,
    ) -> Result<Option<MemoryRecord>, MnemoError> {
        queries::search::find_semantic_duplicate(&self.db, embedding, scope, threshold).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mnemo_core::types::EMBEDDING_DIM;
    use tempfile::tempdir;

    async fn open_store(dir: &tempfile::TempDir, name: &str) -> MemoryStore {
        let path = dir.path().join(name);
        let config = StorageConfig {
            database_path: path.to_str().unwrap().to_string(),
            vector_index: true,
        };
        MemoryStore::open(&config).await.unwrap()
    }

    /// Unit vector concentrated on one axis, 384-dim.
    fn axis_vec(axis: usize) -> Vec<f32> {
        let mut v = vec![0.0f32; EMBEDDING_DIM];
        v[axis % EMBEDDING_DIM] = 1.0;
        v
    }

    fn make_record(id: &str, content: &str, embedding: Option<Vec<f32>>) -> MemoryRecord {
        MemoryRecord {
            id: id.to_string(),
            parent_id: id.to_string(),
            chunk_index: 0,
            content: content.to_string(),
            kind: MemoryKind::Note,
            scope: MemoryScope::Global,
            importance: 0.5,
            token_count: content.split_whitespace().count() as i64,
            recall_count: 0,
            last_recalled_at: None,
            validity_score: 1.0,
            is_negative: false,
            created_at: 1_000,
            updated_at: 1_000,
            embedding,
        }
    }

    #[tokio::test]
    async fn insert_and_get_roundtrip() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir, "roundtrip.db").await;

        let record = make_record("m1", "the user has a golden retriever", Some(axis_vec(0)));
        store.insert_rows(vec![record]).await.unwrap();

        let loaded = store.get("m1").await.unwrap().unwrap();
        assert_eq!(loaded.content, "the user has a golden retriever");
        assert_eq!(loaded.kind, MemoryKind::Note);
        assert_eq!(loaded.embedding.as_ref().unwrap().len(), EMBEDDING_DIM);
        store.close().await.unwrap();
    }

    #[tokio::test]
    async fn get_missing_returns_none() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir, "missing.db").await;
        assert!(store.get("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn fts_search_finds_inserted_row() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir, "fts.db").await;

        store
            .insert_rows(vec![make_record("m1", "golden retriever named Max", None)])
            .await
            .unwrap();

        let hits = store.fts_search("golden retriever", 10).await.unwrap();
        assert_eq!(hits, vec!["m1".to_string()]);

        let none = store.fts_search("quantum chromodynamics", 10).await.unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn ann_search_orders_by_distance_and_honors_scope() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir, "ann.db").await;
        assert!(store.ann().enabled, "{}", store.ann().message);

        let mut session_row = make_record("s1", "session fact", Some(axis_vec(1)));
        session_row.scope = MemoryScope::Session;
        store
            .insert_rows(vec![
                make_record("g1", "global fact one", Some(axis_vec(0))),
                make_record("g2", "global fact two", Some(axis_vec(2))),
                session_row,
            ])
            .await
            .unwrap();

        let hits = store.ann_search(&axis_vec(0), 3, None).await.unwrap();
        assert_eq!(hits[0].0, "g1", "nearest neighbor first");
        assert!(hits[0].1 < hits[1].1);

        let scoped = store
            .ann_search(&axis_vec(1), 3, Some(MemoryScope::Session))
            .await
            .unwrap();
        let ids: Vec<&str> = scoped.iter().map(|(id, _)| id.as_str()).collect();
        assert!(ids.contains(&"s1"));
        assert!(!ids.contains(&"g1"), "scope filter must exclude globals");
    }

    #[tokio::test]
    async fn dedup_probe_requires_threshold_and_scope() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir, "dedup.db").await;

        store
            .insert_rows(vec![make_record("m1", "freedom is the goal", Some(axis_vec(0)))])
            .await
            .unwrap();

        let hit = store
            .find_semantic_duplicate(&axis_vec(0), MemoryScope::Global, 0.95)
            .await
            .unwrap();
        assert_eq!(hit.unwrap().id, "m1");

        // Orthogonal vector: no candidate clears the bar.
        let miss = store
            .find_semantic_duplicate(&axis_vec(5), MemoryScope::Global, 0.95)
            .await
            .unwrap();
        assert!(miss.is_none());

        // Same vector, different scope: probe must not cross scopes.
        let cross = store
            .find_semantic_duplicate(&axis_vec(0), MemoryScope::Project, 0.95)
            .await
            .unwrap();
        assert!(cross.is_none());
    }

    #[tokio::test]
    async fn merge_updates_in_place_without_new_row() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir, "merge.db").await;

        let mut record = make_record("m1", "original text", Some(axis_vec(0)));
        record.importance = 0.5;
        store.insert_rows(vec![record]).await.unwrap();

        store
            .merge_into_existing(
                "m1",
                "replacement text",
                MemoryKind::Knowledge,
                Some(&axis_vec(0)),
                2,
                0.9,
                5_000,
            )
            .await
            .unwrap();

        let merged = store.get("m1").await.unwrap().unwrap();
        assert_eq!(merged.content, "replacement text");
        assert_eq!(merged.kind, MemoryKind::Knowledge);
        // 0.9 * 0.5 + 0.1 * 0.9 = 0.54
        assert!((merged.importance - 0.54).abs() < 1e-9);
        // validity nudges up by 0.01, capped at 1.0
        assert!((merged.validity_score - 1.0).abs() < 1e-9);
        assert_eq!(merged.updated_at, 5_000);
        assert_eq!(store.corpus_size().await.unwrap(), 1);

        // FTS now matches the new content only.
        assert!(store.fts_search("replacement", 10).await.unwrap().contains(&"m1".to_string()));
        assert!(store.fts_search("original", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn bump_recall_metrics_math() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir, "bump.db").await;

        store
            .insert_rows(vec![make_record("m1", "bump me", None)])
            .await
            .unwrap();
        store
            .bump_recall_metrics(vec!["m1".to_string()], 0.04, 9_000)
            .await
            .unwrap();

        let bumped = store.get("m1").await.unwrap().unwrap();
        assert_eq!(bumped.recall_count, 1);
        assert_eq!(bumped.last_recalled_at, Some(9_000));
        assert_eq!(bumped.updated_at, 9_000);
        // 0.98 * 0.5 + 0.04 = 0.53
        assert!((bumped.importance - 0.53).abs() < 1e-9);
    }

    #[tokio::test]
    async fn mark_invalid_floors_at_zero() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir, "invalid.db").await;

        store
            .insert_rows(vec![make_record("m1", "wrong fact", None)])
            .await
            .unwrap();
        store.mark_invalid("m1", -0.3, 9_000).await.unwrap();

        let marked = store.get("m1").await.unwrap().unwrap();
        assert_eq!(marked.validity_score, 0.0);
        assert!(marked.is_negative);
        assert_eq!(marked.updated_at, 9_000);
    }

    #[tokio::test]
    async fn delete_is_idempotent_and_leaves_no_trace() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir, "delete.db").await;

        store
            .insert_rows(vec![make_record("m1", "delete me", Some(axis_vec(0)))])
            .await
            .unwrap();
        store.delete("m1").await.unwrap();
        store.delete("m1").await.unwrap();

        assert!(store.get("m1").await.unwrap().is_none());
        assert!(store.fts_search("delete", 10).await.unwrap().is_empty());
        assert!(store.ann_search(&axis_vec(0), 5, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_parent_removes_all_chunks() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir, "parent.db").await;

        let mut c0 = make_record("c0", "chunk zero", None);
        let mut c1 = make_record("c1", "chunk one", None);
        c0.parent_id = "p".to_string();
        c1.parent_id = "p".to_string();
        c1.chunk_index = 1;
        store.insert_rows(vec![c0, c1]).await.unwrap();

        let removed = store.delete_parent("p").await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.corpus_size().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn siblings_range_scan() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir, "siblings.db").await;

        let mut rows = Vec::new();
        for i in 0..4 {
            let mut r = make_record(&format!("c{i}"), &format!("chunk {i}"), None);
            r.parent_id = "p".to_string();
            r.chunk_index = i;
            rows.push(r);
        }
        store.insert_rows(rows).await.unwrap();

        let sibs = store.siblings("p", 0, 2).await.unwrap();
        let ids: Vec<&str> = sibs.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["c0", "c1", "c2"]);
    }

    #[tokio::test]
    async fn list_filters_and_paginates() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir, "list.db").await;

        let mut a = make_record("a", "Rust borrow checker", None);
        a.kind = MemoryKind::Knowledge;
        a.updated_at = 3_000;
        let mut b = make_record("b", "team standup notes", None);
        b.kind = MemoryKind::Note;
        b.updated_at = 2_000;
        let mut c = make_record("c", "rust release schedule", None);
        c.kind = MemoryKind::Task;
        c.scope = MemoryScope::Project;
        c.updated_at = 1_000;
        store.insert_rows(vec![a, b, c]).await.unwrap();

        let all = store.list(None, None, None, 30, 0).await.unwrap();
        let ids: Vec<&str> = all.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"], "newest update first");
        assert!(all[0].embedding.is_none(), "summaries omit embeddings");

        let substring = store
            .list(None, None, Some("rust".to_string()), 30, 0)
            .await
            .unwrap();
        assert_eq!(substring.len(), 2, "LIKE filter is case-insensitive");

        let scoped = store
            .list(Some(MemoryScope::Project), None, None, 30, 0)
            .await
            .unwrap();
        assert_eq!(scoped.len(), 1);

        let page = store.list(None, None, None, 1, 1).await.unwrap();
        assert_eq!(page[0].id, "b");
    }

    #[tokio::test]
    async fn count_by_kind_groups() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir, "counts.db").await;

        let mut a = make_record("a", "one", None);
        a.kind = MemoryKind::Task;
        let mut b = make_record("b", "two", None);
        b.kind = MemoryKind::Task;
        let mut c = make_record("c", "three", None);
        c.kind = MemoryKind::Identity;
        store.insert_rows(vec![a, b, c]).await.unwrap();

        let counts = store.count_by_kind(None, None).await.unwrap();
        let task = counts.iter().find(|(k, _)| k == "task").unwrap();
        assert_eq!(task.1, 2);
        let identity = counts.iter().find(|(k, _)| k == "identity").unwrap();
        assert_eq!(identity.1, 1);
    }

    #[tokio::test]
    async fn ann_disabled_store_still_works() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("degraded.db");
        let config = StorageConfig {
            database_path: path.to_str().unwrap().to_string(),
            vector_index: false,
        };
        let store = MemoryStore::open(&config).await.unwrap();

        assert!(!store.ann().enabled);
        store
            .insert_rows(vec![make_record("m1", "still works", Some(axis_vec(0)))])
            .await
            .unwrap();

        assert!(store.ann_search(&axis_vec(0), 5, None).await.unwrap().is_empty());
        assert!(store
            .find_semantic_duplicate(&axis_vec(0), MemoryScope::Global, 0.95)
            .await
            .unwrap()
            .is_none());
        // Lexical path still live.
        assert_eq!(store.fts_search("works", 10).await.unwrap().len(), 1);
        store.health_check().await.unwrap();
    }
}
