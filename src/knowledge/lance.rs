//! LanceDB Vector Store
//!
//! 청크 벡터를 `chunks` 테이블 하나에 저장합니다.
//! ID 컬럼 기준 merge-insert로 upsert하고, 코사인 거리로 검색합니다.
//! ref: https://lancedb.github.io/lancedb/

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, Int32Array, RecordBatch, RecordBatchIterator,
    StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::connection::Connection;
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use lancedb::DistanceType;

use super::document::DocumentKind;
use super::vector::{
    cosine_similarity, sort_by_similarity, SearchResult, VectorEntry, VectorStore,
};

/// 벡터 테이블 이름
const TABLE_NAME: &str = "chunks";

// ============================================================================
// LanceVectorStore
// ============================================================================

/// LanceDB 벡터 저장소 구현
pub struct LanceVectorStore {
    db: Connection,
    dimension: usize,
}

impl LanceVectorStore {
    /// 저장소 열기 (테이블이 없으면 빈 테이블 생성)
    ///
    /// # Arguments
    /// * `path` - .lance 디렉토리 경로
    /// * `dimension` - 임베딩 차원
    pub async fn open(path: &Path, dimension: usize) -> Result<Self> {
        let store = Self::connect(path, dimension).await?;

        if !store.table_exists().await {
            store
                .db
                .create_empty_table(TABLE_NAME, Arc::new(Self::create_schema(dimension)))
                .execute()
                .await
                .context("Failed to create empty vector table")?;
            tracing::debug!("Created empty vector table at {:?}", path);
        }

        Ok(store)
    }

    /// 기존 저장소 열기 (테이블이 없으면 None)
    pub async fn open_existing(path: &Path, dimension: usize) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }

        let store = Self::connect(path, dimension).await?;
        if store.table_exists().await {
            Ok(Some(store))
        } else {
            Ok(None)
        }
    }

    async fn connect(path: &Path, dimension: usize) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .context("Failed to create LanceDB directory")?;
            }
        }

        let path_str = path
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("Invalid path encoding"))?;

        let db = lancedb::connect(path_str)
            .execute()
            .await
            .context("Failed to connect to LanceDB")?;

        Ok(Self { db, dimension })
    }

    /// 벡터 테이블 스키마
    fn create_schema(dimension: usize) -> Schema {
        Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("source", DataType::Utf8, false),
            Field::new("kind", DataType::Utf8, false),
            Field::new("title", DataType::Utf8, true),
            Field::new("chunk_index", DataType::Int32, false),
            Field::new("text", DataType::Utf8, false),
            Field::new(
                "embedding",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    dimension as i32,
                ),
                false,
            ),
        ])
    }

    /// 엔트리들을 Arrow RecordBatch로 변환
    fn entries_to_batch(&self, entries: &[VectorEntry]) -> Result<RecordBatch> {
        if entries.is_empty() {
            anyhow::bail!("Cannot create batch from empty entries");
        }

        if let Some(bad) = entries.iter().find(|e| e.embedding.len() != self.dimension) {
            anyhow::bail!(
                "Embedding for {} has dimension {}, store expects {}",
                bad.id,
                bad.embedding.len(),
                self.dimension
            );
        }

        let ids: Vec<&str> = entries.iter().map(|e| e.id.as_str()).collect();
        let sources: Vec<&str> = entries.iter().map(|e| e.source.as_str()).collect();
        let kinds: Vec<&str> = entries.iter().map(|e| e.kind.as_str()).collect();
        let titles: Vec<Option<&str>> = entries.iter().map(|e| e.title.as_deref()).collect();
        let chunk_indices: Vec<i32> = entries.iter().map(|e| e.chunk_index).collect();
        let texts: Vec<&str> = entries.iter().map(|e| e.text.as_str()).collect();

        let embeddings_flat: Vec<f32> = entries
            .iter()
            .flat_map(|e| e.embedding.iter().copied())
            .collect();

        let values = Float32Array::from(embeddings_flat);
        let field = Arc::new(Field::new("item", DataType::Float32, true));
        let embeddings_list = FixedSizeListArray::try_new(
            field,
            self.dimension as i32,
            Arc::new(values) as Arc<dyn Array>,
            None,
        )
        .context("Failed to create embedding array")?;

        let batch = RecordBatch::try_new(
            Arc::new(Self::create_schema(self.dimension)),
            vec![
                Arc::new(StringArray::from(ids)),
                Arc::new(StringArray::from(sources)),
                Arc::new(StringArray::from(kinds)),
                Arc::new(StringArray::from(titles)),
                Arc::new(Int32Array::from(chunk_indices)),
                Arc::new(StringArray::from(texts)),
                Arc::new(embeddings_list),
            ],
        )
        .context("Failed to create RecordBatch")?;

        Ok(batch)
    }

    /// 테이블 존재 여부 확인
    async fn table_exists(&self) -> bool {
        self.db
            .table_names()
            .execute()
            .await
            .map(|names| names.iter().any(|n| n == TABLE_NAME))
            .unwrap_or(false)
    }

    async fn table(&self) -> Result<lancedb::table::Table> {
        self.db
            .open_table(TABLE_NAME)
            .execute()
            .await
            .context("Failed to open vector table")
    }
}

/// 컬럼 다운캐스트 헬퍼
fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<T>())
        .ok_or_else(|| anyhow::anyhow!("Missing {} column", name))
}

#[async_trait]
impl VectorStore for LanceVectorStore {
    async fn upsert(&self, entries: &[VectorEntry]) -> Result<usize> {
        if entries.is_empty() {
            return Ok(0);
        }

        let batch = self.entries_to_batch(entries)?;
        let schema = batch.schema();
        let table = self.table().await?;

        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);
        let mut merge = table.merge_insert(&["id"]);
        merge
            .when_matched_update_all(None)
            .when_not_matched_insert_all();
        merge
            .execute(Box::new(batches))
            .await
            .context("Failed to upsert vectors")?;

        Ok(entries.len())
    }

    async fn search(&self, query_embedding: &[f32], limit: usize) -> Result<Vec<SearchResult>> {
        if query_embedding.len() != self.dimension {
            anyhow::bail!(
                "Query embedding has dimension {}, store expects {}",
                query_embedding.len(),
                self.dimension
            );
        }

        if limit == 0 || self.count().await? == 0 {
            return Ok(vec![]);
        }

        let table = self.table().await?;

        let stream = table
            .vector_search(query_embedding.to_vec())
            .context("Failed to create vector search")?
            .distance_type(DistanceType::Cosine)
            .limit(limit)
            .execute()
            .await
            .context("Failed to execute vector search")?;

        let batches: Vec<RecordBatch> = stream.try_collect().await?;
        let mut results = Vec::new();

        for batch in batches {
            let ids = column::<StringArray>(&batch, "id")?;
            let sources = column::<StringArray>(&batch, "source")?;
            let kinds = column::<StringArray>(&batch, "kind")?;
            let titles = column::<StringArray>(&batch, "title")?;
            let chunk_indices = column::<Int32Array>(&batch, "chunk_index")?;
            let texts = column::<StringArray>(&batch, "text")?;
            let embeddings = column::<FixedSizeListArray>(&batch, "embedding")?;

            for i in 0..batch.num_rows() {
                let stored = embeddings.value(i);
                let stored = stored
                    .as_any()
                    .downcast_ref::<Float32Array>()
                    .ok_or_else(|| anyhow::anyhow!("Embedding column is not f32"))?;

                results.push(SearchResult {
                    id: ids.value(i).to_string(),
                    source: sources.value(i).to_string(),
                    kind: DocumentKind::parse(kinds.value(i)),
                    title: (!titles.is_null(i)).then(|| titles.value(i).to_string()),
                    chunk_index: chunk_indices.value(i),
                    text: texts.value(i).to_string(),
                    similarity: cosine_similarity(query_embedding, stored.values()),
                });
            }
        }

        sort_by_similarity(&mut results);
        results.truncate(limit);
        Ok(results)
    }

    async fn count(&self) -> Result<usize> {
        let table = self.table().await?;
        let count = table.count_rows(None).await.context("Failed to count rows")?;
        Ok(count)
    }

    async fn ids(&self) -> Result<Vec<String>> {
        let table = self.table().await?;
        let stream = table
            .query()
            .select(Select::Columns(vec!["id".to_string()]))
            .execute()
            .await
            .context("Failed to scan ids")?;

        let batches: Vec<RecordBatch> = stream.try_collect().await?;
        let mut ids = Vec::new();
        for batch in batches {
            let col = column::<StringArray>(&batch, "id")?;
            ids.extend((0..batch.num_rows()).map(|i| col.value(i).to_string()));
        }
        ids.sort();
        Ok(ids)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

// ============================================================================
// Tests
// ============================================================================
