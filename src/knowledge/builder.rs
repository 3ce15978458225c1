//! 벡터 저장소 구축
//!
//! 저장소 디렉토리 구성:
//! - `catalog.db`: 임베딩 모델 정보 + 적재된 문서 목록 (SQLite)
//! - `vectors.lance`: 청크 벡터 (LanceDB)
//!
//! 재구축은 디렉토리 전체를 지운 뒤 새로 만듭니다. 일부만 남는 경우는 없습니다.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::embedding::{signature_of, EmbeddingProvider};
use crate::error::PipelineError;

use super::chunker::{ChunkConfig, TokenChunker};
use super::document::{Document, DocumentChunk};
use super::export::write_chunks;
use super::lance::LanceVectorStore;
use super::retriever::Retriever;
use super::store::{Catalog, CatalogStats, DocumentRecord, EmbeddingSignature};
use super::vector::{VectorEntry, VectorStore};

/// 카탈로그 파일 이름
pub const CATALOG_FILE: &str = "catalog.db";

/// 벡터 테이블 디렉토리 이름
pub const VECTORS_DIR: &str = "vectors.lance";

/// 한 번에 임베딩하는 청크 수
pub const DEFAULT_UPSERT_BATCH: usize = 32;

// ============================================================================
// VectorStoreBuilder
// ============================================================================

/// 저장소를 만들거나 여는 빌더
pub struct VectorStoreBuilder {
    db_dir: PathBuf,
    embedder: Arc<dyn EmbeddingProvider>,
    chunk: ChunkConfig,
    batch_size: usize,
}

impl VectorStoreBuilder {
    pub fn new(db_dir: impl Into<PathBuf>, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            db_dir: db_dir.into(),
            embedder,
            chunk: ChunkConfig::default(),
            batch_size: DEFAULT_UPSERT_BATCH,
        }
    }

    pub fn with_chunk_config(mut self, chunk: ChunkConfig) -> Self {
        self.chunk = chunk;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// 저장소 생성 또는 열기
    ///
    /// `rebuild`이면 기존 디렉토리를 통째로 지우고 빈 저장소를 만듭니다.
    /// 지울 수 없으면 [`PipelineError::StoreLocked`]입니다.
    /// 기존 저장소의 임베딩 모델이 다르면 [`PipelineError::ModelMismatch`]입니다.
    pub async fn build_or_load(self, rebuild: bool) -> Result<KnowledgeBase> {
        if rebuild && self.db_dir.exists() {
            tracing::info!("Removing existing vector store at {:?}", self.db_dir);
            remove_store_dir(&self.db_dir)?;
        }

        tokio::fs::create_dir_all(&self.db_dir)
            .await
            .with_context(|| format!("Failed to create store directory {:?}", self.db_dir))?;

        let catalog = Catalog::open(&self.db_dir.join(CATALOG_FILE))?;
        check_signature(&catalog, self.embedder.as_ref())?;

        let vectors =
            LanceVectorStore::open(&self.db_dir.join(VECTORS_DIR), self.embedder.dimension())
                .await?;

        self.finish(catalog, vectors)
    }

    /// 기존 저장소만 열기 (질의 전용)
    ///
    /// 저장소가 없으면 [`PipelineError::StoreMissing`]입니다.
    pub async fn open_existing(self) -> Result<KnowledgeBase> {
        ensure_store_exists(&self.db_dir)?;

        let catalog_path = self.db_dir.join(CATALOG_FILE);
        let missing = || PipelineError::StoreMissing {
            path: self.db_dir.clone(),
        };

        let catalog = Catalog::open(&catalog_path)?;
        check_signature(&catalog, self.embedder.as_ref())?;

        let vectors = LanceVectorStore::open_existing(
            &self.db_dir.join(VECTORS_DIR),
            self.embedder.dimension(),
        )
        .await?
        .ok_or_else(missing)?;

        self.finish(catalog, vectors)
    }

    fn finish(self, catalog: Catalog, vectors: LanceVectorStore) -> Result<KnowledgeBase> {
        let chunker = match self.embedder.token_splitter() {
            Some(splitter) => TokenChunker::with_splitter(self.chunk, splitter)?,
            None => TokenChunker::new(self.chunk)?,
        };

        if let Some(limit) = self.embedder.max_input_tokens() {
            let longest = self.chunk.max_chunk_tokens();
            if longest > limit {
                anyhow::bail!(
                    "Chunks of up to {} tokens exceed the {} token input limit of {}; \
                     lower the chunk size or overlap",
                    longest,
                    limit,
                    self.embedder.name()
                );
            }
        }
        tracing::debug!("Chunking with {}", chunker.splitter_name());

        Ok(KnowledgeBase {
            db_dir: self.db_dir,
            catalog,
            vectors: Arc::new(vectors),
            embedder: self.embedder,
            chunker,
            batch_size: self.batch_size,
        })
    }
}

/// 구축된 저장소가 있는지 확인 (카탈로그 파일 기준)
///
/// 임베딩 모델을 불러오기 전에 질의 전용 실행을 걸러낼 때 씁니다.
pub fn ensure_store_exists(db_dir: &Path) -> Result<()> {
    if db_dir.join(CATALOG_FILE).is_file() {
        Ok(())
    } else {
        Err(PipelineError::StoreMissing {
            path: db_dir.to_path_buf(),
        }
        .into())
    }
}

fn remove_store_dir(path: &Path) -> Result<()> {
    std::fs::remove_dir_all(path).map_err(|source| {
        PipelineError::StoreLocked {
            path: path.to_path_buf(),
            source,
        }
        .into()
    })
}

/// 기록된 임베딩 모델과 비교 (처음이면 기록)
fn check_signature(catalog: &Catalog, embedder: &dyn EmbeddingProvider) -> Result<()> {
    let current = signature_of(embedder);

    match catalog.embedding_signature()? {
        Some(stored) if stored != current => Err(PipelineError::ModelMismatch {
            stored_model: stored.model,
            stored_dimension: stored.dimension,
            model: current.model,
            dimension: current.dimension,
        }
        .into()),
        Some(_) => Ok(()),
        None => catalog.set_embedding_signature(&current),
    }
}

// ============================================================================
// KnowledgeBase
// ============================================================================

/// 적재 결과
#[derive(Debug, Default, Clone, Serialize)]
pub struct IngestReport {
    pub documents: usize,
    pub chunks: usize,
}

/// 열린 저장소 (카탈로그 + 벡터 테이블)
pub struct KnowledgeBase {
    db_dir: PathBuf,
    catalog: Catalog,
    vectors: Arc<LanceVectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    chunker: TokenChunker,
    batch_size: usize,
}

impl KnowledgeBase {
    pub fn db_dir(&self) -> &Path {
        &self.db_dir
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn signature(&self) -> EmbeddingSignature {
        signature_of(self.embedder.as_ref())
    }

    /// 청크 임베딩 후 ID 기준 upsert
    ///
    /// 같은 호출 안의 중복 ID는 마지막 것만 남깁니다.
    pub async fn upsert(&self, chunks: Vec<DocumentChunk>) -> Result<usize> {
        let chunks = dedupe_keep_last(chunks);
        let mut written = 0;

        for (i, batch) in chunks.chunks(self.batch_size).enumerate() {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let embeddings = self
                .embedder
                .embed_batch(&texts)
                .await
                .with_context(|| format!("Failed to embed batch {}", i + 1))?;

            if embeddings.len() != batch.len() {
                anyhow::bail!(
                    "Embedder returned {} vectors for {} chunks",
                    embeddings.len(),
                    batch.len()
                );
            }

            let dimension = self.vectors.dimension();
            let entries = batch
                .iter()
                .cloned()
                .zip(embeddings)
                .map(|(chunk, embedding)| {
                    if embedding.len() != dimension {
                        anyhow::bail!(
                            "Embedding for {} has dimension {}, store expects {}",
                            chunk.id,
                            embedding.len(),
                            dimension
                        );
                    }
                    Ok(VectorEntry::from_chunk(chunk, embedding))
                })
                .collect::<Result<Vec<_>>>()?;

            written += self.vectors.upsert(&entries).await?;
            tracing::debug!("Upserted batch {} ({} chunks)", i + 1, entries.len());
        }

        Ok(written)
    }

    /// 문서 청킹 + upsert + 카탈로그 기록
    pub async fn ingest(&self, documents: &[Document]) -> Result<IngestReport> {
        self.ingest_with_export(documents, None).await
    }

    /// 적재하면서 청크를 파일로 내보내기 (JSONL 또는 CSV)
    ///
    /// 같은 key의 문서가 다시 나오면 처음 것만 적재합니다.
    pub async fn ingest_with_export(
        &self,
        documents: &[Document],
        export: Option<&Path>,
    ) -> Result<IngestReport> {
        let mut seen = HashSet::new();
        let mut all_chunks = Vec::new();
        let mut records = Vec::with_capacity(documents.len());

        for doc in documents {
            if !seen.insert(doc.key.as_str()) {
                tracing::warn!("Skipping duplicate document {} ({})", doc.key, doc.source);
                continue;
            }

            let chunks: Vec<DocumentChunk> = self.chunker.chunk_document(doc).collect();
            if chunks.is_empty() {
                tracing::warn!("No chunks generated for document: {}", doc.key);
                continue;
            }
            records.push(DocumentRecord::from_document(doc, chunks.len()));
            all_chunks.extend(chunks);
        }

        if let Some(path) = export {
            write_chunks(path, &all_chunks)?;
        }

        let written = self.upsert(all_chunks).await?;

        for record in &records {
            self.catalog.record_document(record)?;
        }

        tracing::info!(
            "Ingested {} documents ({} chunks) into {:?}",
            records.len(),
            written,
            self.db_dir
        );

        Ok(IngestReport {
            documents: records.len(),
            chunks: written,
        })
    }

    /// 저장된 벡터 수
    pub async fn count(&self) -> Result<usize> {
        self.vectors.count().await
    }

    /// 저장된 전체 청크 ID (정렬됨)
    pub async fn ids(&self) -> Result<Vec<String>> {
        self.vectors.ids().await
    }

    pub fn stats(&self) -> Result<CatalogStats> {
        self.catalog.stats()
    }

    /// 같은 임베딩 모델을 쓰는 검색기
    pub fn retriever(&self) -> Retriever {
        Retriever::new(self.vectors.clone(), self.embedder.clone())
    }
}

fn dedupe_keep_last(chunks: Vec<DocumentChunk>) -> Vec<DocumentChunk> {
    let mut seen = HashSet::new();
    let mut kept: Vec<DocumentChunk> = chunks
        .into_iter()
        .rev()
        .filter(|c| seen.insert(c.id.clone()))
        .collect();
    kept.reverse();
    kept
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::DocumentKind;
    use async_trait::async_trait;
    use tempfile::TempDir;

    /// 글자 빈도 기반 테스트 임베딩
    struct LetterEmbedding {
        name: String,
        /// 글자 하나를 토큰 하나로 청킹
        by_letter: bool,
        limit: Option<usize>,
    }

    /// 글자 단위 토큰 분할기
    struct LetterSplitter;

    impl crate::knowledge::TokenSplitter for LetterSplitter {
        fn token_starts(&self, text: &str) -> Vec<usize> {
            text.char_indices()
                .filter(|(_, c)| !c.is_whitespace())
                .map(|(i, _)| i)
                .collect()
        }

        fn name(&self) -> &'static str {
            "LetterSplitter"
        }
    }

    #[async_trait]
    impl EmbeddingProvider for LetterEmbedding {
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    let mut v = vec![0.0f32; 26];
                    for c in t.to_ascii_lowercase().bytes().filter(u8::is_ascii_lowercase) {
                        v[(c - b'a') as usize] += 1.0;
                    }
                    v
                })
                .collect())
        }

        fn dimension(&self) -> usize {
            26
        }

        fn name(&self) -> &str {
            &self.name
        }

        fn token_splitter(&self) -> Option<Box<dyn crate::knowledge::TokenSplitter>> {
            self.by_letter
                .then(|| Box::new(LetterSplitter) as Box<dyn crate::knowledge::TokenSplitter>)
        }

        fn max_input_tokens(&self) -> Option<usize> {
            self.limit
        }
    }

    fn embedder(name: &str) -> Arc<dyn EmbeddingProvider> {
        Arc::new(LetterEmbedding {
            name: name.to_string(),
            by_letter: false,
            limit: None,
        })
    }

    fn letter_embedder(limit: usize) -> Arc<dyn EmbeddingProvider> {
        Arc::new(LetterEmbedding {
            name: "letters".to_string(),
            by_letter: true,
            limit: Some(limit),
        })
    }

    fn chunk(source: &str, index: usize, text: &str) -> DocumentChunk {
        DocumentChunk {
            id: crate::knowledge::chunk_id(source, index),
            source: source.to_string(),
            kind: DocumentKind::Text,
            title: None,
            chunk_index: index,
            text: text.to_string(),
        }
    }

    #[test]
    fn test_dedupe_keep_last() {
        let kept = dedupe_keep_last(vec![
            chunk("a", 0, "first"),
            chunk("b", 0, "other"),
            chunk("a", 0, "second"),
        ]);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].source, "b");
        assert_eq!(kept[1].text, "second");
    }

    #[tokio::test]
    async fn test_build_creates_layout() {
        let dir = TempDir::new().unwrap();
        let db_dir = dir.path().join("vector_db");

        let kb = VectorStoreBuilder::new(&db_dir, embedder("letters"))
            .build_or_load(true)
            .await
            .unwrap();

        assert!(db_dir.join(CATALOG_FILE).is_file());
        assert!(db_dir.join(VECTORS_DIR).exists());
        assert_eq!(kb.count().await.unwrap(), 0);
        assert_eq!(
            kb.catalog().embedding_signature().unwrap(),
            Some(EmbeddingSignature {
                model: "letters".to_string(),
                dimension: 26
            })
        );
    }

    #[tokio::test]
    async fn test_upsert_in_batches_without_duplicates() {
        let dir = TempDir::new().unwrap();
        let kb = VectorStoreBuilder::new(dir.path().join("db"), embedder("letters"))
            .with_batch_size(2)
            .build_or_load(false)
            .await
            .unwrap();

        let chunks: Vec<_> = (0..5).map(|i| chunk("notes.txt", i, "play outside")).collect();
        assert_eq!(kb.upsert(chunks.clone()).await.unwrap(), 5);
        kb.upsert(chunks).await.unwrap();
        assert_eq!(kb.count().await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_rebuild_clears_previous_entries() {
        let dir = TempDir::new().unwrap();
        let db_dir = dir.path().join("db");

        let kb = VectorStoreBuilder::new(&db_dir, embedder("letters"))
            .build_or_load(true)
            .await
            .unwrap();
        kb.upsert(vec![chunk("old.txt", 0, "old text")]).await.unwrap();
        drop(kb);

        let kb = VectorStoreBuilder::new(&db_dir, embedder("letters"))
            .build_or_load(true)
            .await
            .unwrap();
        assert_eq!(kb.count().await.unwrap(), 0);
        assert_eq!(kb.stats().unwrap().document_count, 0);
    }

    #[tokio::test]
    async fn test_open_existing_missing_store() {
        let dir = TempDir::new().unwrap();
        let err = VectorStoreBuilder::new(dir.path().join("nope"), embedder("letters"))
            .open_existing()
            .await
            .err()
            .unwrap();

        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::StoreMissing { .. })
        ));
    }

    #[tokio::test]
    async fn test_ensure_store_exists() {
        let dir = TempDir::new().unwrap();
        let db_dir = dir.path().join("db");

        let err = ensure_store_exists(&db_dir).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::StoreMissing { .. })
        ));

        VectorStoreBuilder::new(&db_dir, embedder("letters"))
            .build_or_load(true)
            .await
            .unwrap();
        assert!(ensure_store_exists(&db_dir).is_ok());
    }

    #[tokio::test]
    async fn test_model_mismatch_on_open() {
        let dir = TempDir::new().unwrap();
        let db_dir = dir.path().join("db");

        VectorStoreBuilder::new(&db_dir, embedder("letters"))
            .build_or_load(true)
            .await
            .unwrap();

        let err = VectorStoreBuilder::new(&db_dir, embedder("other-model"))
            .open_existing()
            .await
            .err()
            .unwrap();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::ModelMismatch { .. })
        ));

        // 재구축이면 새 모델로 다시 만들 수 있음
        let kb = VectorStoreBuilder::new(&db_dir, embedder("other-model"))
            .build_or_load(true)
            .await
            .unwrap();
        assert_eq!(kb.signature().model, "other-model");
    }

    #[tokio::test]
    async fn test_ingest_records_documents() {
        let dir = TempDir::new().unwrap();
        let kb = VectorStoreBuilder::new(dir.path().join("db"), embedder("letters"))
            .with_chunk_config(ChunkConfig::new(4, 1))
            .build_or_load(true)
            .await
            .unwrap();

        let docs = vec![
            Document::new("one two three four five six seven", "a.txt", DocumentKind::Text),
            Document::new("   ", "blank.txt", DocumentKind::Text),
        ];
        let report = kb.ingest(&docs).await.unwrap();

        assert_eq!(report.documents, 1);
        assert_eq!(report.chunks, 2);
        assert_eq!(kb.count().await.unwrap(), 2);

        let record = kb.catalog().get_document("a.txt").unwrap().unwrap();
        assert_eq!(record.chunk_count, 2);
    }

    #[tokio::test]
    async fn test_documents_sharing_source_are_all_stored() {
        let dir = TempDir::new().unwrap();
        let kb = VectorStoreBuilder::new(dir.path().join("db"), embedder("letters"))
            .build_or_load(true)
            .await
            .unwrap();

        let docs = vec![
            Document::new("Stay calm during tantrums.", "CDC", DocumentKind::CsvRow)
                .with_key("articles.csv#row1"),
            Document::new("Bedtime routines help sleep.", "CDC", DocumentKind::CsvRow)
                .with_key("articles.csv#row2"),
            Document::new("A repeated row.", "CDC", DocumentKind::CsvRow)
                .with_key("articles.csv#row2"),
        ];
        let report = kb.ingest(&docs).await.unwrap();

        assert_eq!(report.documents, 2);
        assert_eq!(report.chunks, 2);
        assert_eq!(kb.count().await.unwrap(), 2);
        assert_eq!(kb.stats().unwrap().document_count, 2);

        let ids = kb.ids().await.unwrap();
        let mut expected = vec![
            crate::knowledge::chunk_id("articles.csv#row1", 0),
            crate::knowledge::chunk_id("articles.csv#row2", 0),
        ];
        expected.sort();
        assert_eq!(ids, expected);
    }

    #[tokio::test]
    async fn test_embedder_splitter_is_used() {
        let dir = TempDir::new().unwrap();
        let kb = VectorStoreBuilder::new(dir.path().join("db"), letter_embedder(10))
            .with_chunk_config(ChunkConfig::new(4, 1))
            .build_or_load(true)
            .await
            .unwrap();

        // 단어 하나지만 글자 8개 → [0,4) [3,7) [6,8)
        let docs = vec![Document::new("abcdefgh", "letters.txt", DocumentKind::Text)];
        let report = kb.ingest(&docs).await.unwrap();
        assert_eq!(report.chunks, 3);
    }

    #[tokio::test]
    async fn test_chunks_over_input_limit_are_rejected() {
        let dir = TempDir::new().unwrap();

        // 최대 청크 8 + 4 - 1 = 11 > 10
        let err = VectorStoreBuilder::new(dir.path().join("db"), letter_embedder(10))
            .with_chunk_config(ChunkConfig::new(8, 4))
            .build_or_load(true)
            .await
            .err()
            .unwrap();
        assert!(err.to_string().contains("input limit"));

        // 8 + 3 - 1 = 10
        VectorStoreBuilder::new(dir.path().join("db"), letter_embedder(10))
            .with_chunk_config(ChunkConfig::new(8, 3))
            .build_or_load(true)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_ingest_with_export() {
        let dir = TempDir::new().unwrap();
        let kb = VectorStoreBuilder::new(dir.path().join("db"), embedder("letters"))
            .with_chunk_config(ChunkConfig::new(4, 1))
            .build_or_load(true)
            .await
            .unwrap();

        let export = dir.path().join("chunks.jsonl");
        let docs = vec![Document::new(
            "one two three four five six seven",
            "a.txt",
            DocumentKind::Text,
        )];
        let report = kb.ingest_with_export(&docs, Some(&export)).await.unwrap();

        let lines: Vec<serde_json::Value> = std::fs::read_to_string(&export)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), report.chunks);
        assert_eq!(lines[0]["chunk_id"], crate::knowledge::chunk_id("a.txt", 0));
        assert_eq!(lines[1]["content"], "four five six seven");
    }
}
