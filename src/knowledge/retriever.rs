//! 검색기 - 질의 임베딩 후 최근접 청크 조회

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::embedding::EmbeddingProvider;
use crate::error::PipelineError;

use super::vector::{SearchResult, VectorStore};

/// 벡터 검색기
///
/// 저장소를 만들 때와 같은 임베딩 프로바이더를 써야 합니다.
#[derive(Clone)]
pub struct Retriever {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl Retriever {
    pub fn new(store: Arc<dyn VectorStore>, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self { store, embedder }
    }

    /// 상위 `k`개 청크 (유사도 내림차순)
    ///
    /// 저장된 청크가 `k`개보다 적으면 있는 만큼만 반환합니다.
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<SearchResult>> {
        if k == 0 {
            return Err(PipelineError::InvalidTopK(k).into());
        }

        let query_embedding = self
            .embedder
            .embed(query)
            .await
            .context("Failed to embed query")?;

        if query_embedding.len() != self.store.dimension() {
            return Err(PipelineError::ModelMismatch {
                stored_model: "(stored vectors)".to_string(),
                stored_dimension: self.store.dimension(),
                model: self.embedder.name().to_string(),
                dimension: query_embedding.len(),
            }
            .into());
        }

        let results = self.store.search(&query_embedding, k).await?;

        tracing::debug!(
            "Retrieved {} chunks for query ({} requested)",
            results.len(),
            k
        );
        Ok(results)
    }
}
