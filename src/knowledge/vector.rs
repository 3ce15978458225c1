//! Vector Store - 벡터 저장소 트레이트 및 유틸리티

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::document::{DocumentChunk, DocumentKind};

// ============================================================================
// Types
// ============================================================================

/// 벡터 엔트리 (저장용)
#[derive(Debug, Clone)]
pub struct VectorEntry {
    /// 결정적 ID (source + chunk_index)
    pub id: String,
    /// 문서 출처
    pub source: String,
    /// 문서 유형
    pub kind: DocumentKind,
    /// 문서 제목
    pub title: Option<String>,
    /// 청크 인덱스 (0-based)
    pub chunk_index: i32,
    /// 청크 텍스트
    pub text: String,
    /// 임베딩 벡터
    pub embedding: Vec<f32>,
}

impl VectorEntry {
    /// 청크 + 임베딩으로 엔트리 생성
    pub fn from_chunk(chunk: DocumentChunk, embedding: Vec<f32>) -> Self {
        Self {
            id: chunk.id,
            source: chunk.source,
            kind: chunk.kind,
            title: chunk.title,
            chunk_index: chunk.chunk_index as i32,
            text: chunk.text,
            embedding,
        }
    }
}

/// 검색 결과
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: String,
    pub source: String,
    pub kind: DocumentKind,
    pub title: Option<String>,
    pub chunk_index: i32,
    pub text: String,
    /// 유사도 (코사인, 높을수록 가까움)
    pub similarity: f32,
}

// ============================================================================
// VectorStore Trait
// ============================================================================

/// VectorStore 트레이트 (async)
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// ID 기준 upsert (같은 ID는 덮어씀)
    async fn upsert(&self, entries: &[VectorEntry]) -> Result<usize>;

    /// 최근접 `limit`개 검색 (유사도 내림차순)
    async fn search(&self, query_embedding: &[f32], limit: usize) -> Result<Vec<SearchResult>>;

    /// 벡터 개수 조회
    async fn count(&self) -> Result<usize>;

    /// 저장된 전체 ID (정렬됨)
    async fn ids(&self) -> Result<Vec<String>>;

    /// 벡터 차원
    fn dimension(&self) -> usize;
}

// ============================================================================
// Utility Functions
// ============================================================================

/// 청크 ID: `hex(sha256(key ␟ chunk_index))`
///
/// 같은 문서를 다시 넣어도 같은 ID가 나오므로 upsert가 중복을 만들지 않습니다.
pub fn chunk_id(key: &str, chunk_index: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hasher.update([0x1f]);
    hasher.update(chunk_index.to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}

/// 코사인 유사도 (-1.0 ~ 1.0)
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

/// 유사도 내림차순 정렬
pub fn sort_by_similarity(results: &mut [SearchResult]) {
    results.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity_same() {
        let a = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 0.0001);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let c = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &c).abs() < 0.0001);
    }

    #[test]
    fn test_cosine_similarity_mismatched_len() {
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[test]
    fn test_chunk_id_is_deterministic() {
        assert_eq!(chunk_id("a.txt", 0), chunk_id("a.txt", 0));
        assert_ne!(chunk_id("a.txt", 0), chunk_id("a.txt", 1));
        assert_ne!(chunk_id("a.txt", 1), chunk_id("a.txt1", 0));
        assert_eq!(chunk_id("a.txt", 0).len(), 64);
    }

    #[test]
    fn test_sort_by_similarity() {
        let make = |id: &str, similarity: f32| SearchResult {
            id: id.to_string(),
            source: "s".to_string(),
            kind: DocumentKind::Text,
            title: None,
            chunk_index: 0,
            text: String::new(),
            similarity,
        };
        let mut results = vec![make("a", 0.1), make("b", 0.9), make("c", 0.5)];
        sort_by_similarity(&mut results);
        let ids: Vec<_> = results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
    }
}
