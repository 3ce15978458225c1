//! 임베딩 모듈 - 텍스트 벡터화
//!
//! 로컬 sentence-transformers 모델(ONNX)로 텍스트를 고정 차원 벡터로 변환합니다.
//! 저장소 구축과 질의에 반드시 같은 프로바이더를 사용해야 합니다.
//!
//! ## 사용법
//! ```rust,ignore
//! let embedder = OnnxEmbedding::from_settings(&settings).await?;
//! let embedding = embedder.embed("How do I handle tantrums?").await?;
//! ```

mod onnx;
mod splitter;

use anyhow::Result;
use async_trait::async_trait;

pub use onnx::OnnxEmbedding;
pub use splitter::TokenizerSplitter;

use crate::knowledge::{EmbeddingSignature, TokenSplitter};

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// 임베딩 프로바이더 트레이트
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// 단일 텍스트 임베딩
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut batch = self.embed_batch(&[text.to_string()]).await?;
        batch
            .pop()
            .ok_or_else(|| anyhow::anyhow!("Embedding provider returned no vector"))
    }

    /// 배치 임베딩
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// 임베딩 차원 수
    fn dimension(&self) -> usize;

    /// 모델 이름 (저장소에 기록되어 불일치 감지에 사용)
    fn name(&self) -> &str;

    /// 청킹에 쓸 모델 토크나이저 (없으면 공백 단어 단위)
    fn token_splitter(&self) -> Option<Box<dyn TokenSplitter>> {
        None
    }

    /// 잘리지 않고 임베딩되는 최대 토큰 수 (특수 토큰 제외)
    fn max_input_tokens(&self) -> Option<usize> {
        None
    }
}

/// 프로바이더의 모델 정보
pub fn signature_of(provider: &dyn EmbeddingProvider) -> EmbeddingSignature {
    EmbeddingSignature {
        model: provider.name().to_string(),
        dimension: provider.dimension(),
    }
}
