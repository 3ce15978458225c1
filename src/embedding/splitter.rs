//! 모델 토크나이저 기반 토큰 분할
//!
//! 청크 크기를 임베딩 모델이 실제로 세는 word piece 단위로 맞춥니다.

use std::sync::Arc;

use anyhow::Result;
use tokenizers::Tokenizer;

use crate::knowledge::{TokenSplitter, WordSplitter};

/// `tokenizers::Tokenizer` 오프셋으로 토큰 시작 위치를 구하는 분할기
#[derive(Clone)]
pub struct TokenizerSplitter {
    tokenizer: Arc<Tokenizer>,
}

impl TokenizerSplitter {
    /// 잘림/패딩을 끈 복사본으로 생성
    pub fn new(mut tokenizer: Tokenizer) -> Result<Self> {
        tokenizer
            .with_truncation(None)
            .map_err(|e| anyhow::anyhow!("Failed to disable truncation: {}", e))?;
        tokenizer.with_padding(None);

        Ok(Self {
            tokenizer: Arc::new(tokenizer),
        })
    }

    /// 특수 토큰 없이 센 토큰 수
    pub fn count_tokens(&self, text: &str) -> Result<usize> {
        let encoding = self
            .tokenizer
            .encode(text, false)
            .map_err(|e| anyhow::anyhow!("Tokenization failed: {}", e))?;
        Ok(encoding.len())
    }
}

impl std::fmt::Debug for TokenizerSplitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenizerSplitter").finish_non_exhaustive()
    }
}

impl TokenSplitter for TokenizerSplitter {
    fn token_starts(&self, text: &str) -> Vec<usize> {
        let encoding = match self.tokenizer.encode(text, false) {
            Ok(encoding) => encoding,
            Err(e) => {
                tracing::warn!("Tokenizer failed, falling back to word tokens: {}", e);
                return WordSplitter.token_starts(text);
            }
        };

        let mut starts: Vec<usize> = encoding
            .get_offsets()
            .iter()
            .map(|&(start, _)| start)
            .filter(|&start| start < text.len() && text.is_char_boundary(start))
            .collect();
        starts.sort_unstable();
        starts.dedup();
        starts
    }

    fn name(&self) -> &'static str {
        "TokenizerSplitter"
    }
}
