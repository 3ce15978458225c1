//! Text Chunking Module
//!
//! 고정 크기 토큰 윈도우 + 오버랩 청킹입니다.
//! 청크는 원문의 연속 구간(바이트 범위)이므로 오버랩을 제거하고 이어 붙이면
//! 원문이 그대로 복원됩니다.

use anyhow::Result;

use super::document::{Document, DocumentChunk};
use super::vector::chunk_id;

// ============================================================================
// Chunk Configuration
// ============================================================================

/// 청킹 설정 (단위: 토큰)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkConfig {
    /// 청크당 최대 토큰 수
    pub chunk_tokens: usize,
    /// 이웃 청크와 겹치는 토큰 수
    pub overlap_tokens: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        // all-MiniLM-L6-v2 입력 한도(256 word piece) 안에 들어가는 토큰 수
        Self {
            chunk_tokens: 180,
            overlap_tokens: 20,
        }
    }
}

impl ChunkConfig {
    pub fn new(chunk_tokens: usize, overlap_tokens: usize) -> Self {
        Self {
            chunk_tokens,
            overlap_tokens,
        }
    }

    /// 한 청크가 가질 수 있는 최대 토큰 수 (마지막 청크 병합 포함)
    pub fn max_chunk_tokens(&self) -> usize {
        self.chunk_tokens + self.overlap_tokens.saturating_sub(1)
    }

    /// 설정 검증
    pub fn validate(&self) -> Result<()> {
        if self.chunk_tokens == 0 {
            anyhow::bail!("chunk size must be at least 1 token");
        }
        if self.overlap_tokens >= self.chunk_tokens {
            anyhow::bail!(
                "overlap ({}) must be smaller than chunk size ({})",
                self.overlap_tokens,
                self.chunk_tokens
            );
        }
        Ok(())
    }
}

// ============================================================================
// Token Splitting
// ============================================================================

/// 토큰 경계 분할 트레이트
pub trait TokenSplitter: Send + Sync {
    /// 각 토큰의 시작 바이트 오프셋 (오름차순, char 경계)
    fn token_starts(&self, text: &str) -> Vec<usize>;

    /// 분할기 이름
    fn name(&self) -> &'static str;
}

/// 공백 기준 단어 토큰 분할기
#[derive(Debug, Clone, Copy, Default)]
pub struct WordSplitter;

impl TokenSplitter for WordSplitter {
    fn token_starts(&self, text: &str) -> Vec<usize> {
        let mut starts = Vec::new();
        let mut prev_is_space = true;

        for (i, c) in text.char_indices() {
            let is_space = c.is_whitespace();
            if prev_is_space && !is_space {
                starts.push(i);
            }
            prev_is_space = is_space;
        }

        starts
    }

    fn name(&self) -> &'static str {
        "WordSplitter"
    }
}

// ============================================================================
// TextChunk / Chunks iterator
// ============================================================================

/// 원문의 한 구간
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    /// 순번 (0부터)
    pub index: usize,
    /// 시작 바이트 (포함)
    pub start: usize,
    /// 끝 바이트 (제외)
    pub end: usize,
    /// `start..overlap_end`는 이전 청크와 겹치는 구간
    pub overlap_end: usize,
    /// 토큰 수
    pub token_count: usize,
    /// 청크 텍스트 (`text[start..end]`)
    pub text: String,
}

impl TextChunk {
    /// 이전 청크와 겹치지 않는 부분
    pub fn fresh_text(&self) -> &str {
        &self.text[self.overlap_end - self.start..]
    }
}

/// 지연 청크 이터레이터
///
/// `Clone`으로 복제하면 같은 위치부터 다시 순회할 수 있습니다.
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    text: &'a str,
    /// 토큰 경계 (첫 경계는 항상 0, 앞쪽 공백 포함)
    bounds: Vec<usize>,
    config: ChunkConfig,
    next_token: usize,
    prev_end: usize,
    index: usize,
    done: bool,
}

impl<'a> Chunks<'a> {
    fn new(text: &'a str, mut bounds: Vec<usize>, config: ChunkConfig) -> Self {
        if let Some(first) = bounds.first_mut() {
            *first = 0;
        }
        let done = bounds.is_empty();
        Self {
            text,
            bounds,
            config,
            next_token: 0,
            prev_end: 0,
            index: 0,
            done,
        }
    }

    /// 처음부터 다시 순회
    pub fn restart(&mut self) {
        self.next_token = 0;
        self.prev_end = 0;
        self.index = 0;
        self.done = self.bounds.is_empty();
    }

    /// 전체 토큰 수
    pub fn token_count(&self) -> usize {
        self.bounds.len()
    }

    fn byte_at(&self, token: usize) -> usize {
        self.bounds.get(token).copied().unwrap_or(self.text.len())
    }
}

impl Iterator for Chunks<'_> {
    type Item = TextChunk;

    fn next(&mut self) -> Option<TextChunk> {
        if self.done {
            return None;
        }

        let total = self.bounds.len();
        let start_token = self.next_token;
        let mut end_token = (start_token + self.config.chunk_tokens).min(total);

        // 다음 윈도우가 오버랩보다 적은 새 토큰만 가져온다면 현재 청크에 병합
        if end_token < total && total - end_token < self.config.overlap_tokens {
            end_token = total;
        }

        let start = self.byte_at(start_token);
        let end = self.byte_at(end_token);
        let overlap_end = self.prev_end.max(start);

        let chunk = TextChunk {
            index: self.index,
            start,
            end,
            overlap_end,
            token_count: end_token - start_token,
            text: self.text[start..end].to_string(),
        };

        if end_token >= total {
            self.done = true;
        } else {
            self.next_token = end_token - self.config.overlap_tokens;
        }
        self.prev_end = end;
        self.index += 1;

        Some(chunk)
    }
}

impl std::iter::FusedIterator for Chunks<'_> {}

// ============================================================================
// TokenChunker
// ============================================================================

/// 토큰 윈도우 청커
pub struct TokenChunker {
    config: ChunkConfig,
    splitter: Box<dyn TokenSplitter>,
}

impl TokenChunker {
    /// 설정으로 생성 (단어 토큰)
    pub fn new(config: ChunkConfig) -> Result<Self> {
        Self::with_splitter(config, Box::new(WordSplitter))
    }

    /// 토큰 분할기 지정
    pub fn with_splitter(config: ChunkConfig, splitter: Box<dyn TokenSplitter>) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, splitter })
    }

    /// 기본 설정으로 생성
    pub fn with_defaults() -> Self {
        Self {
            config: ChunkConfig::default(),
            splitter: Box::new(WordSplitter),
        }
    }

    pub fn config(&self) -> ChunkConfig {
        self.config
    }

    pub fn splitter_name(&self) -> &'static str {
        self.splitter.name()
    }

    /// 텍스트를 청크로 분할 (지연)
    pub fn chunks<'a>(&self, text: &'a str) -> Chunks<'a> {
        Chunks::new(text, self.splitter.token_starts(text), self.config)
    }

    /// 문서를 메타데이터가 붙은 청크로 분할
    pub fn chunk_document<'a>(
        &self,
        doc: &'a Document,
    ) -> impl Iterator<Item = DocumentChunk> + 'a {
        self.chunks(&doc.text).map(move |chunk| DocumentChunk {
            id: chunk_id(&doc.key, chunk.index),
            source: doc.source.clone(),
            kind: doc.kind,
            title: doc.title.clone(),
            chunk_index: chunk.index,
            text: chunk.text,
        })
    }
}

impl Default for TokenChunker {
    fn default() -> Self {
        Self::with_defaults()
    }
}

// ============================================================================
// Tests
// ============================================================================
