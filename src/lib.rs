//! parenting-rag - 육아/아동심리 문서 기반 RAG
//!
//! 허용된 사이트에서 문서를 모으고, 로컬 임베딩 모델로 LanceDB 벡터 저장소를
//! 구축한 뒤, 검색된 청크를 근거로 원격 LLM이 답변합니다.

pub mod cli;
pub mod collector;
pub mod config;
pub mod embedding;
pub mod error;
pub mod extractor;
pub mod generation;
pub mod knowledge;
pub mod pipeline;
pub mod scraper;

// Re-exports
pub use collector::{DocumentLoader, LoadStats};
pub use config::{LlmSettings, Settings};
pub use embedding::{EmbeddingProvider, OnnxEmbedding, TokenizerSplitter};
pub use error::PipelineError;
pub use generation::{
    Answer, AnswerGenerator, ChatClient, Citation, GenerationStatus, OpenRouterClient,
    FALLBACK_ANSWER, NO_INFORMATION_ANSWER,
};
pub use knowledge::{
    ChunkConfig, Document, DocumentChunk, DocumentKind, KnowledgeBase, Retriever, SearchResult,
    TokenChunker, VectorStore, VectorStoreBuilder,
};
pub use pipeline::{BuildSummary, RagPipeline};
pub use scraper::{CrawlConfig, CrawlReport, CrawledDocument, WebScraper};
