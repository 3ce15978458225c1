//! Knowledge 모듈 - 청킹, 벡터 저장소, 검색
//!
//! - Chunker: 겹치는 토큰 윈도우 분할
//! - LanceDB: 청크 벡터 저장 + 코사인 검색
//! - Catalog: SQLite에 임베딩 모델 정보와 문서 목록 기록
//! - Builder/Retriever: 저장소 구축과 top-k 검색
//! - Export: 적재한 청크를 JSONL/CSV로 내보내기

mod builder;
mod chunker;
mod document;
mod export;
mod lance;
mod retriever;
mod store;
mod vector;

// Re-exports
pub use builder::{
    ensure_store_exists, IngestReport, KnowledgeBase, VectorStoreBuilder, CATALOG_FILE, DEFAULT_UPSERT_BATCH,
    VECTORS_DIR,
};
pub use chunker::{ChunkConfig, Chunks, TextChunk, TokenChunker, TokenSplitter, WordSplitter};
pub use document::{Document, DocumentChunk, DocumentKind};
pub use export::{write_chunks, ExportFormat};
pub use lance::LanceVectorStore;
pub use retriever::Retriever;
pub use store::{Catalog, CatalogStats, DocumentRecord, EmbeddingSignature};
pub use vector::{
    chunk_id, cosine_similarity, sort_by_similarity, SearchResult, VectorEntry, VectorStore,
};
