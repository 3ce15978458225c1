//! RAG 파이프라인 - 수집 → 청킹/임베딩 → 저장 → 검색 → 답변
//!
//! 모든 구성 요소는 `Settings` 하나에서 만들어지며 전역 상태는 없습니다.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::collector::{DocumentLoader, LoadStats};
use crate::config::Settings;
use crate::embedding::{EmbeddingProvider, OnnxEmbedding};
use crate::generation::{Answer, AnswerGenerator};
use crate::knowledge::{IngestReport, KnowledgeBase, VectorStoreBuilder};

/// 저장소 구축 결과
#[derive(Debug, Clone)]
pub struct BuildSummary {
    pub load: LoadStats,
    pub ingest: IngestReport,
    pub total_chunks: usize,
}

/// RAG 파이프라인
pub struct RagPipeline {
    settings: Settings,
    embedder: Arc<dyn EmbeddingProvider>,
    generator: AnswerGenerator,
}

impl RagPipeline {
    pub fn new(
        settings: Settings,
        embedder: Arc<dyn EmbeddingProvider>,
        generator: AnswerGenerator,
    ) -> Self {
        Self {
            settings,
            embedder,
            generator,
        }
    }

    /// 설정대로 로컬 임베딩 모델과 LLM 클라이언트를 준비
    pub async fn from_settings(settings: Settings) -> Result<Self> {
        let embedder = OnnxEmbedding::from_settings(&settings)
            .await
            .context("Failed to load embedding model")?;
        let generator = AnswerGenerator::from_settings(&settings.llm, &settings.prompt_template)?;

        Ok(Self::new(settings, Arc::new(embedder), generator))
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn generator(&self) -> &AnswerGenerator {
        &self.generator
    }

    fn builder(&self) -> VectorStoreBuilder {
        VectorStoreBuilder::new(&self.settings.db_dir, self.embedder.clone())
            .with_chunk_config(self.settings.chunk)
    }

    /// 문서 폴더 + CSV를 읽어 저장소에 적재
    ///
    /// `rebuild`이면 기존 저장소를 지우고 새로 만듭니다.
    pub async fn build(&self, rebuild: bool) -> Result<(KnowledgeBase, BuildSummary)> {
        self.build_with_export(rebuild, None).await
    }

    /// 구축하면서 청크를 JSONL/CSV 파일로 내보내기
    pub async fn build_with_export(
        &self,
        rebuild: bool,
        export: Option<&Path>,
    ) -> Result<(KnowledgeBase, BuildSummary)> {
        let kb = self.builder().build_or_load(rebuild).await?;

        let (documents, load) = DocumentLoader::from_settings(&self.settings)
            .load_all()
            .await?;
        if documents.is_empty() {
            tracing::warn!(
                "No documents found in {:?} or {:?}; the store will be empty",
                self.settings.docs_dir,
                self.settings.csv_path
            );
        }

        let ingest = kb.ingest_with_export(&documents, export).await?;
        let total_chunks = kb.count().await?;

        Ok((
            kb,
            BuildSummary {
                load,
                ingest,
                total_chunks,
            },
        ))
    }

    /// 기존 저장소 열기 (없으면 StoreMissing)
    pub async fn open(&self) -> Result<KnowledgeBase> {
        self.builder().open_existing().await
    }

    /// 검색 + 답변 생성
    pub async fn ask(&self, kb: &KnowledgeBase, question: &str, k: usize) -> Result<Answer> {
        let results = kb.retriever().retrieve(question, k).await?;
        tracing::info!("Retrieved {} chunks", results.len());
        Ok(self.generator.answer(question, &results).await)
    }

    /// 재구축(선택) 후 질문
    pub async fn run(&self, question: &str, k: usize, rebuild: bool) -> Result<Answer> {
        let kb = if rebuild {
            self.build(true).await?.0
        } else {
            self.open().await?
        };
        self.ask(&kb, question, k).await
    }
}
