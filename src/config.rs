//! 설정 모듈
//!
//! 모든 경로, 모델 이름, 청킹/검색 파라미터를 하나의 `Settings` 값으로 모읍니다.
//! 전역 상태 없이 각 컴포넌트에 명시적으로 전달합니다.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::knowledge::ChunkConfig;

/// 기본 임베딩 모델 (HF sentence-transformers)
pub const DEFAULT_EMBEDDING_MODEL: &str = "sentence-transformers/all-MiniLM-L6-v2";

/// 기본 LLM 모델 (OpenRouter 자동 라우팅)
pub const DEFAULT_LLM_MODEL: &str = "openrouter/auto";

/// OpenRouter 기본 엔드포인트
pub const DEFAULT_LLM_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// 기본 검색 결과 수
pub const DEFAULT_TOP_K: usize = 3;

/// 프롬프트 템플릿 (`{question}`, `{sources}` 치환)
pub const DEFAULT_PROMPT_TEMPLATE: &str = "You are a parenting assistant expert. Use ONLY the provided sources to answer the question.\n\
If uncertain or information not found, say so clearly.\n\n\
Question: {question}\n\nSources:\n{sources}\n\nAnswer:";

// ============================================================================
// LLM Settings
// ============================================================================

/// 원격 LLM 설정
#[derive(Debug, Clone)]
pub struct LlmSettings {
    /// API 키 (없으면 답변 생성은 폴백 메시지로 대체)
    pub api_key: Option<String>,
    /// OpenAI 호환 엔드포인트 베이스 URL
    pub base_url: String,
    /// 모델 이름
    pub model: String,
    /// 요청 타임아웃
    pub timeout: Duration,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_LLM_BASE_URL.to_string(),
            model: DEFAULT_LLM_MODEL.to_string(),
            timeout: Duration::from_secs(60),
        }
    }
}

// ============================================================================
// Settings
// ============================================================================

/// 파이프라인 전체 설정
#[derive(Debug, Clone)]
pub struct Settings {
    /// PDF/텍스트 문서 폴더
    pub docs_dir: PathBuf,
    /// CSV 데이터셋 경로
    pub csv_path: PathBuf,
    /// 벡터 저장소 디렉토리
    pub db_dir: PathBuf,
    /// 임베딩 모델 캐시 디렉토리
    pub model_cache_dir: PathBuf,
    /// 임베딩 모델 이름 (HF repo id)
    pub embedding_model: String,
    /// 모델 다운로드용 HF 토큰 (선택)
    pub hf_token: Option<String>,
    /// 청킹 설정
    pub chunk: ChunkConfig,
    /// 짧은 문서 필터 (문자 수)
    pub min_document_chars: usize,
    /// 기본 top-k
    pub top_k: usize,
    /// 원격 LLM 설정
    pub llm: LlmSettings,
    /// 프롬프트 템플릿
    pub prompt_template: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            docs_dir: PathBuf::from("data"),
            csv_path: PathBuf::from("parenting_articles.csv"),
            db_dir: PathBuf::from("vector_db"),
            model_cache_dir: default_model_cache_dir(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            hf_token: None,
            chunk: ChunkConfig::default(),
            min_document_chars: 100,
            top_k: DEFAULT_TOP_K,
            llm: LlmSettings::default(),
            prompt_template: DEFAULT_PROMPT_TEMPLATE.to_string(),
        }
    }
}

impl Settings {
    /// 환경변수를 반영한 설정
    ///
    /// - `OPENROUTER_API_KEY`, `OPENROUTER_BASE_URL`, `OPENROUTER_MODEL`
    /// - `HF_TOKEN` (또는 `HUGGING_FACE_HUB_TOKEN`)
    /// - `PARENTING_RAG_DB_DIR`, `PARENTING_RAG_DOCS_DIR`, `PARENTING_RAG_CSV`
    /// - `PARENTING_RAG_TOP_K`
    pub fn from_env() -> Self {
        let mut settings = Self::default();

        if let Some(dir) = env_non_empty("PARENTING_RAG_DB_DIR") {
            settings.db_dir = PathBuf::from(dir);
        }
        if let Some(dir) = env_non_empty("PARENTING_RAG_DOCS_DIR") {
            settings.docs_dir = PathBuf::from(dir);
        }
        if let Some(path) = env_non_empty("PARENTING_RAG_CSV") {
            settings.csv_path = PathBuf::from(path);
        }

        if let Some(value) = env_non_empty("PARENTING_RAG_TOP_K") {
            match parse_top_k(&value) {
                Some(k) => settings.top_k = k,
                None => tracing::warn!(
                    "Ignoring PARENTING_RAG_TOP_K={:?}; expected a positive integer",
                    value
                ),
            }
        }

        settings.hf_token =
            env_non_empty("HF_TOKEN").or_else(|| env_non_empty("HUGGING_FACE_HUB_TOKEN"));

        settings.llm.api_key = env_non_empty("OPENROUTER_API_KEY");
        if let Some(url) = env_non_empty("OPENROUTER_BASE_URL") {
            settings.llm.base_url = url;
        }
        if let Some(model) = env_non_empty("OPENROUTER_MODEL") {
            settings.llm.model = model;
        }

        settings
    }

    /// 벡터 저장소 경로 변경
    pub fn with_db_dir(mut self, db_dir: impl Into<PathBuf>) -> Self {
        self.db_dir = db_dir.into();
        self
    }

    /// 문서 폴더 변경
    pub fn with_docs_dir(mut self, docs_dir: impl Into<PathBuf>) -> Self {
        self.docs_dir = docs_dir.into();
        self
    }

    /// CSV 경로 변경
    pub fn with_csv_path(mut self, csv_path: impl Into<PathBuf>) -> Self {
        self.csv_path = csv_path.into();
        self
    }

    /// 현재 임베딩 모델의 캐시 디렉토리
    pub fn model_dir(&self) -> PathBuf {
        self.model_cache_dir
            .join(self.embedding_model.replace('/', "--"))
    }

    /// LLM API 키 존재 여부
    pub fn has_api_key(&self) -> bool {
        self.llm.api_key.is_some()
    }

    /// 벡터 저장소 경로
    pub fn db_dir(&self) -> &Path {
        &self.db_dir
    }
}

/// 모델 캐시 기본 위치 (<cache>/parenting-rag/models)
pub fn default_model_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("parenting-rag")
        .join("models")
}

fn parse_top_k(value: &str) -> Option<usize> {
    value.parse::<usize>().ok().filter(|&k| k > 0)
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
