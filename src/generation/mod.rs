//! 답변 생성 모듈
//!
//! 검색된 청크로 프롬프트를 만들어 원격 LLM에 보냅니다.
//! LLM을 쓸 수 없으면 고정 폴백 문구로 대신하지만, 검색 결과(출처)는 그대로 돌려줍니다.

mod client;
mod prompt;

use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;

pub use client::{ChatClient, OpenRouterClient};
pub use prompt::{build_prompt, format_sources, MAX_SOURCE_CHARS};

use crate::config::{LlmSettings, DEFAULT_PROMPT_TEMPLATE};
use crate::knowledge::SearchResult;

/// LLM 호출 실패/미설정 시 답변
pub const FALLBACK_ANSWER: &str = "[LLM unavailable] Unable to retrieve a model-generated answer right now. \
Please verify your OPENROUTER_API_KEY or internet connectivity.";

/// 관련 청크가 없을 때 답변
pub const NO_INFORMATION_ANSWER: &str = "No relevant information found in the knowledge base for this question. \
Try rephrasing it, or add documents and rebuild the store with --rebuild.";

// ============================================================================
// Types
// ============================================================================

/// 답변이 만들어진 경로
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationStatus {
    /// LLM이 생성
    Generated,
    /// LLM 사용 불가 (키 없음, 네트워크/인증 오류 등) - 폴백 문구
    Unavailable,
    /// 검색된 청크 없음 - LLM 호출 안 함
    NoContext,
}

/// 답변에 붙는 출처
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Citation {
    pub id: String,
    pub source: String,
    pub title: Option<String>,
    pub score: f32,
}

/// 최종 답변
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub question: String,
    pub text: String,
    /// 검색 순서 그대로, 청크 ID당 하나
    pub citations: Vec<Citation>,
    pub status: GenerationStatus,
    /// LLM에 보낸 (또는 보낼) 프롬프트
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
}

/// 검색 결과에서 출처 목록 (중복 ID 제거, 순서 유지)
pub fn citations_from(results: &[SearchResult]) -> Vec<Citation> {
    let mut citations: Vec<Citation> = Vec::with_capacity(results.len());
    for r in results {
        if citations.iter().any(|c| c.id == r.id) {
            continue;
        }
        citations.push(Citation {
            id: r.id.clone(),
            source: r.source.clone(),
            title: r.title.clone(),
            score: r.similarity,
        });
    }
    citations
}

// ============================================================================
// AnswerGenerator
// ============================================================================

/// 답변 생성기
pub struct AnswerGenerator {
    client: Option<Arc<dyn ChatClient>>,
    template: String,
}

impl AnswerGenerator {
    pub fn new(client: Option<Arc<dyn ChatClient>>, template: impl Into<String>) -> Self {
        Self {
            client,
            template: template.into(),
        }
    }

    /// LLM 설정으로 생성 (API 키가 없으면 클라이언트 없이)
    pub fn from_settings(settings: &LlmSettings, template: &str) -> Result<Self> {
        let client = OpenRouterClient::from_settings(settings)?;
        if client.is_none() {
            tracing::warn!("OPENROUTER_API_KEY not set; answers will use the fallback message");
        }
        Ok(Self::new(
            client.map(|c| Arc::new(c) as Arc<dyn ChatClient>),
            template,
        ))
    }

    /// 클라이언트 없는 생성기 (항상 폴백)
    pub fn offline() -> Self {
        Self::new(None, DEFAULT_PROMPT_TEMPLATE)
    }

    pub fn has_client(&self) -> bool {
        self.client.is_some()
    }

    /// 질문 + 검색 결과로 답변 생성
    ///
    /// 실패하지 않습니다. LLM 오류는 로그를 남기고 [`GenerationStatus::Unavailable`]로 표시합니다.
    pub async fn answer(&self, question: &str, results: &[SearchResult]) -> Answer {
        let citations = citations_from(results);

        if results.is_empty() {
            tracing::info!("No chunks retrieved; skipping generation");
            return Answer {
                question: question.to_string(),
                text: NO_INFORMATION_ANSWER.to_string(),
                citations,
                status: GenerationStatus::NoContext,
                prompt: None,
            };
        }

        let prompt = build_prompt(&self.template, question, results);

        let (text, status) = match &self.client {
            None => (FALLBACK_ANSWER.to_string(), GenerationStatus::Unavailable),
            Some(client) => match client.complete(&prompt).await {
                Ok(text) => {
                    tracing::debug!("Answer generated by {}", client.model());
                    (text, GenerationStatus::Generated)
                }
                Err(e) => {
                    tracing::warn!("LLM request failed: {:#}", e);
                    (FALLBACK_ANSWER.to_string(), GenerationStatus::Unavailable)
                }
            },
        };

        Answer {
            question: question.to_string(),
            text,
            citations,
            status,
            prompt: Some(prompt),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
