//! 파이프라인 치명 에러
//!
//! 운영자가 직접 조치해야 하는 에러만 여기 모읍니다.
//! 나머지 에러는 `anyhow::Context`로 전파합니다.

use std::path::PathBuf;

use thiserror::Error;

/// 복구 불가능한 파이프라인 에러
#[derive(Debug, Error)]
pub enum PipelineError {
    /// 재구축 요청 시 기존 저장소를 지울 수 없음 (다른 프로세스가 사용 중 등)
    #[error(
        "failed to delete vector store at {path:?}: {source}\n\
         - close any other process (REPL, notebook, second CLI run) using this store\n\
         - or pass --db-dir to build into a fresh directory"
    )]
    StoreLocked {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// 질의 전용 실행인데 저장소가 없음
    #[error("no vector store found at {path:?}; run again with --rebuild to build it")]
    StoreMissing { path: PathBuf },

    /// 저장소를 만든 임베딩 모델과 현재 모델이 다름
    #[error(
        "embedding model mismatch: store was built with {stored_model} ({stored_dimension}d) \
         but the current model is {model} ({dimension}d); rebuild the store with --rebuild"
    )]
    ModelMismatch {
        stored_model: String,
        stored_dimension: usize,
        model: String,
        dimension: usize,
    },

    /// top-k는 1 이상이어야 함
    #[error("k must be at least 1 (got {0})")]
    InvalidTopK(usize),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_locked_mentions_remediation() {
        let err = PipelineError::StoreLocked {
            path: PathBuf::from("vector_db"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "in use"),
        };
        let msg = err.to_string();
        assert!(msg.contains("--db-dir"));
        assert!(msg.contains("in use"));
    }

    #[test]
    fn test_model_mismatch_message() {
        let err = PipelineError::ModelMismatch {
            stored_model: "a".to_string(),
            stored_dimension: 384,
            model: "b".to_string(),
            dimension: 768,
        };
        assert!(err.to_string().contains("--rebuild"));
    }
}
