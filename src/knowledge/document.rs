//! 문서 / 청크 타입

use std::fmt;

use serde::{Deserialize, Serialize};

/// 문서 출처 유형
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    /// 스크랩된 웹 페이지
    Web,
    /// 텍스트 파일
    Text,
    /// PDF 파일
    Pdf,
    /// CSV 데이터셋의 한 행
    CsvRow,
}

impl DocumentKind {
    /// 저장용 문자열
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Web => "web",
            DocumentKind::Text => "text",
            DocumentKind::Pdf => "pdf",
            DocumentKind::CsvRow => "csv_row",
        }
    }

    /// 저장용 문자열에서 복원 (알 수 없는 값은 Text)
    pub fn parse(s: &str) -> Self {
        match s {
            "web" => DocumentKind::Web,
            "pdf" => DocumentKind::Pdf,
            "csv_row" => DocumentKind::CsvRow,
            _ => DocumentKind::Text,
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 로더가 만든 원본 문서 (청킹 후 폐기)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// 본문 텍스트
    pub text: String,
    /// 말뭉치 안에서 고유한 식별자 (청크 ID와 카탈로그 키)
    ///
    /// 파일은 상대 경로, CSV 행은 `<csv>#row<N>`. 출처 URL이 같은 행이 여럿이어도 겹치지 않습니다.
    pub key: String,
    /// 표시용 출처 (URL, 상대 파일 경로, `<csv>#row<N>`)
    pub source: String,
    /// 출처 유형
    pub kind: DocumentKind,
    /// 제목
    pub title: Option<String>,
}

impl Document {
    /// 출처를 그대로 식별자로 쓰는 문서
    pub fn new(text: impl Into<String>, source: impl Into<String>, kind: DocumentKind) -> Self {
        let source = source.into();
        Self {
            text: text.into(),
            key: source.clone(),
            source,
            kind,
            title: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// 출처와 다른 식별자 지정
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }
}

/// 출처 메타데이터가 붙은 청크 (임베딩 단위)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    /// 결정적 엔트리 ID (문서 key + chunk_index 해시)
    pub id: String,
    /// 원본 문서 출처
    pub source: String,
    /// 원본 문서 유형
    pub kind: DocumentKind,
    /// 원본 문서 제목
    pub title: Option<String>,
    /// 문서 내 순번 (0부터)
    pub chunk_index: usize,
    /// 청크 텍스트
    pub text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trip_strings() {
        for kind in [
            DocumentKind::Web,
            DocumentKind::Text,
            DocumentKind::Pdf,
            DocumentKind::CsvRow,
        ] {
            assert_eq!(DocumentKind::parse(kind.as_str()), kind);
        }
        assert_eq!(DocumentKind::parse("unknown"), DocumentKind::Text);
    }

    #[test]
    fn test_document_builder() {
        let doc = Document::new("body", "a.txt", DocumentKind::Text).with_title("A");
        assert_eq!(doc.title.as_deref(), Some("A"));
        assert_eq!(doc.kind, DocumentKind::Text);
        assert_eq!(doc.key, "a.txt");

        let row = Document::new("body", "https://cdc.gov/x", DocumentKind::CsvRow)
            .with_key("articles.csv#row2");
        assert_eq!(row.key, "articles.csv#row2");
        assert_eq!(row.source, "https://cdc.gov/x");
    }
}
