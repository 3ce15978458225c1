//! CSV 데이터셋 로드
//!
//! 헤더 이름으로 본문/제목/출처 열을 찾습니다. 본문 열이 없으면
//! 행의 모든 값을 `" | "`로 이어 본문으로 씁니다.

use std::path::Path;

use anyhow::{Context, Result};

use crate::extractor::clean_text;
use crate::knowledge::{Document, DocumentKind};

const TEXT_COLUMNS: &[&str] = &["content", "text", "article", "body", "summary"];
const TITLE_COLUMNS: &[&str] = &["title", "headline"];
const SOURCE_COLUMNS: &[&str] = &["url", "link", "source"];

/// 헤더에서 찾은 열 위치
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CsvColumns {
    pub text: Option<usize>,
    pub title: Option<usize>,
    pub source: Option<usize>,
}

impl CsvColumns {
    /// 헤더 행에서 열 위치 탐지 (대소문자 무시, 앞쪽 후보 우선)
    pub fn detect(headers: &csv::StringRecord) -> Self {
        let find = |candidates: &[&str]| {
            candidates.iter().find_map(|name| {
                headers
                    .iter()
                    .position(|h| h.trim().eq_ignore_ascii_case(name))
            })
        };

        Self {
            text: find(TEXT_COLUMNS),
            title: find(TITLE_COLUMNS),
            source: find(SOURCE_COLUMNS),
        }
    }
}

/// CSV 파일의 각 행을 문서로 변환
///
/// 파일이 없거나 비어 있으면 빈 목록입니다. 본문이 빈 행은 건너뜁니다.
pub fn load_csv(path: &Path) -> Result<Vec<Document>> {
    if !path.is_file() {
        tracing::warn!("CSV dataset not found: {:?}", path);
        return Ok(Vec::new());
    }

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open CSV: {:?}", path))?;

    let headers = reader
        .headers()
        .with_context(|| format!("Failed to read CSV header: {:?}", path))?
        .clone();
    if headers.is_empty() {
        return Ok(Vec::new());
    }

    let columns = CsvColumns::detect(&headers);
    if columns.text.is_none() {
        tracing::warn!(
            "No text column in {:?}; using all fields of each row",
            path
        );
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "dataset.csv".to_string());

    let mut documents = Vec::new();

    for (i, record) in reader.records().enumerate() {
        let row = i + 1;
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!("Skipping malformed CSV row {}: {}", row, e);
                continue;
            }
        };

        let field = |idx: Option<usize>| {
            idx.and_then(|i| record.get(i))
                .map(str::trim)
                .filter(|v| !v.is_empty())
        };

        let raw = match columns.text {
            Some(_) => field(columns.text).unwrap_or_default().to_string(),
            None => record.iter().collect::<Vec<_>>().join(" | "),
        };
        let text = clean_text(&raw);
        if text.is_empty() {
            continue;
        }

        // 출처 열은 겹칠 수 있으므로 (같은 URL, 발행처 이름 등) 식별자는 항상 행 번호
        let key = format!("{}#row{}", file_name, row);
        let source = field(columns.source)
            .map(str::to_string)
            .unwrap_or_else(|| key.clone());

        let mut doc = Document::new(text, source, DocumentKind::CsvRow).with_key(key);
        if let Some(title) = field(columns.title) {
            doc = doc.with_title(title);
        }
        documents.push(doc);
    }

    tracing::debug!("Loaded {} rows from {:?}", documents.len(), path);
    Ok(documents)
}
