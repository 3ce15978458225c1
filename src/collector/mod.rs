//! 문서 수집 모듈
//!
//! 문서 폴더의 텍스트/PDF 파일과 CSV 데이터셋을 읽어
//! 동일한 형태의 [`Document`] 목록으로 만듭니다.
//! 폴더가 없거나 CSV가 비어 있어도 오류가 아니라 빈 결과입니다.

mod csv_source;

use std::path::{Path, PathBuf};

use anyhow::Result;
use ignore::WalkBuilder;
use serde::Serialize;

pub use csv_source::{load_csv, CsvColumns};

use crate::config::Settings;
use crate::extractor;
use crate::knowledge::{Document, DocumentKind};
use crate::scraper::SOURCE_HEADER;

// ============================================================================
// File Types
// ============================================================================

/// 지원하는 파일 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    /// 텍스트 파일 (txt, md)
    Text,
    /// PDF 파일
    Pdf,
}

impl FileType {
    /// 확장자로 파일 타입 결정
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "txt" | "md" | "markdown" => Some(FileType::Text),
            "pdf" => Some(FileType::Pdf),
            _ => None,
        }
    }

    /// 파일 경로에서 타입 결정
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    /// 대응하는 문서 유형
    pub fn document_kind(self) -> DocumentKind {
        match self {
            FileType::Text => DocumentKind::Text,
            FileType::Pdf => DocumentKind::Pdf,
        }
    }
}

/// 수집된 파일 정보
#[derive(Debug, Clone)]
pub struct CollectedFile {
    /// 파일 경로
    pub path: PathBuf,
    /// 문서 폴더 기준 상대 경로 (문서 출처로 사용)
    pub relative: String,
    pub file_type: FileType,
    pub size: u64,
}

// ============================================================================
// File Collector
// ============================================================================

/// 폴더 재귀 수집 (상대 경로 순으로 정렬)
///
/// 숨김 파일과 .gitignore 대상은 건너뜁니다. 폴더가 없으면 빈 목록입니다.
pub fn collect_directory(root: &Path) -> Vec<CollectedFile> {
    if !root.is_dir() {
        tracing::warn!("Documents folder not found: {:?}", root);
        return Vec::new();
    }

    let walker = WalkBuilder::new(root)
        .hidden(true)
        .git_ignore(true)
        .git_global(false)
        .git_exclude(false)
        .require_git(false)
        .build();

    let mut files = Vec::new();

    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!("Failed to read entry: {}", e);
                continue;
            }
        };

        if !entry.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
            continue;
        }

        let Some(file_type) = FileType::from_path(entry.path()) else {
            continue;
        };

        let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
        let relative = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .to_string_lossy()
            .replace('\\', "/");

        files.push(CollectedFile {
            path: entry.path().to_path_buf(),
            relative,
            file_type,
            size,
        });
    }

    files.sort_by(|a, b| a.relative.cmp(&b.relative));
    tracing::info!("Collected {} files from {:?}", files.len(), root);
    files
}

// ============================================================================
// Document Loader
// ============================================================================

/// 수집 통계
#[derive(Debug, Default, Clone, Serialize)]
pub struct LoadStats {
    pub text_files: usize,
    pub pdf_files: usize,
    pub csv_rows: usize,
    /// 너무 짧거나 읽기 실패로 건너뛴 항목
    pub skipped: usize,
}

/// 문서 로더
#[derive(Debug, Clone)]
pub struct DocumentLoader {
    docs_dir: PathBuf,
    csv_path: PathBuf,
    min_chars: usize,
}

impl DocumentLoader {
    pub fn new(docs_dir: impl Into<PathBuf>, csv_path: impl Into<PathBuf>, min_chars: usize) -> Self {
        Self {
            docs_dir: docs_dir.into(),
            csv_path: csv_path.into(),
            min_chars,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            &settings.docs_dir,
            &settings.csv_path,
            settings.min_document_chars,
        )
    }

    /// 폴더 + CSV 전체 로드
    pub async fn load_all(&self) -> Result<(Vec<Document>, LoadStats)> {
        let mut stats = LoadStats::default();
        let mut documents = self.load_folder(&mut stats).await;

        match load_csv(&self.csv_path) {
            Ok(rows) => {
                stats.csv_rows = rows.len();
                documents.extend(rows);
            }
            Err(e) => {
                tracing::warn!("Failed to load CSV dataset {:?}: {:#}", self.csv_path, e);
            }
        }

        tracing::info!(
            "Loaded {} documents ({} text, {} pdf, {} csv rows, {} skipped)",
            documents.len(),
            stats.text_files,
            stats.pdf_files,
            stats.csv_rows,
            stats.skipped
        );
        Ok((documents, stats))
    }

    /// 문서 폴더의 파일 로드
    async fn load_folder(&self, stats: &mut LoadStats) -> Vec<Document> {
        let mut documents = Vec::new();

        for file in collect_directory(&self.docs_dir) {
            let raw = match extractor::extract_text(&file.path, file.file_type).await {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!("Skipping {}: {:#}", file.relative, e);
                    stats.skipped += 1;
                    continue;
                }
            };

            let text = extractor::clean_text(&raw);
            if text.chars().count() <= self.min_chars {
                tracing::debug!("Skipping nearly empty file {}", file.relative);
                stats.skipped += 1;
                continue;
            }

            match file.file_type {
                FileType::Text => stats.text_files += 1,
                FileType::Pdf => stats.pdf_files += 1,
            }

            let header = PageHeader::parse(&text);
            let mut doc = match (&header.url, file.file_type) {
                // 스크래퍼가 저장한 페이지: 출처는 원본 URL, 식별자는 파일 경로
                (Some(url), FileType::Text) => {
                    Document::new(text, url.as_str(), DocumentKind::Web).with_key(&file.relative)
                }
                _ => Document::new(text, &file.relative, file.file_type.document_kind()),
            };
            if let Some(title) = header.title {
                doc = doc.with_title(title);
            }
            documents.push(doc);
        }

        documents
    }
}

/// 텍스트 파일 머리의 `제목\n====` 밑줄과 `Source: <url>` 줄
#[derive(Debug, Default, PartialEq, Eq)]
struct PageHeader {
    title: Option<String>,
    url: Option<String>,
}

impl PageHeader {
    fn parse(text: &str) -> Self {
        let mut lines = text.lines().map(str::trim).peekable();
        let mut header = PageHeader::default();

        let first = lines.next().unwrap_or_default();
        let underlined = !first.is_empty()
            && lines
                .peek()
                .is_some_and(|u| u.len() >= 3 && u.chars().all(|c| c == '='));

        let line = if underlined {
            header.title = Some(first.to_string());
            lines.next();
            lines.next().unwrap_or_default()
        } else {
            first
        };

        header.url = line
            .strip_prefix(SOURCE_HEADER)
            .map(str::trim)
            .filter(|url| url.starts_with("http://") || url.starts_with("https://"))
            .map(str::to_string);

        header
    }
}

// ============================================================================
// Tests
// ============================================================================
