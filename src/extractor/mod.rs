//! 콘텐츠 추출 모듈
//!
//! 수집된 파일에서 텍스트를 꺼내고 정리합니다.
//! - 텍스트 파일: UTF-8로 읽기 (깨진 바이트는 대체 문자로)
//! - PDF 파일: pdf-extract로 페이지별 추출 후 빈 줄로 연결

pub mod pdf;

use std::path::Path;

use anyhow::{Context, Result};

use crate::collector::FileType;

/// 파일에서 정리되지 않은 원문 추출
pub async fn extract_text(path: &Path, file_type: FileType) -> Result<String> {
    match file_type {
        FileType::Text => extract_plain(path).await,
        FileType::Pdf => extract_pdf(path).await,
    }
}

async fn extract_plain(path: &Path) -> Result<String> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read text file: {:?}", path))?;

    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

async fn extract_pdf(path: &Path) -> Result<String> {
    // PDF 추출은 CPU 바운드이므로 spawn_blocking 사용
    let path = path.to_path_buf();
    let pages = tokio::task::spawn_blocking(move || pdf::extract_text_from_pdf(&path))
        .await
        .context("PDF extraction task failed")??;

    Ok(pages.join("\n\n"))
}

// ============================================================================
// Text Cleaning
// ============================================================================

/// 추출된 텍스트 정리
///
/// 탭/줄바꿈을 제외한 제어 문자를 지우고, 연속 공백은 하나로,
/// 3줄 이상 이어지는 줄바꿈은 빈 줄 하나로 줄인 뒤 앞뒤 공백을 자릅니다.
pub fn clean_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut spaces = 0usize;
    let mut newlines = 0usize;

    for c in text.chars() {
        match c {
            '\r' => continue,
            ' ' => {
                newlines = 0;
                spaces += 1;
                if spaces == 1 {
                    out.push(' ');
                }
            }
            '\n' => {
                spaces = 0;
                newlines += 1;
                if newlines <= 2 {
                    out.push('\n');
                }
            }
            '\t' => {
                spaces = 0;
                newlines = 0;
                out.push('\t');
            }
            c if c.is_control() => continue,
            c => {
                spaces = 0;
                newlines = 0;
                out.push(c);
            }
        }
    }

    out.trim().to_string()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_text() {
        let raw = "  Stay   calm.\r\n\n\n\n\nSet\x0c limits.\x07  ";
        assert_eq!(clean_text(raw), "Stay calm.\n\nSet limits.");
    }

    #[test]
    fn test_clean_text_keeps_tabs_and_paragraphs() {
        assert_eq!(clean_text("a\tb\n\nc"), "a\tb\n\nc");
        assert_eq!(clean_text("   "), "");
    }

    #[tokio::test]
    async fn test_extract_plain_lossy() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("note.txt");
        std::fs::write(&path, b"Praise effort \xff often.").unwrap();

        let text = extract_text(&path, FileType::Text).await.unwrap();
        assert!(text.starts_with("Praise effort"));
        assert!(text.ends_with("often."));
    }

    #[tokio::test]
    async fn test_extract_invalid_pdf_fails() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, b"not a pdf").unwrap();

        assert!(extract_text(&path, FileType::Pdf).await.is_err());
    }
}
