//! PDF 텍스트 추출
//!
//! pdf-extract로 전체 텍스트를 뽑고, 폼피드(`\x0c`) 또는 "--- Page N ---"
//! 형태의 구분선으로 페이지를 나눕니다. 스캔 PDF처럼 텍스트가 없으면 빈 목록입니다.

use std::path::Path;

use anyhow::{Context, Result};
use regex::Regex;

/// PDF에서 페이지별 텍스트 추출 (빈 페이지 제외)
pub fn extract_text_from_pdf(path: &Path) -> Result<Vec<String>> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read PDF: {:?}", path))?;
    extract_pages(&bytes).with_context(|| format!("Failed to extract text from PDF: {:?}", path))
}

fn extract_pages(bytes: &[u8]) -> Result<Vec<String>> {
    let text = pdf_extract::extract_text_from_mem(bytes)?;

    if text.trim().is_empty() {
        tracing::warn!("No text layer in PDF; it might be a scanned document");
        return Ok(Vec::new());
    }

    Ok(split_pdf_pages(&text))
}

/// PDF 텍스트를 페이지별로 분리 (실패하면 전체가 한 페이지)
fn split_pdf_pages(text: &str) -> Vec<String> {
    let split_by = |parts: Vec<&str>| -> Vec<String> {
        parts
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    };

    let pages = split_by(text.split('\x0c').collect());
    if pages.len() > 1 {
        return pages;
    }

    if let Ok(separator) = Regex::new(r"(?m)^\s*[-=]+\s*(?:Page\s*)?\d+\s*[-=]+\s*$") {
        let pages = split_by(separator.split(text).collect());
        if pages.len() > 1 {
            return pages;
        }
    }

    vec![text.trim().to_string()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_pdf_pages_with_formfeed() {
        let pages = split_pdf_pages("Routines help.\x0cSleep matters.\x0c\x0cPlay daily.");
        assert_eq!(pages, vec!["Routines help.", "Sleep matters.", "Play daily."]);
    }

    #[test]
    fn test_split_pdf_pages_with_separator_lines() {
        let text = "Intro\n--- Page 2 ---\nBody\n=== 3 ===\nEnd";
        let pages = split_pdf_pages(text);
        assert_eq!(pages, vec!["Intro", "Body", "End"]);
    }

    #[test]
    fn test_extract_pages_rejects_non_pdf() {
        assert!(extract_pages(b"%PDF-garbage").is_err());
    }

    #[test]
    fn test_split_pdf_pages_no_separator() {
        let pages = split_pdf_pages("  Just one page  ");
        assert_eq!(pages, vec!["Just one page"]);
    }
}
