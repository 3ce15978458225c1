//! 청크 내보내기
//!
//! 적재한 청크를 사람이 검수할 수 있는 파일로 씁니다.
//! 확장자가 `.csv`이면 CSV, 그 외에는 한 줄에 청크 하나인 JSONL입니다.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use super::document::{DocumentChunk, DocumentKind};

/// 내보내기 형식
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Jsonl,
    Csv,
}

impl ExportFormat {
    /// 파일 확장자로 결정
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("csv") => ExportFormat::Csv,
            _ => ExportFormat::Jsonl,
        }
    }
}

/// 내보내는 한 행
#[derive(Debug, Serialize)]
struct ChunkRow<'a> {
    chunk_id: &'a str,
    source: &'a str,
    #[serde(rename = "type")]
    kind: DocumentKind,
    title: &'a str,
    chunk_index: usize,
    content: &'a str,
}

impl<'a> From<&'a DocumentChunk> for ChunkRow<'a> {
    fn from(chunk: &'a DocumentChunk) -> Self {
        Self {
            chunk_id: &chunk.id,
            source: &chunk.source,
            kind: chunk.kind,
            title: chunk.title.as_deref().unwrap_or_default(),
            chunk_index: chunk.chunk_index,
            content: &chunk.text,
        }
    }
}

/// 청크를 파일로 쓰고 행 수 반환
pub fn write_chunks(path: &Path, chunks: &[DocumentChunk]) -> Result<usize> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {:?}", parent))?;
    }

    let file =
        File::create(path).with_context(|| format!("Failed to create export file {:?}", path))?;

    match ExportFormat::from_path(path) {
        ExportFormat::Csv => {
            let mut writer = csv::Writer::from_writer(file);
            for chunk in chunks {
                writer.serialize(ChunkRow::from(chunk))?;
            }
            writer.flush()?;
        }
        ExportFormat::Jsonl => {
            let mut writer = BufWriter::new(file);
            for chunk in chunks {
                serde_json::to_writer(&mut writer, &ChunkRow::from(chunk))?;
                writer.write_all(b"\n")?;
            }
            writer.flush()?;
        }
    }

    tracing::info!("Exported {} chunks to {:?}", chunks.len(), path);
    Ok(chunks.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn chunks() -> Vec<DocumentChunk> {
        vec![
            DocumentChunk {
                id: "abc".to_string(),
                source: "https://www.cdc.gov/tantrums".to_string(),
                kind: DocumentKind::Web,
                title: Some("Tantrums".to_string()),
                chunk_index: 0,
                text: "Stay calm, and name the feeling.".to_string(),
            },
            DocumentChunk {
                id: "def".to_string(),
                source: "articles.csv#row2".to_string(),
                kind: DocumentKind::CsvRow,
                title: None,
                chunk_index: 1,
                text: "Line one\nline two".to_string(),
            },
        ]
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(ExportFormat::from_path(Path::new("out/chunks.CSV")), ExportFormat::Csv);
        assert_eq!(ExportFormat::from_path(Path::new("chunks.jsonl")), ExportFormat::Jsonl);
        assert_eq!(ExportFormat::from_path(Path::new("chunks")), ExportFormat::Jsonl);
    }

    #[test]
    fn test_write_jsonl() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("chunks.jsonl");

        assert_eq!(write_chunks(&path, &chunks()).unwrap(), 2);

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["chunk_id"], "abc");
        assert_eq!(lines[0]["type"], "web");
        assert_eq!(lines[1]["type"], "csv_row");
        assert_eq!(lines[1]["content"], "Line one\nline two");
    }

    #[test]
    fn test_write_csv() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("chunks.csv");

        write_chunks(&path, &chunks()).unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(
            headers.iter().collect::<Vec<_>>(),
            vec!["chunk_id", "source", "type", "title", "chunk_index", "content"]
        );
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[0][1], "https://www.cdc.gov/tantrums");
        assert_eq!(&rows[0][5], "Stay calm, and name the feeling.");
        assert_eq!(&rows[1][2], "csv_row");
        assert_eq!(&rows[1][3], "");
    }
}
