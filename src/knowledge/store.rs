//! Catalog - rusqlite 기반 저장소 메타데이터
//!
//! 벡터 저장소 옆에 `catalog.db`를 두고 다음을 기록합니다.
//! - 저장소를 만든 임베딩 모델/차원 (모델 불일치 감지용)
//! - 적재된 문서 목록 (출처, 유형, 청크 수, 내용 해시)

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::document::{Document, DocumentKind};

// ============================================================================
// Types
// ============================================================================

/// 저장소를 만든 임베딩 모델 정보
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingSignature {
    pub model: String,
    pub dimension: usize,
}

/// 적재된 문서 기록
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// 문서 식별자 ([`Document::key`])
    pub key: String,
    pub source: String,
    pub kind: DocumentKind,
    pub title: Option<String>,
    pub chunk_count: usize,
    pub content_hash: String,
    pub ingested_at: DateTime<Utc>,
}

impl DocumentRecord {
    /// 문서 + 청크 수로 기록 생성
    pub fn from_document(doc: &Document, chunk_count: usize) -> Self {
        Self {
            key: doc.key.clone(),
            source: doc.source.clone(),
            kind: doc.kind,
            title: doc.title.clone(),
            chunk_count,
            content_hash: format!("{:x}", Sha256::digest(doc.text.as_bytes())),
            ingested_at: Utc::now(),
        }
    }
}

/// 카탈로그 통계
#[derive(Debug, Clone, Serialize)]
pub struct CatalogStats {
    pub document_count: usize,
    pub chunk_count: usize,
    pub db_path: PathBuf,
}

// ============================================================================
// Catalog
// ============================================================================

/// SQLite 카탈로그
pub struct Catalog {
    conn: Arc<Mutex<Connection>>,
    db_path: PathBuf,
}

impl Catalog {
    /// 카탈로그 열기 (없으면 생성)
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).context("Failed to create catalog directory")?;
            }
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .context("Failed to open SQLite catalog")?;

        let catalog = Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path: path.to_path_buf(),
        };

        catalog.initialize()?;
        Ok(catalog)
    }

    /// DB 경로 반환
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))
    }

    /// 스키마 초기화
    fn initialize(&self) -> Result<()> {
        let conn = self.lock()?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS documents (
                doc_key TEXT PRIMARY KEY,
                source TEXT NOT NULL,
                kind TEXT NOT NULL,
                title TEXT,
                chunk_count INTEGER NOT NULL,
                content_hash TEXT NOT NULL,
                ingested_at TEXT NOT NULL
            );",
        )
        .context("Failed to create catalog tables")?;

        tracing::debug!("Catalog initialized at {:?}", self.db_path);
        Ok(())
    }

    /// 기록된 임베딩 모델 정보
    pub fn embedding_signature(&self) -> Result<Option<EmbeddingSignature>> {
        let conn = self.lock()?;

        let get = |key: &str| -> Result<Option<String>> {
            conn.query_row("SELECT value FROM meta WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()
            .context("Failed to read catalog meta")
        };

        let model = get("embedding_model")?;
        let dimension = get("embedding_dimension")?;

        match (model, dimension) {
            (Some(model), Some(dimension)) => Ok(Some(EmbeddingSignature {
                model,
                dimension: dimension
                    .parse()
                    .context("Corrupt embedding_dimension in catalog")?,
            })),
            _ => Ok(None),
        }
    }

    /// 임베딩 모델 정보 기록
    pub fn set_embedding_signature(&self, signature: &EmbeddingSignature) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO meta (key, value) VALUES ('embedding_model', ?1)",
            params![signature.model],
        )?;
        conn.execute(
            "INSERT OR REPLACE INTO meta (key, value) VALUES ('embedding_dimension', ?1)",
            params![signature.dimension.to_string()],
        )?;
        Ok(())
    }

    /// 문서 기록 (같은 식별자는 덮어씀)
    pub fn record_document(&self, record: &DocumentRecord) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO documents
                (doc_key, source, kind, title, chunk_count, content_hash, ingested_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                record.key,
                record.source,
                record.kind.as_str(),
                record.title,
                record.chunk_count as i64,
                record.content_hash,
                record.ingested_at.to_rfc3339(),
            ],
        )
        .context("Failed to record document")?;
        Ok(())
    }

    /// 식별자로 문서 기록 조회
    pub fn get_document(&self, key: &str) -> Result<Option<DocumentRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT doc_key, source, kind, title, chunk_count, content_hash, ingested_at
             FROM documents WHERE doc_key = ?1",
        )?;
        let record = stmt.query_row(params![key], row_to_record).optional()?;
        Ok(record)
    }

    /// 문서 기록 목록 (최근 순)
    pub fn list_documents(&self, limit: usize) -> Result<Vec<DocumentRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT doc_key, source, kind, title, chunk_count, content_hash, ingested_at
             FROM documents
             ORDER BY ingested_at DESC, doc_key
             LIMIT ?1",
        )?;

        let records = stmt
            .query_map(params![limit as i64], row_to_record)?
            .filter_map(|r| r.ok())
            .collect();

        Ok(records)
    }

    /// 카탈로그 통계
    pub fn stats(&self) -> Result<CatalogStats> {
        let conn = self.lock()?;

        let (documents, chunks): (i64, i64) = conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(chunk_count), 0) FROM documents",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        Ok(CatalogStats {
            document_count: documents as usize,
            chunk_count: chunks as usize,
            db_path: self.db_path.clone(),
        })
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<DocumentRecord> {
    Ok(DocumentRecord {
        key: row.get(0)?,
        source: row.get(1)?,
        kind: DocumentKind::parse(&row.get::<_, String>(2)?),
        title: row.get(3)?,
        chunk_count: row.get::<_, i64>(4)? as usize,
        content_hash: row.get(5)?,
        ingested_at: parse_datetime(row.get::<_, String>(6)?),
    })
}

/// RFC3339 문자열을 DateTime<Utc>로 파싱
fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

// ============================================================================
// Tests
// ============================================================================
