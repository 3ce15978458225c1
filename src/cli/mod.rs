//! CLI 모듈
//!
//! parenting-rag CLI 명령어 정의 및 구현

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use crate::config::Settings;
use crate::generation::{Answer, GenerationStatus};
use crate::knowledge::{
    ensure_store_exists, Catalog, LanceVectorStore, VectorStore, CATALOG_FILE, VECTORS_DIR,
};
use crate::pipeline::{BuildSummary, RagPipeline};
use crate::scraper::{CrawlConfig, WebScraper};

/// 기본 질문
pub const DEFAULT_QUESTION: &str = "How can I deal with my child's tantrums?";

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "parenting-rag")]
#[command(version, about = "육아/아동심리 문서 기반 RAG 질의응답", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// 저장소/입력 경로 옵션
#[derive(Args, Debug, Clone, Default)]
pub struct StoreArgs {
    /// 벡터 저장소 디렉토리
    #[arg(long)]
    pub db_dir: Option<PathBuf>,

    /// PDF/텍스트 문서 폴더
    #[arg(long)]
    pub docs_dir: Option<PathBuf>,

    /// CSV 데이터셋 경로
    #[arg(long)]
    pub csv: Option<PathBuf>,
}

impl StoreArgs {
    /// 환경변수 설정 위에 플래그 반영
    pub fn apply(&self, mut settings: Settings) -> Settings {
        if let Some(ref dir) = self.db_dir {
            settings = settings.with_db_dir(dir);
        }
        if let Some(ref dir) = self.docs_dir {
            settings = settings.with_docs_dir(dir);
        }
        if let Some(ref path) = self.csv {
            settings = settings.with_csv_path(path);
        }
        settings
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// 질문하기 (필요하면 저장소 재구축)
    Ask {
        /// 질문
        #[arg(short, long, default_value = DEFAULT_QUESTION)]
        query: String,

        /// 검색할 청크 수 (기본: PARENTING_RAG_TOP_K 또는 3)
        #[arg(short)]
        k: Option<usize>,

        /// 기존 저장소를 지우고 다시 구축
        #[arg(long)]
        rebuild: bool,

        #[command(flatten)]
        store: StoreArgs,

        /// LLM에 보낸 프롬프트 출력
        #[arg(long)]
        show_prompt: bool,

        /// 결과를 JSON으로 출력
        #[arg(long)]
        json: bool,
    },

    /// 허용 도메인에서 문서 수집
    Scrape {
        /// 처리할 최대 URL 수
        #[arg(long, default_value_t = 30)]
        max_pages: usize,

        /// 저장할 최대 문서 수
        #[arg(long, default_value_t = 20)]
        max_docs: usize,

        /// 요청 간 지연 (초)
        #[arg(long, default_value = "1.0", value_parser = parse_delay)]
        delay: Duration,

        /// 저장 폴더
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },

    /// 문서를 저장소에 적재 (질문 없이)
    Ingest {
        /// 기존 저장소를 지우고 다시 구축
        #[arg(long)]
        rebuild: bool,

        /// 적재한 청크를 파일로 내보내기 (.jsonl 또는 .csv)
        #[arg(long)]
        export_chunks: Option<PathBuf>,

        #[command(flatten)]
        store: StoreArgs,
    },

    /// 상태 확인
    Status {
        #[command(flatten)]
        store: StoreArgs,
    },
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Ask {
            query,
            k,
            rebuild,
            store,
            show_prompt,
            json,
        } => cmd_ask(&query, k, rebuild, &store, show_prompt, json).await,
        Commands::Scrape {
            max_pages,
            max_docs,
            delay,
            out_dir,
        } => cmd_scrape(max_pages, max_docs, delay, out_dir).await,
        Commands::Ingest {
            rebuild,
            export_chunks,
            store,
        } => cmd_ingest(rebuild, export_chunks.as_deref(), &store).await,
        Commands::Status { store } => cmd_status(&store).await,
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 질문 명령어 (ask)
async fn cmd_ask(
    query: &str,
    k: Option<usize>,
    rebuild: bool,
    store: &StoreArgs,
    show_prompt: bool,
    json: bool,
) -> Result<()> {
    let settings = store.apply(Settings::from_env());
    let k = k.unwrap_or(settings.top_k);

    // 모델 로드/다운로드 전에 저장소부터 확인
    if !rebuild {
        ensure_store_exists(&settings.db_dir)?;
    }
    let pipeline = RagPipeline::from_settings(settings).await?;

    let kb = if rebuild {
        if !json {
            println!("[*] 저장소 재구축 중: {}", pipeline.settings().db_dir.display());
        }
        let (kb, summary) = pipeline.build(true).await?;
        if !json {
            print_build_summary(&summary);
        }
        kb
    } else {
        pipeline.open().await?
    };

    if !json {
        println!("[*] 검색 중: \"{}\"", query);
    }
    let mut answer = pipeline.ask(&kb, query, k).await?;

    if json {
        if !show_prompt {
            answer.prompt = None;
        }
        let out = serde_json::to_string_pretty(&answer).context("Failed to serialize answer")?;
        println!("{}", out);
        return Ok(());
    }

    print_answer(&answer, show_prompt);
    Ok(())
}

/// 수집 명령어 (scrape)
async fn cmd_scrape(
    max_pages: usize,
    max_docs: usize,
    delay: Duration,
    out_dir: Option<PathBuf>,
) -> Result<()> {
    let mut config = CrawlConfig {
        max_pages,
        max_docs,
        delay,
        ..Default::default()
    };
    if let Some(dir) = out_dir {
        config.output_dir = dir;
    }

    println!(
        "[*] 크롤링 시작: 시드 {}개, 최대 {} 페이지 / {} 문서",
        config.seeds.len(),
        config.max_pages,
        config.max_docs
    );

    let scraper = WebScraper::new()?;
    let report = scraper.crawl(&config).await?;

    println!();
    println!(
        "[OK] 완료: 처리 {}, 저장 {}, 실패 {}, 짧은 본문 {}",
        report.pages_processed,
        report.saved.len(),
        report.failed,
        report.too_short
    );
    for path in &report.saved {
        println!("     {}", path.display());
    }

    Ok(())
}

/// 적재 명령어 (ingest)
async fn cmd_ingest(rebuild: bool, export: Option<&Path>, store: &StoreArgs) -> Result<()> {
    let settings = store.apply(Settings::from_env());
    println!("[*] 문서 폴더: {}", settings.docs_dir.display());
    println!("[*] CSV: {}", settings.csv_path.display());

    let pipeline = RagPipeline::from_settings(settings).await?;
    let (_, summary) = pipeline.build_with_export(rebuild, export).await?;

    print_build_summary(&summary);
    if let Some(path) = export {
        println!("[OK] 청크 내보내기: {}", path.display());
    }
    Ok(())
}

/// 상태 명령어 (status)
///
/// 임베딩 모델을 불러오지 않고 카탈로그만 읽습니다.
async fn cmd_status(store: &StoreArgs) -> Result<()> {
    let settings = store.apply(Settings::from_env());

    println!("parenting-rag v{}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("[*] 벡터 저장소: {}", settings.db_dir.display());
    println!("[*] 임베딩 모델: {}", settings.embedding_model);
    println!("[*] 모델 캐시: {}", settings.model_dir().display());

    if settings.has_api_key() {
        println!("[OK] OPENROUTER_API_KEY: 설정됨 ({})", settings.llm.model);
    } else {
        println!("[!] OPENROUTER_API_KEY: 미설정 (폴백 답변 사용)");
        println!("    설정: export OPENROUTER_API_KEY=your-key");
    }

    let catalog_path = settings.db_dir.join(CATALOG_FILE);
    if !catalog_path.is_file() {
        println!("[!] 저장소 없음. `parenting-rag ingest --rebuild`로 구축하세요.");
        return Ok(());
    }

    let catalog = Catalog::open(&catalog_path).context("Failed to open catalog")?;

    let signature = catalog.embedding_signature()?;
    match signature {
        Some(ref sig) => println!("[OK] 저장소 모델: {} ({}d)", sig.model, sig.dimension),
        None => println!("[!] 저장소 모델 정보 없음"),
    }

    let stats = catalog.stats()?;
    println!(
        "[OK] 문서: {} 건, 청크: {} 개",
        stats.document_count, stats.chunk_count
    );

    if let Some(sig) = signature {
        match LanceVectorStore::open_existing(&settings.db_dir.join(VECTORS_DIR), sig.dimension)
            .await
        {
            Ok(Some(vectors)) => match vectors.count().await {
                Ok(count) => println!("[OK] 벡터 인덱스: {} 청크", count),
                Err(e) => tracing::debug!("Failed to count vectors: {}", e),
            },
            Ok(None) => println!("[!] 벡터 인덱스 없음"),
            Err(e) => println!("[!] 벡터 인덱스 열기 실패: {}", e),
        }
    }

    let recent = catalog.list_documents(5)?;
    if !recent.is_empty() {
        println!();
        println!("최근 문서:");
        for doc in recent {
            let title = doc
                .title
                .as_ref()
                .map(|t| truncate_text(t, 40))
                .unwrap_or_else(|| "-".to_string());
            println!("  [{}] {}", doc.kind.as_str(), title);
            println!(
                "        {} | {} 청크 | {}",
                doc.source,
                doc.chunk_count,
                doc.ingested_at.format("%Y-%m-%d %H:%M")
            );
        }
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// `--delay` 값 (초). 음수, inf, NaN은 거부
fn parse_delay(value: &str) -> std::result::Result<Duration, String> {
    let secs: f64 = value
        .trim()
        .parse()
        .map_err(|_| format!("`{}` is not a number of seconds", value))?;
    Duration::try_from_secs_f64(secs).map_err(|e| format!("invalid delay `{}`: {}", value, e))
}

fn print_build_summary(summary: &BuildSummary) {
    let load = &summary.load;
    println!(
        "[OK] 문서 {} 건 적재 (텍스트 {}, PDF {}, CSV 행 {}, 건너뜀 {})",
        summary.ingest.documents, load.text_files, load.pdf_files, load.csv_rows, load.skipped
    );
    println!(
        "     청크 {} 개 추가, 저장소 전체 {} 개",
        summary.ingest.chunks, summary.total_chunks
    );
}

fn print_answer(answer: &Answer, show_prompt: bool) {
    if show_prompt {
        if let Some(ref prompt) = answer.prompt {
            println!("\n=== PROMPT ===\n{}", prompt);
        }
    }

    println!("\n=== QUESTION ===\n{}", answer.question);
    println!("\n=== ANSWER ===\n{}", answer.text);

    match answer.status {
        GenerationStatus::Generated => {}
        GenerationStatus::Unavailable => println!("\n[!] LLM 응답 없음 - 폴백 답변"),
        GenerationStatus::NoContext => println!("\n[!] 관련 문서를 찾지 못했습니다"),
    }

    if answer.citations.is_empty() {
        return;
    }

    println!("\n=== SOURCES ===");
    for (i, citation) in answer.citations.iter().enumerate() {
        println!(
            "{}. [점수: {:.4}] {}",
            i + 1,
            citation.score,
            citation.source
        );
        if let Some(ref title) = citation.title {
            println!("   제목: {}", truncate_text(title, 80));
        }
        println!("   ID: {}", citation.id);
    }
}

/// 텍스트 자르기 (UTF-8 안전)
fn truncate_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.replace('\n', " ").replace('\r', "");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_chars {
        cleaned.to_string()
    } else {
        let truncated: String = cleaned.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

// ============================================================================
// Tests
// ============================================================================
