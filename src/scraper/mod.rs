//! 웹 스크래퍼 모듈 - 육아 자료 크롤링
//!
//! 시드 URL에서 시작하는 너비 우선 크롤링입니다.
//! 허용 도메인 안에서 주제 키워드가 들어간 링크만 따라가며,
//! PDF는 그대로, HTML은 본문 텍스트만 문서 폴더에 저장합니다.
//!
//! 요청은 하나씩 순서대로 보내고 매 요청 뒤에 고정 지연을 둡니다.
//! 개별 페이지의 네트워크/파싱 오류는 로그만 남기고 건너뜁니다.

mod html;

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::header::CONTENT_TYPE;
use scraper::Html;
use serde::Serialize;
use sha2::{Digest, Sha256};
use url::Url;

pub use html::{extract_links, extract_main_text, extract_title};

// ============================================================================
// Crawl Config
// ============================================================================

/// 기본 시드 (UNICEF 육아 허브, CDC 육아 자료)
pub const DEFAULT_SEEDS: &[&str] = &[
    "https://www.unicef.org/parenting",
    "https://www.cdc.gov/parents/essentials/index.html",
    "https://www.cdc.gov/ncbddd/childdevelopment/positiveparenting/index.html",
];

/// 기본 허용 도메인
pub const DEFAULT_ALLOWED_DOMAINS: &[&str] = &["www.unicef.org", "unicef.org", "www.cdc.gov", "cdc.gov"];

/// 링크 관련성 키워드 (URL 소문자에 포함되면 관련 링크)
pub const DEFAULT_KEYWORDS: &[&str] = &[
    "parent",
    "child",
    "children",
    "development",
    "positive-parenting",
    "toddl",
    "teen",
    "behav",
    "discipline",
    "emotional",
    "support",
    "family",
    "caregiver",
    "education",
];

const USER_AGENT: &str = "Mozilla/5.0 (compatible; ParentingRAGBot/1.0)";

/// 파일 이름 최대 길이 (해시 접미사 제외)
const MAX_FILE_STEM: usize = 150;

/// 저장된 페이지 헤더의 원본 URL 줄 접두사
pub const SOURCE_HEADER: &str = "Source: ";

/// 크롤링 설정
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    pub seeds: Vec<String>,
    pub allowed_domains: Vec<String>,
    pub keywords: Vec<String>,
    /// 처리할 최대 URL 수 (실패 포함)
    pub max_pages: usize,
    /// 저장할 최대 문서 수
    pub max_docs: usize,
    /// 요청 간 지연
    pub delay: Duration,
    /// 이 길이 이하의 HTML 본문은 저장하지 않음
    pub min_text_chars: usize,
    pub output_dir: PathBuf,
    pub page_timeout: Duration,
    pub pdf_timeout: Duration,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        let owned = |items: &[&str]| items.iter().map(|s| s.to_string()).collect();
        Self {
            seeds: owned(DEFAULT_SEEDS),
            allowed_domains: owned(DEFAULT_ALLOWED_DOMAINS),
            keywords: owned(DEFAULT_KEYWORDS),
            max_pages: 30,
            max_docs: 20,
            delay: Duration::from_secs(1),
            min_text_chars: 300,
            output_dir: PathBuf::from("data"),
            page_timeout: Duration::from_secs(20),
            pdf_timeout: Duration::from_secs(30),
        }
    }
}

impl CrawlConfig {
    /// 허용 도메인 여부
    pub fn is_domain_allowed(&self, url: &Url) -> bool {
        url.host_str()
            .map(|host| {
                let host = host.to_ascii_lowercase();
                self.allowed_domains.iter().any(|allowed| *allowed == host)
            })
            .unwrap_or(false)
    }

    /// 주제 관련 링크 여부
    pub fn is_relevant(&self, url: &Url) -> bool {
        let lower = url.as_str().to_lowercase();
        self.keywords.iter().any(|k| lower.contains(k.as_str()))
    }
}

// ============================================================================
// Crawl Results
// ============================================================================

/// 가져온 페이지
#[derive(Debug, Clone)]
pub enum CrawledDocument {
    /// HTML 페이지 (본문과 다음 링크 후보)
    WebPage {
        url: Url,
        title: Option<String>,
        text: String,
        links: Vec<Url>,
    },
    /// PDF 원본 바이트
    PdfDocument { url: Url, bytes: Vec<u8> },
}

/// 크롤링 결과
#[derive(Debug, Default, Clone, Serialize)]
pub struct CrawlReport {
    pub pages_processed: usize,
    pub saved: Vec<PathBuf>,
    /// 오류/비정상 응답으로 건너뛴 URL 수
    pub failed: usize,
    /// 본문이 짧아 저장하지 않은 페이지 수
    pub too_short: usize,
}

// ============================================================================
// Web Scraper
// ============================================================================

/// 웹 스크래퍼
pub struct WebScraper {
    client: reqwest::Client,
}

impl WebScraper {
    /// 새 스크래퍼 생성
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client })
    }

    /// 너비 우선 크롤링
    pub async fn crawl(&self, config: &CrawlConfig) -> Result<CrawlReport> {
        tokio::fs::create_dir_all(&config.output_dir)
            .await
            .with_context(|| format!("Failed to create output directory {:?}", config.output_dir))?;

        let mut queue: VecDeque<Url> = VecDeque::new();
        let mut queued: HashSet<String> = HashSet::new();
        let mut visited: HashSet<String> = HashSet::new();

        for seed in &config.seeds {
            match Url::parse(seed) {
                Ok(url) => {
                    if queued.insert(url.to_string()) {
                        queue.push_back(url);
                    }
                }
                Err(e) => tracing::warn!("Ignoring invalid seed {}: {}", seed, e),
            }
        }

        let mut report = CrawlReport::default();

        while report.pages_processed < config.max_pages && report.saved.len() < config.max_docs {
            let Some(url) = queue.pop_front() else {
                break;
            };
            queued.remove(url.as_str());
            if !visited.insert(url.to_string()) {
                continue;
            }

            tracing::info!("Fetching: {}", url);

            match self.fetch(&url, config).await {
                Ok(Some(page)) => {
                    if let CrawledDocument::WebPage { links, .. } = &page {
                        for link in links {
                            if !config.is_domain_allowed(link) || !config.is_relevant(link) {
                                continue;
                            }
                            let key = link.to_string();
                            if !visited.contains(&key) && queued.insert(key) {
                                queue.push_back(link.clone());
                            }
                        }
                    }

                    match save_document(&page, config).await {
                        Ok(Some(path)) => {
                            tracing::info!("Saved {:?} from {}", path, url);
                            report.saved.push(path);
                        }
                        Ok(None) => {
                            tracing::debug!("Page too short, not saved: {}", url);
                            report.too_short += 1;
                        }
                        Err(e) => {
                            tracing::warn!("Failed to save {}: {:#}", url, e);
                            report.failed += 1;
                        }
                    }
                }
                Ok(None) => report.failed += 1,
                Err(e) => {
                    tracing::warn!("Error processing {}: {:#}", url, e);
                    report.failed += 1;
                }
            }

            report.pages_processed += 1;
            if !config.delay.is_zero() {
                tokio::time::sleep(config.delay).await;
            }
        }

        tracing::info!(
            "Crawl finished: {} pages processed, {} documents saved",
            report.pages_processed,
            report.saved.len()
        );
        Ok(report)
    }

    /// URL 하나 가져오기 (2xx가 아니면 None)
    pub async fn fetch(&self, url: &Url, config: &CrawlConfig) -> Result<Option<CrawledDocument>> {
        let by_path = is_pdf_url(url);
        let timeout = if by_path {
            config.pdf_timeout
        } else {
            config.page_timeout
        };

        let response = self
            .client
            .get(url.clone())
            .timeout(timeout)
            .send()
            .await
            .context("HTTP request failed")?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!("Non-success status {} for {}", status, url);
            return Ok(None);
        }

        let is_pdf = by_path
            || response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.to_ascii_lowercase().starts_with("application/pdf"))
                .unwrap_or(false);

        if is_pdf {
            let bytes = response.bytes().await.context("Failed to read PDF body")?;
            return Ok(Some(CrawledDocument::PdfDocument {
                url: url.clone(),
                bytes: bytes.to_vec(),
            }));
        }

        let body = response.text().await.context("Failed to read response body")?;
        Ok(Some(parse_page(url, &body)))
    }
}

/// HTML 본문을 WebPage로 변환
pub fn parse_page(url: &Url, body: &str) -> CrawledDocument {
    let document = Html::parse_document(body);
    CrawledDocument::WebPage {
        url: url.clone(),
        title: extract_title(&document),
        text: extract_main_text(&document),
        links: extract_links(url, &document),
    }
}

fn is_pdf_url(url: &Url) -> bool {
    url.path().to_ascii_lowercase().ends_with(".pdf")
}

/// 문서 파일로 저장 (짧은 HTML 본문이면 None)
async fn save_document(page: &CrawledDocument, config: &CrawlConfig) -> Result<Option<PathBuf>> {
    match page {
        CrawledDocument::PdfDocument { url, bytes } => {
            let stem = last_segment(url)
                .map(|name| name.trim_end_matches(".pdf").trim_end_matches(".PDF").to_string())
                .unwrap_or_default();
            let path = config.output_dir.join(output_file_name(&stem, "pdf"));
            tokio::fs::write(&path, bytes)
                .await
                .with_context(|| format!("Failed to write {:?}", path))?;
            Ok(Some(path))
        }
        CrawledDocument::WebPage { url, title, text, .. } => {
            if text.chars().count() <= config.min_text_chars {
                return Ok(None);
            }

            let title = title.as_deref().unwrap_or("");
            let base = if title.is_empty() {
                last_segment(url).unwrap_or_default()
            } else {
                title.to_string()
            };
            let path = config.output_dir.join(output_file_name(&base, "txt"));
            write_text_file(&path, title, url, text).await?;
            Ok(Some(path))
        }
    }
}

fn last_segment(url: &Url) -> Option<String> {
    url.path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .map(str::to_string)
}

/// 헤더: 제목 + `=` 밑줄 (제목이 있을 때), `Source: <url>`, 빈 줄
async fn write_text_file(path: &Path, title: &str, url: &Url, text: &str) -> Result<()> {
    let mut content = String::with_capacity(text.len() + title.len() * 2 + 64);
    if !title.is_empty() {
        content.push_str(title);
        content.push('\n');
        content.push_str(&"=".repeat(title.chars().count()));
        content.push('\n');
    }
    content.push_str(SOURCE_HEADER);
    content.push_str(url.as_str());
    content.push_str("\n\n");
    content.push_str(text);

    tokio::fs::write(path, content)
        .await
        .with_context(|| format!("Failed to write {:?}", path))
}

/// 파일 이름에 쓸 수 있는 문자만 남김 (공백은 `_`, 최대 150자)
pub fn sanitize_filename(name: &str) -> String {
    name.trim()
        .replace(' ', "_")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .take(MAX_FILE_STEM)
        .collect()
}

/// `<이름>-<sha256 앞 8자리>.<확장자>`
///
/// 같은 제목/경로는 같은 이름이 되어 다시 크롤링하면 덮어씁니다.
pub fn output_file_name(base: &str, extension: &str) -> String {
    let base = if base.trim().is_empty() { "document" } else { base };
    let hash = format!("{:x}", Sha256::digest(base.as_bytes()));
    let stem = sanitize_filename(base);
    let stem = if stem.is_empty() { "document" } else { stem.as_str() };
    format!("{}-{}.{}", stem, &hash[..8], extension)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename(" Positive Parenting: Tips! "), "Positive_Parenting_Tips");
        assert_eq!(sanitize_filename(&"a".repeat(200)).len(), 150);
        assert_eq!(sanitize_filename("아이"), "");
    }

    #[test]
    fn test_output_file_name_is_stable() {
        let a = output_file_name("Toddler Tantrums", "txt");
        let b = output_file_name("Toddler Tantrums", "txt");
        assert_eq!(a, b);
        assert!(a.starts_with("Toddler_Tantrums-"));
        assert!(a.ends_with(".txt"));
        assert_eq!(a.len(), "Toddler_Tantrums-".len() + 8 + 4);
        assert!(output_file_name("", "pdf").starts_with("document-"));
    }

    #[test]
    fn test_domain_and_keyword_filters() {
        let config = CrawlConfig::default();
        let ok = Url::parse("https://www.cdc.gov/parents/toddlers.html").unwrap();
        let off_topic = Url::parse("https://www.cdc.gov/flu/index.html").unwrap();
        let foreign = Url::parse("https://example.com/parents").unwrap();

        assert!(config.is_domain_allowed(&ok) && config.is_relevant(&ok));
        assert!(!config.is_relevant(&off_topic));
        assert!(!config.is_domain_allowed(&foreign));
    }

    #[test]
    fn test_pdf_detection_by_path() {
        assert!(is_pdf_url(&Url::parse("https://cdc.gov/a/Guide.PDF").unwrap()));
        assert!(!is_pdf_url(&Url::parse("https://cdc.gov/a/pdf-guides").unwrap()));
    }

    /// 경로별 고정 응답을 주는 로컬 HTTP 서버
    async fn spawn_site() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                let mut buf = vec![0u8; 4096];
                let n = socket.read(&mut buf).await.unwrap_or(0);
                let request = String::from_utf8_lossy(&buf[..n]).to_string();
                let path = request.split_whitespace().nth(1).unwrap_or("/").to_string();

                let paragraph = "Toddlers have big feelings and small vocabularies. ".repeat(8);
                let (status, content_type, body) = match path.as_str() {
                    "/parenting" => (
                        "200 OK",
                        "text/html",
                        format!(
                            "<html><head><title>Parenting Hub</title></head><body><main>\
                             <p>{}</p>\
                             <a href=\"/parenting/tantrums#top\">t</a>\
                             <a href=\"/parenting/guide.pdf\">g</a>\
                             <a href=\"/weather\">w</a>\
                             <a href=\"https://elsewhere.example/parenting\">x</a>\
                             </main></body></html>",
                            paragraph
                        ),
                    ),
                    "/parenting/tantrums" => (
                        "200 OK",
                        "text/html",
                        "<html><body><p>Too short.</p></body></html>".to_string(),
                    ),
                    "/parenting/guide.pdf" => {
                        ("200 OK", "application/pdf", "%PDF-1.4 fake".to_string())
                    }
                    _ => ("404 Not Found", "text/plain", "missing".to_string()),
                };

                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    content_type,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_crawl_local_site() {
        let base = spawn_site().await;
        let out = TempDir::new().unwrap();

        let config = CrawlConfig {
            seeds: vec![format!("{}/parenting", base), format!("{}/missing", base)],
            allowed_domains: vec!["127.0.0.1".to_string()],
            delay: Duration::ZERO,
            output_dir: out.path().to_path_buf(),
            ..CrawlConfig::default()
        };

        let report = WebScraper::new().unwrap().crawl(&config).await.unwrap();

        // /parenting, /missing, /parenting/tantrums, /parenting/guide.pdf
        assert_eq!(report.pages_processed, 4);
        assert_eq!(report.saved.len(), 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.too_short, 1);

        let text_path = out.path().join(output_file_name("Parenting Hub", "txt"));
        let saved = std::fs::read_to_string(&text_path).unwrap();
        assert!(saved.starts_with("Parenting Hub\n=============\nSource: http://"));
        assert!(saved.contains("\n\nToddlers have big feelings"));

        let pdf_path = out.path().join(output_file_name("guide", "pdf"));
        assert_eq!(std::fs::read(&pdf_path).unwrap(), b"%PDF-1.4 fake");
    }

    #[tokio::test]
    async fn test_crawl_respects_limits() {
        let base = spawn_site().await;
        let out = TempDir::new().unwrap();

        let config = CrawlConfig {
            seeds: vec![format!("{}/parenting", base)],
            allowed_domains: vec!["127.0.0.1".to_string()],
            max_docs: 1,
            delay: Duration::ZERO,
            output_dir: out.path().to_path_buf(),
            ..CrawlConfig::default()
        };

        let report = WebScraper::new().unwrap().crawl(&config).await.unwrap();
        assert_eq!(report.pages_processed, 1);
        assert_eq!(report.saved.len(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_seed_is_skipped() {
        let out = TempDir::new().unwrap();
        let config = CrawlConfig {
            seeds: vec!["http://127.0.0.1:9/parenting".to_string(), "not a url".to_string()],
            delay: Duration::ZERO,
            output_dir: out.path().to_path_buf(),
            ..CrawlConfig::default()
        };

        let report = WebScraper::new().unwrap().crawl(&config).await.unwrap();
        assert_eq!(report.pages_processed, 1);
        assert_eq!(report.failed, 1);
        assert!(report.saved.is_empty());
    }
}
