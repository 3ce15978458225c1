//! HTML 파싱 헬퍼 - 제목, 본문, 링크 추출

use scraper::{ElementRef, Html, Selector};
use url::Url;

/// 본문 컨테이너 우선순위
const CONTAINER_SELECTORS: &[&str] = &[
    "article",
    "main",
    "[role=main]",
    ".content",
    "#content",
    "body",
];

/// 문단으로 취급하는 요소
const PARAGRAPH_SELECTOR: &str = "p, li, h1, h2, h3, h4";

/// 컨테이너 채택 최소 길이 (미달이면 다음 후보)
const MIN_CONTAINER_CHARS: usize = 100;

/// 제목 추출 (<title>, 없으면 첫 <h1>)
pub fn extract_title(document: &Html) -> Option<String> {
    ["title", "h1"].iter().find_map(|tag| {
        let selector = Selector::parse(tag).ok()?;
        let element = document.select(&selector).next()?;
        let title = collapse_whitespace(&element.text().collect::<Vec<_>>().join(" "));
        (!title.is_empty()).then_some(title)
    })
}

/// 본문 추출
///
/// 우선순위 컨테이너 중 충분한 텍스트가 있는 첫 요소에서
/// 문단/목록/소제목 텍스트를 빈 줄로 이어 반환합니다.
pub fn extract_main_text(document: &Html) -> String {
    let Ok(paragraphs) = Selector::parse(PARAGRAPH_SELECTOR) else {
        return String::new();
    };

    let mut fallback = String::new();

    for selector_str in CONTAINER_SELECTORS {
        let Ok(selector) = Selector::parse(selector_str) else {
            continue;
        };
        let Some(container) = document.select(&selector).next() else {
            continue;
        };

        let text = paragraph_text(&container, &paragraphs);
        if text.chars().count() > MIN_CONTAINER_CHARS {
            return text;
        }
        if fallback.is_empty() {
            fallback = text;
        }
    }

    fallback
}

fn paragraph_text(container: &ElementRef<'_>, paragraphs: &Selector) -> String {
    container
        .select(paragraphs)
        .map(|el| collapse_whitespace(&el.text().collect::<Vec<_>>().join(" ")))
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// 페이지의 링크를 절대 URL로 (프래그먼트 제거, 순서 유지 중복 제거)
///
/// `#`, `javascript:`, `mailto:` 링크와 http(s)가 아닌 링크는 제외합니다.
pub fn extract_links(base: &Url, document: &Html) -> Vec<Url> {
    let Ok(selector) = Selector::parse("a[href]") else {
        return Vec::new();
    };

    let mut links: Vec<Url> = Vec::new();

    for element in document.select(&selector) {
        let Some(href) = element.value().attr("href").map(str::trim) else {
            continue;
        };
        let lower = href.to_ascii_lowercase();
        if href.is_empty()
            || href.starts_with('#')
            || lower.starts_with("javascript:")
            || lower.starts_with("mailto:")
        {
            continue;
        }

        let Ok(mut link) = base.join(href) else {
            continue;
        };
        if !matches!(link.scheme(), "http" | "https") {
            continue;
        }
        link.set_fragment(None);

        if !links.contains(&link) {
            links.push(link);
        }
    }

    links
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_title() {
        let html = Html::parse_document(
            "<html><head><title> Positive  Parenting Tips </title></head><body><h1>H</h1></body></html>",
        );
        assert_eq!(extract_title(&html), Some("Positive Parenting Tips".to_string()));
    }

    #[test]
    fn test_extract_title_h1_fallback() {
        let html = Html::parse_document(
            "<html><head><title></title></head><body><h1>Toddler Sleep</h1></body></html>",
        );
        assert_eq!(extract_title(&html), Some("Toddler Sleep".to_string()));
    }

    #[test]
    fn test_extract_main_text_prefers_article() {
        let html = Html::parse_document(
            r#"<html><body>
                <nav><ul><li>Home</li><li>About</li></ul></nav>
                <article>
                    <h2>Tantrums</h2>
                    <p>Tantrums are a normal part of toddler development and usually fade.</p>
                    <p>Stay   calm, name the feeling,
                       and hold the limit you set.</p>
                </article>
                <footer><p>Footer</p></footer>
            </body></html>"#,
        );

        let text = extract_main_text(&html);
        assert!(text.starts_with("Tantrums\n\nTantrums are a normal part"));
        assert!(text.contains("Stay calm, name the feeling, and hold the limit you set."));
        assert!(!text.contains("Home"));
        assert!(!text.contains("Footer"));
    }

    #[test]
    fn test_extract_main_text_falls_back_to_short_body() {
        let html = Html::parse_document("<html><body><p>Short page.</p></body></html>");
        assert_eq!(extract_main_text(&html), "Short page.");
    }

    #[test]
    fn test_extract_links() {
        let base = Url::parse("https://www.cdc.gov/parents/index.html").unwrap();
        let html = Html::parse_document(
            r##"<body>
                <a href="/parents/toddlers.html#sleep">a</a>
                <a href="toddlers.html">dup</a>
                <a href="#top">skip</a>
                <a href="javascript:void(0)">skip</a>
                <a href="mailto:info@cdc.gov">skip</a>
                <a href="ftp://cdc.gov/file">skip</a>
                <a href="https://www.unicef.org/parenting">b</a>
            </body>"##,
        );

        let links: Vec<String> = extract_links(&base, &html)
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(
            links,
            vec![
                "https://www.cdc.gov/parents/toddlers.html",
                "https://www.unicef.org/parenting",
            ]
        );
    }
}
