//! 프롬프트 조립

use crate::knowledge::SearchResult;

/// 출처 블록 하나에 넣는 최대 문자 수
pub const MAX_SOURCE_CHARS: usize = 1000;

/// 검색 결과를 출처 블록으로 (빈 줄로 구분)
///
/// 각 블록: `[ID: <id>] (source: <source>)` 다음 줄에 본문 앞 1000자
pub fn format_sources(results: &[SearchResult]) -> String {
    results
        .iter()
        .map(|r| {
            format!(
                "[ID: {}] (source: {})\n{}",
                r.id,
                r.source,
                truncate_chars(&r.text, MAX_SOURCE_CHARS)
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// 템플릿의 `{question}`, `{sources}` 치환
pub fn build_prompt(template: &str, question: &str, results: &[SearchResult]) -> String {
    // 질문 안의 "{sources}"가 다시 치환되지 않도록 sources 먼저
    template
        .replace("{sources}", &format_sources(results))
        .replacen("{question}", question, 1)
}

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_PROMPT_TEMPLATE;
    use crate::knowledge::DocumentKind;

    fn result(id: &str, text: &str) -> SearchResult {
        SearchResult {
            id: id.to_string(),
            source: "tips.txt".to_string(),
            kind: DocumentKind::Text,
            title: None,
            chunk_index: 0,
            text: text.to_string(),
            similarity: 0.9,
        }
    }

    #[test]
    fn test_build_prompt() {
        let prompt = build_prompt(
            DEFAULT_PROMPT_TEMPLATE,
            "How do I handle tantrums?",
            &[result("a1", "Stay calm."), result("b2", "Set limits.")],
        );

        assert!(prompt.starts_with("You are a parenting assistant expert."));
        assert!(prompt.contains("Question: How do I handle tantrums?\n\nSources:\n"));
        assert!(prompt.contains(
            "[ID: a1] (source: tips.txt)\nStay calm.\n\n[ID: b2] (source: tips.txt)\nSet limits."
        ));
        assert!(prompt.ends_with("\n\nAnswer:"));
    }

    #[test]
    fn test_source_text_truncated_on_char_boundary() {
        let long = "가".repeat(1500);
        let block = format_sources(&[result("x", &long)]);
        let body = block.split_once('\n').unwrap().1;
        assert_eq!(body.chars().count(), MAX_SOURCE_CHARS);
    }

    #[test]
    fn test_question_with_braces_not_expanded() {
        let prompt = build_prompt("Q: {question}\nS: {sources}", "what is {sources}?", &[]);
        assert_eq!(prompt, "Q: what is {sources}?\nS: ");
    }
}
