//! OpenAI 호환 chat completions 클라이언트 (OpenRouter)
//!
//! 재시도 없이 한 번만 호출합니다. 실패 처리는 호출하는 쪽에서 합니다.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

use crate::config::LlmSettings;

/// 답변 생성 클라이언트
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// 프롬프트 하나를 보내고 응답 텍스트를 받음
    async fn complete(&self, prompt: &str) -> Result<String>;

    /// 모델 이름
    fn model(&self) -> &str;
}

/// OpenRouter (OpenAI 호환) 클라이언트
pub struct OpenRouterClient {
    api_key: String,
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl OpenRouterClient {
    pub fn new(api_key: String, settings: &LlmSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .context("failed to build chat HTTP client")?;

        Ok(Self {
            api_key,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            client,
        })
    }

    /// 설정에 API 키가 있을 때만 생성
    pub fn from_settings(settings: &LlmSettings) -> Result<Option<Self>> {
        match &settings.api_key {
            Some(key) => Self::new(key.clone(), settings).map(Some),
            None => Ok(None),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl ChatClient for OpenRouterClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {}", self.api_key.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth).context("invalid OpenRouter API key")?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        let resp = self
            .client
            .post(self.endpoint())
            .headers(headers)
            .json(&body)
            .send()
            .await
            .context("failed to call chat completions")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            bail!("chat completions returned {}: {}", status, text);
        }

        let parsed: ChatResponse = resp
            .json()
            .await
            .context("failed to parse chat completions response")?;

        let answer = parsed
            .choices
            .into_iter()
            .find_map(|choice| choice.message.content.or(choice.text))
            .map(|content| content.trim().to_string())
            .unwrap_or_default();

        if answer.is_empty() {
            bail!("chat completions returned an empty answer");
        }
        Ok(answer)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    #[serde(default)]
    message: AssistantMessage,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// 고정 응답 하나를 주는 로컬 서버
    async fn serve_once(status: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = vec![0u8; 16 * 1024];
                let _ = socket.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });
        format!("http://{}/api/v1/", addr)
    }

    fn settings(base_url: String) -> LlmSettings {
        LlmSettings {
            api_key: Some("test-key".to_string()),
            base_url,
            model: "openrouter/auto".to_string(),
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_no_key_no_client() {
        let settings = LlmSettings::default();
        assert!(OpenRouterClient::from_settings(&settings).unwrap().is_none());
    }

    #[test]
    fn test_endpoint_trims_slash() {
        let client =
            OpenRouterClient::new("k".to_string(), &settings("https://x.test/v1/".to_string()))
                .unwrap();
        assert_eq!(client.endpoint(), "https://x.test/v1/chat/completions");
    }

    #[test]
    fn test_parse_response_shapes() {
        let parsed: ChatResponse = serde_json::from_str(
            r#"{"id":"x","choices":[{"message":{"role":"assistant","content":"Stay calm."}}]}"#,
        )
        .unwrap();
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some("Stay calm."));

        let legacy: ChatResponse =
            serde_json::from_str(r#"{"choices":[{"text":"Set limits."}]}"#).unwrap();
        assert_eq!(legacy.choices[0].text.as_deref(), Some("Set limits."));
    }

    #[tokio::test]
    async fn test_complete_success() {
        let base = serve_once(
            "200 OK",
            r#"{"choices":[{"message":{"content":"  Name the feeling.  "}}]}"#,
        )
        .await;
        let client = OpenRouterClient::from_settings(&settings(base)).unwrap().unwrap();
        assert_eq!(client.complete("q").await.unwrap(), "Name the feeling.");
    }

    #[tokio::test]
    async fn test_complete_unauthorized() {
        let base = serve_once("401 Unauthorized", r#"{"error":{"message":"bad key"}}"#).await;
        let client = OpenRouterClient::from_settings(&settings(base)).unwrap().unwrap();
        let err = client.complete("q").await.unwrap_err();
        assert!(err.to_string().contains("401"));
    }

    #[tokio::test]
    async fn test_complete_empty_answer_is_error() {
        let base = serve_once("200 OK", r#"{"choices":[]}"#).await;
        let client = OpenRouterClient::from_settings(&settings(base)).unwrap().unwrap();
        assert!(client.complete("q").await.is_err());
    }
}
