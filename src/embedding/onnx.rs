//! ONNX 로컬 임베딩
//!
//! HF sentence-transformers 모델의 ONNX export를 받아 mean pooling + L2 정규화로
//! 문장 벡터를 만듭니다. 모델 파일은 최초 1회 다운로드 후 캐시합니다.
//! ref: https://huggingface.co/sentence-transformers/all-MiniLM-L6-v2

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;
use serde::Deserialize;
use tokenizers::{Tokenizer, TruncationParams};

use super::{EmbeddingProvider, TokenizerSplitter};
use crate::config::Settings;
use crate::knowledge::TokenSplitter;

/// HF 파일 다운로드 URL
const HF_RESOLVE_URL: &str = "https://huggingface.co";

/// 모델 최대 입력 길이 (word piece)
const MAX_SEQUENCE_LENGTH: usize = 256;

/// [CLS], [SEP]
const SPECIAL_TOKENS: usize = 2;

/// 배치 크기
const BATCH_SIZE: usize = 32;

/// 모델 config.json 중 필요한 부분
#[derive(Debug, Deserialize)]
struct ModelConfig {
    hidden_size: usize,
}

/// ONNX Runtime 임베딩 구현체
pub struct OnnxEmbedding {
    model: String,
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    splitter: TokenizerSplitter,
    dimension: usize,
}

impl std::fmt::Debug for OnnxEmbedding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxEmbedding")
            .field("model", &self.model)
            .field("dimension", &self.dimension)
            .finish()
    }
}

impl OnnxEmbedding {
    /// 설정의 모델을 로드 (캐시에 없으면 다운로드)
    pub async fn from_settings(settings: &Settings) -> Result<Self> {
        let model_dir = settings.model_dir();
        tokio::fs::create_dir_all(&model_dir)
            .await
            .with_context(|| format!("Failed to create model cache {:?}", model_dir))?;

        let files = [
            ("onnx/model.onnx", "model.onnx"),
            ("tokenizer.json", "tokenizer.json"),
            ("config.json", "config.json"),
        ];

        let mut client = None;
        for (remote, local) in files {
            let path = model_dir.join(local);
            if path.exists() {
                continue;
            }
            let client = match client.as_ref() {
                Some(c) => c,
                None => client.insert(download_client()?),
            };
            download_file(
                client,
                &settings.embedding_model,
                remote,
                &path,
                settings.hf_token.as_deref(),
            )
            .await?;
        }

        Self::load(&settings.embedding_model, &model_dir)
    }

    /// 캐시 디렉토리에서 로드
    ///
    /// `model.onnx`, `tokenizer.json`, `config.json`이 있어야 합니다.
    pub fn load(model: &str, model_dir: &Path) -> Result<Self> {
        tracing::info!("Loading embedding model {} from {:?}", model, model_dir);

        let config_text = std::fs::read_to_string(model_dir.join("config.json"))
            .context("Failed to read model config.json")?;
        let config: ModelConfig =
            serde_json::from_str(&config_text).context("Failed to parse model config.json")?;

        let session = Session::builder()
            .map_err(|e| anyhow::anyhow!("Failed to create session builder: {}", e))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| anyhow::anyhow!("Failed to set optimization level: {}", e))?
            .with_intra_threads(1)
            .map_err(|e| anyhow::anyhow!("Failed to set threads: {}", e))?
            .commit_from_file(model_dir.join("model.onnx"))
            .map_err(|e| anyhow::anyhow!("Failed to load ONNX model: {}", e))?;

        let mut tokenizer = Tokenizer::from_file(model_dir.join("tokenizer.json"))
            .map_err(|e| anyhow::anyhow!("Failed to load tokenizer: {}", e))?;
        let splitter = TokenizerSplitter::new(tokenizer.clone())?;
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: MAX_SEQUENCE_LENGTH,
                ..Default::default()
            }))
            .map_err(|e| anyhow::anyhow!("Failed to configure truncation: {}", e))?;

        Ok(Self {
            model: model.to_string(),
            session: Mutex::new(session),
            tokenizer,
            splitter,
            dimension: config.hidden_size,
        })
    }

    /// 한 배치 추론 (mean pooling + L2 정규화)
    fn encode(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let batch_size = texts.len();

        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| anyhow::anyhow!("Tokenization failed: {}", e))?;

        for (text, encoding) in texts.iter().zip(&encodings) {
            if !encoding.get_overflowing().is_empty() {
                tracing::warn!(
                    "Input truncated to {} tokens before embedding: {:.60}",
                    MAX_SEQUENCE_LENGTH,
                    text
                );
            }
        }

        let max_len = encodings
            .iter()
            .map(|e| e.get_ids().len())
            .max()
            .unwrap_or(0)
            .min(MAX_SEQUENCE_LENGTH);

        let mut input_ids = vec![0i64; batch_size * max_len];
        let mut attention_mask = vec![0i64; batch_size * max_len];
        let mut token_type_ids = vec![0i64; batch_size * max_len];

        for (i, encoding) in encodings.iter().enumerate() {
            let ids = encoding.get_ids();
            let mask = encoding.get_attention_mask();
            let types = encoding.get_type_ids();

            for j in 0..ids.len().min(max_len) {
                input_ids[i * max_len + j] = ids[j] as i64;
                attention_mask[i * max_len + j] = mask[j] as i64;
                token_type_ids[i * max_len + j] = types[j] as i64;
            }
        }

        let shape = vec![batch_size, max_len];
        let input_ids_tensor = Tensor::from_array((shape.clone(), input_ids.into_boxed_slice()))
            .map_err(|e| anyhow::anyhow!("Input tensor creation failed: {}", e))?;
        let attention_mask_tensor =
            Tensor::from_array((shape.clone(), attention_mask.clone().into_boxed_slice()))
                .map_err(|e| anyhow::anyhow!("Attention mask tensor creation failed: {}", e))?;
        let token_type_ids_tensor =
            Tensor::from_array((shape, token_type_ids.into_boxed_slice()))
                .map_err(|e| anyhow::anyhow!("Token type tensor creation failed: {}", e))?;

        let inputs = vec![
            ("input_ids", input_ids_tensor.into_dyn()),
            ("attention_mask", attention_mask_tensor.into_dyn()),
            ("token_type_ids", token_type_ids_tensor.into_dyn()),
        ];

        let mut session = self
            .session
            .lock()
            .map_err(|e| anyhow::anyhow!("Session lock error: {}", e))?;
        let outputs = session
            .run(inputs)
            .map_err(|e| anyhow::anyhow!("Inference failed: {}", e))?;

        let output_iter: Vec<_> = outputs.iter().collect();
        let output = output_iter
            .iter()
            .find(|(name, _)| *name == "last_hidden_state")
            .or_else(|| output_iter.first())
            .map(|(_, v)| v)
            .ok_or_else(|| anyhow::anyhow!("No output tensor"))?;

        let (tensor_shape, tensor_data) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| anyhow::anyhow!("Failed to extract tensor: {}", e))?;

        let dims: Vec<usize> = tensor_shape.iter().map(|&d| d as usize).collect();
        let hidden_size = dims.get(2).copied().unwrap_or(self.dimension);
        if hidden_size != self.dimension {
            anyhow::bail!(
                "Model produced {}-dimensional vectors, expected {}",
                hidden_size,
                self.dimension
            );
        }

        let mut embeddings = Vec::with_capacity(batch_size);
        for i in 0..batch_size {
            let mut sum = vec![0.0f32; hidden_size];
            let mut count = 0.0f32;

            for j in 0..max_len {
                let mask_val = attention_mask[i * max_len + j] as f32;
                if mask_val > 0.0 {
                    let offset = i * max_len * hidden_size + j * hidden_size;
                    for (k, value) in sum.iter_mut().enumerate() {
                        if let Some(x) = tensor_data.get(offset + k) {
                            *value += x * mask_val;
                        }
                    }
                    count += mask_val;
                }
            }

            if count > 0.0 {
                sum.iter_mut().for_each(|v| *v /= count);
            }
            embeddings.push(l2_normalize(sum));
        }

        Ok(embeddings)
    }
}

#[async_trait]
impl EmbeddingProvider for OnnxEmbedding {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());

        for (i, batch) in texts.chunks(BATCH_SIZE).enumerate() {
            tracing::debug!("Embedding batch {} ({} texts)", i + 1, batch.len());
            let refs: Vec<&str> = batch.iter().map(String::as_str).collect();
            results.extend(self.encode(&refs)?);
        }

        Ok(results)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        &self.model
    }

    fn token_splitter(&self) -> Option<Box<dyn TokenSplitter>> {
        Some(Box::new(self.splitter.clone()))
    }

    fn max_input_tokens(&self) -> Option<usize> {
        Some(MAX_SEQUENCE_LENGTH - SPECIAL_TOKENS)
    }
}

/// L2 정규화 (영벡터는 그대로)
fn l2_normalize(mut v: Vec<f32>) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
    v
}

fn download_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("parenting-rag/", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(300))
        .build()
        .context("Failed to create HTTP client")
}

/// HF 허브에서 파일 하나 다운로드
async fn download_file(
    client: &reqwest::Client,
    repo: &str,
    remote: &str,
    path: &Path,
    hf_token: Option<&str>,
) -> Result<()> {
    let url = format!("{}/{}/resolve/main/{}", HF_RESOLVE_URL, repo, remote);
    tracing::info!("Downloading {}", url);

    let mut request = client.get(&url);
    if let Some(token) = hf_token {
        request = request.bearer_auth(token);
    }

    let response = request
        .send()
        .await
        .with_context(|| format!("Failed to download {}", url))?;

    if !response.status().is_success() {
        anyhow::bail!("Download of {} failed: HTTP {}", url, response.status());
    }

    let bytes = response
        .bytes()
        .await
        .with_context(|| format!("Failed to read {}", url))?;

    // 중간에 끊긴 파일이 캐시로 남지 않도록 임시 파일 후 rename
    let tmp = path.with_extension("part");
    tokio::fs::write(&tmp, &bytes)
        .await
        .with_context(|| format!("Failed to write {:?}", tmp))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("Failed to move {:?} into place", path))?;

    tracing::info!("Saved {:?} ({} bytes)", path, bytes.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_l2_normalize() {
        let v = l2_normalize(vec![3.0, 4.0]);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
        assert_eq!(l2_normalize(vec![0.0, 0.0]), vec![0.0, 0.0]);
    }

    #[test]
    fn test_model_config_parse() {
        let config: ModelConfig =
            serde_json::from_str(r#"{"hidden_size": 384, "model_type": "bert"}"#).unwrap();
        assert_eq!(config.hidden_size, 384);
    }

    #[test]
    fn test_load_missing_dir_fails() {
        let dir = tempfile::TempDir::new().unwrap();
        let result = OnnxEmbedding::load("x/y", dir.path());
        assert!(result.is_err());
    }
}
