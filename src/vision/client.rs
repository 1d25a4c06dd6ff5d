/// Vision model client
///
/// One call per (image, prompt) pair against Ollama's `/api/generate`.
/// The reqwest client is built once and reused for every image; each request
/// carries its own prompt and image, so no state leaks between calls.

use super::preprocess::ImagePayload;
use crate::config::Configuration;
use crate::error::InferenceError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Anything that can answer a prompt about an image
#[async_trait]
pub trait VisionModel: Send + Sync {
    async fn complete(&self, prompt: &str, image: &ImagePayload) -> Result<String, InferenceError>;
}

#[async_trait]
impl<T: VisionModel + ?Sized> VisionModel for &T {
    async fn complete(&self, prompt: &str, image: &ImagePayload) -> Result<String, InferenceError> {
        (**self).complete(prompt, image).await
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    images: [&'a str; 1],
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: Option<String>,
    error: Option<String>,
}

/// Ollama HTTP backend
#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: reqwest::Client,
    model: String,
    base_url: String,
}

impl OllamaClient {
    pub fn new(config: &Configuration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Self {
            client,
            model: config.model.clone(),
            base_url: config.base_url.clone(),
        })
    }

    fn api_path(&self, api_path: &str) -> String {
        if api_path.starts_with('/') {
            format!("{}{}", self.base_url, api_path)
        } else {
            format!("{}/{}", self.base_url, api_path)
        }
    }
}

#[async_trait]
impl VisionModel for OllamaClient {
    async fn complete(&self, prompt: &str, image: &ImagePayload) -> Result<String, InferenceError> {
        let url = self.api_path("/api/generate");
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            images: [image.as_base64()],
            stream: false,
            // Tags should be reproducible, not creative
            options: GenerateOptions { temperature: 0.0 },
        };

        let transport = |source| InferenceError::Transport {
            url: url.clone(),
            source,
        };

        let resp = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(transport)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(InferenceError::Status(status.as_u16()));
        }

        let body = resp.bytes().await.map_err(transport)?;
        let parsed: GenerateResponse =
            serde_json::from_slice(&body).map_err(|e| InferenceError::Malformed(e.to_string()))?;

        match (parsed.response, parsed.error) {
            (Some(text), _) => Ok(text),
            (None, Some(error)) => Err(InferenceError::Malformed(error)),
            (None, None) => Err(InferenceError::Malformed(
                "missing `response` field".to_string(),
            )),
        }
    }
}
