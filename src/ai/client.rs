use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use thiserror::Error;
use tracing::debug;

use super::dto::{
    Content, ErrorEnvelope, GenerateContentRequest, GenerateContentResponse, InlineData, Part,
};
use crate::config::AiConfig;

#[derive(Debug, Error)]
pub enum AiError {
    #[error("model {0} not found")]
    ModelNotFound(String),

    #[error("provider answered {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("provider request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("provider returned no text")]
    EmptyResponse,

    #[error("no candidate model configured")]
    NoModels,

    #[error("every candidate model was unavailable")]
    Exhausted,
}

impl AiError {
    /// Only a missing model lets the fallback loop move on.
    pub fn is_model_not_found(&self) -> bool {
        matches!(self, Self::ModelNotFound(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    pub mime_type: String,
    pub data: String,
}

impl InlineImage {
    /// Accepts raw base64 or a `data:<mime>;base64,` URL. The payload itself
    /// is not validated.
    pub fn from_client_payload(payload: &str) -> Self {
        if let Some(rest) = payload.strip_prefix("data:") {
            if let Some((mime, data)) = rest.split_once(";base64,") {
                let mime_type = if mime.is_empty() { DEFAULT_MIME } else { mime };
                return Self { mime_type: mime_type.to_string(), data: data.to_string() };
            }
        }
        Self { mime_type: DEFAULT_MIME.to_string(), data: payload.to_string() }
    }
}

const DEFAULT_MIME: &str = "image/png";

#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub prompt: String,
    pub image: Option<InlineImage>,
}

#[async_trait]
pub trait GenerativeClient: Send + Sync {
    async fn generate(&self, model: &str, request: &GenerateRequest) -> Result<String, AiError>;
}

/// Client for the Generative Language `generateContent` endpoint.
pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(config: &AiConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl GenerativeClient for GeminiClient {
    async fn generate(&self, model: &str, request: &GenerateRequest) -> Result<String, AiError> {
        let mut parts = vec![Part::Text { text: &request.prompt }];
        if let Some(image) = &request.image {
            parts.push(Part::InlineData {
                inline_data: InlineData { mime_type: &image.mime_type, data: &image.data },
            });
        }
        let body = GenerateContentRequest { contents: vec![Content { parts }] };

        let url = format!("{}/models/{}:generateContent", self.base_url, model);
        let res = self
            .http
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(classify_failure(model, status, text));
        }

        let parsed: GenerateContentResponse = res.json().await?;
        debug!(model, candidates = parsed.candidates.len(), "generateContent ok");
        parsed
            .first_text()
            .map(str::to_string)
            .ok_or(AiError::EmptyResponse)
    }
}

/// Upstream errors carry the provider's message when the body is its error
/// envelope, else the raw body.
pub(crate) fn classify_failure(model: &str, status: StatusCode, body: String) -> AiError {
    let envelope = serde_json::from_str::<ErrorEnvelope>(&body).ok();
    let provider_status = envelope.as_ref().map(|e| e.error.status.as_str());
    if status == StatusCode::NOT_FOUND || provider_status == Some("NOT_FOUND") {
        return AiError::ModelNotFound(model.to_string());
    }
    let body = match envelope {
        Some(e) if !e.error.message.is_empty() => e.error.message,
        _ => body,
    };
    AiError::Upstream { status: status.as_u16(), body }
}
