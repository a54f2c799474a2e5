// src/gemini.rs

use crate::config::GeminiConfig;
use crate::credential::Credential;
use crate::error::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

/// A single outbound call made with one key.
///
/// Failures are plain text; the pool only inspects the message to decide
/// whether to rotate.
#[async_trait]
pub trait RemoteCall: Send + Sync {
    type Request: Sync;
    type Response: Send;

    async fn call(
        &self,
        credential: &Credential,
        request: &Self::Request,
    ) -> std::result::Result<Self::Response, String>;
}

/// Text prompt for `generateContent`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateRequest {
    pub prompt: String,
    /// Overrides the configured model for this request.
    pub model: Option<String>,
}

impl GenerateRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

/// Text produced by the first candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateResponse {
    pub text: String,
    pub model: String,
}

#[derive(Serialize)]
struct WirePart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct WireContent<'a> {
    parts: Vec<WirePart<'a>>,
}

#[derive(Serialize)]
struct WireRequest<'a> {
    contents: Vec<WireContent<'a>>,
}

#[derive(Deserialize, Default)]
struct WireResponse {
    #[serde(default)]
    candidates: Vec<WireCandidate>,
}

#[derive(Deserialize)]
struct WireCandidate {
    content: Option<WireCandidateContent>,
}

#[derive(Deserialize)]
struct WireCandidateContent {
    #[serde(default)]
    parts: Vec<WireCandidatePart>,
}

#[derive(Deserialize)]
struct WireCandidatePart {
    text: Option<String>,
}

/// Failure message for a 2xx body that does not decode.
pub const MALFORMED_RESPONSE: &str = "Malformed generateContent response";

/// Gemini `generateContent` client authenticated with the key it is handed.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    client: Client,
    base_url: String,
    model: String,
}

impl GeminiClient {
    pub fn new(config: &GeminiConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        info!(base_url = %config.base_url, model = %config.model, "Gemini client created");
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, model)
    }
}

#[async_trait]
impl RemoteCall for GeminiClient {
    type Request = GenerateRequest;
    type Response = GenerateResponse;

    async fn call(
        &self,
        credential: &Credential,
        request: &GenerateRequest,
    ) -> std::result::Result<GenerateResponse, String> {
        let model = request.model.as_deref().unwrap_or(&self.model);
        let body = WireRequest {
            contents: vec![WireContent {
                parts: vec![WirePart {
                    text: &request.prompt,
                }],
            }],
        };

        debug!(api_key.preview = %credential.preview(), model, "Sending generateContent request");
        let response = self
            .client
            .post(self.endpoint(model))
            .header("x-goog-api-key", credential.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        let text = response.text().await.map_err(|e| e.to_string())?;

        if !status.is_success() {
            warn!(status = %status, api_key.preview = %credential.preview(), "Upstream returned an error");
            return Err(format!("{status}: {text}"));
        }

        // serde's wording ("invalid type", ...) would read as a key problem to the classifier.
        let parsed: WireResponse = serde_json::from_str(&text).map_err(|e| {
            warn!(error = %e, api_key.preview = %credential.preview(), "Could not decode generateContent response");
            MALFORMED_RESPONSE.to_string()
        })?;
        let text = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<String>()
            })
            .unwrap_or_default();

        Ok(GenerateResponse {
            text,
            model: model.to_string(),
        })
    }
}
