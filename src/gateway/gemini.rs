//! Gemini API連携
//!
//! generateContent エンドポイントへ画像（inline_data）とプロンプトを送る。

use super::{ModelError, ModelReply, ModelRequest, VisionModel};
use crate::config::Config;
use crate::error::{MenuPhotoError, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

/// Gemini APIリクエスト
#[derive(Serialize)]
struct GeminiRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part {
    Text { text: String },
    InlineData { inline_data: InlineData },
}

#[derive(Serialize)]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f32,
}

/// Gemini APIレスポンス（候補が無い・ブロックされた場合も受け付ける）
#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<ResponseContent>,
}

#[derive(Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

pub struct GeminiModel {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl GeminiModel {
    pub fn new(config: &Config, api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| MenuPhotoError::ApiCall(format!("HTTPクライアント初期化エラー: {}", e)))?;

        let endpoint = format!(
            "{}/models/{}:generateContent",
            config.api_base.trim_end_matches('/'),
            config.model
        );

        Ok(Self {
            client,
            endpoint,
            api_key,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl VisionModel for GeminiModel {
    async fn generate(&self, request: &ModelRequest<'_>) -> std::result::Result<ModelReply, ModelError> {
        let body = build_request_body(request);

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ModelError::Transport(e.without_url().to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ModelError::Transport(e.without_url().to_string()))?;

        interpret_response(status, &text)
    }
}

fn build_request_body(request: &ModelRequest<'_>) -> GeminiRequest {
    let mut parts = vec![Part::Text {
        text: request.prompt.clone(),
    }];

    if let Some(image) = &request.image {
        parts.push(Part::InlineData {
            inline_data: InlineData {
                mime_type: image.mime_type.to_string(),
                data: general_purpose::STANDARD.encode(image.bytes),
            },
        });
    }

    GeminiRequest {
        contents: vec![Content { parts }],
        generation_config: GenerationConfig { temperature: 0.1 },
    }
}

/// HTTPステータスと本文をモデル応答に変換
fn interpret_response(status: StatusCode, body: &str) -> std::result::Result<ModelReply, ModelError> {
    // 成功応答の本文はモデル出力なので判定に使わない
    let quota_error = !status.is_success() && body.contains("RESOURCE_EXHAUSTED");
    if status == StatusCode::TOO_MANY_REQUESTS || quota_error {
        return Err(ModelError::RateLimited(format!("HTTP {}", status.as_u16())));
    }

    if status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT {
        return Err(ModelError::Transport(format!("HTTP {}", status.as_u16())));
    }

    if !status.is_success() {
        let preview: String = body.chars().take(200).collect();
        return Err(ModelError::Rejected(format!("HTTP {}: {}", status.as_u16(), preview)));
    }

    let response: GeminiResponse =
        serde_json::from_str(body).map_err(|e| ModelError::Malformed(e.to_string()))?;

    let text: String = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        Ok(ModelReply::Empty)
    } else {
        Ok(ModelReply::Text(text))
    }
}
