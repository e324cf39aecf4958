//! 分類ゲートウェイ
//!
//! 外部マルチモーダルモデルへの呼び出しをラップし、
//! レート制限時のリトライと失敗時のフォールバックを担う。
//! 分類（classify）は決して失敗しない。失敗はすべて `Unmatched` に変換する。

mod gemini;

pub use gemini::GeminiModel;

use async_trait::async_trait;
use menu_photo_common::{
    build_classify_prompt, parse_label_reply, Classification, FallbackReason, InputItem,
    MenuReference, FALLBACK_LABEL,
};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// モデルに渡す画像（インライン）
#[derive(Debug, Clone, Copy)]
pub struct InlineImage<'a> {
    pub mime_type: &'static str,
    pub bytes: &'a [u8],
}

impl<'a> InlineImage<'a> {
    /// バイト列からMIMEタイプを判定する。判定できなければJPEG扱い
    pub fn sniff(bytes: &'a [u8]) -> Self {
        let mime_type = image::guess_format(bytes)
            .map(|f| f.to_mime_type())
            .unwrap_or("image/jpeg");
        Self { mime_type, bytes }
    }
}

/// モデルへの1回分のリクエスト
#[derive(Debug, Clone)]
pub struct ModelRequest<'a> {
    pub prompt: String,
    pub image: Option<InlineImage<'a>>,
}

impl<'a> ModelRequest<'a> {
    pub fn text(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            image: None,
        }
    }

    pub fn with_image(prompt: impl Into<String>, image: InlineImage<'a>) -> Self {
        Self {
            prompt: prompt.into(),
            image: Some(image),
        }
    }
}

/// モデルの応答
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelReply {
    Text(String),
    Empty,
}

/// モデル呼び出しの失敗
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("レート制限: {0}")]
    RateLimited(String),

    #[error("通信エラー: {0}")]
    Transport(String),

    #[error("リクエスト拒否: {0}")]
    Rejected(String),

    #[error("不正なレスポンス: {0}")]
    Malformed(String),
}

impl ModelError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ModelError::RateLimited(_) | ModelError::Transport(_))
    }

    pub fn fallback_reason(&self) -> FallbackReason {
        match self {
            ModelError::RateLimited(_) => FallbackReason::RateLimited,
            ModelError::Transport(_) => FallbackReason::Transport,
            ModelError::Rejected(_) => FallbackReason::Rejected,
            ModelError::Malformed(_) => FallbackReason::Malformed,
        }
    }
}

/// 外部マルチモーダルモデル（1回の呼び出し＝1リクエスト）
#[async_trait]
pub trait VisionModel: Send + Sync {
    async fn generate(&self, request: &ModelRequest<'_>) -> Result<ModelReply, ModelError>;
}

/// 画像1枚をラベルに分類する
#[async_trait]
pub trait Classify: Send + Sync {
    async fn classify(&self, item: &InputItem, menu: &MenuReference) -> Classification;
}

#[async_trait]
impl<T: Classify + ?Sized> Classify for &T {
    async fn classify(&self, item: &InputItem, menu: &MenuReference) -> Classification {
        (**self).classify(item, menu).await
    }
}

/// リトライ設定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 最大試行回数（初回を含む）
    pub max_attempts: u32,
    pub rate_limit_cooldown: Duration,
    pub transient_backoff: Duration,
    /// 1回の呼び出しの上限時間。超えたら通信エラー扱い
    pub call_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            rate_limit_cooldown: Duration::from_secs(30),
            transient_backoff: Duration::from_secs(2),
            call_timeout: Duration::from_secs(120),
        }
    }
}

impl RetryPolicy {
    /// 待機なし（テスト用）
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            rate_limit_cooldown: Duration::ZERO,
            transient_backoff: Duration::ZERO,
            call_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    fn delay_for(&self, error: &ModelError) -> Duration {
        match error {
            ModelError::RateLimited(_) => self.rate_limit_cooldown,
            _ => self.transient_backoff,
        }
    }
}

pub struct ClassifierGateway<M> {
    model: M,
    policy: RetryPolicy,
}

impl<M: VisionModel> ClassifierGateway<M> {
    pub fn new(model: M, policy: RetryPolicy) -> Self {
        Self { model, policy }
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// リトライ付きでモデルを呼び出す
    ///
    /// レート制限・通信エラー・タイムアウトは待機して再試行し、上限に達したら最後のエラーを返す。
    /// 拒否・不正レスポンスは再試行しない。
    pub async fn call_with_retry(&self, request: &ModelRequest<'_>) -> Result<ModelReply, ModelError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1u32;
        loop {
            let outcome = match tokio::time::timeout(self.policy.call_timeout, self.model.generate(request)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(ModelError::Transport(format!(
                    "{}秒以内に応答がありません",
                    self.policy.call_timeout.as_secs_f32()
                ))),
            };
            match outcome {
                Ok(reply) => return Ok(reply),
                Err(err) if err.is_retryable() && attempt < max_attempts => {
                    let wait = self.policy.delay_for(&err);
                    warn!(attempt, max_attempts, wait_secs = wait.as_secs(), error = %err, "model call failed, retrying");
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                Err(err) => {
                    debug!(attempt, error = %err, "model call gave up");
                    return Err(err);
                }
            }
        }
    }

    /// テキストのみの呼び出し（メニュー抽出用）。失敗は呼び出し元へ返す
    pub async fn generate_text(&self, prompt: &str) -> Result<String, ModelError> {
        match self.call_with_retry(&ModelRequest::text(prompt)).await? {
            ModelReply::Text(text) => Ok(text),
            ModelReply::Empty => Ok(String::new()),
        }
    }
}

#[async_trait]
impl<M: VisionModel> Classify for ClassifierGateway<M> {
    async fn classify(&self, item: &InputItem, menu: &MenuReference) -> Classification {
        if menu.is_empty() {
            return Classification::fallback(FallbackReason::EmptyMenu);
        }

        let request = ModelRequest::with_image(build_classify_prompt(menu), InlineImage::sniff(&item.bytes));

        let classification = match self.call_with_retry(&request).await {
            Ok(ModelReply::Text(text)) => match parse_label_reply(&text) {
                Some(label) if label.eq_ignore_ascii_case(FALLBACK_LABEL) => {
                    Classification::fallback(FallbackReason::ModelDeclined)
                }
                Some(label) => Classification::matched(label),
                None => Classification::fallback(FallbackReason::EmptyReply),
            },
            Ok(ModelReply::Empty) => Classification::fallback(FallbackReason::EmptyReply),
            Err(err) => {
                warn!(file = %item.file_name, error = %err, "classification failed, using fallback label");
                Classification::fallback(err.fallback_reason())
            }
        };

        debug!(file = %item.file_name, label = %classification.label, "classified");
        classification
    }
}
