use crate::error::{MenuPhotoError, Result};
use crate::gateway::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_key: Option<String>,
    pub model: String,
    pub api_base: String,
    pub default_batch_size: usize,
    pub timeout_seconds: u64,
    /// 1枚あたりの最大試行回数
    pub max_attempts: u32,
    /// レート制限時の待機秒数
    pub rate_limit_cooldown_seconds: u64,
    /// 通信エラー時の待機秒数
    pub transient_backoff_seconds: u64,
    pub log_level: String,
    /// ステージング領域の親ディレクトリ（省略時はシステムの一時ディレクトリ）
    pub staging_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "gemini-2.0-flash".into(),
            api_base: "https://generativelanguage.googleapis.com/v1beta".into(),
            default_batch_size: 5,
            timeout_seconds: 120,
            max_attempts: 3,
            rate_limit_cooldown_seconds: 30,
            transient_backoff_seconds: 2,
            log_level: "info".into(),
            staging_dir: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config = serde_json::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| MenuPhotoError::Config("ホームディレクトリが見つかりません".into()))?;
        Ok(home.join(".config").join("menu-photo-ai").join("config.json"))
    }

    pub fn validate(&self) -> Result<()> {
        if self.default_batch_size == 0 {
            return Err(MenuPhotoError::Config("default_batch_size は1以上にしてください".into()));
        }
        if self.max_attempts == 0 {
            return Err(MenuPhotoError::Config("max_attempts は1以上にしてください".into()));
        }
        if self.model.trim().is_empty() {
            return Err(MenuPhotoError::Config("model が空です".into()));
        }
        Ok(())
    }

    pub fn get_api_key(&self) -> Result<String> {
        // 環境変数を優先
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.trim().is_empty() {
                return Ok(key);
            }
        }

        self.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or(MenuPhotoError::MissingApiKey)
    }

    pub fn set_api_key(&mut self, key: String) -> Result<()> {
        self.api_key = Some(key);
        self.save()
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            rate_limit_cooldown: Duration::from_secs(self.rate_limit_cooldown_seconds),
            transient_backoff: Duration::from_secs(self.transient_backoff_seconds),
            call_timeout: self.request_timeout(),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}
