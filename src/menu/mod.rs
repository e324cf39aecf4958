//! メニュー読み込み
//!
//! 貼り付けテキスト（1行1項目）か、URLから取得したページをモデルで抽出した一覧。
//! ここでの失敗は実行全体を中止する（分類開始前）。

pub mod html;

use crate::error::{MenuPhotoError, Result};
use crate::gateway::{ClassifierGateway, VisionModel};
use async_trait::async_trait;
use menu_photo_common::{build_menu_extraction_prompt, parse_menu_lines, MenuReference};
use std::time::Duration;
use tracing::{debug, info};

/// メニューの入力元
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuSource {
    Url(String),
    Text(String),
}

impl MenuSource {
    /// 指定された入力から使うものを決める（貼り付けテキストを優先）
    ///
    /// どちらも空なら [`MenuPhotoError::NoMenuSource`]。
    pub fn resolve(url: Option<&str>, text: Option<&str>) -> Result<Self> {
        if let Some(text) = text.filter(|t| !t.trim().is_empty()) {
            return Ok(MenuSource::Text(text.to_string()));
        }
        if let Some(url) = url.map(str::trim).filter(|u| !u.is_empty()) {
            return Ok(MenuSource::Url(url.to_string()));
        }
        Err(MenuPhotoError::NoMenuSource)
    }

    pub fn url(&self) -> Option<&str> {
        match self {
            MenuSource::Url(url) => Some(url),
            MenuSource::Text(_) => None,
        }
    }
}

/// メニューページの取得
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String>;
}

pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("menu-photo-ai/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| MenuPhotoError::MenuUnavailable(format!("HTTPクライアント初期化エラー: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| MenuPhotoError::MenuUnavailable(format!("{}: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(MenuPhotoError::MenuUnavailable(format!("{}: HTTP {}", url, status.as_u16())));
        }

        response
            .text()
            .await
            .map_err(|e| MenuPhotoError::MenuUnavailable(format!("{}: {}", url, e)))
    }
}

/// メニューを読み込んで候補一覧を作る
pub async fn load_menu<M, F>(
    source: &MenuSource,
    fetcher: &F,
    gateway: &ClassifierGateway<M>,
) -> Result<MenuReference>
where
    M: VisionModel,
    F: PageFetcher + ?Sized,
{
    let menu = match source {
        MenuSource::Text(text) => {
            let menu = parse_menu_lines(text);
            if menu.is_empty() {
                return Err(MenuPhotoError::EmptyMenu("貼り付けテキスト".into()));
            }
            menu
        }
        MenuSource::Url(url) => {
            let html = fetcher.fetch(url).await?;
            let page_text = html::visible_text(&html);
            debug!(url = %url, chars = page_text.len(), "fetched menu page");
            if page_text.is_empty() {
                return Err(MenuPhotoError::MenuUnavailable(format!("{}: 本文がありません", url)));
            }

            let reply = gateway
                .generate_text(&build_menu_extraction_prompt(&page_text))
                .await
                .map_err(|e| MenuPhotoError::MenuUnavailable(format!("{}: メニュー抽出に失敗 ({})", url, e)))?;

            let menu = parse_menu_lines(&reply);
            if menu.is_empty() {
                return Err(MenuPhotoError::EmptyMenu(url.clone()));
            }
            menu
        }
    };

    info!(items = menu.len(), "menu loaded");
    Ok(menu)
}
