//! 分類結果キャッシュモジュール
//!
//! 画像のSHA-256とメニュー指紋をキーにしてラベルをキャッシュし、
//! 同じ画像・同じメニューの再分類をスキップする。

use crate::error::Result;
use crate::gateway::Classify;
use async_trait::async_trait;
use menu_photo_common::{Classification, InputItem, MenuReference};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

const CACHE_FILE_NAME: &str = ".menu-photo-cache.json";

/// キャッシュファイルの構造
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheFile {
    /// バージョン（互換性チェック用）
    version: u32,
    /// キャッシュキー → 分類結果のマップ
    entries: HashMap<String, CacheEntry>,
}

/// キャッシュエントリ
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// ファイル名
    pub file_name: String,
    /// ファイルサイズ
    pub file_size: u64,
    /// 照合したラベル（サニタイズ前）
    pub label: String,
}

impl CacheFile {
    const CURRENT_VERSION: u32 = 1;

    pub fn cache_path(folder: &Path) -> PathBuf {
        folder.join(CACHE_FILE_NAME)
    }

    /// キャッシュファイルを読み込み（無い・壊れている場合は空）
    pub fn load(folder: &Path) -> Self {
        let cache_path = Self::cache_path(folder);
        if !cache_path.exists() {
            return Self::default();
        }

        let file = match File::open(&cache_path) {
            Ok(f) => f,
            Err(_) => return Self::default(),
        };

        let reader = BufReader::new(file);
        match serde_json::from_reader::<_, CacheFile>(reader) {
            Ok(cache) if cache.version == Self::CURRENT_VERSION => cache,
            Ok(_) => {
                warn!("キャッシュバージョン不一致、再生成します");
                Self::default()
            }
            Err(e) => {
                warn!(error = %e, "キャッシュファイルが壊れています、再生成します");
                Self::default()
            }
        }
    }

    /// キャッシュファイルを保存
    pub fn save(&self, folder: &Path) -> Result<()> {
        let file = File::create(Self::cache_path(folder))?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    /// キャッシュファイルを削除。削除した場合は true
    pub fn clear(folder: &Path) -> Result<bool> {
        let cache_path = Self::cache_path(folder);
        if cache_path.exists() {
            std::fs::remove_file(cache_path)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// キャッシュをルックアップ
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(|e| e.label.as_str())
    }

    /// キャッシュに追加
    pub fn insert(&mut self, key: String, file_name: String, file_size: u64, label: String) {
        self.entries.insert(key, CacheEntry {
            file_name,
            file_size,
            label,
        });
    }

    /// キャッシュ件数
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for CacheFile {
    fn default() -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            entries: HashMap::new(),
        }
    }
}

/// 画像バイト列とメニューからキャッシュキーを作る
pub fn cache_key(bytes: &[u8], menu: &MenuReference) -> String {
    let digest = hex::encode(Sha256::digest(bytes));
    format!("{}-{}", digest, menu.fingerprint())
}

/// キャッシュ付き分類器
///
/// 照合できた結果（Matched）のみ保存する。フォールバックは次回再試行する。
pub struct CachedClassifier<C> {
    inner: C,
    cache: Mutex<CacheFile>,
    hits: Mutex<usize>,
}

impl<C: Classify> CachedClassifier<C> {
    pub fn new(inner: C, cache: CacheFile) -> Self {
        Self {
            inner,
            cache: Mutex::new(cache),
            hits: Mutex::new(0),
        }
    }

    pub fn hits(&self) -> usize {
        self.hits.lock().map(|h| *h).unwrap_or(0)
    }

    pub fn into_cache(self) -> CacheFile {
        self.cache.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl<C: Classify> Classify for CachedClassifier<C> {
    async fn classify(&self, item: &InputItem, menu: &MenuReference) -> Classification {
        let key = cache_key(&item.bytes, menu);

        let cached = self
            .cache
            .lock()
            .ok()
            .and_then(|cache| cache.get(&key).map(str::to_string));
        if let Some(label) = cached {
            debug!(file = %item.file_name, label = %label, "cache hit");
            if let Ok(mut hits) = self.hits.lock() {
                *hits += 1;
            }
            return Classification::matched(label);
        }

        let result = self.inner.classify(item, menu).await;

        if result.outcome.is_matched() {
            if let Ok(mut cache) = self.cache.lock() {
                cache.insert(key, item.file_name.clone(), item.bytes.len() as u64, result.label.clone());
            }
        }

        result
    }
}
