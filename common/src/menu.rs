//! メニュー参照テーブル
//!
//! 1回の実行の間は読み取り専用。空でもよい（その場合分類は常にフォールバック）。

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// メニュー項目
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuItem {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl MenuItem {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
        }
    }

    pub fn with_description(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: Some(description.into()),
        }
    }
}

/// 候補となるメニュー項目の一覧
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuReference {
    items: Vec<MenuItem>,
}

impl MenuReference {
    pub fn new(items: Vec<MenuItem>) -> Self {
        Self { items }
    }

    pub fn items(&self) -> &[MenuItem] {
        &self.items
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(|i| i.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// プロンプトに埋め込むテキスト表現（1行1項目）
    pub fn to_prompt_text(&self) -> String {
        self.items
            .iter()
            .map(|item| match &item.description {
                Some(desc) => format!("- {}: {}", item.name, desc),
                None => format!("- {}", item.name),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// キャッシュキー用のメニュー指紋（SHA-256の先頭16桁）
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for item in &self.items {
            hasher.update(item.name.as_bytes());
            hasher.update([0x1f]);
            if let Some(desc) = &item.description {
                hasher.update(desc.as_bytes());
            }
            hasher.update([0x1e]);
        }
        let digest = hex::encode(hasher.finalize());
        digest[..16].to_string()
    }
}

impl FromIterator<MenuItem> for MenuReference {
    fn from_iter<T: IntoIterator<Item = MenuItem>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
