//! 分類パイプラインの型定義
//!
//! CLIと他のフロントエンドで共有される型:
//! - InputItem: アップロードされた画像1枚
//! - Classification: 1枚に対する分類結果（必ず1件）
//! - OutputRecord: ステージング領域に書き出した結果ファイル

use serde::{Deserialize, Serialize};
use std::fmt;

/// 分類できなかった画像に付けるラベル
pub const FALLBACK_LABEL: &str = "Unmatched";

/// 入力画像（受け取った後は不変）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputItem {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl InputItem {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
        }
    }

    /// 元ファイル名の拡張子（小文字、jpegはjpgに統一）
    pub fn extension(&self) -> Option<String> {
        let (_, ext) = self.file_name.rsplit_once('.')?;
        if ext.is_empty() {
            return None;
        }
        let ext = ext.to_ascii_lowercase();
        Some(if ext == "jpeg" { "jpg".to_string() } else { ext })
    }
}

/// フォールバックになった理由
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FallbackReason {
    /// 空のレスポンス
    EmptyReply,
    /// 通信エラー・タイムアウト（リトライ上限まで失敗）
    Transport,
    /// レート制限（リトライ上限まで失敗）
    RateLimited,
    /// 解釈できないレスポンス
    Malformed,
    /// APIがリクエストを拒否（認証エラー等）
    Rejected,
    /// メニューが空のため照合しない
    EmptyMenu,
    /// モデル自身が「該当なし」と回答
    ModelDeclined,
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FallbackReason::EmptyReply => write!(f, "空のレスポンス"),
            FallbackReason::Transport => write!(f, "通信エラー"),
            FallbackReason::RateLimited => write!(f, "レート制限"),
            FallbackReason::Malformed => write!(f, "不正なレスポンス"),
            FallbackReason::Rejected => write!(f, "リクエスト拒否"),
            FallbackReason::EmptyMenu => write!(f, "メニューが空"),
            FallbackReason::ModelDeclined => write!(f, "該当なし"),
        }
    }
}

/// 照合結果の区分
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "reason")]
pub enum MatchOutcome {
    Matched,
    Fallback(FallbackReason),
}

impl MatchOutcome {
    pub fn is_matched(&self) -> bool {
        matches!(self, MatchOutcome::Matched)
    }
}

/// 1枚の画像に対する分類結果
///
/// `label` はサニタイズ前の値。フォールバック時は [`FALLBACK_LABEL`]。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub label: String,
    pub outcome: MatchOutcome,
}

impl Classification {
    pub fn matched(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            outcome: MatchOutcome::Matched,
        }
    }

    pub fn fallback(reason: FallbackReason) -> Self {
        Self {
            label: FALLBACK_LABEL.to_string(),
            outcome: MatchOutcome::Fallback(reason),
        }
    }
}

/// ステージング領域に書き出した結果ファイル
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputRecord {
    /// 元のファイル名
    pub source_name: String,
    /// モデルが返したラベル（サニタイズ前）
    pub label: String,
    /// 重複解消後のファイル名（拡張子なし）
    pub stem: String,
    /// 出力ファイル名
    pub file_name: String,
    pub outcome: MatchOutcome,
}
