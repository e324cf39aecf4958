//! ファイル名サニタイズ
//!
//! モデルが返したラベルを、どのファイルシステムでも安全な識別子
//! （英数字とアンダースコアのみ）に変換する。

use crate::types::FALLBACK_LABEL;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref DISALLOWED_RUN: Regex = Regex::new(r"[^A-Za-z0-9_]+").unwrap();
}

/// URLが無い（貼り付けメニュー）場合のブランド名
pub const DEFAULT_BRAND: &str = "Custom_Restaurant";

/// ラベルをファイル名に使える識別子へ変換
///
/// 許可されない文字の連続は1つの `_` に置換し、前後の `_` を除去する。
/// 入力にもともとある `_` はそのまま残す。
/// 結果が空なら [`FALLBACK_LABEL`] を返す。失敗せず、冪等。
///
/// # Examples
/// ```
/// use menu_photo_common::sanitize;
///
/// assert_eq!(sanitize("Margherita Pizza "), "Margherita_Pizza");
/// assert_eq!(sanitize("!!!@@@"), "Unmatched");
/// ```
pub fn sanitize(raw: &str) -> String {
    let replaced = DISALLOWED_RUN.replace_all(raw, "_");
    let trimmed = replaced.trim_matches('_');
    if trimmed.is_empty() {
        FALLBACK_LABEL.to_string()
    } else {
        trimmed.to_string()
    }
}

/// メニューURLからアーカイブ名のブランド部分を作る
///
/// `https://www.joes-pizza.com/menu` → `Joes_pizza`
pub fn brand_name(url: Option<&str>) -> String {
    let Some(url) = url.map(str::trim).filter(|u| !u.is_empty()) else {
        return DEFAULT_BRAND.to_string();
    };

    let without_scheme = url.split_once("://").map(|(_, rest)| rest).unwrap_or(url);
    let host = without_scheme
        .split(|c| matches!(c, '/' | ':' | '?' | '#'))
        .next()
        .unwrap_or_default();
    let host = host.rsplit('@').next().unwrap_or(host);
    let host = host.strip_prefix("www.").unwrap_or(host);
    let first = host.split('.').next().unwrap_or_default();

    let mut chars = first.chars();
    let capitalized: String = match chars.next() {
        Some(c) => c.to_uppercase().chain(chars).collect(),
        None => return DEFAULT_BRAND.to_string(),
    };

    let brand = sanitize(&capitalized);
    if brand == FALLBACK_LABEL {
        DEFAULT_BRAND.to_string()
    } else {
        brand
    }
}
