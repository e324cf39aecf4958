//! プロンプト生成モジュール
//!
//! - build_classify_prompt: 画像1枚をメニュー項目に照合するプロンプト
//! - build_menu_extraction_prompt: Webページ本文からメニュー項目を抜き出すプロンプト

use crate::menu::MenuReference;
use crate::types::FALLBACK_LABEL;

/// メニュー抽出に渡すページ本文の上限（文字数）
pub const MAX_PAGE_CHARS: usize = 30_000;

/// 画像分類プロンプト生成
///
/// モデルにはラベルのみを1行で返させる。確信がない場合は [`FALLBACK_LABEL`]。
pub fn build_classify_prompt(menu: &MenuReference) -> String {
    let menu_text = if menu.is_empty() {
        "(the menu is empty)".to_string()
    } else {
        menu.to_prompt_text()
    };

    format!(
        r#"You are matching a restaurant photo to the restaurant's menu.

## Menu
{menu_text}

## Instructions
- Identify which menu item is shown in the attached photo.
- Return ONLY the exact item name as written in the menu, on a single line.
- Do not add explanations, punctuation, quotes or numbering.
- If you are not sure, or the dish is not on the menu, return {FALLBACK_LABEL}."#
    )
}

/// メニュー抽出プロンプト生成
///
/// ページ本文は [`MAX_PAGE_CHARS`] で切り詰める。
pub fn build_menu_extraction_prompt(page_text: &str) -> String {
    let truncated: String = page_text.chars().take(MAX_PAGE_CHARS).collect();

    format!(
        r#"The following text was scraped from a restaurant web page.
List every dish or drink on the menu.

## Output format
- One item per line: `Item Name - short description`
- Omit the description if there is none.
- No prices, no section headings, no numbering, no extra commentary.
- If the page contains no menu, return nothing.

## Page text
{truncated}"#
    )
}
