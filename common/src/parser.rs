//! モデル応答パーサー
//!
//! - parse_label_reply: 分類応答からラベル1行を取り出す
//! - parse_menu_lines: 貼り付けテキスト／抽出応答をメニュー項目に分解する

use crate::menu::{MenuItem, MenuReference};
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;

lazy_static! {
    /// 先頭の "Label:" "Answer:" などの前置き
    static ref CHATTER_PREFIX: Regex =
        Regex::new(r"(?i)^(?:label|answer|dish|item|menu item|result)\s*:\s*").unwrap();
    /// 箇条書き記号・番号
    static ref BULLET: Regex = Regex::new(r"^(?:[-*•·]+|\d+[.)])\s*").unwrap();
    /// 行末の価格（通貨記号付き、または小数2桁）
    static ref TRAILING_PRICE: Regex =
        Regex::new(r"\s*(?:[$€£¥]\s*\d+(?:[.,]\d{1,2})?|\d+[.,]\d{2}\s*[$€£¥]?)\s*$").unwrap();
    /// 項目名と説明の区切り
    static ref DESCRIPTION_SEP: Regex = Regex::new(r"\s+[-–—]\s+|:\s+").unwrap();
}

/// 分類応答からラベルを取り出す
///
/// 最初の空でない行を採用し、前後の空白・引用符・強調記号・前置きを除く。
/// ラベルが得られない場合は `None`。
///
/// # Examples
/// ```
/// use menu_photo_common::parse_label_reply;
///
/// assert_eq!(parse_label_reply("Margherita Pizza \n").as_deref(), Some("Margherita Pizza"));
/// assert_eq!(parse_label_reply("  \n"), None);
/// ```
pub fn parse_label_reply(reply: &str) -> Option<String> {
    let line = reply
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty() && !l.starts_with("```"))?;

    let line = CHATTER_PREFIX.replace(line, "");
    let label = line
        .trim()
        .trim_matches(|c: char| matches!(c, '"' | '\'' | '`' | '*' | '“' | '”'))
        .trim();

    if label.is_empty() {
        None
    } else {
        Some(label.to_string())
    }
}

/// テキストをメニュー項目に分解する（1行1項目）
///
/// 箇条書き記号・番号・行末の価格を除き、`名前 - 説明` を分割する。
/// 見出し（`#`）とコードフェンスは無視し、同名項目（大文字小文字無視）は最初のみ残す。
pub fn parse_menu_lines(text: &str) -> MenuReference {
    let mut seen = HashSet::new();
    let mut items = Vec::new();

    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with("```") {
            continue;
        }

        let line = BULLET.replace(line, "");
        let line = TRAILING_PRICE.replace(line.trim(), "");
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let item = match DESCRIPTION_SEP.find(line) {
            Some(m) if m.start() > 0 => {
                let name = line[..m.start()].trim();
                let desc = line[m.end()..].trim();
                if desc.is_empty() {
                    MenuItem::new(name)
                } else {
                    MenuItem::with_description(name, desc)
                }
            }
            _ => MenuItem::new(line.trim_end_matches(':').trim()),
        };

        let name = item
            .name
            .trim_matches(|c: char| matches!(c, '*' | '"' | '`'))
            .trim()
            .to_string();
        if name.is_empty() {
            continue;
        }
        let item = MenuItem { name, description: item.description };

        if seen.insert(item.name.to_lowercase()) {
            items.push(item);
        }
    }

    MenuReference::new(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    // =============================================
    // parse_label_reply テスト
    // =============================================

    #[test]
    fn test_label_trims_whitespace() {
        assert_eq!(parse_label_reply("Margherita Pizza ").as_deref(), Some("Margherita Pizza"));
        assert_eq!(parse_label_reply("\n\n  Caesar Salad\n").as_deref(), Some("Caesar Salad"));
    }

    #[test]
    fn test_label_first_line_only() {
        let reply = "Pad Thai\nThis photo shows noodles with shrimp.";
        assert_eq!(parse_label_reply(reply).as_deref(), Some("Pad Thai"));
    }

    #[test]
    fn test_label_strips_chatter() {
        assert_eq!(parse_label_reply("Label: \"Tiramisu\"").as_deref(), Some("Tiramisu"));
        assert_eq!(parse_label_reply("**Green Curry**").as_deref(), Some("Green Curry"));
        assert_eq!(parse_label_reply("```\nRamen\n```").as_deref(), Some("Ramen"));
    }

    #[test]
    fn test_label_empty() {
        assert_eq!(parse_label_reply(""), None);
        assert_eq!(parse_label_reply("   \n\t"), None);
        assert_eq!(parse_label_reply("\"\""), None);
    }

    #[test]
    fn test_label_not_validated_against_menu() {
        // メニュー外のラベルもそのまま返す
        assert_eq!(parse_label_reply("Unicorn Steak").as_deref(), Some("Unicorn Steak"));
    }

    // =============================================
    // parse_menu_lines テスト
    // =============================================

    #[test]
    fn test_menu_lines_plain() {
        let menu = parse_menu_lines("Margherita Pizza\nCaesar Salad\n\nTiramisu\n");
        let names: Vec<&str> = menu.names().collect();
        assert_eq!(names, vec!["Margherita Pizza", "Caesar Salad", "Tiramisu"]);
    }

    #[test]
    fn test_menu_lines_bullets_and_prices() {
        let text = "- Pad Thai $12.99\n* Green Curry 11.50\n3. Spring Rolls €6\n4) Mango Sticky Rice";
        let menu = parse_menu_lines(text);
        let names: Vec<&str> = menu.names().collect();
        assert_eq!(names, vec!["Pad Thai", "Green Curry", "Spring Rolls", "Mango Sticky Rice"]);
    }

    #[test]
    fn test_menu_lines_descriptions() {
        let menu = parse_menu_lines("Caesar Salad - romaine, parmesan, croutons\nBurger: beef patty\nHot-Dog");
        assert_eq!(menu.items()[0].name, "Caesar Salad");
        assert_eq!(menu.items()[0].description.as_deref(), Some("romaine, parmesan, croutons"));
        assert_eq!(menu.items()[1].name, "Burger");
        assert_eq!(menu.items()[1].description.as_deref(), Some("beef patty"));
        assert_eq!(menu.items()[2].name, "Hot-Dog");
        assert_eq!(menu.items()[2].description, None);
    }

    #[test]
    fn test_menu_lines_skip_headings_and_duplicates() {
        let text = "# Starters\n```\nSoup\nsoup\n## Mains\nSteak\n```";
        let menu = parse_menu_lines(text);
        let names: Vec<&str> = menu.names().collect();
        assert_eq!(names, vec!["Soup", "Steak"]);
    }

    #[test]
    fn test_menu_lines_empty() {
        assert!(parse_menu_lines("").is_empty());
        assert!(parse_menu_lines("\n  \n$5.00\n").is_empty());
    }
}
