//! HTMLから表示テキストを取り出す

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref HIDDEN_BLOCK: Regex =
        Regex::new(r"(?is)<(script|style|noscript|svg|template)\b.*?</(?:script|style|noscript|svg|template)\s*>|<!--.*?-->").unwrap();
    static ref BLOCK_TAG: Regex =
        Regex::new(r"(?i)<\s*/?\s*(?:br|p|div|li|ul|ol|h[1-6]|tr|td|th|section|article|header|footer|table|dt|dd)\b[^>]*>").unwrap();
    static ref ANY_TAG: Regex = Regex::new(r"(?s)<[^>]*>").unwrap();
    static ref NUMERIC_ENTITY: Regex = Regex::new(r"&#(x[0-9a-fA-F]+|[0-9]+);").unwrap();
}

/// ページの表示テキストを1行ずつ返す（空行は除く）
pub fn visible_text(html: &str) -> String {
    let text = HIDDEN_BLOCK.replace_all(html, " ");
    let text = BLOCK_TAG.replace_all(&text, "\n");
    let text = ANY_TAG.replace_all(&text, " ");
    let text = decode_entities(&text);

    text.lines()
        .map(normalize_ws)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn decode_entities(s: &str) -> String {
    let s = NUMERIC_ENTITY.replace_all(s, |caps: &regex::Captures| {
        let code = &caps[1];
        let value = match code.strip_prefix('x') {
            Some(hex) => u32::from_str_radix(hex, 16).ok(),
            None => code.parse::<u32>().ok(),
        };
        value
            .and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_default()
    });

    s.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

fn normalize_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
