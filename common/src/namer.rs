//! 重複解消ネーミング
//!
//! 同じラベルが複数回出現した場合に連番サフィックスを付ける。
//! 1回目はサフィックスなし、2回目以降は `_1`, `_2`, ... とする。
//! 大文字小文字だけが違う名前は同じ名前として扱う（macOS/Windowsで上書きされるため）。

use std::collections::{HashMap, HashSet};

/// 1回の実行内で発行したラベルの出現回数
///
/// 実行ごとに新しく作成し、実行間で共有しない。
/// キーはどちらも小文字化した名前。
#[derive(Debug, Default)]
pub struct NameTracker {
    counts: HashMap<String, usize>,
    issued: HashSet<String>,
}

fn fold(name: &str) -> String {
    name.to_ascii_lowercase()
}

impl NameTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// サニタイズ済みラベルに一意なファイル名（拡張子なし）を割り当てる
    ///
    /// モデルが `Pizza_1` のようなラベルを直接返して既存の名前と衝突する場合は、
    /// 空きが見つかるまで連番を進める。
    pub fn assign(&mut self, sanitized_label: &str) -> String {
        let key = fold(sanitized_label);
        let mut count = self.counts.get(&key).copied().unwrap_or(0);
        let name = loop {
            let candidate = if count == 0 {
                sanitized_label.to_string()
            } else {
                format!("{}_{}", sanitized_label, count)
            };
            if !self.issued.contains(&fold(&candidate)) {
                break candidate;
            }
            count += 1;
        };

        self.counts.insert(key, count + 1);
        self.issued.insert(fold(&name));
        name
    }

    /// ラベルがこれまでに割り当てられた回数（大文字小文字は区別しない）
    pub fn count(&self, sanitized_label: &str) -> usize {
        self.counts.get(&fold(sanitized_label)).copied().unwrap_or(0)
    }

    /// 発行済みの名前の数
    pub fn len(&self) -> usize {
        self.issued.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issued.is_empty()
    }
}
