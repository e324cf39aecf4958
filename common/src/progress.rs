//! 進捗率の計算
//!
//! バッチ番号からではなく処理済み件数から算出するので、
//! 値は単調非減少で必ず 0〜100 に収まる。

/// 処理済み件数カウンタ
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressCounter {
    processed: usize,
    total: usize,
}

impl ProgressCounter {
    pub fn new(total: usize) -> Self {
        Self { processed: 0, total }
    }

    /// 1件完了。totalを超えては進まない
    pub fn advance(&mut self) -> u8 {
        if self.processed < self.total {
            self.processed += 1;
        }
        self.percent()
    }

    /// 進捗率 [0, 100]。0件の実行は完了扱いで100
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        let pct = self.processed.saturating_mul(100) / self.total;
        pct.min(100) as u8
    }

    pub fn processed(&self) -> usize {
        self.processed
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn is_complete(&self) -> bool {
        self.processed >= self.total
    }
}
