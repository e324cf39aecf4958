//! 進捗通知
//!
//! 長時間処理（分類・パッケージング）の状況をフロントエンドへ伝える。
//! CLIは indicatif のプログレスバーで実装する。

use crate::orchestrator::RunPhase;
use indicatif::{ProgressBar, ProgressStyle};
use menu_photo_common::OutputRecord;

pub trait ProgressSink {
    /// 開始時に総件数を通知
    fn begin(&mut self, _total: usize) {}

    /// 実行フェーズの遷移
    fn phase(&mut self, _phase: RunPhase) {}

    /// 1件完了。`percent` は 0〜100 で単調非減少
    fn item_done(&mut self, _record: &OutputRecord, _percent: u8) {}

    /// 終了時（成功・失敗どちらでも）
    fn finish(&mut self) {}
}

/// 何もしない進捗通知
pub struct NullProgress;

impl ProgressSink for NullProgress {}

/// ターミナル用プログレスバー（0〜100%）
pub struct TerminalProgress {
    bar: ProgressBar,
}

impl TerminalProgress {
    pub fn new() -> Self {
        let bar = ProgressBar::new(100);
        bar.set_style(
            ProgressStyle::with_template("  {bar:40.cyan/blue} {pos:>3}% {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█▓░"),
        );
        Self { bar }
    }
}

impl Default for TerminalProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for TerminalProgress {
    fn begin(&mut self, total: usize) {
        self.bar.set_position(0);
        self.bar.set_message(format!("0/{}枚", total));
    }

    fn phase(&mut self, phase: RunPhase) {
        if phase == RunPhase::Packaging {
            self.bar.set_message("ZIPを作成中...");
        }
    }

    fn item_done(&mut self, record: &OutputRecord, percent: u8) {
        self.bar.set_position(u64::from(percent));
        self.bar.set_message(format!("{} → {}", record.source_name, record.file_name));
    }

    fn finish(&mut self) {
        self.bar.finish_and_clear();
    }
}
