//! バッチ処理オーケストレータ
//!
//! 入力画像を順番に 分類 → サニタイズ → 重複解消 → ステージング書き出し → 進捗通知 し、
//! 最後にアーカイブを作る。入力1件につき必ず出力1件。
//!
//! ステージング領域と NameTracker は実行ごとに新規作成し、
//! 成功・失敗・中断どの経路でも呼び出し元に戻る前に削除される。

use crate::archive::ArchiveBuilder;
use crate::error::{MenuPhotoError, Result};
use crate::gateway::{ClassifierGateway, Classify, VisionModel};
use crate::menu::{load_menu, MenuSource, PageFetcher};
use crate::progress::ProgressSink;
use menu_photo_common::{sanitize, InputItem, MenuReference, NameTracker, OutputRecord, ProgressCounter};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 入力画像の供給元（中身はバッチ処理時に読み込む）
pub trait ItemSource {
    fn name(&self) -> &str;
    fn load(&self) -> Result<InputItem>;

    /// 分類開始前の読み込み可否チェック（中身は読まない）
    fn ensure_readable(&self) -> Result<()> {
        Ok(())
    }
}

impl ItemSource for InputItem {
    fn name(&self) -> &str {
        &self.file_name
    }

    fn load(&self) -> Result<InputItem> {
        Ok(self.clone())
    }
}

/// 実行フェーズ
///
/// `Idle → Extracting → Classifying → Packaging → Done`。
/// `Failed` へは `Extracting` からのみ遷移する（分類中の失敗はフォールバックで吸収）。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    Extracting,
    Classifying,
    Packaging,
    Done,
    Failed,
}

impl RunPhase {
    pub fn can_transition_to(self, next: RunPhase) -> bool {
        matches!(
            (self, next),
            (RunPhase::Idle, RunPhase::Extracting)
                // メニュー取得済みで直接分類を始める場合
                | (RunPhase::Idle, RunPhase::Classifying)
                | (RunPhase::Extracting, RunPhase::Classifying)
                | (RunPhase::Extracting, RunPhase::Failed)
                | (RunPhase::Classifying, RunPhase::Packaging)
                | (RunPhase::Packaging, RunPhase::Done)
        )
    }
}

/// 中断フラグ（アイテム間でチェックする）
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    /// 一度に読み込む枚数（メモリ上限のため。出力には影響しない）
    pub batch_size: usize,
    /// 元の拡張子を保持する（既定は常に .jpg）
    pub keep_extension: bool,
    /// ステージング領域を作る親ディレクトリ（省略時はシステムの一時ディレクトリ）
    pub staging_root: Option<PathBuf>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            batch_size: 5,
            keep_extension: false,
            staging_root: None,
        }
    }
}

/// 1回の実行結果。完成したアーカイブは呼び出し元が保持する
#[derive(Debug, Clone)]
pub struct RunResult {
    /// 入力順の出力ファイル
    pub outputs: Vec<OutputRecord>,
    /// 通知した進捗値（単調非減少、最後は100）
    pub progress: Vec<u8>,
    /// アーカイブのバイト列
    pub archive: Vec<u8>,
}

impl RunResult {
    pub fn matched_count(&self) -> usize {
        self.outputs.iter().filter(|o| o.outcome.is_matched()).count()
    }

    pub fn fallback_count(&self) -> usize {
        self.outputs.len() - self.matched_count()
    }
}

pub struct Orchestrator {
    options: RunOptions,
    cancel: Option<CancelFlag>,
}

impl Orchestrator {
    pub fn new(options: RunOptions) -> Self {
        Self {
            options,
            cancel: None,
        }
    }

    pub fn with_cancel(mut self, flag: CancelFlag) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// 分類からアーカイブ生成までを実行（メニュー取得済み）
    ///
    /// 読めない入力があれば分類を始める前に失敗する。
    pub async fn run<S, C, A, P>(
        &self,
        items: &[S],
        menu: &MenuReference,
        classifier: &C,
        archive: &A,
        progress: &mut P,
    ) -> Result<RunResult>
    where
        S: ItemSource,
        C: Classify + ?Sized,
        A: ArchiveBuilder + ?Sized,
        P: ProgressSink + ?Sized,
    {
        self.run_from(RunPhase::Idle, items, menu, classifier, archive, progress).await
    }

    async fn run_from<S, C, A, P>(
        &self,
        from: RunPhase,
        items: &[S],
        menu: &MenuReference,
        classifier: &C,
        archive: &A,
        progress: &mut P,
    ) -> Result<RunResult>
    where
        S: ItemSource,
        C: Classify + ?Sized,
        A: ArchiveBuilder + ?Sized,
        P: ProgressSink + ?Sized,
    {
        let result = self.run_inner(from, items, menu, classifier, archive, progress).await;
        progress.finish();
        result
    }

    async fn run_inner<S, C, A, P>(
        &self,
        from: RunPhase,
        items: &[S],
        menu: &MenuReference,
        classifier: &C,
        archive: &A,
        progress: &mut P,
    ) -> Result<RunResult>
    where
        S: ItemSource,
        C: Classify + ?Sized,
        A: ArchiveBuilder + ?Sized,
        P: ProgressSink + ?Sized,
    {
        if let Err(e) = verify_items(items) {
            if from.can_transition_to(RunPhase::Failed) {
                enter_phase(progress, from, RunPhase::Failed);
            }
            return Err(e);
        }

        // ドロップ時に削除される（エラー・中断を含む全経路）
        let staging = {
            let mut builder = tempfile::Builder::new();
            builder.prefix("menu-photo-");
            match &self.options.staging_root {
                Some(root) => builder.tempdir_in(root)?,
                None => builder.tempdir()?,
            }
        };
        debug!(staging = %staging.path().display(), "created staging area");

        let mut tracker = NameTracker::new();
        let mut counter = ProgressCounter::new(items.len());
        let mut outputs = Vec::with_capacity(items.len());
        let mut progress_values = Vec::with_capacity(items.len() + 1);

        progress.begin(items.len());
        enter_phase(progress, from, RunPhase::Classifying);
        info!(total = items.len(), menu_items = menu.len(), "classification started");

        let batch_size = self.options.batch_size.max(1);
        for (batch_idx, batch) in items.chunks(batch_size).enumerate() {
            debug!(batch = batch_idx + 1, size = batch.len(), "loading batch");
            // チェック後に消えたファイルのみここで失敗する
            let loaded = batch.iter().map(ItemSource::load).collect::<Result<Vec<_>>>()?;

            for item in loaded {
                self.check_cancelled()?;

                let classification = classifier.classify(&item, menu).await;
                let stem = tracker.assign(&sanitize(&classification.label));
                let file_name = format!("{}.{}", stem, self.extension_for(&item));

                std::fs::write(staging.path().join(&file_name), &item.bytes)?;

                let record = OutputRecord {
                    source_name: item.file_name,
                    label: classification.label,
                    stem,
                    file_name,
                    outcome: classification.outcome,
                };

                let percent = counter.advance();
                progress_values.push(percent);
                progress.item_done(&record, percent);
                outputs.push(record);
            }
        }

        if items.is_empty() {
            progress_values.push(counter.percent());
        }

        enter_phase(progress, RunPhase::Classifying, RunPhase::Packaging);
        let archive_bytes = archive.build(staging.path(), &outputs)?;

        if let Err(e) = staging.close() {
            warn!(error = %e, "failed to remove staging area");
        }

        enter_phase(progress, RunPhase::Packaging, RunPhase::Done);
        info!(outputs = outputs.len(), archive_bytes = archive_bytes.len(), "run finished");

        Ok(RunResult {
            outputs,
            progress: progress_values,
            archive: archive_bytes,
        })
    }

    fn check_cancelled(&self) -> Result<()> {
        match &self.cancel {
            Some(flag) if flag.is_cancelled() => {
                warn!("run cancelled, discarding staging area");
                Err(MenuPhotoError::Cancelled)
            }
            _ => Ok(()),
        }
    }

    fn extension_for(&self, item: &InputItem) -> String {
        if self.options.keep_extension {
            item.extension().unwrap_or_else(|| "jpg".to_string())
        } else {
            "jpg".to_string()
        }
    }
}

/// すべての入力が読めることを確認する
fn verify_items<S: ItemSource>(items: &[S]) -> Result<()> {
    for item in items {
        if let Err(e) = item.ensure_readable() {
            warn!(file = item.name(), error = %e, "unreadable input, aborting before classification");
            return Err(e);
        }
    }
    Ok(())
}

fn enter_phase<P: ProgressSink + ?Sized>(progress: &mut P, from: RunPhase, to: RunPhase) {
    debug_assert!(from.can_transition_to(to), "invalid phase transition {:?} -> {:?}", from, to);
    debug!(?from, ?to, "phase");
    progress.phase(to);
}

/// メニュー読み込みから実行完了まで
///
/// メニューが読めない場合や読めない入力がある場合は、分類を始めずに失敗する（出力なし）。
#[allow(clippy::too_many_arguments)]
pub async fn run_pipeline<S, M, F, C, A, P>(
    orchestrator: &Orchestrator,
    source: &MenuSource,
    fetcher: &F,
    gateway: &ClassifierGateway<M>,
    classifier: &C,
    items: &[S],
    archive: &A,
    progress: &mut P,
) -> Result<(MenuReference, RunResult)>
where
    S: ItemSource,
    M: VisionModel,
    F: PageFetcher + ?Sized,
    C: Classify + ?Sized,
    A: ArchiveBuilder + ?Sized,
    P: ProgressSink + ?Sized,
{
    enter_phase(progress, RunPhase::Idle, RunPhase::Extracting);

    let menu = match load_menu(source, fetcher, gateway).await {
        Ok(menu) => menu,
        Err(e) => {
            enter_phase(progress, RunPhase::Extracting, RunPhase::Failed);
            progress.finish();
            return Err(e);
        }
    };

    let result = orchestrator
        .run_from(RunPhase::Extracting, items, &menu, classifier, archive, progress)
        .await?;
    Ok((menu, result))
}
