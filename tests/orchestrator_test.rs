//! オーケストレータ統合テスト
//!
//! 分類 → 命名 → ステージング → ZIP の一連の流れを
//! スクリプト化した分類器で検証

use async_trait::async_trait;
use menu_photo_ai::archive::{ArchiveBuilder, ZipArchiveBuilder};
use menu_photo_ai::error::{MenuPhotoError, Result};
use menu_photo_ai::gateway::{ClassifierGateway, Classify, ModelError, ModelReply, ModelRequest, RetryPolicy, VisionModel};
use menu_photo_ai::orchestrator::{CancelFlag, ItemSource, Orchestrator, RunOptions, RunPhase};
use menu_photo_ai::progress::{NullProgress, ProgressSink};
use menu_photo_common::{
    Classification, FallbackReason, InputItem, MatchOutcome, MenuItem, MenuReference, OutputRecord,
};
use std::collections::{HashMap, VecDeque};
use std::io::{Cursor, Read};
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use tempfile::{tempdir, TempDir};

fn menu() -> MenuReference {
    MenuReference::new(vec![
        MenuItem::new("Margherita Pizza"),
        MenuItem::new("Caesar Salad"),
        MenuItem::new("Tiramisu"),
    ])
}

fn photo(name: &str, seed: u8) -> InputItem {
    InputItem::new(name, vec![0xFF, 0xD8, 0xFF, seed, seed, seed])
}

fn options_in(root: &TempDir, batch_size: usize) -> RunOptions {
    RunOptions {
        batch_size,
        staging_root: Some(root.path().to_path_buf()),
        ..RunOptions::default()
    }
}

fn is_empty_dir(path: &Path) -> bool {
    std::fs::read_dir(path).map(|mut d| d.next().is_none()).unwrap_or(false)
}

/// ZIPの中身を (名前, バイト列) の順序付きリストで取り出す
fn zip_entries(bytes: &[u8]) -> Vec<(String, Vec<u8>)> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).expect("ZIPとして読めない");
    (0..archive.len())
        .map(|i| {
            let mut file = archive.by_index(i).unwrap();
            let mut buf = Vec::new();
            file.read_to_end(&mut buf).unwrap();
            (file.name().to_string(), buf)
        })
        .collect()
}

fn stems(outputs: &[OutputRecord]) -> Vec<&str> {
    outputs.iter().map(|o| o.stem.as_str()).collect()
}

/// 決められたラベルを順に返す分類器（尽きたらフォールバック）
struct ScriptedClassifier {
    labels: Mutex<VecDeque<Classification>>,
}

impl ScriptedClassifier {
    fn matching(labels: &[&str]) -> Self {
        Self {
            labels: Mutex::new(labels.iter().map(|l| Classification::matched(*l)).collect()),
        }
    }
}

#[async_trait]
impl Classify for ScriptedClassifier {
    async fn classify(&self, _item: &InputItem, _menu: &MenuReference) -> Classification {
        self.labels
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Classification::fallback(FallbackReason::EmptyReply))
    }
}

/// ファイル名でラベルを決める分類器（呼び出し順に依存しない）
struct ByNameClassifier(HashMap<String, String>);

#[async_trait]
impl Classify for ByNameClassifier {
    async fn classify(&self, item: &InputItem, _menu: &MenuReference) -> Classification {
        match self.0.get(&item.file_name) {
            Some(label) => Classification::matched(label.clone()),
            None => Classification::fallback(FallbackReason::ModelDeclined),
        }
    }
}

/// n件目の分類後に中断フラグを立てる分類器
struct CancelAfter {
    flag: CancelFlag,
    after: u32,
    calls: AtomicU32,
}

#[async_trait]
impl Classify for CancelAfter {
    async fn classify(&self, _item: &InputItem, _menu: &MenuReference) -> Classification {
        if self.calls.fetch_add(1, Ordering::SeqCst) + 1 >= self.after {
            self.flag.cancel();
        }
        Classification::matched("Tiramisu")
    }
}

/// 常にレート制限を返すモデル
struct ThrottledModel {
    calls: AtomicU32,
}

#[async_trait]
impl VisionModel for ThrottledModel {
    async fn generate(&self, _request: &ModelRequest<'_>) -> std::result::Result<ModelReply, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ModelError::RateLimited("429 Too Many Requests".into()))
    }
}

struct FailingArchive;

impl ArchiveBuilder for FailingArchive {
    fn build(&self, _staging_dir: &Path, _outputs: &[OutputRecord]) -> Result<Vec<u8>> {
        Err(MenuPhotoError::FileNotFound("staging".into()))
    }
}

/// 読み込みに失敗しうる入力
enum TestItem {
    Ready(InputItem),
    /// 最初から読めない
    Broken(String),
    /// チェック後に消える
    Vanishing(String),
}

impl ItemSource for TestItem {
    fn name(&self) -> &str {
        match self {
            TestItem::Ready(item) => &item.file_name,
            TestItem::Broken(name) | TestItem::Vanishing(name) => name,
        }
    }

    fn load(&self) -> Result<InputItem> {
        match self {
            TestItem::Ready(item) => Ok(item.clone()),
            TestItem::Broken(name) | TestItem::Vanishing(name) => Err(MenuPhotoError::ImageLoad(name.clone())),
        }
    }

    fn ensure_readable(&self) -> Result<()> {
        match self {
            TestItem::Broken(name) => Err(MenuPhotoError::ImageLoad(name.clone())),
            _ => Ok(()),
        }
    }
}

/// 通知内容を記録する進捗
#[derive(Default)]
struct RecordingProgress {
    total: Option<usize>,
    phases: Vec<RunPhase>,
    percents: Vec<u8>,
    finished: bool,
}

impl ProgressSink for RecordingProgress {
    fn begin(&mut self, total: usize) {
        self.total = Some(total);
    }

    fn phase(&mut self, phase: RunPhase) {
        self.phases.push(phase);
    }

    fn item_done(&mut self, _record: &OutputRecord, percent: u8) {
        self.percents.push(percent);
    }

    fn finish(&mut self) {
        self.finished = true;
    }
}

/// 同じ料理が2枚ある場合は2枚目に _1 が付く
#[tokio::test]
async fn test_duplicate_labels_get_suffixes() {
    let root = tempdir().unwrap();
    let items = vec![photo("IMG_1.jpg", 1), photo("IMG_2.jpg", 2), photo("IMG_3.jpg", 3)];
    let classifier = ScriptedClassifier::matching(&["Margherita Pizza", "Margherita Pizza ", "Caesar Salad"]);
    let mut progress = RecordingProgress::default();

    let result = Orchestrator::new(options_in(&root, 5))
        .run(&items, &menu(), &classifier, &ZipArchiveBuilder, &mut progress)
        .await
        .unwrap();

    assert_eq!(stems(&result.outputs), vec!["Margherita_Pizza", "Margherita_Pizza_1", "Caesar_Salad"]);
    assert_eq!(result.progress, vec![33, 66, 100]);
    assert_eq!(progress.percents, result.progress);
    assert_eq!(progress.total, Some(3));
    assert_eq!(progress.phases, vec![RunPhase::Classifying, RunPhase::Packaging, RunPhase::Done]);
    assert!(progress.finished);
    assert_eq!(result.matched_count(), 3);

    let entries = zip_entries(&result.archive);
    let names: Vec<&str> = entries.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, vec!["Margherita_Pizza.jpg", "Margherita_Pizza_1.jpg", "Caesar_Salad.jpg"]);
    for ((_, bytes), item) in entries.iter().zip(&items) {
        assert_eq!(bytes, &item.bytes);
    }

    assert!(is_empty_dir(root.path()), "ステージング領域が残っている");
}

/// 大文字小文字だけが違うラベルも別名になる
#[tokio::test]
async fn test_labels_differing_only_in_case() {
    let root = tempdir().unwrap();
    let items = vec![photo("a.jpg", 1), photo("b.jpg", 2), photo("c.jpg", 3)];
    let classifier = ScriptedClassifier::matching(&["Pizza", "pizza", "PIZZA"]);

    let result = Orchestrator::new(options_in(&root, 5))
        .run(&items, &menu(), &classifier, &ZipArchiveBuilder, &mut NullProgress)
        .await
        .unwrap();

    let names: Vec<&str> = result.outputs.iter().map(|o| o.file_name.as_str()).collect();
    assert_eq!(names, vec!["Pizza.jpg", "pizza_1.jpg", "PIZZA_2.jpg"]);

    let folded: std::collections::HashSet<String> = names.iter().map(|n| n.to_ascii_lowercase()).collect();
    assert_eq!(folded.len(), items.len());

    let entries = zip_entries(&result.archive);
    assert_eq!(entries.len(), 3);
    for ((_, bytes), item) in entries.iter().zip(&items) {
        assert_eq!(bytes, &item.bytes);
    }
}

/// モデルが毎回レート制限でも全画像が Unmatched として出力される
#[tokio::test]
async fn test_rate_limited_model_falls_back() {
    let root = tempdir().unwrap();
    let items = vec![photo("a.jpg", 1), photo("b.jpg", 2)];
    let gateway = ClassifierGateway::new(ThrottledModel { calls: AtomicU32::new(0) }, RetryPolicy::immediate(3));

    let result = Orchestrator::new(options_in(&root, 5))
        .run(&items, &menu(), &gateway, &ZipArchiveBuilder, &mut NullProgress)
        .await
        .unwrap();

    assert_eq!(stems(&result.outputs), vec!["Unmatched", "Unmatched_1"]);
    assert!(result
        .outputs
        .iter()
        .all(|o| o.outcome == MatchOutcome::Fallback(FallbackReason::RateLimited)));
    assert_eq!(result.fallback_count(), 2);
    // 1枚あたり上限3回まで試行
    assert_eq!(gateway.model().calls.load(Ordering::SeqCst), 6);
    assert_eq!(zip_entries(&result.archive).len(), 2);
}

/// サニタイズで空になるラベルは Unmatched になる
#[tokio::test]
async fn test_unusable_label_becomes_unmatched() {
    let root = tempdir().unwrap();
    let items = vec![photo("weird.jpg", 1)];
    let classifier = ScriptedClassifier::matching(&["!!!@@@"]);

    let result = Orchestrator::new(options_in(&root, 5))
        .run(&items, &menu(), &classifier, &ZipArchiveBuilder, &mut NullProgress)
        .await
        .unwrap();

    assert_eq!(result.outputs[0].stem, "Unmatched");
    assert_eq!(result.outputs[0].file_name, "Unmatched.jpg");
    assert_eq!(result.outputs[0].label, "!!!@@@");
}

/// 空のメニューでは分類器を呼ばずに全件フォールバック
#[tokio::test]
async fn test_empty_menu_falls_back_without_model_calls() {
    let root = tempdir().unwrap();
    let items = vec![photo("a.jpg", 1)];
    let gateway = ClassifierGateway::new(ThrottledModel { calls: AtomicU32::new(0) }, RetryPolicy::immediate(3));

    let result = Orchestrator::new(options_in(&root, 5))
        .run(&items, &MenuReference::default(), &gateway, &ZipArchiveBuilder, &mut NullProgress)
        .await
        .unwrap();

    assert_eq!(result.outputs[0].outcome, MatchOutcome::Fallback(FallbackReason::EmptyMenu));
    assert_eq!(gateway.model().calls.load(Ordering::SeqCst), 0);
}

/// バッチサイズは出力に影響しない
#[tokio::test]
async fn test_batch_size_does_not_change_output() {
    let items: Vec<InputItem> = (0..7).map(|i| photo(&format!("IMG_{}.jpg", i), i as u8)).collect();
    let labels: HashMap<String, String> = items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let label = if i % 2 == 0 { "Caesar Salad" } else { "Tiramisu" };
            (item.file_name.clone(), label.to_string())
        })
        .collect();
    let classifier = ByNameClassifier(labels);

    let mut runs = Vec::new();
    for batch_size in [1, 3, 7, 50] {
        let root = tempdir().unwrap();
        let result = Orchestrator::new(options_in(&root, batch_size))
            .run(&items, &menu(), &classifier, &ZipArchiveBuilder, &mut NullProgress)
            .await
            .unwrap();
        assert_eq!(result.outputs.len(), items.len());
        assert_eq!(*result.progress.last().unwrap(), 100);
        assert!(result.progress.windows(2).all(|w| w[0] <= w[1]));
        runs.push((result.outputs, zip_entries(&result.archive)));
    }

    for run in &runs[1..] {
        assert_eq!(run, &runs[0]);
    }
    assert_eq!(
        stems(&runs[0].0),
        vec!["Caesar_Salad", "Tiramisu", "Caesar_Salad_1", "Tiramisu_1", "Caesar_Salad_2", "Tiramisu_2", "Caesar_Salad_3"]
    );
}

/// 0件の実行は空のZIPと進捗100
#[tokio::test]
async fn test_zero_items() {
    let root = tempdir().unwrap();
    let items: Vec<InputItem> = Vec::new();
    let classifier = ScriptedClassifier::matching(&[]);

    let result = Orchestrator::new(options_in(&root, 5))
        .run(&items, &menu(), &classifier, &ZipArchiveBuilder, &mut NullProgress)
        .await
        .unwrap();

    assert!(result.outputs.is_empty());
    assert_eq!(result.progress, vec![100]);
    assert!(zip_entries(&result.archive).is_empty());
}

/// 元の拡張子を保持するオプション
#[tokio::test]
async fn test_keep_extension() {
    let root = tempdir().unwrap();
    let items = vec![photo("a.PNG", 1), photo("b.jpeg", 2), photo("noext", 3)];
    let classifier = ScriptedClassifier::matching(&["Tiramisu", "Tiramisu", "Tiramisu"]);
    let options = RunOptions {
        keep_extension: true,
        ..options_in(&root, 5)
    };

    let result = Orchestrator::new(options)
        .run(&items, &menu(), &classifier, &ZipArchiveBuilder, &mut NullProgress)
        .await
        .unwrap();

    let names: Vec<&str> = result.outputs.iter().map(|o| o.file_name.as_str()).collect();
    assert_eq!(names, vec!["Tiramisu.png", "Tiramisu_1.jpg", "Tiramisu_2.jpg"]);
}

/// 中断するとエラーになり、ステージング領域は残らない
#[tokio::test]
async fn test_cancel_between_items() {
    let root = tempdir().unwrap();
    let items: Vec<InputItem> = (0..5).map(|i| photo(&format!("{}.jpg", i), i as u8)).collect();
    let flag = CancelFlag::new();
    let classifier = CancelAfter {
        flag: flag.clone(),
        after: 2,
        calls: AtomicU32::new(0),
    };
    let mut progress = RecordingProgress::default();

    let result = Orchestrator::new(options_in(&root, 2))
        .with_cancel(flag)
        .run(&items, &menu(), &classifier, &ZipArchiveBuilder, &mut progress)
        .await;

    assert!(matches!(result, Err(MenuPhotoError::Cancelled)));
    assert_eq!(classifier.calls.load(Ordering::SeqCst), 2);
    assert_eq!(progress.percents, vec![20, 40]);
    assert!(progress.finished);
    assert!(is_empty_dir(root.path()), "ステージング領域が残っている");
}

/// 読めない入力があれば分類を1件も行わずに失敗する
#[tokio::test]
async fn test_unreadable_input_fails_before_classification() {
    let root = tempdir().unwrap();
    let items = vec![
        TestItem::Ready(photo("a.jpg", 1)),
        TestItem::Ready(photo("b.jpg", 2)),
        TestItem::Broken("c.jpg".into()),
    ];
    let classifier = ScriptedClassifier::matching(&["Tiramisu", "Tiramisu"]);
    let mut progress = RecordingProgress::default();

    let result = Orchestrator::new(options_in(&root, 2))
        .run(&items, &menu(), &classifier, &ZipArchiveBuilder, &mut progress)
        .await;

    assert!(matches!(result, Err(MenuPhotoError::ImageLoad(ref name)) if name == "c.jpg"));
    // 分類器は呼ばれていない
    assert_eq!(classifier.labels.lock().unwrap().len(), 2);
    assert!(progress.percents.is_empty());
    assert!(progress.phases.is_empty());
    assert!(progress.finished);
    assert!(is_empty_dir(root.path()), "ステージング領域が残っている");
}

/// チェック後に消えた入力は読み込み時に失敗し、ステージング領域は削除される
#[tokio::test]
async fn test_input_vanishing_mid_run_cleans_staging() {
    let root = tempdir().unwrap();
    let items = vec![
        TestItem::Ready(photo("a.jpg", 1)),
        TestItem::Ready(photo("b.jpg", 2)),
        TestItem::Vanishing("c.jpg".into()),
    ];
    let classifier = ScriptedClassifier::matching(&["Tiramisu", "Tiramisu"]);

    let result = Orchestrator::new(options_in(&root, 2))
        .run(&items, &menu(), &classifier, &ZipArchiveBuilder, &mut NullProgress)
        .await;

    assert!(matches!(result, Err(MenuPhotoError::ImageLoad(_))));
    assert!(is_empty_dir(root.path()), "ステージング領域が残っている");
}

/// アーカイブ生成の失敗でもステージング領域は削除される
#[tokio::test]
async fn test_archive_failure_cleans_staging() {
    let root = tempdir().unwrap();
    let items = vec![photo("a.jpg", 1)];
    let classifier = ScriptedClassifier::matching(&["Tiramisu"]);
    let mut progress = RecordingProgress::default();

    let result = Orchestrator::new(options_in(&root, 5))
        .run(&items, &menu(), &classifier, &FailingArchive, &mut progress)
        .await;

    assert!(matches!(result, Err(MenuPhotoError::FileNotFound(_))));
    assert_eq!(progress.phases.last(), Some(&RunPhase::Packaging));
    assert!(progress.finished);
    assert!(is_empty_dir(root.path()), "ステージング領域が残っている");
}

/// 実行ごとに命名状態はリセットされる
#[tokio::test]
async fn test_runs_are_independent() {
    let root = tempdir().unwrap();
    let items = vec![photo("a.jpg", 1)];
    let orchestrator = Orchestrator::new(options_in(&root, 5));

    for _ in 0..2 {
        let classifier = ScriptedClassifier::matching(&["Caesar Salad"]);
        let result = orchestrator
            .run(&items, &menu(), &classifier, &ZipArchiveBuilder, &mut NullProgress)
            .await
            .unwrap();
        assert_eq!(result.outputs[0].stem, "Caesar_Salad");
    }
}

#[test]
fn test_phase_transitions() {
    use RunPhase::*;

    assert!(Idle.can_transition_to(Extracting));
    assert!(Extracting.can_transition_to(Classifying));
    assert!(Extracting.can_transition_to(Failed));
    assert!(Classifying.can_transition_to(Packaging));
    assert!(Packaging.can_transition_to(Done));

    assert!(!Classifying.can_transition_to(Failed));
    assert!(!Done.can_transition_to(Idle));
    assert!(!Failed.can_transition_to(Classifying));
    assert!(!Packaging.can_transition_to(Classifying));
}
