use anyhow::Context;
use clap::Parser;
use menu_photo_ai::{archive, cache, cli, config, error, gateway, menu, orchestrator, progress, scanner};
use menu_photo_common::{brand_name, MatchOutcome, MenuReference, OutputRecord};
use cli::{Cli, Commands, MenuArgs};
use config::Config;
use gateway::{ClassifierGateway, GeminiModel};
use menu::{HttpFetcher, MenuSource};
use orchestrator::{CancelFlag, Orchestrator, RunOptions};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

const PASTE_TEMPLATE: &str = "# メニューを1行に1品ずつ貼り付けてください（# で始まる行は無視）\n";

/// 照合結果レポート（--report）
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RunReport<'a> {
    created_at: chrono::DateTime<chrono::Local>,
    archive: String,
    menu: &'a MenuReference,
    outputs: &'a [OutputRecord],
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load().context("設定ファイルの読み込みに失敗しました")?;
    init_logging(cli.verbose, &config.log_level);

    match cli.command {
        Commands::Run { folder, menu: menu_args, output, report, batch_size, use_cache, keep_extension } => {
            println!("🍽  menu-photo - 写真照合\n");

            // 1. 画像スキャン
            println!("[1/3] 写真をスキャン中...");
            let images = scanner::scan_folder(&folder)?;
            println!("✔ {}枚の写真を検出\n", images.len());

            if images.is_empty() {
                return Err(error::MenuPhotoError::NoImagesFound(folder.display().to_string()).into());
            }

            // 2. メニュー読み込み + AI照合
            let source = menu_source(&menu_args)?;
            let gateway = build_gateway(&config)?;
            let fetcher = HttpFetcher::new(config.request_timeout())?;

            let cancel = CancelFlag::new();
            let flag = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    flag.cancel();
                }
            });

            let options = RunOptions {
                batch_size: batch_size.unwrap_or(config.default_batch_size),
                keep_extension,
                staging_root: config.staging_dir.clone(),
            };
            let orchestrator = Orchestrator::new(options).with_cancel(cancel);
            let mut bar = progress::TerminalProgress::new();

            println!("[2/3] メニュー読み込み・AI照合中...{}", if use_cache { " (キャッシュ有効)" } else { "" });
            let (menu_ref, result) = if use_cache {
                let cached = cache::CachedClassifier::new(&gateway, cache::CacheFile::load(&folder));
                let out = orchestrator::run_pipeline(
                    &orchestrator, &source, &fetcher, &gateway, &cached, &images, &archive::ZipArchiveBuilder, &mut bar,
                )
                .await?;
                println!("  キャッシュヒット: {}枚", cached.hits());
                cached.into_cache().save(&folder)?;
                out
            } else {
                orchestrator::run_pipeline(
                    &orchestrator, &source, &fetcher, &gateway, &gateway, &images, &archive::ZipArchiveBuilder, &mut bar,
                )
                .await?
            };
            println!("✔ メニュー{}品・照合 {}枚 / Unmatched {}枚",
                menu_ref.len(), result.matched_count(), result.fallback_count());
            for record in &result.outputs {
                if let MatchOutcome::Fallback(reason) = record.outcome {
                    println!("  {} → {} ({})", record.source_name, record.file_name, reason);
                }
            }
            println!();

            // 3. 保存
            println!("[3/3] ZIPを保存中...");
            let archive_path = archive_output_path(output, &brand_name(source.url()));
            std::fs::write(&archive_path, &result.archive)
                .with_context(|| format!("ZIPを保存できませんでした: {}", archive_path.display()))?;
            println!("✔ ZIPを保存: {}", archive_path.display());

            if let Some(report_path) = report {
                let report = RunReport {
                    created_at: chrono::Local::now(),
                    archive: archive_path.display().to_string(),
                    menu: &menu_ref,
                    outputs: &result.outputs,
                };
                std::fs::write(&report_path, serde_json::to_string_pretty(&report)?)?;
                println!("✔ レポートを保存: {}", report_path.display());
            }

            println!("\n✅ 完了: {}枚すべてZIPに格納しました", result.outputs.len());
        }

        Commands::Menu { menu: menu_args } => {
            println!("📋 menu-photo - メニュー読み込み\n");

            let source = menu_source(&menu_args)?;
            let gateway = build_gateway(&config)?;
            let fetcher = HttpFetcher::new(config.request_timeout())?;

            let menu_ref = menu::load_menu(&source, &fetcher, &gateway).await?;
            for (i, item) in menu_ref.items().iter().enumerate() {
                match &item.description {
                    Some(desc) => println!("  {:>3}. {} - {}", i + 1, item.name, desc),
                    None => println!("  {:>3}. {}", i + 1, item.name),
                }
            }
            println!("\n✔ {}品", menu_ref.len());
        }

        Commands::Config { set_api_key, show } => {
            let mut config = config;

            if let Some(key) = set_api_key {
                config.set_api_key(key)?;
                println!("✔ APIキーを設定しました");
            }

            if show {
                println!("設定:");
                println!("  パス: {}", Config::config_path()?.display());
                println!("  モデル: {}", config.model);
                println!("  APIベース: {}", config.api_base);
                println!("  バッチサイズ: {}", config.default_batch_size);
                println!("  タイムアウト: {}秒", config.timeout_seconds);
                println!("  最大試行回数: {}", config.max_attempts);
                println!("  レート制限待機: {}秒", config.rate_limit_cooldown_seconds);
                println!("  APIキー: {}", if config.get_api_key().is_ok() { "設定済み" } else { "未設定" });
            }
        }

        Commands::Cache { clear, folder, info } => {
            let target = folder.unwrap_or_else(|| PathBuf::from("."));
            let cache_path = cache::CacheFile::cache_path(&target);

            if info || !clear {
                // デフォルトまたは--info: 情報表示
                if cache_path.exists() {
                    let cache = cache::CacheFile::load(&target);
                    println!("キャッシュ情報:");
                    println!("  パス: {}", cache_path.display());
                    println!("  件数: {}", cache.len());
                    if let Ok(meta) = std::fs::metadata(&cache_path) {
                        println!("  サイズ: {} bytes", meta.len());
                    }
                } else {
                    println!("キャッシュファイルが存在しません: {}", cache_path.display());
                }
            }

            if clear {
                match cache::CacheFile::clear(&target) {
                    Ok(true) => println!("✔ キャッシュを削除しました: {}", cache_path.display()),
                    Ok(false) => println!("キャッシュファイルが存在しません"),
                    Err(e) => println!("キャッシュ削除エラー: {}", e),
                }
            }
        }
    }

    Ok(())
}

fn init_logging(verbose: bool, level: &str) {
    let default_level = if verbose { "debug" } else { level };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// CLI引数からメニュー入力元を決める
fn menu_source(args: &MenuArgs) -> anyhow::Result<MenuSource> {
    let text = if let Some(path) = &args.menu_file {
        Some(
            std::fs::read_to_string(path)
                .with_context(|| format!("メニューファイルを読み込めませんでした: {}", path.display()))?,
        )
    } else if args.paste {
        dialoguer::Editor::new()
            .extension(".txt")
            .edit(PASTE_TEMPLATE)
            .context("エディタを起動できませんでした")?
    } else {
        None
    };

    Ok(MenuSource::resolve(args.url.as_deref(), text.as_deref())?)
}

fn build_gateway(config: &Config) -> anyhow::Result<ClassifierGateway<GeminiModel>> {
    let api_key = config.get_api_key()?;
    let model = GeminiModel::new(config, api_key)?;
    Ok(ClassifierGateway::new(model, config.retry_policy()))
}

fn archive_output_path(output: Option<PathBuf>, brand: &str) -> PathBuf {
    let file_name = archive::archive_file_name(brand);
    match output {
        Some(path) if path.is_dir() => path.join(file_name),
        Some(path) => path,
        None => Path::new(".").join(file_name),
    }
}
