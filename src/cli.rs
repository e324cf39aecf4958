use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "menu-photo")]
#[command(about = "料理写真をメニュー項目名でリネームしてZIPにまとめるツール", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// 詳細ログを出力
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// メニューの入力元（貼り付けテキストがURLより優先）
#[derive(Args, Debug, Clone, Default)]
pub struct MenuArgs {
    /// メニューページのURL
    #[arg(short, long)]
    pub url: Option<String>,

    /// メニューテキストファイル（1行1項目）
    #[arg(short, long)]
    pub menu_file: Option<PathBuf>,

    /// エディタでメニューを貼り付ける
    #[arg(long)]
    pub paste: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 写真フォルダを照合してZIPを出力
    Run {
        /// 写真フォルダのパス
        #[arg(required = true)]
        folder: PathBuf,

        #[command(flatten)]
        menu: MenuArgs,

        /// 出力ZIP（デフォルト: <ブランド名>_Photos.zip）
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// 照合結果のJSONレポート
        #[arg(long)]
        report: Option<PathBuf>,

        /// バッチサイズ（一度に読み込む枚数、省略時は設定値）
        #[arg(short, long)]
        batch_size: Option<usize>,

        /// キャッシュを使用（照合済みの写真をスキップ）
        #[arg(long)]
        use_cache: bool,

        /// 元の拡張子を保持（デフォルトは .jpg）
        #[arg(long)]
        keep_extension: bool,
    },

    /// メニューを読み込んで候補一覧を表示
    Menu {
        #[command(flatten)]
        menu: MenuArgs,
    },

    /// 設定を表示/編集
    Config {
        /// APIキーを設定
        #[arg(long)]
        set_api_key: Option<String>,

        /// 設定を表示
        #[arg(long)]
        show: bool,
    },

    /// キャッシュ管理
    Cache {
        /// キャッシュを削除
        #[arg(long)]
        clear: bool,

        /// 対象フォルダ（省略時はカレント）
        #[arg(short, long)]
        folder: Option<PathBuf>,

        /// キャッシュ情報を表示
        #[arg(long)]
        info: bool,
    },
}
