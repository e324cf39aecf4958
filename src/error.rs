use thiserror::Error;

#[derive(Error, Debug)]
pub enum MenuPhotoError {
    #[error("設定エラー: {0}")]
    Config(String),

    #[error("APIキーが設定されていません。`menu-photo config --set-api-key YOUR_KEY` または環境変数 GEMINI_API_KEY で設定してください")]
    MissingApiKey,

    #[error("ファイルが見つかりません: {0}")]
    FileNotFound(String),

    #[error("フォルダが見つかりません: {0}")]
    FolderNotFound(String),

    #[error("画像が見つかりません: {0}")]
    NoImagesFound(String),

    #[error("画像読み込みエラー: {0}")]
    ImageLoad(String),

    #[error("メニューの入力がありません。--url / --menu-file / --paste のいずれかを指定してください")]
    NoMenuSource,

    #[error("メニューを読み込めませんでした: {0}")]
    MenuUnavailable(String),

    #[error("メニュー項目が1件も見つかりませんでした: {0}")]
    EmptyMenu(String),

    #[error("API呼び出しエラー: {0}")]
    ApiCall(String),

    #[error("アーカイブ生成エラー: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("処理が中断されました")]
    Cancelled,

    #[error("JSON解析エラー: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IOエラー: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, MenuPhotoError>;
