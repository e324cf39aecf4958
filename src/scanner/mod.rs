use crate::error::{MenuPhotoError, Result};
use crate::orchestrator::ItemSource;
use menu_photo_common::InputItem;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// フォルダ内の画像ファイル（中身はバッチ処理時に読み込む）
#[derive(Debug, Clone)]
pub struct ImageInfo {
    pub path: PathBuf,
    pub file_name: String,
}

impl ItemSource for ImageInfo {
    fn name(&self) -> &str {
        &self.file_name
    }

    fn load(&self) -> Result<InputItem> {
        let bytes = std::fs::read(&self.path).map_err(|e| {
            MenuPhotoError::ImageLoad(format!("{}: {}", self.path.display(), e))
        })?;
        Ok(InputItem::new(self.file_name.clone(), bytes))
    }

    fn ensure_readable(&self) -> Result<()> {
        std::fs::File::open(&self.path)
            .map(|_| ())
            .map_err(|e| MenuPhotoError::ImageLoad(format!("{}: {}", self.path.display(), e)))
    }
}

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];

pub fn scan_folder(folder: &Path) -> Result<Vec<ImageInfo>> {
    if !folder.is_dir() {
        return Err(MenuPhotoError::FolderNotFound(folder.display().to_string()));
    }

    let mut images = Vec::new();

    for entry in WalkDir::new(folder)
        .max_depth(1)  // 直下のみ（再帰しない）
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();

        if !path.is_file() {
            continue;
        }

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        // 隠しファイル（キャッシュ等）は対象外
        if file_name.starts_with('.') {
            continue;
        }

        if let Some(ext) = path.extension() {
            if is_image_extension(&ext.to_string_lossy()) {
                images.push(ImageInfo {
                    path: path.to_path_buf(),
                    file_name,
                });
            }
        }
    }

    // ファイル名でソート（処理順＝連番の決定に使う）
    images.sort_by(|a, b| a.file_name.cmp(&b.file_name));

    tracing::debug!(folder = %folder.display(), count = images.len(), "scanned folder");
    Ok(images)
}

fn is_image_extension(ext: &str) -> bool {
    IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str())
}
