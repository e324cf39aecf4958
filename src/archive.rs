//! アーカイブ生成
//!
//! ステージング領域の結果ファイルを1つのZIPにまとめる。
//! 画像は再エンコードせずそのまま格納する。

use crate::error::{MenuPhotoError, Result};
use menu_photo_common::OutputRecord;
use std::io::{Cursor, Write};
use std::path::Path;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

pub trait ArchiveBuilder {
    /// `outputs` の順にステージング領域のファイルを格納したアーカイブを返す
    fn build(&self, staging_dir: &Path, outputs: &[OutputRecord]) -> Result<Vec<u8>>;
}

/// Deflate圧縮のZIP
#[derive(Debug, Clone, Copy, Default)]
pub struct ZipArchiveBuilder;

impl ArchiveBuilder for ZipArchiveBuilder {
    fn build(&self, staging_dir: &Path, outputs: &[OutputRecord]) -> Result<Vec<u8>> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        for record in outputs {
            let path = staging_dir.join(&record.file_name);
            let bytes = std::fs::read(&path).map_err(|e| {
                MenuPhotoError::FileNotFound(format!("{}: {}", path.display(), e))
            })?;
            zip.start_file(record.file_name.as_str(), options)?;
            zip.write_all(&bytes)?;
        }

        let cursor = zip.finish()?;
        Ok(cursor.into_inner())
    }
}

/// アーカイブ名（`<Brand>_Photos.zip`）
pub fn archive_file_name(brand: &str) -> String {
    format!("{}_Photos.zip", brand)
}
