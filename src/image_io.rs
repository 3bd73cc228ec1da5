//! 画像・結果ファイルの入出力

use scan_extract_common::{EncodedImage, ExtractionResult, SourceImage};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{Result, ScanError};

/// `data:` URI で渡された入力か
pub fn is_data_url(input: &Path) -> bool {
    input.to_str().is_some_and(|s| s.starts_with("data:"))
}

/// 画像ファイル（または `data:` URI）を読み込み、形式とサイズを判定する
pub fn load_image(path: &Path) -> Result<SourceImage> {
    if let Some(data_url) = path.to_str().filter(|_| is_data_url(path)) {
        let image = SourceImage::from_data_url(data_url)
            .map_err(|e| ScanError::ImageLoad(format!("data URI: {}", e)))?;
        debug!(width = image.width(), height = image.height(), "Image loaded from data URI");
        return Ok(image);
    }
    if !path.is_file() {
        return Err(ScanError::FileNotFound(path.display().to_string()));
    }
    let bytes = std::fs::read(path)?;
    let image = SourceImage::from_bytes(bytes)
        .map_err(|e| ScanError::ImageLoad(format!("{}: {}", path.display(), e)))?;
    debug!(path = %path.display(), width = image.width(), height = image.height(), "Image loaded");
    Ok(image)
}

pub fn write_image(path: &Path, image: &EncodedImage) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, image.bytes())?;
    Ok(())
}

/// 抽出結果をJSONで保存
pub fn save_result(path: &Path, result: &ExtractionResult) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(&result.to_json())?;
    std::fs::write(path, json)?;
    Ok(())
}

/// 保存済みのJSONを抽出結果として読み込む
pub fn load_result(path: &Path) -> Result<ExtractionResult> {
    if !path.is_file() {
        return Err(ScanError::FileNotFound(path.display().to_string()));
    }
    let content = std::fs::read_to_string(path)?;
    let value: serde_json::Value = serde_json::from_str(&content)?;
    Ok(ExtractionResult::from_json(value)?)
}

/// 切り抜き画像の保存先（拡張子は実際の形式に合わせる。素通しなら元の形式のまま）
pub fn crop_output_path(input: &Path, image: &EncodedImage) -> PathBuf {
    default_output_path(input, &format!("crop.{}", image.file_extension()))
}

/// 入力画像の隣に置く出力パス（例: receipt.jpg → receipt.result.json）
///
/// `data:` URI 入力はカレントディレクトリの `scan.<suffix>`。
pub fn default_output_path(input: &Path, suffix: &str) -> PathBuf {
    if is_data_url(input) {
        return PathBuf::from(format!("scan.{}", suffix));
    }
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "output".to_string());
    input.with_file_name(format!("{}.{}", stem, suffix))
}

#[cfg(test)]
mod tests {
    use super::*;
    use scan_extract_common::DocValue;
    use tempfile::tempdir;

    #[test]
    fn test_default_output_path() {
        assert_eq!(
            default_output_path(Path::new("/tmp/scans/receipt.jpg"), "result.json"),
            PathBuf::from("/tmp/scans/receipt.result.json")
        );
        assert_eq!(
            default_output_path(Path::new("page.png"), "crop.jpg"),
            PathBuf::from("page.crop.jpg")
        );
    }

    #[test]
    fn test_data_url_input() {
        let mut png = Vec::new();
        image::DynamicImage::ImageRgb8(image::RgbImage::new(4, 3))
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        let url = format!(
            "data:image/png;base64,{}",
            SourceImage::new(png, "image/png", 4, 3).to_base64()
        );
        let input = Path::new(&url);

        assert!(is_data_url(input));
        assert_eq!(load_image(input).unwrap().dimensions(), (4, 3));
        assert_eq!(default_output_path(input, "result.json"), PathBuf::from("scan.result.json"));

        let broken = Path::new("data:image/png;base64,!!!");
        assert!(matches!(load_image(broken), Err(ScanError::ImageLoad(_))));
    }

    #[test]
    fn test_crop_output_path_follows_format() {
        let input = Path::new("/scans/receipt.png");
        let passthrough = EncodedImage::new(vec![0x89], "image/png", 1, 1);
        let cropped = EncodedImage::new(vec![0xff], "image/jpeg", 1, 1);
        assert_eq!(crop_output_path(input, &passthrough), PathBuf::from("/scans/receipt.crop.png"));
        assert_eq!(crop_output_path(input, &cropped), PathBuf::from("/scans/receipt.crop.jpg"));
    }

    #[test]
    fn test_load_missing_image() {
        let err = load_image(Path::new("/nonexistent/scan-12345.jpg")).unwrap_err();
        assert!(matches!(err, ScanError::FileNotFound(_)));
    }

    #[test]
    fn test_load_non_image() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("note.jpg");
        std::fs::write(&path, "hello").unwrap();
        assert!(matches!(load_image(&path), Err(ScanError::ImageLoad(_))));
    }

    #[test]
    fn test_result_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out").join("r.json");
        let result = ExtractionResult::Pages(vec![DocValue::text("a"), DocValue::text("b")]);

        save_result(&path, &result).unwrap();
        assert_eq!(load_result(&path).unwrap(), result);
    }

    #[test]
    fn test_load_result_rejects_scalar() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("r.json");
        std::fs::write(&path, "42").unwrap();
        assert!(matches!(load_result(&path), Err(ScanError::Extract(_))));
    }
}
