use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use scan_extract_common::{EncodedImage, ExtractionResult, RequestId, SourceImage};

pub fn load_source_image(path: &Path) -> Result<SourceImage> {
    let bytes = fs::read(path).with_context(|| format!("read {}", path.display()))?;
    SourceImage::from_bytes(bytes).with_context(|| format!("decode {}", path.display()))
}

/// CLIが書き出した結果JSONを読み込む
pub fn load_result(path: &Path) -> Result<ExtractionResult> {
    let content = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let value: serde_json::Value =
        serde_json::from_str(&content).with_context(|| format!("parse {}", path.display()))?;
    ExtractionResult::from_json(value).with_context(|| format!("shape {}", path.display()))
}

/// 解析に渡す切り抜き画像を一時ファイルに書き出す
pub fn write_request_image(dir: &Path, request: RequestId, image: &EncodedImage) -> Result<PathBuf> {
    let ext = image.file_extension();
    fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    let path = dir.join(format!("request-{request}.{ext}"));
    fs::write(&path, image.bytes()).with_context(|| format!("write {}", path.display()))?;
    Ok(path)
}

pub fn request_dir() -> PathBuf {
    std::env::temp_dir().join("scan-extract-desktop")
}

/// テクスチャ用にRGBAへ展開
pub fn decode_rgba(image: &EncodedImage) -> Result<([usize; 2], Vec<u8>)> {
    let decoded = image::load_from_memory(image.bytes()).context("decode image")?;
    let rgba = decoded.to_rgba8();
    let size = [rgba.width() as usize, rgba.height() as usize];
    Ok((size, rgba.into_raw()))
}
