//! 画像切り抜き
//!
//! 表示座標で指定された切り抜き矩形を元画像の解像度に写像し、
//! 元画像から直接ピクセルを切り出す。
//!
//! - 座標計算（`plan_crop`）は常に利用可能な純粋関数
//! - ラスタ処理（`apply_crop`）は `raster` feature で有効

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
#[cfg(feature = "raster")]
use crate::types::{ExtractedImage, SourceImage};

/// 出力JPEG品質 (0-100)
pub const JPEG_QUALITY: u8 = 95;

/// 出力画像の1辺の上限（JPEGで表現できる最大値）
pub const MAX_OUTPUT_SIDE: u32 = 65_535;

// 浮動小数点の誤差で 999.9999 → 999 にならないようにする
const FLOOR_EPSILON: f64 = 1e-6;

/// 矩形の単位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CropUnit {
    /// 表示サイズに対する百分率
    Percent,
    /// 表示ピクセル
    Pixel,
}

/// 表示座標系の切り抜き矩形
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CropRect {
    pub unit: CropUnit,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl CropRect {
    pub fn pixels(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { unit: CropUnit::Pixel, x, y, width, height }
    }

    pub fn percent(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { unit: CropUnit::Percent, x, y, width, height }
    }

    /// 画像読み込み時の初期選択（幅・高さ90%、5%オフセット）
    pub fn default_selection() -> Self {
        Self::percent(5.0, 5.0, 90.0, 90.0)
    }

    /// 2点（ドラッグ開始点と現在点）から矩形を作る
    pub fn from_corners(a: (f64, f64), b: (f64, f64)) -> Self {
        let x = a.0.min(b.0);
        let y = a.1.min(b.1);
        Self::pixels(x, y, (a.0 - b.0).abs(), (a.1 - b.1).abs())
    }

    /// 表示ピクセル単位に変換
    pub fn to_pixels(&self, displayed_width: f64, displayed_height: f64) -> Self {
        match self.unit {
            CropUnit::Pixel => *self,
            CropUnit::Percent => Self::pixels(
                self.x * displayed_width / 100.0,
                self.y * displayed_height / 100.0,
                self.width * displayed_width / 100.0,
                self.height * displayed_height / 100.0,
            ),
        }
    }

    /// 幅・高さがともに正か
    pub fn has_area(&self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }

    /// 表示領域に収まるように調整
    pub fn clamp_to(&self, displayed_width: f64, displayed_height: f64) -> Self {
        let px = self.to_pixels(displayed_width, displayed_height);
        let x = px.x.clamp(0.0, displayed_width);
        let y = px.y.clamp(0.0, displayed_height);
        let right = (px.x + px.width).clamp(0.0, displayed_width);
        let bottom = (px.y + px.height).clamp(0.0, displayed_height);
        Self::pixels(x, y, (right - x).max(0.0), (bottom - y).max(0.0))
    }
}

/// 表示サイズと元画像サイズの関係
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayGeometry {
    pub natural_width: u32,
    pub natural_height: u32,
    pub displayed_width: f64,
    pub displayed_height: f64,
    /// 高密度ディスプレイの倍率（window.devicePixelRatio 相当）
    pub device_pixel_ratio: f64,
}

impl DisplayGeometry {
    pub fn new(
        natural: (u32, u32),
        displayed: (f64, f64),
        device_pixel_ratio: f64,
    ) -> Self {
        Self {
            natural_width: natural.0,
            natural_height: natural.1,
            displayed_width: displayed.0,
            displayed_height: displayed.1,
            device_pixel_ratio,
        }
    }

    /// 等倍表示（表示サイズ = 元画像サイズ、倍率1）
    pub fn unscaled(natural_width: u32, natural_height: u32) -> Self {
        Self::new(
            (natural_width, natural_height),
            (natural_width as f64, natural_height as f64),
            1.0,
        )
    }

    pub fn scale_x(&self) -> f64 {
        self.natural_width as f64 / self.displayed_width
    }

    pub fn scale_y(&self) -> f64 {
        self.natural_height as f64 / self.displayed_height
    }

    fn validate(&self) -> Result<()> {
        let positive = |v: f64| v.is_finite() && v > 0.0;
        if self.natural_width == 0 || self.natural_height == 0 {
            return Err(Error::Geometry("元画像のサイズが0です".into()));
        }
        if !positive(self.displayed_width) || !positive(self.displayed_height) {
            return Err(Error::Geometry(format!(
                "表示サイズが不正です: {}x{}",
                self.displayed_width, self.displayed_height
            )));
        }
        if !positive(self.device_pixel_ratio) {
            return Err(Error::Geometry(format!(
                "画面の倍率が不正です: {}",
                self.device_pixel_ratio
            )));
        }
        Ok(())
    }
}

/// 元画像ピクセル座標の矩形
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// 切り抜き計画
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CropPlan {
    /// 元画像をそのまま使う
    Passthrough,
    /// 元画像の `source` を `output_width` x `output_height` に描画する
    Region {
        source: SourceRect,
        output_width: u32,
        output_height: u32,
    },
}

impl CropPlan {
    pub fn is_passthrough(&self) -> bool {
        matches!(self, CropPlan::Passthrough)
    }

    /// 出力サイズ（Passthroughは元画像サイズ）
    pub fn output_size(&self, geometry: &DisplayGeometry) -> (u32, u32) {
        match self {
            CropPlan::Passthrough => (geometry.natural_width, geometry.natural_height),
            CropPlan::Region { output_width, output_height, .. } => (*output_width, *output_height),
        }
    }
}

/// 確定した切り抜き矩形から切り抜き計画を作る
///
/// 切り抜きが未確定、または幅・高さが0の場合は元画像をそのまま使う。
/// これはエラーではない。
///
/// # Errors
/// * `Error::Geometry` - 表示サイズ・倍率が正の有限値でない、
///   または出力の1辺が `MAX_OUTPUT_SIDE` を超える
pub fn plan_crop(completed: Option<&CropRect>, geometry: &DisplayGeometry) -> Result<CropPlan> {
    let Some(rect) = completed else {
        return Ok(CropPlan::Passthrough);
    };
    geometry.validate()?;

    let px = rect.to_pixels(geometry.displayed_width, geometry.displayed_height);
    if !px.has_area() {
        return Ok(CropPlan::Passthrough);
    }

    let scale_x = geometry.scale_x();
    let scale_y = geometry.scale_y();
    let natural_w = geometry.natural_width as f64;
    let natural_h = geometry.natural_height as f64;

    let left = (px.x * scale_x).clamp(0.0, natural_w);
    let top = (px.y * scale_y).clamp(0.0, natural_h);
    let right = ((px.x + px.width) * scale_x).clamp(0.0, natural_w);
    let bottom = ((px.y + px.height) * scale_y).clamp(0.0, natural_h);

    let source = SourceRect {
        x: left,
        y: top,
        width: right - left,
        height: bottom - top,
    };

    let ratio = geometry.device_pixel_ratio;
    let output_width = output_side(source.width * ratio)?;
    let output_height = output_side(source.height * ratio)?;

    if output_width == 0 || output_height == 0 {
        return Ok(CropPlan::Passthrough);
    }

    Ok(CropPlan::Region { source, output_width, output_height })
}

fn output_side(length: f64) -> Result<u32> {
    let side = (length + FLOOR_EPSILON).floor();
    if side > MAX_OUTPUT_SIDE as f64 {
        return Err(Error::Geometry(format!(
            "出力サイズが大きすぎます: {}px（上限 {}px）",
            side, MAX_OUTPUT_SIDE
        )));
    }
    Ok(side as u32)
}

/// 切り抜き計画を元画像に適用してJPEG(品質95)を作る
#[cfg(feature = "raster")]
pub fn apply_crop(source: &SourceImage, plan: &CropPlan) -> Result<ExtractedImage> {
    use image::imageops::FilterType;

    let (rect, output_width, output_height) = match plan {
        CropPlan::Passthrough => return Ok(source.clone()),
        CropPlan::Region { source, output_width, output_height } => {
            (source, *output_width, *output_height)
        }
    };

    let decoded = image::load_from_memory(source.bytes())
        .map_err(|e| Error::Image(format!("画像デコードに失敗: {}", e)))?;

    let (img_w, img_h) = (decoded.width(), decoded.height());
    let x0 = (rect.x.round() as u32).min(img_w.saturating_sub(1));
    let y0 = (rect.y.round() as u32).min(img_h.saturating_sub(1));
    let x1 = ((rect.x + rect.width).round() as u32).clamp(x0 + 1, img_w);
    let y1 = ((rect.y + rect.height).round() as u32).clamp(y0 + 1, img_h);

    let cropped = decoded.crop_imm(x0, y0, x1 - x0, y1 - y0);
    let rendered = if cropped.width() == output_width && cropped.height() == output_height {
        cropped
    } else {
        cropped.resize_exact(output_width, output_height, FilterType::CatmullRom)
    };

    let bytes = encode_jpeg(&rendered, JPEG_QUALITY)?;
    Ok(ExtractedImage::new(bytes, "image/jpeg", output_width, output_height))
}

/// 計画作成と適用をまとめて行う
#[cfg(feature = "raster")]
pub fn crop_image(
    source: &SourceImage,
    completed: Option<&CropRect>,
    geometry: &DisplayGeometry,
) -> Result<ExtractedImage> {
    apply_crop(source, &plan_crop(completed, geometry)?)
}

#[cfg(feature = "raster")]
fn encode_jpeg(img: &image::DynamicImage, quality: u8) -> Result<Vec<u8>> {
    use image::codecs::jpeg::JpegEncoder;

    let rgb = img.to_rgb8();
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality)
        .encode_image(&rgb)
        .map_err(|e| Error::Image(format!("JPEGエンコードに失敗: {}", e)))?;
    Ok(buf)
}
