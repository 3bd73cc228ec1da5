use clap::{Args, Parser, Subcommand};
use scan_extract_common::{CropRect, DisplayGeometry, SourceImage};
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Parser)]
#[command(name = "scan-extract")]
#[command(about = "書類画像を切り抜いてAIで構造化データを抽出するツール", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// 詳細ログを出力
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 画像を切り抜いて解析し、結果JSONを出力
    Scan {
        /// 書類画像ファイル（data: URI も可）
        #[arg(required = true)]
        image: PathBuf,

        #[command(flatten)]
        crop: CropArgs,

        /// 出力JSONファイル（デフォルト: <画像名>.result.json）
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// 結果の紙面表示を省略
        #[arg(long)]
        quiet: bool,
    },

    /// 切り抜きだけ行いJPEGを保存
    Crop {
        /// 書類画像ファイル（data: URI も可）
        #[arg(required = true)]
        image: PathBuf,

        #[command(flatten)]
        crop: CropArgs,

        /// 出力画像ファイル（デフォルト: <画像名>.crop.<拡張子>）
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// 保存済みの結果JSONを紙面形式で表示
    Render {
        /// 結果JSONファイル
        #[arg(required = true)]
        input: PathBuf,
    },

    /// 設定を管理
    Config {
        /// APIキーを設定
        #[arg(long)]
        set_api_key: Option<String>,

        /// 使用モデルを設定
        #[arg(long)]
        set_model: Option<String>,

        /// 見出しの言語を設定
        #[arg(long)]
        set_language: Option<String>,

        /// 現在の設定を表示
        #[arg(long)]
        show: bool,
    },
}

/// 切り抜き指定
#[derive(Args, Debug, Clone, Default)]
pub struct CropArgs {
    /// 切り抜き矩形 X,Y,W,H（表示座標。省略時は画像全体）
    #[arg(long)]
    pub crop: Option<CropArg>,

    /// 矩形をパーセントで解釈
    #[arg(long, requires = "crop")]
    pub percent: bool,

    /// 矩形を指定したときの表示サイズ WxH（省略時は元画像サイズ）
    #[arg(long)]
    pub display: Option<DisplaySize>,

    /// 画面の倍率（出力ピクセル数に掛かる）
    #[arg(long, default_value = "1.0", value_parser = parse_pixel_ratio)]
    pub pixel_ratio: f64,
}

impl CropArgs {
    /// ドラッグ完了時の矩形に相当する値
    pub fn completed_rect(&self) -> Option<CropRect> {
        self.crop.map(|c| {
            if self.percent {
                CropRect::percent(c.x, c.y, c.width, c.height)
            } else {
                CropRect::pixels(c.x, c.y, c.width, c.height)
            }
        })
    }

    pub fn geometry(&self, source: &SourceImage) -> DisplayGeometry {
        let displayed = match self.display {
            Some(size) => (size.width, size.height),
            None => (source.width() as f64, source.height() as f64),
        };
        DisplayGeometry::new(source.dimensions(), displayed, self.pixel_ratio)
    }
}

/// 倍率は正の有限値のみ
fn parse_pixel_ratio(s: &str) -> Result<f64, String> {
    let ratio: f64 = s
        .trim()
        .parse()
        .map_err(|_| format!("数値として解釈できません: {}", s))?;
    if !ratio.is_finite() || ratio <= 0.0 {
        return Err(format!("倍率は正の値で指定してください: {}", s));
    }
    Ok(ratio)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropArg {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl FromStr for CropArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let values: Vec<f64> = s
            .split(',')
            .map(|v| v.trim().parse::<f64>())
            .collect::<Result<_, _>>()
            .map_err(|_| format!("数値として解釈できません: {}", s))?;

        match values.as_slice() {
            [x, y, width, height] if values.iter().all(|v| v.is_finite() && *v >= 0.0) => Ok(Self {
                x: *x,
                y: *y,
                width: *width,
                height: *height,
            }),
            [_, _, _, _] => Err(format!("負の値は指定できません: {}", s)),
            _ => Err(format!("X,Y,W,H の4つを指定してください: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplaySize {
    pub width: f64,
    pub height: f64,
}

impl FromStr for DisplaySize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .to_lowercase()
            .split_once('x')
            .map(|(w, h)| (w.trim().to_string(), h.trim().to_string()))
            .ok_or_else(|| format!("WxH 形式で指定してください: {}", s))?;

        let width: f64 = w.parse().map_err(|_| format!("幅が不正です: {}", s))?;
        let height: f64 = h.parse().map_err(|_| format!("高さが不正です: {}", s))?;
        if width <= 0.0 || height <= 0.0 || !width.is_finite() || !height.is_finite() {
            return Err(format!("表示サイズは正の値で指定してください: {}", s));
        }
        Ok(Self { width, height })
    }
}
