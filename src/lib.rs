//! scan-extract
//!
//! 書類画像を切り抜き、Gemini で構造化データを抽出して紙面形式で表示する。

pub mod cli;
pub mod config;
pub mod controller;
pub mod error;
pub mod extractor;
pub mod image_io;
