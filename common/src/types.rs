//! データモデル
//!
//! CLIとデスクトップで共有される型:
//! - EncodedImage: アップロード画像・切り抜き画像（エンコード済みバイト列）
//! - DocValue: 抽出結果の値（Scalar / Sequence / Mapping の閉じた型）
//! - ExtractionResult: 1ドキュメント or 複数ドキュメントの抽出結果

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::error::{Error, ExtractError, Result};

/// エンコード済み画像
///
/// アップロードされた元画像と切り抜き結果は同じ表現を使う。
/// 一度作ったら変更しない（差し替えは新しい値で行う）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    bytes: Vec<u8>,
    mime_type: String,
    width: u32,
    height: u32,
}

/// アップロードされた元画像
pub type SourceImage = EncodedImage;

/// 切り抜き後の画像（解析に送る画像）
pub type ExtractedImage = EncodedImage;

impl EncodedImage {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
            width,
            height,
        }
    }

    /// バイト列から画像形式とピクセルサイズを読み取って作成
    #[cfg(feature = "raster")]
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        use std::io::Cursor;

        let reader = image::ImageReader::new(Cursor::new(bytes.as_slice()))
            .with_guessed_format()
            .map_err(|e| Error::Image(format!("画像形式の判定に失敗: {}", e)))?;
        let format = reader
            .format()
            .ok_or_else(|| Error::Image("対応していない画像形式です".into()))?;
        let (width, height) = reader
            .into_dimensions()
            .map_err(|e| Error::Image(format!("画像サイズの取得に失敗: {}", e)))?;

        Ok(Self::new(bytes, format.to_mime_type(), width, height))
    }

    /// Data URLから作成
    #[cfg(feature = "raster")]
    pub fn from_data_url(data_url: &str) -> Result<Self> {
        let (_, bytes) = decode_data_url(data_url)?;
        Self::from_bytes(bytes)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Base64エンコード（ヘッダなし）
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }

    /// MIMEタイプに対応する拡張子（不明ならjpg）
    pub fn file_extension(&self) -> &'static str {
        match self.mime_type.as_str() {
            "image/png" => "png",
            "image/webp" => "webp",
            "image/gif" => "gif",
            "image/bmp" => "bmp",
            _ => "jpg",
        }
    }
}

/// Data URLをMIMEタイプとバイト列に分解
///
/// # Examples
/// ```
/// use scan_extract_common::decode_data_url;
///
/// let (mime, bytes) = decode_data_url("data:image/png;base64,AAEC").unwrap();
/// assert_eq!(mime, "image/png");
/// assert_eq!(bytes, vec![0, 1, 2]);
/// ```
pub fn decode_data_url(data_url: &str) -> Result<(String, Vec<u8>)> {
    let rest = data_url
        .strip_prefix("data:")
        .ok_or_else(|| Error::DataUrl("\"data:\" で始まっていません".into()))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| Error::DataUrl("カンマがありません".into()))?;
    let mime = header
        .strip_suffix(";base64")
        .ok_or_else(|| Error::DataUrl("base64形式ではありません".into()))?;
    let bytes = STANDARD
        .decode(payload)
        .map_err(|e| Error::DataUrl(format!("base64デコード失敗: {}", e)))?;
    let mime = if mime.is_empty() { "image/jpeg" } else { mime };
    Ok((mime.to_string(), bytes))
}

/// スカラー値
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    Text(String),
}

impl Scalar {
    /// 表示用の文字列
    pub fn display_text(&self) -> String {
        match self {
            Scalar::Null => "null".to_string(),
            Scalar::Bool(b) => b.to_string(),
            Scalar::Number(n) => format_number(n),
            Scalar::Text(s) => s.clone(),
        }
    }
}

// 3.0 は "3" と表示する
fn format_number(n: &serde_json::Number) -> String {
    if n.is_f64() {
        if let Some(f) = n.as_f64() {
            if f.fract() == 0.0 && f.abs() < 1e15 {
                return format!("{}", f as i64);
            }
        }
    }
    n.to_string()
}

/// 抽出結果の値
///
/// Mappingはサービスが返したキー順を保持する。
#[derive(Debug, Clone, PartialEq)]
pub enum DocValue {
    Scalar(Scalar),
    Sequence(Vec<DocValue>),
    Mapping(Vec<(String, DocValue)>),
}

impl DocValue {
    pub fn text(s: impl Into<String>) -> Self {
        DocValue::Scalar(Scalar::Text(s.into()))
    }

    pub fn is_mapping(&self) -> bool {
        matches!(self, DocValue::Mapping(_))
    }

    /// Mappingのキーで値を取得
    pub fn get(&self, label: &str) -> Option<&DocValue> {
        match self {
            DocValue::Mapping(fields) => fields.iter().find(|(k, _)| k == label).map(|(_, v)| v),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            DocValue::Scalar(Scalar::Null) => Value::Null,
            DocValue::Scalar(Scalar::Bool(b)) => Value::Bool(*b),
            DocValue::Scalar(Scalar::Number(n)) => Value::Number(n.clone()),
            DocValue::Scalar(Scalar::Text(s)) => Value::String(s.clone()),
            DocValue::Sequence(items) => Value::Array(items.iter().map(DocValue::to_json).collect()),
            DocValue::Mapping(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }
}

impl From<Value> for DocValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => DocValue::Scalar(Scalar::Null),
            Value::Bool(b) => DocValue::Scalar(Scalar::Bool(b)),
            Value::Number(n) => DocValue::Scalar(Scalar::Number(n)),
            Value::String(s) => DocValue::Scalar(Scalar::Text(s)),
            Value::Array(items) => DocValue::Sequence(items.into_iter().map(DocValue::from).collect()),
            Value::Object(map) => {
                DocValue::Mapping(map.into_iter().map(|(k, v)| (k, DocValue::from(v))).collect())
            }
        }
    }
}

impl Serialize for DocValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            DocValue::Scalar(Scalar::Null) => serializer.serialize_unit(),
            DocValue::Scalar(Scalar::Bool(b)) => serializer.serialize_bool(*b),
            DocValue::Scalar(Scalar::Number(n)) => n.serialize(serializer),
            DocValue::Scalar(Scalar::Text(s)) => serializer.serialize_str(s),
            DocValue::Sequence(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            DocValue::Mapping(fields) => {
                let mut map = serializer.serialize_map(Some(fields.len()))?;
                for (k, v) in fields {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
        }
    }
}

/// AI抽出結果
///
/// - Single: 1枚の書類（JSONオブジェクト）
/// - Pages: 複数枚の書類（JSON配列、1要素 = 1ページ）
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionResult {
    Single(DocValue),
    Pages(Vec<DocValue>),
}

impl ExtractionResult {
    /// JSON値から作成
    ///
    /// トップレベルはオブジェクトか配列のみ受け付ける。
    /// 各ドキュメントの中身は検証しない。
    pub fn from_json(value: Value) -> std::result::Result<Self, ExtractError> {
        match value {
            Value::Object(_) => Ok(ExtractionResult::Single(DocValue::from(value))),
            Value::Array(items) => Ok(ExtractionResult::Pages(
                items.into_iter().map(DocValue::from).collect(),
            )),
            other => Err(ExtractError::MalformedData(format!(
                "トップレベルがオブジェクトでも配列でもありません: {}",
                other
            ))),
        }
    }

    /// 表示順のドキュメント一覧
    pub fn documents(&self) -> Vec<&DocValue> {
        match self {
            ExtractionResult::Single(doc) => vec![doc],
            ExtractionResult::Pages(docs) => docs.iter().collect(),
        }
    }

    pub fn is_multi_page(&self) -> bool {
        matches!(self, ExtractionResult::Pages(_))
    }

    pub fn to_json(&self) -> Value {
        match self {
            ExtractionResult::Single(doc) => doc.to_json(),
            ExtractionResult::Pages(docs) => Value::Array(docs.iter().map(DocValue::to_json).collect()),
        }
    }
}

impl Serialize for ExtractionResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            ExtractionResult::Single(doc) => doc.serialize(serializer),
            ExtractionResult::Pages(docs) => docs.serialize(serializer),
        }
    }
}
