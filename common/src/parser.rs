//! APIレスポンスパーサー
//!
//! Gemini のレスポンスから本文テキストを取り出し、
//! 抽出結果（ExtractionResult）にパースする

use serde_json::Value;

use crate::error::ExtractError;
use crate::request::GeminiResponse;
use crate::types::ExtractionResult;

/// markdownのコードフェンスを取り除く
///
/// "```json" と "```" をすべて削除して前後の空白を落とす。
///
/// # Examples
/// ```
/// use scan_extract_common::strip_code_fences;
///
/// assert_eq!(strip_code_fences("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
/// ```
pub fn strip_code_fences(text: &str) -> String {
    text.replace("```json", "").replace("```", "").trim().to_string()
}

/// テキストをJSONとしてパース
///
/// 1. そのままパース
/// 2. 失敗したらコードフェンスを除去して1回だけ再試行
pub fn parse_json_text(text: &str) -> Result<Value, ExtractError> {
    match serde_json::from_str::<Value>(text) {
        Ok(value) => Ok(value),
        Err(_) => {
            let cleaned = strip_code_fences(text);
            serde_json::from_str::<Value>(&cleaned)
                .map_err(|e| ExtractError::MalformedData(e.to_string()))
        }
    }
}

/// 本文テキストを抽出結果にパース
pub fn parse_extraction_text(text: &str) -> Result<ExtractionResult, ExtractError> {
    if text.trim().is_empty() {
        return Err(ExtractError::EmptyResponse);
    }
    let value = parse_json_text(text)?;
    ExtractionResult::from_json(value)
}

/// Gemini レスポンス全体（JSON）を抽出結果にパース
///
/// # Returns
/// * `Err(EmptyResponse)` - 本文テキストがない
/// * `Err(MalformedData)` - JSONとして解釈できない
pub fn parse_extraction_response(payload: Value) -> Result<ExtractionResult, ExtractError> {
    let response: GeminiResponse = serde_json::from_value(payload)
        .map_err(|e| ExtractError::MalformedData(format!("レスポンス形式が不正: {}", e)))?;
    let text = response.primary_text().ok_or(ExtractError::EmptyResponse)?;
    parse_extraction_text(text)
}
