//! Gemini generateContent のリクエスト・レスポンス型

use serde::{Deserialize, Serialize};

use crate::prompts::build_extraction_prompt;
use crate::types::ExtractedImage;

/// 既定モデル
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// 既定エンドポイント
pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";

/// 応答を構造化データに限定するMIMEタイプ
pub const RESPONSE_MIME_TYPE: &str = "application/json";

/// generateContent のURL（キーはクエリで渡す）
pub fn generate_content_url(endpoint: &str, model: &str, api_key: &str) -> String {
    format!(
        "{}/models/{}:generateContent?key={}",
        endpoint.trim_end_matches('/'),
        model,
        api_key
    )
}

/// Gemini APIリクエスト
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiRequest {
    pub contents: Vec<Content>,
    pub generation_config: GenerationConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct Content {
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Part {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_mime_type: String,
}

impl GeminiRequest {
    /// 抽出リクエストを作成（指示文 + 画像1枚）
    pub fn extraction(image: &ExtractedImage, label_language: &str) -> Self {
        Self {
            contents: vec![Content {
                parts: vec![
                    Part::Text {
                        text: build_extraction_prompt(label_language),
                    },
                    Part::InlineData {
                        inline_data: InlineData {
                            mime_type: image.mime_type().to_string(),
                            data: image.to_base64(),
                        },
                    },
                ],
            }],
            generation_config: GenerationConfig {
                response_mime_type: RESPONSE_MIME_TYPE.to_string(),
            },
        }
    }
}

/// Gemini APIレスポンス（必要な部分のみ）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GeminiResponse {
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Candidate {
    pub content: ResponseContent,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ResponseContent {
    pub parts: Vec<ResponsePart>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ResponsePart {
    pub text: Option<String>,
}

impl GeminiResponse {
    /// 最初の候補の最初のパートのテキスト
    pub fn primary_text(&self) -> Option<&str> {
        self.candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .and_then(|p| p.text.as_deref())
            .filter(|t| !t.is_empty())
    }
}
