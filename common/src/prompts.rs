//! プロンプト生成モジュール
//!
//! CLIとデスクトップで共有される抽出指示文:
//! - DEFAULT_LABEL_LANGUAGE: 見出しの既定言語
//! - build_extraction_prompt: OCR + 項目別抽出用プロンプト

/// 見出し（カテゴリ名）の既定言語
pub const DEFAULT_LABEL_LANGUAGE: &str = "Thai";

/// 抽出プロンプト生成
///
/// 画像内の全テキストを読み取り、書類の種類に合った見出しごとに
/// まとめたJSONだけを返すよう指示する。複数枚の書類が写っている場合は
/// 1枚 = 1オブジェクトの配列で返させる。
///
/// # Arguments
/// * `label_language` - 見出しに使う言語名（例: "Thai", "Japanese"）
pub fn build_extraction_prompt(label_language: &str) -> String {
    let language = if label_language.trim().is_empty() {
        DEFAULT_LABEL_LANGUAGE
    } else {
        label_language.trim()
    };

    format!(
        r#"You are an expert in advanced OCR and document data extraction.
Read and extract ALL text from this document image.

After extracting the text, group it into categories that fit the type of document you see.
If the image contains several clearly separate documents or pages, reply with a JSON array
of objects, one object per document.
If there is only one document or page, reply with a single JSON object
(an array holding one object is also acceptable).

Reply with JSON only. Keys are the category names written in {language};
values are the extracted data (nested objects and arrays are allowed).
Do not add markdown, code fences, or any explanation outside the JSON."#
    )
}
