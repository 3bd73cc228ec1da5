//! エラー型定義
//!
//! - `Error`: 画像・Data URL・JSONなど共通処理のエラー
//! - `ExtractError`: 抽出処理の失敗理由（UIには単一メッセージで表示）

use thiserror::Error;

/// UIに表示する汎用エラーメッセージ
///
/// 失敗理由はログとテストのために`ExtractError`で区別するが、
/// 利用者にはこの1文だけを見せる。
pub const USER_FACING_ERROR: &str =
    "解析に失敗しました（APIキーまたはサービスの状態を確認してください）";

/// CLIが失敗理由の分類を標準エラーに出すときの行頭
///
/// デスクトップはこの行を読んで `ExtractError::from_kind` で復元する。
pub const FAILURE_KIND_PREFIX: &str = "failure-kind: ";

/// 共通エラー型
#[derive(Error, Debug)]
pub enum Error {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Data URL error: {0}")]
    DataUrl(String),

    #[error("Image error: {0}")]
    Image(String),

    #[error("Crop geometry error: {0}")]
    Geometry(String),
}

/// Result型エイリアス
pub type Result<T> = std::result::Result<T, Error>;

/// 抽出処理の失敗理由
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractError {
    /// APIキー未設定（ネットワーク呼び出し前に検出）
    #[error("APIキーが設定されていません")]
    MissingCredential,

    /// HTTP/通信エラー（リトライ上限到達後）
    #[error("通信エラー: {0}")]
    Transport(String),

    /// レスポンスにテキストが含まれていない
    #[error("AIからの応答テキストがありません")]
    EmptyResponse,

    /// コードフェンス除去後もJSONとして解釈できない
    #[error("応答JSONを解析できません: {0}")]
    MalformedData(String),
}

impl ExtractError {
    /// ログ用の短い分類名
    pub fn kind(&self) -> &'static str {
        match self {
            ExtractError::MissingCredential => "configuration",
            ExtractError::Transport(_) => "transport",
            ExtractError::EmptyResponse => "empty_response",
            ExtractError::MalformedData(_) => "malformed_data",
        }
    }

    /// `kind()` の分類名から復元する（詳細は文字列で受け取る）
    pub fn from_kind(kind: &str, detail: impl Into<String>) -> Option<Self> {
        match kind.trim() {
            "configuration" => Some(ExtractError::MissingCredential),
            "transport" => Some(ExtractError::Transport(detail.into())),
            "empty_response" => Some(ExtractError::EmptyResponse),
            "malformed_data" => Some(ExtractError::MalformedData(detail.into())),
            _ => None,
        }
    }

    /// UIに表示するメッセージ（理由によらず共通）
    pub fn user_message(&self) -> &'static str {
        USER_FACING_ERROR
    }
}
