use scan_extract_common::ExtractError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("設定エラー: {0}")]
    Config(String),

    #[error("ファイルが見つかりません: {0}")]
    FileNotFound(String),

    #[error("画像読み込みエラー: {0}")]
    ImageLoad(String),

    #[error("引数エラー: {0}")]
    InvalidArgument(String),

    #[error("HTTPクライアント初期化エラー: {0}")]
    HttpClient(String),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Common(#[from] scan_extract_common::Error),

    #[error("JSON解析エラー: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IOエラー: {0}")]
    Io(#[from] std::io::Error),
}

impl ScanError {
    /// APIキー未設定かどうか（設定方法の案内を出すため）
    pub fn is_missing_credential(&self) -> bool {
        matches!(self, ScanError::Extract(ExtractError::MissingCredential))
    }

    /// 抽出失敗の分類（デスクトップ版が stderr から読み取る）
    pub fn failure_kind(&self) -> Option<&'static str> {
        match self {
            ScanError::Extract(err) => Some(err.kind()),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ScanError>;
