//! HTTP通信
//!
//! 抽出クライアントは `Transport` 越しにJSONをPOSTする。
//! 本番は reqwest、テストは応答を台本どおり返す実装を使う。

use scan_extract_common::ExtractError;
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// 通信エラー（すべてリトライ対象）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("HTTP error! status: {status}")]
    Status { status: u16, body: String },

    #[error("接続エラー: {0}")]
    Connection(String),

    #[error("レスポンスがJSONではありません: {0}")]
    Decode(String),
}

impl From<TransportError> for ExtractError {
    fn from(err: TransportError) -> Self {
        ExtractError::Transport(err.to_string())
    }
}

pub trait Transport {
    /// JSONをPOSTし、成功ステータスのJSON応答を返す
    fn post_json(
        &self,
        url: &str,
        body: &Value,
    ) -> impl Future<Output = Result<Value, TransportError>> + Send;
}

/// reqwest による実装
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    async fn post_json(&self, url: &str, body: &Value) -> Result<Value, TransportError> {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| TransportError::Connection(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| TransportError::Decode(e.without_url().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_error_display() {
        let err = TransportError::Status { status: 503, body: "unavailable".into() };
        assert_eq!(err.to_string(), "HTTP error! status: 503");
    }

    #[test]
    fn test_into_extract_error() {
        let err: ExtractError = TransportError::Connection("refused".into()).into();
        assert_eq!(err, ExtractError::Transport("接続エラー: refused".into()));
        assert_eq!(err.kind(), "transport");
    }
}
