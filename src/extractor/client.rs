//! Gemini 抽出クライアント
//!
//! 1. APIキー確認（未設定ならネットワークに出る前に失敗）
//! 2. リクエスト作成（指示文 + 画像 + JSON応答指定）
//! 3. リトライ付きでPOST
//! 4. 応答テキストを抽出結果にパース

use scan_extract_common::request::{generate_content_url, GeminiRequest};
use scan_extract_common::{parse_extraction_response, ExtractError, ExtractedImage, ExtractionResult};
use std::time::Duration;
use tracing::{debug, error, info};

use super::retry::{retry_with_backoff, Sleeper, TokioSleeper};
use super::transport::{HttpTransport, Transport};
use crate::config::Config;
use crate::error::{Result, ScanError};

/// クライアント設定
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub api_key: Option<String>,
    pub model: String,
    pub endpoint: String,
    pub max_attempts: usize,
    pub label_language: String,
}

impl ClientSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            api_key: config.get_api_key(),
            model: config.model.clone(),
            endpoint: config.endpoint.clone(),
            max_attempts: config.max_attempts,
            label_language: config.label_language.clone(),
        }
    }
}

pub struct ExtractionClient<T, S = TokioSleeper> {
    settings: ClientSettings,
    transport: T,
    sleeper: S,
}

impl ExtractionClient<HttpTransport, TokioSleeper> {
    /// 設定ファイル・環境変数から作成
    pub fn from_config(config: &Config) -> Result<Self> {
        let transport = HttpTransport::new(Duration::from_secs(config.timeout_seconds))
            .map_err(|e| ScanError::HttpClient(e.to_string()))?;
        Ok(Self::new(ClientSettings::from_config(config), transport, TokioSleeper))
    }
}

impl<T: Transport, S: Sleeper> ExtractionClient<T, S> {
    pub fn new(settings: ClientSettings, transport: T, sleeper: S) -> Self {
        Self { settings, transport, sleeper }
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    /// APIキーを確認
    pub fn check_credential(&self) -> std::result::Result<&str, ExtractError> {
        self.settings
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or(ExtractError::MissingCredential)
    }

    /// 画像から構造化データを抽出
    pub async fn extract(&self, image: &ExtractedImage) -> std::result::Result<ExtractionResult, ExtractError> {
        let outcome = self.extract_inner(image).await;
        match &outcome {
            Ok(result) => info!(documents = result.documents().len(), "Extraction succeeded"),
            Err(err) => error!(kind = err.kind(), error = %err, "Extraction failed"),
        }
        outcome
    }

    async fn extract_inner(&self, image: &ExtractedImage) -> std::result::Result<ExtractionResult, ExtractError> {
        let api_key = self.check_credential()?;

        let request = GeminiRequest::extraction(image, &self.settings.label_language);
        let body = serde_json::to_value(&request)
            .map_err(|e| ExtractError::Transport(format!("リクエスト生成に失敗: {}", e)))?;
        let url = generate_content_url(&self.settings.endpoint, &self.settings.model, api_key);

        debug!(
            model = %self.settings.model,
            image_bytes = image.bytes().len(),
            mime = image.mime_type(),
            "Sending extraction request"
        );

        let url = url.as_str();
        let body = &body;
        let payload = retry_with_backoff(
            self.settings.max_attempts,
            |attempt| {
                debug!(attempt = attempt + 1, "POST generateContent");
                self.transport.post_json(url, body)
            },
            |wait| self.sleeper.sleep(wait),
        )
        .await?;

        parse_extraction_response(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::transport::TransportError;
    use scan_extract_common::DocValue;
    use serde_json::{json, Value};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// 台本どおりに応答を返す通信
    #[derive(Default)]
    struct ScriptedTransport {
        script: Mutex<VecDeque<std::result::Result<Value, TransportError>>>,
        requests: Mutex<Vec<(String, Value)>>,
    }

    impl ScriptedTransport {
        fn new(script: Vec<std::result::Result<Value, TransportError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                requests: Mutex::default(),
            }
        }

        fn calls(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    impl Transport for ScriptedTransport {
        async fn post_json(&self, url: &str, body: &Value) -> std::result::Result<Value, TransportError> {
            self.requests.lock().unwrap().push((url.to_string(), body.clone()));
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(TransportError::Connection("script exhausted".into())))
        }
    }

    /// 待たずに待機時間だけ記録する
    #[derive(Default)]
    struct RecordingSleeper {
        waits: Mutex<Vec<Duration>>,
    }

    impl Sleeper for RecordingSleeper {
        fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
            self.waits.lock().unwrap().push(duration);
            std::future::ready(())
        }
    }

    fn settings(api_key: Option<&str>) -> ClientSettings {
        ClientSettings {
            api_key: api_key.map(str::to_string),
            model: "gemini-2.5-flash".into(),
            endpoint: "https://example.test/v1beta".into(),
            max_attempts: 5,
            label_language: "Thai".into(),
        }
    }

    fn client(
        api_key: Option<&str>,
        script: Vec<std::result::Result<Value, TransportError>>,
    ) -> ExtractionClient<ScriptedTransport, RecordingSleeper> {
        ExtractionClient::new(settings(api_key), ScriptedTransport::new(script), RecordingSleeper::default())
    }

    fn image() -> ExtractedImage {
        ExtractedImage::new(vec![0xff, 0xd8, 0xff], "image/jpeg", 900, 720)
    }

    fn reply(text: &str) -> Value {
        json!({"candidates": [{"content": {"parts": [{"text": text}]}}]})
    }

    fn unavailable() -> std::result::Result<Value, TransportError> {
        Err(TransportError::Status { status: 503, body: String::new() })
    }

    #[tokio::test]
    async fn test_missing_credential_makes_no_request() {
        for key in [None, Some("")] {
            let client = client(key, vec![Ok(reply("{}"))]);
            let err = client.extract(&image()).await.unwrap_err();
            assert_eq!(err, ExtractError::MissingCredential);
            assert_eq!(client.transport.calls(), 0);
        }
    }

    #[tokio::test]
    async fn test_request_shape() {
        let client = client(Some("secret"), vec![Ok(reply(r#"{"Name": "A"}"#))]);
        client.extract(&image()).await.unwrap();

        let requests = client.transport.requests.lock().unwrap();
        let (url, body) = &requests[0];
        assert_eq!(
            url,
            "https://example.test/v1beta/models/gemini-2.5-flash:generateContent?key=secret"
        );
        assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");
        let parts = body["contents"][0]["parts"].as_array().unwrap();
        assert!(parts[0]["text"].as_str().unwrap().contains("Thai"));
        assert_eq!(parts[1]["inlineData"]["mimeType"], "image/jpeg");
        assert_eq!(parts[1]["inlineData"]["data"], "/9j/");
    }

    #[tokio::test]
    async fn test_retries_then_succeeds() {
        let client = client(
            Some("k"),
            vec![unavailable(), unavailable(), Ok(reply(r#"{"Total": "42.00"}"#))],
        );
        let result = client.extract(&image()).await.unwrap();

        assert_eq!(client.transport.calls(), 3);
        assert_eq!(
            *client.sleeper.waits.lock().unwrap(),
            vec![Duration::from_secs(1), Duration::from_secs(2)]
        );
        match result {
            ExtractionResult::Single(doc) => assert_eq!(doc.get("Total"), Some(&DocValue::text("42.00"))),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_exhausted_retries_is_transport_error() {
        let client = client(Some("k"), (0..5).map(|_| unavailable()).collect());
        let err = client.extract(&image()).await.unwrap_err();

        assert_eq!(err, ExtractError::Transport("HTTP error! status: 503".into()));
        assert_eq!(client.transport.calls(), 5);
        assert_eq!(client.sleeper.waits.lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_fenced_text_is_parsed() {
        let client = client(Some("k"), vec![Ok(reply("```json\n[{\"p\": 1}, {\"p\": 2}]\n```"))]);
        let result = client.extract(&image()).await.unwrap();
        assert!(result.is_multi_page());
        assert_eq!(result.documents().len(), 2);
    }

    #[tokio::test]
    async fn test_empty_and_malformed_are_not_retried() {
        let client1 = client(Some("k"), vec![Ok(json!({"candidates": []}))]);
        assert_eq!(client1.extract(&image()).await.unwrap_err(), ExtractError::EmptyResponse);
        assert_eq!(client1.transport.calls(), 1);

        let client2 = client(Some("k"), vec![Ok(reply("not json at all"))]);
        assert!(matches!(
            client2.extract(&image()).await.unwrap_err(),
            ExtractError::MalformedData(_)
        ));
        assert_eq!(client2.transport.calls(), 1);
        assert!(client2.sleeper.waits.lock().unwrap().is_empty());
    }
}
