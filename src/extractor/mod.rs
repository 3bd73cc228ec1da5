//! AI抽出モジュール
//!
//! Gemini generateContent に切り抜き画像を送り、構造化データを受け取る。

mod client;
mod retry;
mod transport;

pub use client::{ClientSettings, ExtractionClient};
pub use retry::{backoff_delay, retry_with_backoff, Sleeper, TokioSleeper, BACKOFF_SCHEDULE, DEFAULT_MAX_ATTEMPTS};
pub use transport::{HttpTransport, Transport, TransportError};
