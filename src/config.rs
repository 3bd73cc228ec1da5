use crate::error::{Result, ScanError};
use scan_extract_common::request::{DEFAULT_ENDPOINT, DEFAULT_MODEL};
use scan_extract_common::DEFAULT_LABEL_LANGUAGE;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::extractor::DEFAULT_MAX_ATTEMPTS;

/// APIキーを上書きする環境変数
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub api_key: Option<String>,
    pub model: String,
    pub endpoint: String,
    pub max_attempts: usize,
    pub timeout_seconds: u64,
    pub label_language: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.into(),
            endpoint: DEFAULT_ENDPOINT.into(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            timeout_seconds: 120,
            label_language: DEFAULT_LABEL_LANGUAGE.into(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// 指定パスから読み込み（ファイルがなければ既定値）
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = serde_json::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| ScanError::Config("ホームディレクトリが見つかりません".into()))?;
        Ok(home.join(".config").join("scan-extract").join("config.json"))
    }

    /// APIキーを取得（環境変数を優先）
    ///
    /// 未設定の場合はNone。未設定の扱いは抽出クライアントが決める。
    pub fn get_api_key(&self) -> Option<String> {
        Self::resolve_api_key(std::env::var(API_KEY_ENV).ok(), self.api_key.as_deref())
    }

    fn resolve_api_key(env_value: Option<String>, stored: Option<&str>) -> Option<String> {
        env_value
            .filter(|k| !k.trim().is_empty())
            .or_else(|| stored.map(str::to_string))
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
    }

    pub fn set_api_key(&mut self, key: String) -> Result<()> {
        self.api_key = Some(key);
        self.save()
    }
}
