use crate::error::{BackfillError, Result};
use image_backfill_common::Collection;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// 画像生成サービスURLを上書きする環境変数
pub const SERVICE_URL_ENV: &str = "IMAGE_GENERATION_API";

pub const DEFAULT_SERVICE_URL: &str =
    "https://image-generation-service-856401495068.us-central1.run.app";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service_url: String,
    pub batch_size: usize,
    pub max_concurrency: usize,
    /// バッチ内で次の項目を開始するまでの間隔
    pub stagger_ms: u64,
    /// バッチ間の待機時間
    pub batch_delay_ms: u64,
    pub timeout_seconds: u64,
    /// 1回の実行で生成する上限件数（0は無制限）
    pub max_items: usize,
    /// 生成失敗時に設定する代替画像URL
    pub placeholder_url: Option<String>,
    pub data_dir: PathBuf,
    pub temp_dir: PathBuf,
    pub logs_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_url: DEFAULT_SERVICE_URL.into(),
            batch_size: 5,
            max_concurrency: 3,
            stagger_ms: 300,
            batch_delay_ms: 3000,
            timeout_seconds: 60,
            max_items: 20,
            placeholder_url: None,
            data_dir: PathBuf::from("data"),
            temp_dir: PathBuf::from("temp"),
            logs_dir: PathBuf::from("logs"),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_service_url_override(std::env::var(SERVICE_URL_ENV).ok());
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|e| BackfillError::Config(format!("{}: {}", path.display(), e)))?;
        Ok(config)
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
            .ok_or_else(|| BackfillError::Config("ホームディレクトリが見つかりません".into()))?;
        Ok(home.join(".config").join("image-backfill").join("config.json"))
    }

    /// 環境変数の値が空でなければサービスURLを上書き
    pub fn apply_service_url_override(&mut self, value: Option<String>) {
        if let Some(url) = value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
            self.service_url = url;
        }
    }

    pub fn set_service_url(&mut self, url: String) -> Result<()> {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(BackfillError::Config(format!("URLが不正です: {}", url)));
        }
        self.service_url = url;
        self.save()
    }

    pub fn store_path(&self, collection: Collection) -> PathBuf {
        self.data_dir.join(format!("{}.json", collection.key()))
    }

    pub fn work_list_path(&self, collection: Collection) -> PathBuf {
        self.temp_dir.join(collection.work_list_file_name())
    }

    pub fn max_items_limit(&self) -> Option<usize> {
        (self.max_items > 0).then_some(self.max_items)
    }
}
