use crate::config::Config;
use crate::error::{BackfillError, Result};
use std::path::PathBuf;
use std::time::Duration;

/// バッチ生成の実行パラメータ
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    pub batch_size: usize,
    pub max_concurrency: usize,
    pub stagger: Duration,
    pub batch_delay: Duration,
    pub show_progress: bool,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl GenerateOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            batch_size: config.batch_size,
            max_concurrency: config.max_concurrency,
            stagger: Duration::from_millis(config.stagger_ms),
            batch_delay: Duration::from_millis(config.batch_delay_ms),
            show_progress: true,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(BackfillError::Config("バッチサイズは1以上にしてください".into()));
        }
        if self.max_concurrency == 0 {
            return Err(BackfillError::Config("同時実行数は1以上にしてください".into()));
        }
        Ok(())
    }
}

/// `generate` の実行結果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub updated: usize,
    pub placeholders: usize,
    pub log_path: Option<PathBuf>,
    pub backup_path: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_from_config() {
        let config = Config {
            batch_size: 2,
            stagger_ms: 0,
            ..Default::default()
        };
        let options = GenerateOptions::from_config(&config);
        assert_eq!(options.batch_size, 2);
        assert_eq!(options.max_concurrency, 3);
        assert!(options.stagger.is_zero());
        assert_eq!(options.batch_delay, Duration::from_millis(3000));
    }

    #[test]
    fn test_validate_rejects_zero() {
        let options = GenerateOptions {
            batch_size: 0,
            ..Default::default()
        };
        assert!(matches!(options.validate(), Err(BackfillError::Config(_))));

        let options = GenerateOptions {
            max_concurrency: 0,
            ..Default::default()
        };
        assert!(options.validate().is_err());
        assert!(GenerateOptions::default().validate().is_ok());
    }
}
