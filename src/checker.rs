//! 画像URLの生存確認
//!
//! 設定済みの `imageUrl` に HEAD リクエストを送り、リンク切れを検出する。

use crate::error::{BackfillError, Result};
use crate::identifier::{select_work_items, write_work_list};
use crate::store::RecordStore;
use async_trait::async_trait;
use image_backfill_common::{Collection, WorkList};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageStatus {
    Ok,
    Missing,
    Broken(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageCheck {
    pub id: String,
    pub image_url: Option<String>,
    pub status: ImageStatus,
}

#[derive(Debug, Clone, Default)]
pub struct CheckReport {
    /// ストア内の順序
    pub checks: Vec<ImageCheck>,
}

impl CheckReport {
    pub fn ok_count(&self) -> usize {
        self.count(|s| *s == ImageStatus::Ok)
    }

    pub fn missing_count(&self) -> usize {
        self.count(|s| *s == ImageStatus::Missing)
    }

    pub fn broken_count(&self) -> usize {
        self.count(|s| matches!(s, ImageStatus::Broken(_)))
    }

    /// 再生成が必要なレコードのID
    pub fn needs_regeneration(&self) -> HashSet<String> {
        self.checks
            .iter()
            .filter(|c| c.status != ImageStatus::Ok)
            .map(|c| c.id.clone())
            .collect()
    }

    fn count<F: Fn(&ImageStatus) -> bool>(&self, f: F) -> usize {
        self.checks.iter().filter(|c| f(&c.status)).count()
    }
}

/// URL 1件の確認
#[async_trait]
pub trait ImageUrlProbe: Send + Sync {
    /// 到達可能なら `Ok(())`、そうでなければ理由
    async fn probe(&self, url: &str) -> std::result::Result<(), String>;
}

pub struct HttpProbe {
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ImageUrlProbe for HttpProbe {
    async fn probe(&self, url: &str) -> std::result::Result<(), String> {
        let response = self.client.head(url).send().await.map_err(|e| e.to_string())?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(format!("HTTP {}", status))
        }
    }
}

/// ストア内の全レコードの画像URLを確認
pub async fn check_store(
    path: &Path,
    collection: Collection,
    probe: Arc<dyn ImageUrlProbe>,
    concurrency: usize,
) -> Result<CheckReport> {
    if concurrency == 0 {
        return Err(BackfillError::Config("同時実行数は1以上にしてください".into()));
    }

    let store = RecordStore::load(path, collection)?;
    let mut checks: Vec<ImageCheck> = store
        .records()
        .iter()
        .map(|record| {
            let image_url = record.image_url().map(str::to_string);
            ImageCheck {
                id: store.identity_of(record),
                status: if image_url.is_some() { ImageStatus::Ok } else { ImageStatus::Missing },
                image_url,
            }
        })
        .collect();

    let semaphore = Arc::new(Semaphore::new(concurrency));
    let mut tasks = JoinSet::new();
    let mut pending = vec![false; checks.len()];
    for (index, check) in checks.iter().enumerate() {
        let Some(url) = check.image_url.clone() else {
            continue;
        };
        pending[index] = true;
        let semaphore = Arc::clone(&semaphore);
        let probe = Arc::clone(&probe);
        tasks.spawn(async move {
            let outcome = match semaphore.acquire_owned().await {
                Ok(_permit) => probe.probe(&url).await,
                Err(e) => Err(e.to_string()),
            };
            (index, outcome)
        });
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, outcome)) => {
                pending[index] = false;
                if let Err(reason) = outcome {
                    tracing::debug!(id = %checks[index].id, reason = %reason, "broken image url");
                    checks[index].status = ImageStatus::Broken(reason);
                }
            }
            Err(e) => tracing::error!(error = %e, "probe task aborted"),
        }
    }

    // 結果を返さなかった確認は正常とみなさない
    for (check, _) in checks.iter_mut().zip(&pending).filter(|(_, p)| **p) {
        check.status = ImageStatus::Broken("確認タスクが異常終了しました".into());
    }

    Ok(CheckReport { checks })
}

/// `check` コマンド本体
///
/// `work_list_path` 指定時は、画像なし・リンク切れのレコードを作業リストに書き出す。
pub async fn run_check(
    store_path: &Path,
    collection: Collection,
    probe: Arc<dyn ImageUrlProbe>,
    concurrency: usize,
    work_list_path: Option<&Path>,
) -> Result<(CheckReport, Option<WorkList>)> {
    println!("- {}の画像URLを確認中... ({})", collection, store_path.display());
    let report = check_store(store_path, collection, probe, concurrency).await?;

    for check in &report.checks {
        match &check.status {
            ImageStatus::Ok => {}
            ImageStatus::Missing => println!("  ❌ {}: 画像なし", check.id),
            ImageStatus::Broken(reason) => println!(
                "  ❌ {}: {} ({})",
                check.id,
                check.image_url.as_deref().unwrap_or_default(),
                reason
            ),
        }
    }
    println!(
        "✔ 正常 {} / 画像なし {} / リンク切れ {}",
        report.ok_count(),
        report.missing_count(),
        report.broken_count()
    );

    let Some(work_list_path) = work_list_path else {
        return Ok((report, None));
    };

    let targets = report.needs_regeneration();
    if targets.is_empty() {
        println!("✅ 再生成が必要な{}はありません", collection);
        return Ok((report, None));
    }

    let store = RecordStore::load(store_path, collection)?;
    let selected = select_work_items(&store, None, |_, identity| targets.contains(identity));
    let list = write_work_list(work_list_path, collection, selected.items)?;
    println!("✔ 作業リストを保存: {} ({}件)", work_list_path.display(), list.count);
    Ok((report, Some(list)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    /// `broken` を含むURLだけ失敗させる
    struct FakeProbe;

    #[async_trait]
    impl ImageUrlProbe for FakeProbe {
        async fn probe(&self, url: &str) -> std::result::Result<(), String> {
            if url.contains("broken") {
                Err("HTTP 404 Not Found".into())
            } else {
                Ok(())
            }
        }
    }

    fn write_store(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("locations.json");
        let value = json!({"locations": [
            {"id": "l1", "name": "A", "imageUrl": "https://img.example/ok.jpg"},
            {"id": "l2", "name": "B", "imageUrl": "https://img.example/broken.jpg"},
            {"id": "l3", "name": "C", "imageUrl": ""}
        ]});
        std::fs::write(&path, serde_json::to_string_pretty(&value).unwrap()).unwrap();
        path
    }

    #[tokio::test]
    async fn test_check_store_classifies_records() {
        let dir = tempdir().unwrap();
        let path = write_store(dir.path());

        let report = check_store(&path, Collection::Locations, Arc::new(FakeProbe), 2)
            .await
            .unwrap();

        assert_eq!(report.checks.len(), 3);
        assert_eq!(report.checks[0].status, ImageStatus::Ok);
        assert_eq!(
            report.checks[1].status,
            ImageStatus::Broken("HTTP 404 Not Found".into())
        );
        assert_eq!(report.checks[2].status, ImageStatus::Missing);
        assert_eq!(
            (report.ok_count(), report.missing_count(), report.broken_count()),
            (1, 1, 1)
        );
    }

    #[tokio::test]
    async fn test_run_check_writes_work_list() {
        let dir = tempdir().unwrap();
        let path = write_store(dir.path());
        let list_path = dir.path().join("list.json");

        let (_, list) = run_check(
            &path,
            Collection::Locations,
            Arc::new(FakeProbe),
            2,
            Some(&list_path),
        )
        .await
        .unwrap();

        let list = list.unwrap();
        let ids: Vec<&str> = list.items.iter().map(|i| i.id()).collect();
        assert_eq!(ids, vec!["l2", "l3"]);
        assert!(list_path.exists());
    }

    /// 特定のURLで異常終了する
    struct PanickingProbe;

    #[async_trait]
    impl ImageUrlProbe for PanickingProbe {
        async fn probe(&self, url: &str) -> std::result::Result<(), String> {
            if url.contains("broken") {
                panic!("probe bug");
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_aborted_check_is_not_reported_ok() {
        let dir = tempdir().unwrap();
        let path = write_store(dir.path());

        let report = check_store(&path, Collection::Locations, Arc::new(PanickingProbe), 2)
            .await
            .unwrap();

        assert_eq!(report.checks[0].status, ImageStatus::Ok);
        assert_eq!(
            report.checks[1].status,
            ImageStatus::Broken("確認タスクが異常終了しました".into())
        );
        assert_eq!(report.checks[2].status, ImageStatus::Missing);
        assert!(report.needs_regeneration().contains("l2"));
    }

    #[tokio::test]
    async fn test_check_rejects_zero_concurrency() {
        let dir = tempdir().unwrap();
        let path = write_store(dir.path());
        let result = check_store(&path, Collection::Locations, Arc::new(FakeProbe), 0).await;
        assert!(matches!(result, Err(BackfillError::Config(_))));
    }
}
