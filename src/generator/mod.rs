//! バッチ画像生成モジュール
//!
//! 作業リストを固定サイズのバッチに分け、バッチ内はセマフォで同時実行数を制限して
//! 画像生成サービスを呼び出す。項目ごとの失敗は結果として記録し、バッチは止めない。

pub mod client;
mod log;
mod types;

pub use client::{HttpImageGenerator, ImageGenerator};
pub use log::write_generation_log;
pub use types::{GenerateOptions, RunSummary};

use crate::error::Result;
use crate::identifier::load_work_list;
use crate::store::{merge_results, RecordStore};
use image_backfill_common::{Collection, GenerationResult, WorkItem};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::sleep;

fn make_progress_bar(total: usize, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::with_template("{spinner:.cyan} [{elapsed_precise}] {bar:30} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    pb.set_draw_target(ProgressDrawTarget::stderr_with_hz(12));
    pb
}

/// 進捗バー表示中はバーの上に、非表示なら標準出力に出す
fn report(progress: &ProgressBar, line: String) {
    if progress.is_hidden() {
        println!("{}", line);
    } else {
        progress.println(line);
    }
}

async fn generate_one(
    generator: Arc<dyn ImageGenerator>,
    item: &WorkItem,
    progress: &ProgressBar,
) -> GenerationResult {
    let result = match generator.generate(item).await {
        Ok(image) => GenerationResult::succeeded(item, image),
        Err(e) => GenerationResult::failed(item, e.to_string()),
    };

    match (&result.image_url, &result.error) {
        (Some(url), _) => report(progress, format!("  ✔ {} ({}): {}", result.label, result.id, url)),
        (None, error) => report(
            progress,
            format!(
                "  ❌ {} ({}): {}",
                result.label,
                result.id,
                error.as_deref().unwrap_or("unknown error")
            ),
        ),
    }
    progress.inc(1);
    result
}

/// 1バッチを処理
///
/// 投入は入力順で、2件目以降は `stagger` だけ間隔を空ける。
/// 結果は完了順に並ぶ。
async fn process_batch(
    batch: &[WorkItem],
    generator: &Arc<dyn ImageGenerator>,
    options: &GenerateOptions,
    progress: &ProgressBar,
) -> Vec<GenerationResult> {
    let semaphore = Arc::new(Semaphore::new(options.max_concurrency));
    let mut tasks = JoinSet::new();
    let mut results = Vec::with_capacity(batch.len());
    let mut completed = vec![false; batch.len()];

    for (index, item) in batch.iter().enumerate() {
        if index > 0 && !options.stagger.is_zero() {
            sleep(options.stagger).await;
        }

        let permit = match Arc::clone(&semaphore).acquire_owned().await {
            Ok(permit) => permit,
            Err(e) => {
                results.push(GenerationResult::failed(item, e.to_string()));
                completed[index] = true;
                progress.inc(1);
                continue;
            }
        };

        let generator = Arc::clone(generator);
        let item = item.clone();
        let progress = progress.clone();
        tasks.spawn(async move {
            let _permit = permit;
            (index, generate_one(generator, &item, &progress).await)
        });
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, result)) => {
                completed[index] = true;
                results.push(result);
            }
            Err(e) => tracing::error!(error = %e, "generation task aborted"),
        }
    }

    for (item, _) in batch.iter().zip(&completed).filter(|(_, done)| !**done) {
        results.push(GenerationResult::failed(item, "生成タスクが異常終了しました"));
        progress.inc(1);
    }

    results
}

/// 全作業項目の画像を生成
///
/// バッチは順番に実行し、最後以外のバッチの後で `batch_delay` 待機する。
pub async fn generate_images(
    items: &[WorkItem],
    generator: Arc<dyn ImageGenerator>,
    options: &GenerateOptions,
) -> Result<Vec<GenerationResult>> {
    options.validate()?;

    let total_batches = items.len().div_ceil(options.batch_size);
    let progress = make_progress_bar(items.len(), options.show_progress);
    let mut results = Vec::with_capacity(items.len());

    for (batch_idx, batch) in items.chunks(options.batch_size).enumerate() {
        report(
            &progress,
            format!("  バッチ {}/{}: {}件", batch_idx + 1, total_batches, batch.len()),
        );

        let batch_results = process_batch(batch, &generator, options, &progress).await;
        let succeeded = batch_results.iter().filter(|r| r.success).count();
        report(
            &progress,
            format!(
                "  バッチ {} 完了 - 成功 {} / 失敗 {}",
                batch_idx + 1,
                succeeded,
                batch_results.len() - succeeded
            ),
        );
        results.extend(batch_results);

        if batch_idx + 1 < total_batches && !options.batch_delay.is_zero() {
            tracing::debug!(delay_ms = options.batch_delay.as_millis() as u64, "waiting before next batch");
            sleep(options.batch_delay).await;
        }
    }

    progress.finish_and_clear();
    Ok(results)
}

/// `generate` の入出力先
#[derive(Debug, Clone)]
pub struct GenerateJob<'a> {
    pub collection: Collection,
    pub work_list_path: &'a Path,
    pub store_path: &'a Path,
    pub logs_dir: &'a Path,
    pub placeholder: Option<&'a str>,
}

/// `generate` コマンド本体
///
/// 1. 作業リストとストアを検証（失敗時は何も書かない）
/// 2. バッチ生成
/// 3. 結果ログを書き出し
/// 4. 成功が1件以上ならストアへ反映（バックアップ後に上書き）
pub async fn run_generate(
    job: &GenerateJob<'_>,
    generator: Arc<dyn ImageGenerator>,
    options: &GenerateOptions,
) -> Result<RunSummary> {
    options.validate()?;

    let list = load_work_list(job.work_list_path, job.collection)?;
    RecordStore::load(job.store_path, job.collection)?;

    println!("✔ {}件の{}に画像を生成します", list.items.len(), job.collection);
    println!(
        "- バッチサイズ {} / 同時実行数 {}",
        options.batch_size, options.max_concurrency
    );

    let results = generate_images(&list.items, generator, options).await?;

    let mut summary = RunSummary {
        processed: results.len(),
        succeeded: results.iter().filter(|r| r.success).count(),
        ..Default::default()
    };
    summary.failed = summary.processed - summary.succeeded;

    println!("\n=== 画像生成サマリー ===");
    println!("処理件数: {}", summary.processed);
    println!("成功: {}", summary.succeeded);
    println!("失敗: {}", summary.failed);

    let log_path = write_generation_log(job.logs_dir, job.collection, &results)?;
    println!("✔ 詳細ログ: {}", log_path.display());
    summary.log_path = Some(log_path);

    if summary.succeeded == 0 {
        println!("成功した生成がないため、{}は更新しません", job.store_path.display());
        return Ok(summary);
    }

    let outcome = merge_results(job.store_path, job.collection, &results, job.placeholder)?;
    if let Some(backup) = &outcome.backup_path {
        println!("✔ バックアップ: {}", backup.display());
    }
    println!("✔ {}件の{}の画像URLを更新しました", outcome.updated, job.collection);
    if outcome.placeholders > 0 {
        println!("- {}件に代替画像を設定しました", outcome.placeholders);
    }

    summary.updated = outcome.updated;
    summary.placeholders = outcome.placeholders;
    summary.backup_path = outcome.backup_path;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BackfillError;
    use async_trait::async_trait;
    use image_backfill_common::{AppraiserItem, GeneratedImage};
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// 同時実行数の最大値を記録するモック
    struct TrackingGenerator {
        in_flight: AtomicUsize,
        max_seen: AtomicUsize,
        admitted: Mutex<Vec<String>>,
        fail_ids: HashSet<String>,
        delay: Duration,
    }

    impl TrackingGenerator {
        fn new(fail_ids: &[&str], delay: Duration) -> Self {
            Self {
                in_flight: AtomicUsize::new(0),
                max_seen: AtomicUsize::new(0),
                admitted: Mutex::new(Vec::new()),
                fail_ids: fail_ids.iter().map(|s| s.to_string()).collect(),
                delay,
            }
        }
    }

    #[async_trait]
    impl ImageGenerator for TrackingGenerator {
        async fn generate(&self, item: &WorkItem) -> Result<GeneratedImage> {
            self.admitted.lock().unwrap().push(item.id().to_string());
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_seen.fetch_max(now, Ordering::SeqCst);

            sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.fail_ids.contains(item.id()) {
                Err(BackfillError::ApiCall("HTTP 500 Internal Server Error: boom".into()))
            } else {
                Ok(GeneratedImage {
                    image_url: format!("https://img.example/{}.jpg", item.id()),
                    original_url: None,
                })
            }
        }
    }

    fn items(count: usize) -> Vec<WorkItem> {
        (1..=count)
            .map(|i| {
                WorkItem::Appraiser(AppraiserItem {
                    id: format!("a{}", i),
                    ..Default::default()
                })
            })
            .collect()
    }

    fn fast_options(batch_size: usize, max_concurrency: usize) -> GenerateOptions {
        GenerateOptions {
            batch_size,
            max_concurrency,
            stagger: Duration::ZERO,
            batch_delay: Duration::ZERO,
            show_progress: false,
        }
    }

    #[tokio::test]
    async fn test_concurrency_never_exceeds_limit() {
        let generator = Arc::new(TrackingGenerator::new(&[], Duration::from_millis(30)));
        let results = generate_images(&items(10), generator.clone(), &fast_options(5, 3))
            .await
            .unwrap();

        assert_eq!(results.len(), 10);
        let max_seen = generator.max_seen.load(Ordering::SeqCst);
        assert!(max_seen <= 3, "max in flight {}", max_seen);
        assert!(max_seen >= 2, "requests should overlap, saw {}", max_seen);
    }

    #[tokio::test]
    async fn test_admission_follows_input_order() {
        let generator = Arc::new(TrackingGenerator::new(&[], Duration::from_millis(5)));
        generate_images(&items(4), generator.clone(), &fast_options(2, 1))
            .await
            .unwrap();

        let admitted = generator.admitted.lock().unwrap().clone();
        assert_eq!(admitted, vec!["a1", "a2", "a3", "a4"]);
    }

    #[tokio::test]
    async fn test_failures_are_isolated() {
        let generator = Arc::new(TrackingGenerator::new(&["a2"], Duration::from_millis(1)));
        let results = generate_images(&items(3), generator, &fast_options(5, 3))
            .await
            .unwrap();

        assert_eq!(results.len(), 3);
        let failed: Vec<&GenerationResult> = results.iter().filter(|r| !r.success).collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].id, "a2");
        assert!(failed[0].image_url.is_none());
        assert!(failed[0].error.as_deref().unwrap().contains("500"));
    }

    #[tokio::test]
    async fn test_batches_run_sequentially() {
        // バッチ間で重なりがなければ、同時実行数はバッチサイズを超えない
        let generator = Arc::new(TrackingGenerator::new(&[], Duration::from_millis(20)));
        generate_images(&items(6), generator.clone(), &fast_options(2, 5))
            .await
            .unwrap();

        assert!(generator.max_seen.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_invalid_options_rejected() {
        let generator = Arc::new(TrackingGenerator::new(&[], Duration::ZERO));
        let err = generate_images(&items(1), generator, &fast_options(0, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, BackfillError::Config(_)));
    }

    struct PanickingGenerator;

    #[async_trait]
    impl ImageGenerator for PanickingGenerator {
        async fn generate(&self, item: &WorkItem) -> Result<GeneratedImage> {
            if item.id() == "a1" {
                panic!("generator bug");
            }
            Ok(GeneratedImage {
                image_url: "https://img.example/ok.jpg".into(),
                original_url: None,
            })
        }
    }

    #[tokio::test]
    async fn test_panicking_task_recorded_as_failure() {
        let results = generate_images(&items(2), Arc::new(PanickingGenerator), &fast_options(5, 2))
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        let failed = results.iter().find(|r| r.id == "a1").unwrap();
        assert!(!failed.success);
        assert!(results.iter().any(|r| r.id == "a2" && r.success));
    }
}
