//! 生成結果ログの書き出し

use crate::error::Result;
use crate::store::write_json_pretty;
use image_backfill_common::{Collection, GenerationLog, GenerationResult};
use std::path::{Path, PathBuf};

/// `<logs_dir>/<prefix>-<epoch_ms>.json` に全結果を書き出す
pub fn write_generation_log(
    logs_dir: &Path,
    collection: Collection,
    results: &[GenerationResult],
) -> Result<PathBuf> {
    let now = chrono::Utc::now();
    let log = GenerationLog::from_results(
        collection,
        now.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        results,
    );

    let path = logs_dir.join(format!(
        "{}-{}.json",
        collection.log_prefix(),
        now.timestamp_millis()
    ));
    write_json_pretty(&path, &log)?;
    Ok(path)
}
