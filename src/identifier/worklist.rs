//! 作業リストファイルの読み書き

use crate::error::{BackfillError, Result};
use crate::store::write_json_pretty;
use image_backfill_common::{Collection, WorkItem, WorkList};
use std::path::Path;

pub fn write_work_list(path: &Path, collection: Collection, items: Vec<WorkItem>) -> Result<WorkList> {
    let timestamp = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
    let list = WorkList::new(collection, items, timestamp);
    write_json_pretty(path, &list.to_json()?)?;
    Ok(list)
}

pub fn load_work_list(path: &Path, collection: Collection) -> Result<WorkList> {
    if !path.exists() {
        return Err(BackfillError::WorkListNotFound(path.display().to_string()));
    }

    let content = std::fs::read_to_string(path)?;
    let value: serde_json::Value = serde_json::from_str(&content)
        .map_err(|e| BackfillError::InvalidWorkList(format!("{}: {}", path.display(), e)))?;

    let list = WorkList::from_json(value, collection)
        .map_err(|e| BackfillError::InvalidWorkList(format!("{}: {}", path.display(), e)))?;

    if list.items.is_empty() {
        return Err(BackfillError::InvalidWorkList(format!(
            "{}: {} が0件です",
            path.display(),
            collection.key()
        )));
    }

    Ok(list)
}

/// 前回の作業リストが残っていれば削除
pub fn remove_work_list(path: &Path) -> Result<bool> {
    if path.exists() {
        std::fs::remove_file(path)?;
        Ok(true)
    } else {
        Ok(false)
    }
}
