//! バックアップファイル管理
//!
//! 上書き直前のストアを `<path>.backup-<epoch_ms>.json` として複製する。
//! バックアップは手動復旧用で、パイプラインからは読み戻さない。

use crate::error::Result;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const BACKUP_MARKER: &str = ".backup-";

#[derive(Debug, Clone, PartialEq)]
pub struct BackupInfo {
    pub path: PathBuf,
    pub epoch_ms: i64,
    pub size: u64,
}

fn file_name_of(path: &Path) -> OsString {
    path.file_name().map(OsString::from).unwrap_or_default()
}

/// バックアップファイルのパス
pub fn backup_path_for(path: &Path, epoch_ms: i64, sequence: usize) -> PathBuf {
    let mut name = file_name_of(path);
    if sequence == 0 {
        name.push(format!("{}{}.json", BACKUP_MARKER, epoch_ms));
    } else {
        name.push(format!("{}{}-{}.json", BACKUP_MARKER, epoch_ms, sequence));
    }
    path.with_file_name(name)
}

/// 現在のファイルをバックアップ
///
/// 同じミリ秒で既に存在する場合は連番を付ける。
pub fn create_backup(path: &Path) -> Result<PathBuf> {
    let epoch_ms = chrono::Utc::now().timestamp_millis();

    let mut sequence = 0;
    let mut backup = backup_path_for(path, epoch_ms, sequence);
    while backup.exists() {
        sequence += 1;
        backup = backup_path_for(path, epoch_ms, sequence);
    }

    std::fs::copy(path, &backup)?;
    Ok(backup)
}

fn parse_epoch(file_name: &str, prefix: &str) -> Option<i64> {
    let rest = file_name.strip_prefix(prefix)?.strip_suffix(".json")?;
    rest.split('-').next()?.parse().ok()
}

/// ストアのバックアップ一覧（新しい順）
pub fn list_backups(path: &Path) -> Result<Vec<BackupInfo>> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let prefix = format!("{}{}", file_name_of(path).to_string_lossy(), BACKUP_MARKER);

    let mut backups: Vec<BackupInfo> = WalkDir::new(&dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().to_string();
            let epoch_ms = parse_epoch(&name, &prefix)?;
            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            Some(BackupInfo {
                path: entry.path().to_path_buf(),
                epoch_ms,
                size,
            })
        })
        .collect();

    backups.sort_by(|a, b| b.epoch_ms.cmp(&a.epoch_ms).then_with(|| b.path.cmp(&a.path)));
    Ok(backups)
}
