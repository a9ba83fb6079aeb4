//! 旧形式レコードの移行
//!
//! - IDのないレコードに決定的なIDを付与
//! - 旧フィールド `image` を `imageUrl` へ移し、旧値を `oldImage` に残す

use crate::error::Result;
use crate::store::{backup, RecordStore};
use image_backfill_common::Collection;
use std::path::{Path, PathBuf};

/// 変更の種類
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationKind {
    AssignedId,
    LegacyImage,
}

impl std::fmt::Display for MigrationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MigrationKind::AssignedId => write!(f, "ID付与"),
            MigrationKind::LegacyImage => write!(f, "image → imageUrl"),
        }
    }
}

/// 個別の変更内容
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationChange {
    pub id: String,
    pub kind: MigrationKind,
}

#[derive(Debug, Clone, Default)]
pub struct MigrationReport {
    pub total_records: usize,
    pub changes: Vec<MigrationChange>,
    /// 書き込みを行った場合のみ
    pub backup_path: Option<PathBuf>,
    pub dry_run: bool,
}

impl MigrationReport {
    pub fn changed_records(&self) -> usize {
        let mut ids: Vec<&str> = self.changes.iter().map(|c| c.id.as_str()).collect();
        ids.dedup();
        ids.len()
    }
}

pub fn migrate_store(path: &Path, collection: Collection, dry_run: bool) -> Result<MigrationReport> {
    let mut store = RecordStore::load(path, collection)?;
    let identities: Vec<String> = store.records().iter().map(|r| store.identity_of(r)).collect();

    let mut report = MigrationReport {
        total_records: identities.len(),
        dry_run,
        ..Default::default()
    };

    for (record, identity) in store.records_mut().iter_mut().zip(&identities) {
        if record.id().is_none() {
            record.set_id(identity);
            report.changes.push(MigrationChange {
                id: identity.clone(),
                kind: MigrationKind::AssignedId,
            });
        }
        if record.migrate_legacy_image() {
            report.changes.push(MigrationChange {
                id: identity.clone(),
                kind: MigrationKind::LegacyImage,
            });
        }
    }

    if dry_run || report.changes.is_empty() {
        return Ok(report);
    }

    report.backup_path = Some(backup::create_backup(path)?);
    store.save()?;
    Ok(report)
}

/// `migrate` コマンド本体
pub fn run_migrate(path: &Path, collection: Collection, dry_run: bool) -> Result<MigrationReport> {
    println!("- {}を移行中... ({})", collection, path.display());
    let report = migrate_store(path, collection, dry_run)?;

    for change in &report.changes {
        println!("  ✔ {}: {}", change.id, change.kind);
    }

    if report.changes.is_empty() {
        println!("✅ 移行が必要なレコードはありません");
    } else if report.dry_run {
        println!(
            "- ドライラン: {}件中 {}件が変更対象です（書き込みなし）",
            report.total_records,
            report.changed_records()
        );
    } else {
        if let Some(backup) = &report.backup_path {
            println!("✔ バックアップ: {}", backup.display());
        }
        println!(
            "✔ {}件中 {}件を移行しました",
            report.total_records,
            report.changed_records()
        );
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use tempfile::tempdir;

    fn write_store(dir: &Path) -> PathBuf {
        let path = dir.join("appraisers.json");
        let value = json!({"appraisers": [
            {"id": "a1", "imageUrl": "https://x/a1.jpg"},
            {"name": "Eve Stone", "city": "Boston", "image": "https://x/eve.jpg"},
            {"id": "a3", "image": "https://x/old.jpg", "imageUrl": "https://x/new.jpg"}
        ]});
        std::fs::write(&path, serde_json::to_string_pretty(&value).unwrap()).unwrap();
        path
    }

    fn read(path: &Path) -> Value {
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
    }

    #[test]
    fn test_migrate_assigns_ids_and_moves_legacy_image() {
        let dir = tempdir().unwrap();
        let path = write_store(dir.path());

        let report = migrate_store(&path, Collection::Appraisers, false).unwrap();
        assert_eq!(report.total_records, 3);
        assert_eq!(report.changed_records(), 2);
        assert!(report.backup_path.as_ref().unwrap().exists());

        let value = read(&path);
        let eve = &value["appraisers"][1];
        assert_eq!(eve["id"], json!("boston-eve-stone"));
        assert_eq!(eve["imageUrl"], json!("https://x/eve.jpg"));
        assert_eq!(eve["oldImage"], json!("https://x/eve.jpg"));
        assert!(eve.get("image").is_none());

        // 既存の imageUrl は上書きしない
        let a3 = &value["appraisers"][2];
        assert_eq!(a3["imageUrl"], json!("https://x/new.jpg"));
        assert_eq!(a3["oldImage"], json!("https://x/old.jpg"));
    }

    #[test]
    fn test_migrate_dry_run_leaves_store() {
        let dir = tempdir().unwrap();
        let path = write_store(dir.path());
        let before = std::fs::read_to_string(&path).unwrap();

        let report = migrate_store(&path, Collection::Appraisers, true).unwrap();
        assert_eq!(report.changes.len(), 3);
        assert!(report.backup_path.is_none());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), before);
        assert!(backup::list_backups(&path).unwrap().is_empty());
    }

    #[test]
    fn test_migrate_nothing_to_do() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("appraisers.json");
        std::fs::write(&path, r#"{"appraisers": [{"id": "a", "imageUrl": "https://x/a.jpg"}]}"#).unwrap();

        let report = run_migrate(&path, Collection::Appraisers, false).unwrap();
        assert!(report.changes.is_empty());
        assert!(report.backup_path.is_none());
    }
}
