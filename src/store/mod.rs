//! レコードストアモジュール
//!
//! `{ <collection>: Record[] }` 形式のJSONファイルを読み書きし、
//! 生成結果を `id` で再結合して反映する。書き込み前には必ずバックアップを作成する。

pub mod backup;

use crate::error::{BackfillError, Result};
use image_backfill_common::{Collection, GenerationResult, Record};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// 整形JSON（インデント2、末尾改行）で書き込む
pub fn write_json_pretty<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut content = serde_json::to_string_pretty(value)?;
    content.push('\n');
    std::fs::write(path, content)?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct RecordStore {
    path: PathBuf,
    collection: Collection,
    /// コレクション以外のトップレベルキーも保持する
    root: Map<String, Value>,
    records: Vec<Record>,
}

impl RecordStore {
    pub fn load(path: &Path, collection: Collection) -> Result<Self> {
        if !path.exists() {
            return Err(BackfillError::StoreNotFound(path.display().to_string()));
        }

        let content = std::fs::read_to_string(path)?;
        let value: Value = serde_json::from_str(&content)
            .map_err(|e| BackfillError::InvalidStore(format!("{}: {}", path.display(), e)))?;

        let Value::Object(mut root) = value else {
            return Err(Self::shape_error(path, collection));
        };

        let records = match root.get_mut(collection.key()).map(Value::take) {
            Some(Value::Array(values)) => values
                .into_iter()
                .enumerate()
                .map(|(i, v)| match v {
                    Value::Object(fields) => Ok(Record::new(fields)),
                    _ => Err(BackfillError::InvalidStore(format!(
                        "{}: {} の {} 件目がオブジェクトではありません",
                        path.display(),
                        collection.key(),
                        i + 1
                    ))),
                })
                .collect::<Result<Vec<_>>>()?,
            _ => return Err(Self::shape_error(path, collection)),
        };

        Ok(Self {
            path: path.to_path_buf(),
            collection,
            root,
            records,
        })
    }

    fn shape_error(path: &Path, collection: Collection) -> BackfillError {
        BackfillError::InvalidStore(format!(
            "{}: {{ \"{}\": [...] }} の形式が必要です",
            path.display(),
            collection.key()
        ))
    }

    pub fn collection(&self) -> Collection {
        self.collection
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn records_mut(&mut self) -> &mut [Record] {
        &mut self.records
    }

    /// ID導出に使う地域名（レコードの `city`、なければファイル名）
    fn locality_for(&self, record: &Record) -> String {
        let city = record.string_field("city");
        if !city.trim().is_empty() {
            return city;
        }
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    /// レコードの識別子（IDがなければ決定的に導出）
    pub fn identity_of(&self, record: &Record) -> String {
        record.identity(&self.locality_for(record))
    }

    pub fn to_json(&self) -> Value {
        let mut root = self.root.clone();
        let records = self
            .records
            .iter()
            .map(|r| Value::Object(r.fields().clone()))
            .collect();
        root.insert(self.collection.key().into(), Value::Array(records));
        Value::Object(root)
    }

    pub fn save(&self) -> Result<()> {
        write_json_pretty(&self.path, &self.to_json())
    }
}

/// 反映結果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeOutcome {
    pub updated: usize,
    pub placeholders: usize,
    pub backup_path: Option<PathBuf>,
}

/// 生成結果をレコードストアへ反映
///
/// - 成功結果が1件もなければファイルには触れない（バックアップも作らない）
/// - ストアを読み直し、成功した `id → imageUrl` を適用
/// - `placeholder` 指定時は、失敗かつ画像なしのレコードに代替URLを設定
/// - 上書き前にバックアップを作成
pub fn merge_results(
    path: &Path,
    collection: Collection,
    results: &[GenerationResult],
    placeholder: Option<&str>,
) -> Result<MergeOutcome> {
    let successes: HashMap<&str, &str> = results
        .iter()
        .filter(|r| r.success)
        .filter_map(|r| r.image_url.as_deref().map(|url| (r.id.as_str(), url)))
        .collect();

    if successes.is_empty() {
        tracing::info!(store = %path.display(), "no successful results; store left untouched");
        return Ok(MergeOutcome::default());
    }

    let failed: HashSet<&str> = results
        .iter()
        .filter(|r| !r.success)
        .map(|r| r.id.as_str())
        .collect();

    let mut store = RecordStore::load(path, collection)?;
    let identities: Vec<String> = store.records().iter().map(|r| store.identity_of(r)).collect();

    let mut outcome = MergeOutcome::default();
    for (record, identity) in store.records_mut().iter_mut().zip(&identities) {
        if let Some(url) = successes.get(identity.as_str()) {
            if record.id().is_none() {
                record.set_id(identity);
            }
            if record.apply_image_url(url) {
                outcome.updated += 1;
            }
        } else if let Some(placeholder) = placeholder {
            if failed.contains(identity.as_str()) && record.needs_image() {
                record.migrate_legacy_image();
                if record.needs_image() {
                    record.apply_image_url(placeholder);
                    outcome.placeholders += 1;
                }
            }
        }
    }

    let backup_path = backup::create_backup(path)?;
    tracing::debug!(backup = %backup_path.display(), "backup created");
    store.save()?;

    outcome.backup_path = Some(backup_path);
    Ok(outcome)
}
