//! 画像欠損レコードの識別
//!
//! レコードストアから `imageUrl` が空・未設定のレコードを抽出し、
//! 作業リストファイルとして書き出す。

mod worklist;

pub use worklist::{load_work_list, remove_work_list, write_work_list};

use crate::error::Result;
use crate::store::RecordStore;
use image_backfill_common::{Collection, Record, WorkItem, WorkList};
use std::collections::HashSet;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct Identification {
    pub total_records: usize,
    /// 上限適用前の該当件数
    pub missing: usize,
    pub items: Vec<WorkItem>,
}

impl Identification {
    pub fn truncated(&self) -> bool {
        self.items.len() < self.missing
    }
}

/// 条件に合うレコードを作業項目に射影する
///
/// 元の順序を保ち、`max_items` を超えた分は捨てる。
/// 同じ識別子のレコードは最初の1件だけを採用する。
pub fn select_work_items<F>(store: &RecordStore, max_items: Option<usize>, predicate: F) -> Identification
where
    F: Fn(&Record, &str) -> bool,
{
    let collection = store.collection();
    let mut seen = HashSet::new();
    let mut matched: Vec<WorkItem> = Vec::new();

    for record in store.records() {
        let identity = store.identity_of(record);
        if !predicate(record, &identity) {
            continue;
        }
        if !seen.insert(identity.clone()) {
            tracing::warn!(id = %identity, "duplicate record identity; only the first record is queued");
            continue;
        }
        matched.push(WorkItem::from_record(collection, record, identity));
    }

    let missing = matched.len();
    let items = match max_items {
        Some(limit) => matched.into_iter().take(limit).collect(),
        None => matched,
    };

    Identification {
        total_records: store.records().len(),
        missing,
        items,
    }
}

pub fn identify(store_path: &Path, collection: Collection, max_items: Option<usize>) -> Result<Identification> {
    let store = RecordStore::load(store_path, collection)?;
    Ok(select_work_items(&store, max_items, |record, _| record.needs_image()))
}

/// `identify` コマンド本体
///
/// 該当なしの場合は作業リストを作らず（古いものは削除し）`Ok(None)` を返す。
pub fn run_identify(
    store_path: &Path,
    work_list_path: &Path,
    collection: Collection,
    max_items: Option<usize>,
) -> Result<Option<WorkList>> {
    println!("- 画像のない{}を検索中... ({})", collection, store_path.display());
    let found = identify(store_path, collection, max_items)?;
    println!(
        "✔ {}件中 {}件に画像がありません",
        found.total_records, found.missing
    );

    if found.items.is_empty() {
        if remove_work_list(work_list_path)? {
            tracing::debug!(path = %work_list_path.display(), "stale work list removed");
        }
        println!("✅ すべての{}に画像があります。処理は不要です", collection);
        return Ok(None);
    }

    if found.truncated() {
        println!(
            "- コスト抑制のため {}件に制限します（残り{}件は次回）",
            found.items.len(),
            found.missing - found.items.len()
        );
    }

    let list = write_work_list(work_list_path, collection, found.items)?;
    println!("✔ 作業リストを保存: {} ({}件)", work_list_path.display(), list.count);
    Ok(Some(list))
}
