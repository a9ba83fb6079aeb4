//! レコード・作業項目・生成結果の型定義
//!
//! - Collection: 対象データ種別（鑑定士 / 拠点）
//! - Record: レコードストア内の1件（任意のJSONオブジェクト）
//! - WorkItem: 画像生成リクエスト用に切り出した射影
//! - WorkList: 作業リストファイル
//! - GenerationResult / GenerationLog: 生成結果と監査ログ

use crate::error::{Error, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;
use std::str::FromStr;

lazy_static! {
    static ref NON_SLUG_CHARS: Regex = Regex::new(r"[^a-z0-9]").unwrap();
}

/// 対象データ種別
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Appraisers,
    Locations,
}

impl Collection {
    /// レコードストア・作業リスト内の配列キー
    pub fn key(&self) -> &'static str {
        match self {
            Collection::Appraisers => "appraisers",
            Collection::Locations => "locations",
        }
    }

    /// リクエストボディ内のキー
    pub fn payload_key(&self) -> &'static str {
        match self {
            Collection::Appraisers => "appraiser",
            Collection::Locations => "location",
        }
    }

    /// 画像生成サービスのエンドポイントパス
    pub fn endpoint_path(&self) -> &'static str {
        match self {
            Collection::Appraisers => "/api/generate",
            Collection::Locations => "/api/generate-location",
        }
    }

    pub fn work_list_file_name(&self) -> &'static str {
        match self {
            Collection::Appraisers => "appraisers-needing-images.json",
            Collection::Locations => "locations-needing-images.json",
        }
    }

    pub fn log_prefix(&self) -> &'static str {
        match self {
            Collection::Appraisers => "image-generation",
            Collection::Locations => "location-image-generation",
        }
    }

    /// 生成画像ファイル名の接頭辞
    pub fn filename_prefix(&self) -> &'static str {
        self.payload_key()
    }
}

impl FromStr for Collection {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "appraisers" | "appraiser" => Ok(Collection::Appraisers),
            "locations" | "location" => Ok(Collection::Locations),
            _ => Err(format!("Unknown collection: {}. Use appraisers or locations", s)),
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// 名前・地域名からID用のスラッグを生成
///
/// 小文字化し、英数字以外を `-` に置換する（連続した `-` はそのまま）。
pub fn slugify(text: &str) -> String {
    NON_SLUG_CHARS
        .replace_all(&text.trim().to_lowercase(), "-")
        .into_owned()
}

/// レコードストア内の1件
///
/// 未知のフィールドも含めて順序ごと保持し、書き戻し時に失わない。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// 文字列として取得（数値・真偽値は文字列化、それ以外は空文字）
    pub fn string_field(&self, key: &str) -> String {
        match self.0.get(key) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::Bool(b)) => b.to_string(),
            _ => String::new(),
        }
    }

    /// 文字列配列として取得（単一文字列は1要素の配列として扱う）
    pub fn string_list(&self, key: &str) -> Vec<String> {
        match self.0.get(key) {
            Some(Value::Array(values)) => values
                .iter()
                .filter_map(|v| v.as_str())
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
            _ => Vec::new(),
        }
    }

    pub fn id(&self) -> Option<String> {
        let id = self.string_field("id");
        let trimmed = id.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }

    pub fn set_id(&mut self, id: &str) {
        self.0.insert("id".into(), Value::String(id.to_string()));
    }

    /// 表示名（`name`、なければ `firstName lastName`）
    pub fn name(&self) -> String {
        let name = self.string_field("name");
        if !name.trim().is_empty() {
            return name.trim().to_string();
        }
        let full = format!(
            "{} {}",
            self.string_field("firstName").trim(),
            self.string_field("lastName").trim()
        );
        full.trim().to_string()
    }

    /// レコードの識別子
    ///
    /// `id` がなければ `<地域スラッグ>-<名前スラッグ>` を決定的に導出する。
    pub fn identity(&self, locality: &str) -> String {
        if let Some(id) = self.id() {
            return id;
        }
        let name = self.name();
        let name_part = if name.is_empty() {
            "unnamed".to_string()
        } else {
            slugify(&name)
        };
        format!("{}-{}", slugify(locality), name_part)
    }

    /// 空白でない `imageUrl`
    pub fn image_url(&self) -> Option<&str> {
        self.0
            .get("imageUrl")
            .and_then(|v| v.as_str())
            .filter(|s| !s.trim().is_empty())
    }

    pub fn needs_image(&self) -> bool {
        self.image_url().is_none()
    }

    /// 旧フィールド `image` を `imageUrl` へ移行
    ///
    /// 旧値は `oldImage` に退避し、`image` は削除する。
    /// `imageUrl` が空の場合のみ旧値を `imageUrl` に採用する。
    pub fn migrate_legacy_image(&mut self) -> bool {
        let Some(legacy) = self.0.remove("image") else {
            return false;
        };

        if let Value::String(url) = &legacy {
            if self.needs_image() && !url.trim().is_empty() {
                self.0.insert("imageUrl".into(), Value::String(url.clone()));
            }
        }
        self.0.insert("oldImage".into(), legacy);
        true
    }

    /// 生成された画像URLを適用
    ///
    /// 既存の異なる `imageUrl` は `oldImageUrl` に退避する。
    pub fn apply_image_url(&mut self, url: &str) -> bool {
        self.migrate_legacy_image();

        if let Some(current) = self.image_url() {
            if current == url {
                return false;
            }
            let previous = current.to_string();
            self.0.insert("oldImageUrl".into(), Value::String(previous));
        }
        self.0.insert("imageUrl".into(), Value::String(url.to_string()));
        true
    }
}

/// 鑑定士の作業項目
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppraiserItem {
    pub id: String,
    pub name: String,
    pub first_name: String,
    pub last_name: String,
    pub company: String,
    pub city: String,
    pub state: String,
    pub license_number: String,
    pub specialties: Vec<String>,
    pub specialty: String,
    pub experience: String,
    pub credentials: String,
    pub education: String,
}

impl AppraiserItem {
    pub fn from_record(record: &Record, id: String) -> Self {
        let specialty = record.string_field("specialty");
        let mut specialties = record.string_list("specialties");
        if specialties.is_empty() && !specialty.trim().is_empty() {
            specialties.push(specialty.trim().to_string());
        }

        Self {
            id,
            name: record.name(),
            first_name: record.string_field("firstName"),
            last_name: record.string_field("lastName"),
            company: record.string_field("company"),
            city: record.string_field("city"),
            state: record.string_field("state"),
            license_number: record.string_field("licenseNumber"),
            specialties,
            specialty,
            experience: record.string_field("experience"),
            credentials: record.string_field("credentials"),
            education: record.string_field("education"),
        }
    }
}

/// 拠点の作業項目
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LocationItem {
    pub id: String,
    pub name: String,
    pub address: String,
    pub city: String,
    pub state: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
    pub features: Vec<String>,
}

impl LocationItem {
    pub fn from_record(record: &Record, id: String) -> Self {
        Self {
            id,
            name: record.string_field("name"),
            address: record.string_field("address"),
            city: record.string_field("city"),
            state: record.string_field("state"),
            kind: record.string_field("type"),
            description: record.string_field("description"),
            features: record.string_list("features"),
        }
    }
}

/// 画像生成リクエスト用の作業項目
///
/// 元レコードへの参照は `id` のみ。結果の反映は `id` で再結合する。
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum WorkItem {
    Appraiser(AppraiserItem),
    Location(LocationItem),
}

impl WorkItem {
    pub fn from_record(collection: Collection, record: &Record, id: String) -> Self {
        match collection {
            Collection::Appraisers => WorkItem::Appraiser(AppraiserItem::from_record(record, id)),
            Collection::Locations => WorkItem::Location(LocationItem::from_record(record, id)),
        }
    }

    pub fn collection(&self) -> Collection {
        match self {
            WorkItem::Appraiser(_) => Collection::Appraisers,
            WorkItem::Location(_) => Collection::Locations,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            WorkItem::Appraiser(item) => &item.id,
            WorkItem::Location(item) => &item.id,
        }
    }

    /// 進捗表示用の名前
    pub fn label(&self) -> String {
        let name = match self {
            WorkItem::Appraiser(item) => item.name.trim(),
            WorkItem::Location(item) => item.name.trim(),
        };
        if name.is_empty() {
            self.id().to_string()
        } else {
            name.to_string()
        }
    }
}

/// 作業リストファイル `{ count, timestamp, <collection>: [...] }`
#[derive(Debug, Clone, PartialEq)]
pub struct WorkList {
    pub count: usize,
    pub timestamp: String,
    pub collection: Collection,
    pub items: Vec<WorkItem>,
}

impl WorkList {
    pub fn new(collection: Collection, items: Vec<WorkItem>, timestamp: String) -> Self {
        Self {
            count: items.len(),
            timestamp,
            collection,
            items,
        }
    }

    pub fn to_json(&self) -> Result<Value> {
        let mut root = Map::new();
        root.insert("count".into(), json!(self.count));
        root.insert("timestamp".into(), json!(self.timestamp));
        root.insert(self.collection.key().into(), serde_json::to_value(&self.items)?);
        Ok(Value::Object(root))
    }

    /// 作業リストJSONを読み込む
    ///
    /// 件数は実際の配列長を採用する。IDが空の項目は再結合できないためエラー。
    pub fn from_json(value: Value, collection: Collection) -> Result<Self> {
        let Value::Object(mut root) = value else {
            return Err(Error::Parse("作業リストがJSONオブジェクトではありません".into()));
        };

        let timestamp = root
            .get("timestamp")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        let raw_items = match root.remove(collection.key()) {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(Error::Parse(format!(
                    "作業リストに {} 配列がありません",
                    collection.key()
                )))
            }
        };

        let items: Vec<WorkItem> = match collection {
            Collection::Appraisers => serde_json::from_value::<Vec<AppraiserItem>>(Value::Array(raw_items))?
                .into_iter()
                .map(WorkItem::Appraiser)
                .collect(),
            Collection::Locations => serde_json::from_value::<Vec<LocationItem>>(Value::Array(raw_items))?
                .into_iter()
                .map(WorkItem::Location)
                .collect(),
        };

        if let Some(position) = items.iter().position(|item| item.id().trim().is_empty()) {
            return Err(Error::Parse(format!(
                "作業リストの {} 件目にIDがありません",
                position + 1
            )));
        }

        Ok(Self::new(collection, items, timestamp))
    }
}

/// 画像生成サービスの成功レスポンス
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedImage {
    pub image_url: String,
    pub original_url: Option<String>,
}

/// 1件分の生成結果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationResult {
    pub id: String,
    pub label: String,
    pub success: bool,
    pub image_url: Option<String>,
    pub original_url: Option<String>,
    pub error: Option<String>,
}

impl GenerationResult {
    pub fn succeeded(item: &WorkItem, image: GeneratedImage) -> Self {
        Self {
            id: item.id().to_string(),
            label: item.label(),
            success: true,
            image_url: Some(image.image_url),
            original_url: image.original_url,
            error: None,
        }
    }

    pub fn failed(item: &WorkItem, error: impl Into<String>) -> Self {
        Self {
            id: item.id().to_string(),
            label: item.label(),
            success: false,
            image_url: None,
            original_url: None,
            error: Some(error.into()),
        }
    }
}

/// 生成結果ログ（観測用、後続処理からは読まない）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationLog {
    pub timestamp: String,
    pub collection: Collection,
    pub total_processed: usize,
    pub successful: usize,
    pub failed: usize,
    pub results: Vec<GenerationResult>,
}

impl GenerationLog {
    pub fn from_results(collection: Collection, timestamp: String, results: &[GenerationResult]) -> Self {
        let successful = results.iter().filter(|r| r.success).count();
        Self {
            timestamp,
            collection,
            total_processed: results.len(),
            successful,
            failed: results.len() - successful,
            results: results.to_vec(),
        }
    }
}
