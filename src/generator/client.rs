//! 画像生成サービス連携モジュール
//!
//! `POST <base>/api/generate`（拠点は `/api/generate-location`）に
//! `{ appraiser|location: {...}, filename, customPrompt }` を送り、
//! レスポンスは共通パーサーで検証する。

use crate::error::{BackfillError, Result};
use async_trait::async_trait;
use image_backfill_common::prompts::DEFAULT_LOCATION_TYPE;
use image_backfill_common::{
    build_filename, build_prompt, parse_generate_response, Collection, GeneratedImage,
    LocationItem, WorkItem,
};
use serde_json::{Map, Value};
use std::time::Duration;

/// エラーメッセージに含めるレスポンス本文の最大文字数
const BODY_PREVIEW_CHARS: usize = 500;

/// 1件分の画像生成
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate(&self, item: &WorkItem) -> Result<GeneratedImage>;
}

/// サービスURLからエンドポイントを決定
///
/// `/api/` を含むURLはそのまま使い、ベースURLにはコレクションのパスを付ける。
pub fn resolve_endpoint(service_url: &str, collection: Collection) -> String {
    let base = service_url.trim().trim_end_matches('/');
    if base.contains("/api/") {
        base.to_string()
    } else {
        format!("{}{}", base, collection.endpoint_path())
    }
}

/// リクエストボディを構築
pub fn build_request_body(item: &WorkItem, epoch_ms: i64) -> Result<Value> {
    let collection = item.collection();

    let record = match item {
        WorkItem::Location(location) if location.kind.trim().is_empty() => {
            serde_json::to_value(LocationItem {
                kind: DEFAULT_LOCATION_TYPE.into(),
                ..location.clone()
            })?
        }
        _ => serde_json::to_value(item)?,
    };

    let mut body = Map::new();
    body.insert(collection.payload_key().into(), record);
    body.insert(
        "filename".into(),
        Value::String(build_filename(collection, item.id(), epoch_ms)),
    );
    body.insert("customPrompt".into(), Value::String(build_prompt(item)));
    Ok(Value::Object(body))
}

fn preview(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() > BODY_PREVIEW_CHARS {
        let head: String = trimmed.chars().take(BODY_PREVIEW_CHARS).collect();
        format!("{}...", head)
    } else {
        trimmed.to_string()
    }
}

/// 1秒未満や端数はミリ秒で表示
fn describe_timeout(timeout: Duration) -> String {
    if timeout.subsec_millis() == 0 && timeout.as_secs() > 0 {
        format!("{}秒", timeout.as_secs())
    } else {
        format!("{}ミリ秒", timeout.as_millis())
    }
}

pub struct HttpImageGenerator {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl HttpImageGenerator {
    pub fn new(service_url: &str, collection: Collection, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: resolve_endpoint(service_url, collection),
            timeout,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn describe_transport_error(&self, error: &reqwest::Error) -> String {
        if error.is_timeout() {
            format!("タイムアウト ({})", describe_timeout(self.timeout))
        } else {
            format!("リクエスト失敗: {}", error)
        }
    }
}

#[async_trait]
impl ImageGenerator for HttpImageGenerator {
    async fn generate(&self, item: &WorkItem) -> Result<GeneratedImage> {
        let body = build_request_body(item, chrono::Utc::now().timestamp_millis())?;
        tracing::debug!(id = item.id(), endpoint = %self.endpoint, "requesting image");

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| BackfillError::ApiCall(self.describe_transport_error(&e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| BackfillError::ApiCall(self.describe_transport_error(&e)))?;

        if !status.is_success() {
            return Err(BackfillError::ApiCall(format!("HTTP {}: {}", status, preview(&text))));
        }

        parse_generate_response(&text).map_err(|e| BackfillError::ApiParse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image_backfill_common::AppraiserItem;
    use serde_json::json;

    #[test]
    fn test_resolve_endpoint() {
        assert_eq!(
            resolve_endpoint("https://svc.example/", Collection::Appraisers),
            "https://svc.example/api/generate"
        );
        assert_eq!(
            resolve_endpoint("https://svc.example", Collection::Locations),
            "https://svc.example/api/generate-location"
        );
        assert_eq!(
            resolve_endpoint("http://localhost:3000/api/generate-with-filename", Collection::Appraisers),
            "http://localhost:3000/api/generate-with-filename"
        );
    }

    #[test]
    fn test_request_body_for_appraiser() {
        let item = WorkItem::Appraiser(AppraiserItem {
            id: "a1".into(),
            first_name: "Ann".into(),
            specialties: vec!["Antiques".into()],
            ..Default::default()
        });

        let body = build_request_body(&item, 1700000000000).unwrap();
        assert_eq!(body["appraiser"]["id"], json!("a1"));
        assert_eq!(body["appraiser"]["specialties"], json!(["Antiques"]));
        assert!(body["filename"].as_str().unwrap().starts_with("appraiser_a1_1700000000000_V"));
        assert!(body["customPrompt"].as_str().unwrap().contains("Antiques"));
        assert!(body.get("location").is_none());
    }

    #[test]
    fn test_request_body_location_defaults_type() {
        let item = WorkItem::Location(LocationItem {
            id: "l1".into(),
            name: "Gallery".into(),
            ..Default::default()
        });

        let body = build_request_body(&item, 1).unwrap();
        assert_eq!(body["location"]["type"], json!("Office"));
        assert!(body["filename"].as_str().unwrap().starts_with("location_l1_1_V"));
    }

    #[test]
    fn test_describe_timeout() {
        assert_eq!(describe_timeout(Duration::from_secs(60)), "60秒");
        assert_eq!(describe_timeout(Duration::from_millis(300)), "300ミリ秒");
        assert_eq!(describe_timeout(Duration::from_millis(1500)), "1500ミリ秒");
    }

    #[test]
    fn test_preview_truncates_long_body() {
        let long = "x".repeat(BODY_PREVIEW_CHARS + 10);
        let text = preview(&long);
        assert!(text.ends_with("..."));
        assert_eq!(text.chars().count(), BODY_PREVIEW_CHARS + 3);
    }
}
