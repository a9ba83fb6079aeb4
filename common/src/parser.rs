//! 画像生成サービスのレスポンスパーサー
//!
//! レスポンススキーマは次の1種類のみを受け付ける:
//!
//! ```text
//! { "success"?: bool, "imageUrl"?: string, "originalUrl"?: string,
//!   "data"?: { "imageUrl"?: string, "originalUrl"?: string },
//!   "error"?: any }
//! ```
//!
//! 画像URLはトップレベル `imageUrl` または `data.imageUrl`。
//! 両方あって値が異なる場合、どちらもない場合はエラーとし、成功扱いにはしない。

use crate::error::{Error, Result};
use crate::types::GeneratedImage;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    success: Option<bool>,
    image_url: Option<String>,
    original_url: Option<String>,
    data: Option<GenerateData>,
    error: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateData {
    image_url: Option<String>,
    original_url: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn describe_error(error: Option<Value>) -> String {
    match error {
        Some(Value::String(message)) => message,
        Some(Value::Null) | None => "unknown error".to_string(),
        Some(other) => other.to_string(),
    }
}

/// レスポンス本文をパース
///
/// # Arguments
/// * `body` - HTTPレスポンス本文
///
/// # Returns
/// * `Ok(GeneratedImage)` - 画像URLを取得できた場合
/// * `Err(Error::Parse)` - JSONでない、`success: false`、URLなし、URL不一致
pub fn parse_generate_response(body: &str) -> Result<GeneratedImage> {
    let response: GenerateResponse = serde_json::from_str(body.trim())
        .map_err(|e| Error::Parse(format!("レスポンスJSONパースエラー: {}", e)))?;

    if response.success == Some(false) {
        return Err(Error::Parse(format!(
            "画像生成サービスがエラーを返しました: {}",
            describe_error(response.error)
        )));
    }

    let data = response.data.unwrap_or_default();
    let top_url = non_blank(response.image_url);
    let data_url = non_blank(data.image_url);

    let image_url = match (top_url, data_url) {
        (Some(top), Some(nested)) if top != nested => {
            return Err(Error::Parse(format!(
                "imageUrl と data.imageUrl が一致しません: {} / {}",
                top, nested
            )));
        }
        (Some(url), _) | (None, Some(url)) => url,
        (None, None) => {
            return Err(Error::Parse("レスポンスに imageUrl がありません".into()));
        }
    };

    let original_url = non_blank(response.original_url).or_else(|| non_blank(data.original_url));

    Ok(GeneratedImage {
        image_url,
        original_url,
    })
}
