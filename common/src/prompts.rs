//! プロンプト・ファイル名生成モジュール
//!
//! 画像生成サービスに渡す customPrompt と filename を組み立てる:
//! - build_appraiser_prompt: 鑑定士のポートレート用
//! - build_location_prompt: 拠点の外観用
//! - build_filename: `<prefix>_<id>_<epoch_ms>_V<hash8>.jpg`

use crate::types::{AppraiserItem, Collection, LocationItem, WorkItem};
use sha2::{Digest, Sha256};

/// 専門分野が空のときの既定値
pub const DEFAULT_SPECIALTY: &str = "fine art";

/// 拠点種別が空のときの既定値
pub const DEFAULT_LOCATION_TYPE: &str = "Office";

fn locality_phrase(city: &str, state: &str) -> Option<String> {
    match (city.trim(), state.trim()) {
        ("", "") => None,
        (city, "") => Some(city.to_string()),
        ("", state) => Some(state.to_string()),
        (city, state) => Some(format!("{}, {}", city, state)),
    }
}

pub fn build_appraiser_prompt(item: &AppraiserItem) -> String {
    let specialties = if item.specialties.is_empty() {
        DEFAULT_SPECIALTY.to_string()
    } else {
        item.specialties.join(", ")
    };

    let place = locality_phrase(&item.city, &item.state)
        .map(|p| format!(" in {}", p))
        .unwrap_or_default();

    format!(
        "Professional art appraiser{} specializing in {} in an elegant office with artwork, good lighting, professional attire",
        place, specialties
    )
}

pub fn build_location_prompt(item: &LocationItem) -> String {
    let kind = if item.kind.trim().is_empty() {
        DEFAULT_LOCATION_TYPE
    } else {
        item.kind.trim()
    };

    let mut prompt = format!("Exterior view of the {}", kind.to_lowercase());
    if !item.name.trim().is_empty() {
        prompt.push_str(&format!(" \"{}\"", item.name.trim()));
    }
    if let Some(place) = locality_phrase(&item.city, &item.state) {
        prompt.push_str(&format!(" in {}", place));
    }
    prompt.push('.');

    if !item.description.trim().is_empty() {
        prompt.push_str(&format!(" {}", item.description.trim()));
        if !prompt.ends_with('.') {
            prompt.push('.');
        }
    }
    if !item.features.is_empty() {
        prompt.push_str(&format!(" Features: {}.", item.features.join(", ")));
    }

    prompt.push_str(" Professional architectural photography, natural daylight");
    prompt
}

pub fn build_prompt(item: &WorkItem) -> String {
    match item {
        WorkItem::Appraiser(appraiser) => build_appraiser_prompt(appraiser),
        WorkItem::Location(location) => build_location_prompt(location),
    }
}

/// 生成画像のファイル名
///
/// 末尾の `V` 以降はIDと時刻から求めたハッシュ先頭8桁で、同一実行内で項目ごとに一意。
pub fn build_filename(collection: Collection, id: &str, epoch_ms: i64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(id.as_bytes());
    hasher.update(b":");
    hasher.update(epoch_ms.to_string().as_bytes());
    let digest = hex::encode(hasher.finalize());

    format!(
        "{}_{}_{}_V{}.jpg",
        collection.filename_prefix(),
        id,
        epoch_ms,
        &digest[..8]
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_appraiser_prompt_with_specialties() {
        let item = AppraiserItem {
            id: "a".into(),
            city: "Chicago".into(),
            state: "IL".into(),
            specialties: vec!["Modern Art".into(), "Sculptures".into()],
            ..Default::default()
        };
        let prompt = build_appraiser_prompt(&item);
        assert!(prompt.starts_with("Professional art appraiser in Chicago, IL"));
        assert!(prompt.contains("specializing in Modern Art, Sculptures"));
    }

    #[test]
    fn test_appraiser_prompt_default_specialty() {
        let item = AppraiserItem::default();
        let prompt = build_appraiser_prompt(&item);
        assert!(prompt.contains("specializing in fine art"));
        assert!(!prompt.contains(" in ,"));
    }

    #[test]
    fn test_location_prompt_defaults_to_office() {
        let item = LocationItem {
            name: "Art Hub".into(),
            state: "FL".into(),
            features: vec!["gallery".into()],
            ..Default::default()
        };
        let prompt = build_location_prompt(&item);
        assert!(prompt.starts_with("Exterior view of the office \"Art Hub\" in FL."));
        assert!(prompt.contains("Features: gallery."));
    }

    #[test]
    fn test_build_filename_format() {
        let name = build_filename(Collection::Appraisers, "chicago-jane-doe", 1700000000000);
        assert!(name.starts_with("appraiser_chicago-jane-doe_1700000000000_V"));
        assert!(name.ends_with(".jpg"));

        let suffix = name
            .trim_end_matches(".jpg")
            .rsplit("_V")
            .next()
            .unwrap();
        assert_eq!(suffix.len(), 8);
    }

    #[test]
    fn test_build_filename_unique_per_item() {
        let a = build_filename(Collection::Locations, "a", 1);
        let b = build_filename(Collection::Locations, "b", 1);
        assert_ne!(a, b);
        assert_eq!(a, build_filename(Collection::Locations, "a", 1));
    }
}
