//! Image Backfill Common Library
//!
//! 識別・生成・反映の各処理で共有される型とユーティリティ

pub mod error;
pub mod parser;
pub mod prompts;
pub mod types;

pub use error::{Error, Result};
pub use parser::parse_generate_response;
pub use prompts::{build_appraiser_prompt, build_filename, build_location_prompt, build_prompt};
pub use types::{
    slugify, AppraiserItem, Collection, GeneratedImage, GenerationLog, GenerationResult,
    LocationItem, Record, WorkItem, WorkList,
};
