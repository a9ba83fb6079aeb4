//! 鑑定士・拠点レコードの画像一括生成
//!
//! 画像のないレコードを抽出し、画像生成サービスをバッチ・並列数制限付きで呼び出して、
//! 得られたURLをバックアップ付きでレコードストアへ書き戻す。

pub mod checker;
pub mod cli;
pub mod config;
pub mod error;
pub mod generator;
pub mod identifier;
pub mod migrate;
pub mod store;
