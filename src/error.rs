use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackfillError {
    #[error("設定エラー: {0}")]
    Config(String),

    #[error("レコードストアが見つかりません: {0}")]
    StoreNotFound(String),

    #[error("レコードストアの形式が不正: {0}")]
    InvalidStore(String),

    #[error("作業リストが見つかりません: {0}。先に `image-backfill identify` を実行してください")]
    WorkListNotFound(String),

    #[error("作業リストの形式が不正: {0}")]
    InvalidWorkList(String),

    #[error("API呼び出しエラー: {0}")]
    ApiCall(String),

    #[error("APIレスポンスのパースに失敗: {0}")]
    ApiParse(String),

    #[error("JSON解析エラー: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IOエラー: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTPエラー: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Common(#[from] image_backfill_common::Error),
}

pub type Result<T> = std::result::Result<T, BackfillError>;
