use crate::config::Config;
use clap::{Args, Parser, Subcommand};
use image_backfill_common::Collection;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "image-backfill")]
#[command(about = "鑑定士・拠点レコードの画像一括生成ツール", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// 詳細ログを出力
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// 対象ストアと作業リスト
#[derive(Args, Debug, Clone)]
pub struct TargetArgs {
    /// 対象コレクション (appraisers/locations)
    #[arg(short, long, default_value = "appraisers")]
    pub collection: Collection,

    /// レコードストアJSON（デフォルト: <data_dir>/<collection>.json）
    #[arg(long)]
    pub store: Option<PathBuf>,

    /// 作業リストJSON（デフォルト: <temp_dir>/<collection>-needing-images.json）
    #[arg(long)]
    pub work_list: Option<PathBuf>,
}

impl TargetArgs {
    pub fn store_path(&self, config: &Config) -> PathBuf {
        self.store
            .clone()
            .unwrap_or_else(|| config.store_path(self.collection))
    }

    pub fn work_list_path(&self, config: &Config) -> PathBuf {
        self.work_list
            .clone()
            .unwrap_or_else(|| config.work_list_path(self.collection))
    }
}

/// 生成パラメータ（未指定は設定ファイルの値）
#[derive(Args, Debug, Clone, Default)]
pub struct GenerationArgs {
    /// バッチサイズ
    #[arg(short, long)]
    pub batch_size: Option<usize>,

    /// バッチ内の最大同時実行数
    #[arg(long)]
    pub max_concurrency: Option<usize>,

    /// バッチ内の開始間隔（ミリ秒）
    #[arg(long)]
    pub stagger_ms: Option<u64>,

    /// バッチ間の待機時間（ミリ秒）
    #[arg(long)]
    pub batch_delay_ms: Option<u64>,

    /// 1リクエストのタイムアウト（秒）
    #[arg(long)]
    pub timeout_seconds: Option<u64>,

    /// 画像生成サービスURL
    #[arg(long)]
    pub service_url: Option<String>,

    /// 結果ログの出力先
    #[arg(long)]
    pub logs_dir: Option<PathBuf>,

    /// 生成失敗時に設定する代替画像URL
    #[arg(long)]
    pub placeholder_url: Option<String>,

    /// 進捗バーを表示しない
    #[arg(long)]
    pub no_progress: bool,
}

impl GenerationArgs {
    /// コマンドライン指定で設定を上書き
    pub fn apply(&self, config: &mut Config) {
        if let Some(v) = self.batch_size {
            config.batch_size = v;
        }
        if let Some(v) = self.max_concurrency {
            config.max_concurrency = v;
        }
        if let Some(v) = self.stagger_ms {
            config.stagger_ms = v;
        }
        if let Some(v) = self.batch_delay_ms {
            config.batch_delay_ms = v;
        }
        if let Some(v) = self.timeout_seconds {
            config.timeout_seconds = v;
        }
        config.apply_service_url_override(self.service_url.clone());
        if let Some(v) = &self.logs_dir {
            config.logs_dir = v.clone();
        }
        if self.placeholder_url.is_some() {
            config.placeholder_url = self.placeholder_url.clone();
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// 画像のないレコードを抽出して作業リストを作成
    Identify {
        #[command(flatten)]
        target: TargetArgs,

        /// 抽出する上限件数（0は無制限、デフォルトは設定値）
        #[arg(short, long)]
        max: Option<usize>,
    },

    /// 作業リストの画像を生成してストアへ反映
    Generate {
        #[command(flatten)]
        target: TargetArgs,

        #[command(flatten)]
        generation: GenerationArgs,
    },

    /// 抽出から生成・反映まで一括実行
    Run {
        #[command(flatten)]
        target: TargetArgs,

        #[command(flatten)]
        generation: GenerationArgs,

        /// 抽出する上限件数（0は無制限、デフォルトは設定値）
        #[arg(short, long)]
        max: Option<usize>,
    },

    /// 設定済み画像URLのリンク切れを確認
    Check {
        #[command(flatten)]
        target: TargetArgs,

        /// 同時確認数
        #[arg(long)]
        max_concurrency: Option<usize>,

        /// 画像なし・リンク切れのレコードを作業リストに書き出す
        #[arg(long)]
        write_work_list: bool,
    },

    /// 旧形式レコードを移行（ID付与、image → imageUrl）
    Migrate {
        #[command(flatten)]
        target: TargetArgs,

        /// 変更内容の表示のみ
        #[arg(long)]
        dry_run: bool,
    },

    /// ストアのバックアップ一覧
    Backups {
        #[command(flatten)]
        target: TargetArgs,
    },

    /// 設定の表示・変更
    Config {
        /// 現在の設定を表示
        #[arg(long)]
        show: bool,

        /// 画像生成サービスURLを保存
        #[arg(long)]
        set_service_url: Option<String>,
    },
}
