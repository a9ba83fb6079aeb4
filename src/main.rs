use anyhow::{Context, Result};
use clap::Parser;
use image_backfill::cli::{Cli, Commands, GenerationArgs, TargetArgs};
use image_backfill::config::Config;
use image_backfill::generator::{self, GenerateJob, GenerateOptions, HttpImageGenerator};
use image_backfill::{checker, identifier, migrate, store};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(err) = run(cli).await {
        tracing::error!(error = %err, "command failed");
        for cause in err.chain().skip(1) {
            tracing::error!(cause = %cause, "caused by");
        }
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = Config::load().context("設定の読み込みに失敗しました")?;

    match cli.command {
        Commands::Identify { target, max } => {
            println!("🔎 image-backfill - 画像なしレコードの抽出\n");
            identify(&target, max, &config)?;
        }

        Commands::Generate { target, generation } => {
            println!("🎨 image-backfill - 画像生成\n");
            generation.apply(&mut config);
            generate(&target, &generation, &config).await?;
            println!("\n✅ 画像生成完了");
        }

        Commands::Run { target, generation, max } => {
            println!("🚀 image-backfill - 抽出・生成一括実行\n");
            generation.apply(&mut config);

            println!("[1/2] 画像のない{}を抽出中...", target.collection);
            let list = identify(&target, max, &config)?;
            if list.is_none() {
                return Ok(());
            }

            println!("\n[2/2] 画像を生成中...");
            match generate(&target, &generation, &config).await {
                Ok(_) => println!("\n✅ 一括実行完了"),
                Err(e) => {
                    tracing::warn!(error = %e, "image generation failed; continuing");
                    println!("\n⚠ 画像生成に失敗しましたが、処理を続行します");
                }
            }
        }

        Commands::Check { target, max_concurrency, write_work_list } => {
            println!("🔗 image-backfill - 画像URL確認\n");
            let probe = checker::HttpProbe::new(Duration::from_secs(config.timeout_seconds))?;
            let work_list_path = write_work_list.then(|| target.work_list_path(&config));
            checker::run_check(
                &target.store_path(&config),
                target.collection,
                Arc::new(probe),
                max_concurrency.unwrap_or(config.max_concurrency),
                work_list_path.as_deref(),
            )
            .await?;
        }

        Commands::Migrate { target, dry_run } => {
            println!("🛠 image-backfill - レコード移行\n");
            migrate::run_migrate(&target.store_path(&config), target.collection, dry_run)?;
        }

        Commands::Backups { target } => {
            let path = target.store_path(&config);
            let backups = store::backup::list_backups(&path)?;
            if backups.is_empty() {
                println!("{} のバックアップはありません", path.display());
            }
            for backup in backups {
                println!("{}  {} bytes", backup.path.display(), backup.size);
            }
        }

        Commands::Config { show, set_service_url } => {
            let show = show || set_service_url.is_none();
            if let Some(url) = set_service_url {
                config.set_service_url(url)?;
                println!("✔ サービスURLを設定しました");
            }

            if show {
                println!("{}", serde_json::to_string_pretty(&config)?);
                println!("\n設定ファイル: {}", Config::config_path()?.display());
            }
        }
    }

    Ok(())
}

fn identify(
    target: &TargetArgs,
    max: Option<usize>,
    config: &Config,
) -> Result<Option<image_backfill_common::WorkList>> {
    let max_items = match max {
        Some(0) => None,
        Some(limit) => Some(limit),
        None => config.max_items_limit(),
    };

    let list = identifier::run_identify(
        &target.store_path(config),
        &target.work_list_path(config),
        target.collection,
        max_items,
    )?;
    Ok(list)
}

async fn generate(
    target: &TargetArgs,
    generation: &GenerationArgs,
    config: &Config,
) -> Result<generator::RunSummary> {
    let store_path = target.store_path(config);
    let work_list_path = target.work_list_path(config);
    let job = GenerateJob {
        collection: target.collection,
        work_list_path: &work_list_path,
        store_path: &store_path,
        logs_dir: &config.logs_dir,
        placeholder: config.placeholder_url.as_deref(),
    };

    let client = HttpImageGenerator::new(
        &config.service_url,
        target.collection,
        Duration::from_secs(config.timeout_seconds),
    )?;
    tracing::info!(endpoint = client.endpoint(), "image generation service");

    let mut options = GenerateOptions::from_config(config);
    options.show_progress = !generation.no_progress;

    let summary = generator::run_generate(&job, Arc::new(client), &options).await?;
    Ok(summary)
}
