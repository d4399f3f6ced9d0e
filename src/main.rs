use clap::Parser;
use media_reconcile::config::cli::{select_targets, Cli, Command, ProbeArgs, ReconcileArgs, UploadArgs};
use media_reconcile::core::report::{print_summary, write_report_bundle};
use media_reconcile::utils::error::{ErrorSeverity, ReconcileError};
use media_reconcile::utils::{logger, validation::Validate};
use media_reconcile::{
    AnyStorage, AppConfig, LocalFileLocator, MediaUploader, NoDatabase, PgMediaRepository,
    PipelineOptions, ReconcileEngine, ReconcilePipeline, RemoteFetcher,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // 初始化日誌
    if cli.json_logs {
        logger::init_json_logger(cli.verbose);
    } else {
        logger::init_cli_logger(cli.verbose);
    }

    tracing::info!("Starting media-reconcile {}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = execute(cli).await {
        // 記錄詳細錯誤信息
        tracing::error!(
            "❌ media-reconcile failed: {} (Category: {:?}, Severity: {:?})",
            e,
            e.category(),
            e.severity()
        );
        tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

        eprintln!("❌ {}", e.user_friendly_message());
        eprintln!("💡 建議: {}", e.recovery_suggestion());

        // 根據錯誤嚴重程度決定退出碼
        let exit_code = match e.severity() {
            ErrorSeverity::Low => 0,
            ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        };

        if exit_code > 0 {
            std::process::exit(exit_code);
        }
    }

    Ok(())
}

async fn execute(cli: Cli) -> Result<(), ReconcileError> {
    let mut config = AppConfig::load(&cli.config)?;
    let monitor_enabled = cli.monitor || config.monitoring.enabled;
    if monitor_enabled {
        tracing::info!("🔍 System monitoring enabled");
    }

    match cli.command {
        Command::Reconcile(args) => {
            args.apply(&mut config);
            reconcile(config, args, monitor_enabled).await
        }
        Command::Upload(args) => upload(config, args).await,
        Command::Probe(args) => probe(config, args).await,
        Command::CheckConfig => check_config(&config),
    }
}

async fn reconcile(
    config: AppConfig,
    args: ReconcileArgs,
    monitor_enabled: bool,
) -> Result<(), ReconcileError> {
    config.validate_for_reconcile()?;
    let targets = select_targets(&config, &args.targets)?;

    if config.reconcile.dry_run {
        tracing::info!("🔍 DRY RUN MODE - nothing will be uploaded or written to the database");
    }

    let storage = AnyStorage::from_config(&config).await?;
    let repository = PgMediaRepository::connect(&config.database).await?;
    let locator = LocalFileLocator::new(
        &config.storage.local.public_dir,
        &config.reconcile.fallback_dirs,
    );

    let options = PipelineOptions {
        limit: args.limit,
        ..PipelineOptions::from_config(&config)
    };
    let pipeline = ReconcilePipeline::new(storage, repository, locator, options)
        .with_remote_fetcher(RemoteFetcher::new(config.http_timeout())?);

    let engine = ReconcileEngine::new_with_monitoring(pipeline, monitor_enabled);
    let report = engine.run(&targets).await?;

    print_summary(&report);

    if let Some(dir) = &config.report.output_dir {
        let path = write_report_bundle(dir, &report).await?;
        println!("📁 Report saved to: {}", path.display());
    }

    let totals = report.totals();
    if totals.failed > 0 {
        tracing::warn!(
            "⚠️ {} entries failed and kept their original value; re-run to retry them",
            totals.failed
        );
    }
    tracing::info!("✅ Reconcile completed");
    Ok(())
}

async fn upload(config: AppConfig, args: UploadArgs) -> Result<(), ReconcileError> {
    config.validate()?;
    let storage = AnyStorage::from_config(&config).await?;

    let mut uploader = MediaUploader::new(storage, config.upload.clone(), config.retry.clone());
    if let Some(folder) = args.folder {
        uploader = uploader.with_folder(folder);
    }

    let mut failed = 0;
    for file in &args.files {
        match uploader.upload_file(file).await {
            Ok(media) => println!("{}\t{}", file.display(), media.url),
            Err(e) => {
                tracing::error!("❌ {}: {}", file.display(), e);
                eprintln!("❌ {}: {}", file.display(), e.user_friendly_message());
                failed += 1;
            }
        }
    }

    if failed > 0 {
        return Err(ReconcileError::processing(format!(
            "{} of {} uploads failed",
            failed,
            args.files.len()
        )));
    }
    Ok(())
}

async fn probe(config: AppConfig, args: ProbeArgs) -> Result<(), ReconcileError> {
    config.validate()?;
    let storage = AnyStorage::from_config(&config).await?;
    let locator = LocalFileLocator::new(
        &config.storage.local.public_dir,
        &config.reconcile.fallback_dirs,
    );

    let pipeline = ReconcilePipeline::new(
        storage,
        NoDatabase,
        locator,
        PipelineOptions::from_config(&config),
    )
    .with_remote_fetcher(RemoteFetcher::new(config.http_timeout())?);

    let mut plans = Vec::with_capacity(args.values.len());
    for (index, value) in args.values.iter().enumerate() {
        plans.push(pipeline.resolve_entry(index, value).await);
    }

    println!("{}", serde_json::to_string_pretty(&plans)?);
    Ok(())
}

fn check_config(config: &AppConfig) -> Result<(), ReconcileError> {
    config.validate()?;
    for (key, value) in config.redacted_summary() {
        println!("{:<28} {}", key, value);
    }
    if config.database.url.is_empty() {
        println!("⚠️ database.url is not set; `reconcile` will refuse to run");
    } else {
        config.validate_for_reconcile()?;
    }
    println!("✅ Configuration is valid");
    Ok(())
}
