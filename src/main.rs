//! Splicer - remote video concatenation service
//!
//! Entry point for the HTTP service and the one-shot maintenance commands.

use anyhow::Result;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn, Level};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use splicer::cli::{Args, Commands, ConfigAction};
use splicer::config::Config;
use splicer::fetch::HttpFetcher;
use splicer::media::MediaProcessorFactory;
use splicer::pipeline::ConcatOrchestrator;
use splicer::probe::StreamProbe;
use splicer::server::{self, AppState};
use splicer::store::ArtifactStore;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = load_config(&args)?;
    config.apply_env();
    config.validate()?;

    let _guard = setup_logging(args.verbose, &config.logging.dir)?;
    info!("Starting splicer {}", env!("CARGO_PKG_VERSION"));

    match args.command {
        Commands::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| config.server.bind.clone());
            let store = ArtifactStore::new(&config.storage.root)?;

            if config.storage.retention_secs > 0 {
                server::spawn_sweeper(
                    store.clone(),
                    Duration::from_secs(config.storage.retention_secs),
                    Duration::from_secs(config.storage.sweep_interval_secs.max(1)),
                );
            } else {
                warn!("Retention disabled, working sets will accumulate under {}", store.root().display());
            }

            let state = Arc::new(AppState {
                orchestrator: build_orchestrator(&config, store)?,
                public_url: config.server.public_url.clone(),
            });
            server::start_server(&bind, state).await?;
        }

        Commands::Concat { urls } => {
            let store = ArtifactStore::new(&config.storage.root)?;
            let orchestrator = build_orchestrator(&config, store)?;

            let spinner = ProgressBar::new_spinner();
            spinner.set_style(
                ProgressStyle::default_spinner()
                    .template("{spinner:.green} [{elapsed_precise}] {msg}")?,
            );
            spinner.set_message(format!("Concatenating {} videos", urls.len()));
            spinner.enable_steady_tick(Duration::from_millis(120));

            let result = orchestrator.run(urls).await;
            spinner.finish_and_clear();

            let report = result?;
            println!("✅ Concatenated {} videos via {}", report.sources, report.strategy);
            println!("📁 Output: {}", report.artifact_path.display());
            println!(
                "⏱️  Time: {}",
                format_duration((report.finished_at - report.started_at).num_seconds().max(0) as u64)
            );
        }

        Commands::Probe { input } => {
            if !input.exists() {
                anyhow::bail!("Input file does not exist: {}", input.display());
            }
            let probe = StreamProbe::new(MediaProcessorFactory::create_engine(config.media.clone()));
            let profile = probe.profile(&input).await;
            println!("{}", serde_json::to_string_pretty(&profile)?);
        }

        Commands::Check => {
            let engine = MediaProcessorFactory::create_engine(config.media.clone());
            engine.check_availability()?;
            let version = engine.version_info().await?;
            println!("✅ {}", version);
            println!("✅ ffprobe: {}", config.media.ffprobe_path);
        }

        Commands::Sweep { max_age_hours } => {
            let ttl = max_age_hours
                .map(|h| Duration::from_secs(h * 3600))
                .unwrap_or_else(|| Duration::from_secs(config.storage.retention_secs));
            let store = ArtifactStore::new(&config.storage.root)?;
            let removed = tokio::task::spawn_blocking(move || store.sweep_expired(ttl)).await??;
            println!("🧹 Removed {} expired working sets", removed);
        }

        Commands::Config { action } => match action {
            ConfigAction::Show => {
                print!("{}", toml::to_string_pretty(&config)?);
            }
            ConfigAction::Init { path, force } => {
                if path.exists() && !force {
                    anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
                }
                Config::default().save_to_file(&path)?;
                println!("📝 Wrote default configuration to {}", path.display());
            }
        },
    }

    Ok(())
}

fn load_config(args: &Args) -> Result<Config> {
    let config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None if Path::new("config.toml").exists() => Config::from_file("config.toml")?,
        None => Config::default(),
    };
    Ok(config)
}

fn build_orchestrator(config: &Config, store: ArtifactStore) -> Result<ConcatOrchestrator> {
    let engine = MediaProcessorFactory::create_engine(config.media.clone());
    if let Err(e) = engine.check_availability() {
        warn!("Media engine unavailable, every request will fail: {}", e);
    }
    let fetcher = Arc::new(HttpFetcher::new(&config.fetch)?);
    Ok(ConcatOrchestrator::new(config, store, engine, fetcher))
}

/// Console plus daily-rotated file logging. The returned guard flushes the file writer on drop.
fn setup_logging(verbose: bool, log_dir: &Path) -> Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)?;

    let file_appender = rolling::daily(log_dir, "splicer.log");
    let (non_blocking_file, guard) = non_blocking(file_appender);

    let log_level = if verbose { Level::DEBUG } else { Level::INFO };

    let console_layer = fmt::layer()
        .with_target(false)
        .with_thread_ids(true)
        .with_file(verbose)
        .with_line_number(verbose);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_target(false)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!("Logging initialized - console: {}, file: {}", log_level, log_dir.join("splicer.log").display());
    Ok(guard)
}

fn format_duration(seconds: u64) -> String {
    if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else {
        format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
    }
}
