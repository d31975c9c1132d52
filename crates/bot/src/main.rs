mod commands;
mod delivery;
mod local;
mod metrics;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mediaforge_core::{
    acquire::MediaDownloader,
    dispatch::{serve_worker, ProcessLauncher},
    exec::ProcessRunner,
    load_config,
    media::{FfmpegEncoder, MediaEncoder},
    transform::sync_registry,
    validate_config, ErrorClass, MediaProcessor, ProcessorSettings, SanitizedConfig, TempStore,
};

use commands::COMMANDS;
use delivery::DirectoryDelivery;
use local::LocalChat;

#[derive(Parser)]
#[command(name = "mediaforge", version, about = "Runs media commands on linked files")]
struct Cli {
    /// Configuration file
    #[arg(long, env = "MEDIAFORGE_CONFIG", default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Runs one command on media found at the given URLs
    Run {
        /// Command name, see `transforms`
        transform: String,
        /// Media URL; repeat for commands taking several inputs
        #[arg(long = "url")]
        urls: Vec<String>,
        /// Command argument; repeatable
        #[arg(long = "text")]
        args: Vec<String>,
        /// Directory results are copied into
        #[arg(long, default_value = ".")]
        out: PathBuf,
        /// Print Prometheus metrics after the run
        #[arg(long)]
        metrics: bool,
    },
    /// Serves one isolated transform request on stdin/stdout
    #[command(hide = true)]
    Worker,
    /// Lists the available commands
    Transforms,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Stdout carries results and the worker protocol, so logs go to stderr.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Worker => {
            metrics::COMMANDS_TOTAL.with_label_values(&["worker"]).inc();
            serve_worker(sync_registry(), tokio::io::stdin(), tokio::io::stdout())
                .await
                .context("Worker failed to answer")
        }
        Command::Transforms => {
            metrics::COMMANDS_TOTAL.with_label_values(&["transforms"]).inc();
            for spec in COMMANDS {
                println!("{:<10} {:<24} {}", spec.name, spec.runs.to_string(), spec.help);
            }
            Ok(())
        }
        Command::Run {
            transform,
            urls,
            args,
            out,
            metrics: print_metrics,
        } => {
            metrics::COMMANDS_TOTAL.with_label_values(&["run"]).inc();
            let result = run_command(&cli.config, &transform, &urls, args, out).await;
            if print_metrics {
                print!("{}", metrics::encode_metrics());
            }
            result
        }
    }
}

async fn run_command(
    config_path: &Path,
    transform: &str,
    urls: &[String],
    args: Vec<String>,
    out: PathBuf,
) -> Result<()> {
    let job = commands::build(transform, args)
        .ok_or_else(|| anyhow!("Unknown command '{}', see `mediaforge transforms`", transform))?;

    info!("Loading configuration from {:?}", config_path);
    let config = load_config(config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;
    validate_config(&config).context("Configuration validation failed")?;
    debug!(
        "Configuration: {}",
        serde_json::to_string(&SanitizedConfig::from(&config)).unwrap_or_default()
    );

    let temp_dir = config.temp.dir.clone().unwrap_or_else(TempStore::default_dir);
    let store = TempStore::init(&temp_dir)
        .await
        .with_context(|| format!("Failed to prepare temp directory {:?}", temp_dir))?;

    let encoder = Arc::new(FfmpegEncoder::new(config.tools.clone(), config.media.clone()));
    encoder
        .validate()
        .await
        .context("ffmpeg/ffprobe are not usable")?;
    info!("Using encoder: {}", encoder.name());

    let downloader = Arc::new(
        MediaDownloader::new(config.media.max_download_size, config.tenor.clone())
            .context("Failed to create HTTP client")?,
    );

    let worker_program = match &config.tools.worker_program {
        Some(program) => program.clone(),
        None => std::env::current_exe().context("Cannot locate own executable for workers")?,
    };
    let launcher = ProcessLauncher::new(
        worker_program,
        vec!["worker".to_string()],
        ProcessRunner::new(config.tools.niceness),
    );

    let settings = ProcessorSettings::from_config(&config);
    info!(workers = settings.workers, "Processor ready");
    let processor = MediaProcessor::new(settings, store, encoder, downloader.clone(), downloader)
        .with_launcher(Arc::new(launcher));

    let chat = LocalChat::new(urls);
    let delivery = DirectoryDelivery::new(out);
    let report = processor.run(&chat, &delivery, job).await;
    debug!(
        job_id = %report.job_id,
        saved = delivery.saved().len(),
        temp_files_removed = report.temp_files_removed,
        "Run finished"
    );

    match report.outcome {
        Ok(_) => Ok(()),
        Err(e) => match e.class() {
            ErrorClass::User | ErrorClass::Transient => bail!("{}", e),
            ErrorClass::Bug => match e.diagnostics() {
                Some(output) => bail!("Internal error in job {}: {}\n{}", report.job_id, e, output),
                None => bail!("Internal error in job {}: {}", report.job_id, e),
            },
        },
    }
}
