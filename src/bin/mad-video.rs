use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};

use mad_video::api::VideoAnomalyPipeline;
use mad_video::core::detection::{HttpDetectionClient, KNOWN_MODELS};
use mad_video::core::PipelineConfig;

// ── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "mad-video",
    version,
    about = "Run a video through the anomaly detector and re-encode the annotated frames",
    long_about = None
)]
struct Cli {
    /// JSON5 config file; flags and MAD_* env vars override it
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Detector base URL
    #[arg(long, global = true)]
    detector_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract, detect and reassemble one video.
    Process {
        /// Input video path
        #[arg(short, long)]
        input: PathBuf,

        /// Output path; the extension follows the negotiated container
        #[arg(short, long, default_value = "annotated.webm")]
        output: PathBuf,

        /// Detector model id
        #[arg(short, long)]
        model: Option<String>,

        /// Sampling rate in frames per second
        #[arg(long)]
        fps: Option<u32>,

        /// Detection requests in flight at once
        #[arg(long)]
        concurrency: Option<usize>,

        /// Where to write the JSON session report
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// List detector models.
    Models,

    /// Query detector health.
    Health,
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    mad_video::init_logging();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => PipelineConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => PipelineConfig::default(),
    }
    .with_env_overrides()?;
    if let Some(url) = cli.detector_url {
        config.detector_url = url;
    }

    // Single-threaded: the session is driven cooperatively.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")?;

    match cli.command {
        Commands::Process {
            input,
            output,
            model,
            fps,
            concurrency,
            report,
        } => {
            if let Some(model) = model {
                config.model_id = model;
            }
            if let Some(fps) = fps {
                config.sampling_rate_hz = fps;
            }
            if let Some(concurrency) = concurrency {
                config.dispatch_concurrency = concurrency;
            }
            runtime.block_on(cmd_process(config, input, output, report))
        }
        Commands::Models => runtime.block_on(cmd_models(config)),
        Commands::Health => runtime.block_on(cmd_health(config)),
    }
}

// ── process ───────────────────────────────────────────────────────────────────

async fn cmd_process(
    config: PipelineConfig,
    input: PathBuf,
    output: PathBuf,
    report_path: Option<PathBuf>,
) -> Result<()> {
    info!("input  : {}", input.display());
    info!("model  : {} @ {} Hz", config.model_id, config.sampling_rate_hz);

    let pipeline = VideoAnomalyPipeline::create(config).await?;
    let mut progress = pipeline.subscribe();

    let watcher = async {
        let mut last = 0;
        while progress.changed().await.is_ok() {
            let snapshot = *progress.borrow_and_update();
            if snapshot.percent >= last + 10 || snapshot.state.is_terminal() {
                info!("[{:>3}%] {}", snapshot.percent, snapshot.state.label());
                last = snapshot.percent;
            }
            if snapshot.state.is_terminal() {
                break;
            }
        }
    };

    let (result, ()) = tokio::join!(pipeline.process_file(&input), watcher);
    let (artifact, report) = match result {
        Ok(done) => done,
        Err(e) => {
            warn!("{e}");
            anyhow::bail!(e.user_message());
        }
    };

    let output = with_extension(&output, artifact.extension());
    artifact
        .save(&output)
        .with_context(|| format!("writing {}", output.display()))?;
    info!(
        "output : {} ({}, {} frames, {:.2}s)",
        output.display(),
        artifact.content_type,
        artifact.frame_count,
        artifact.duration.as_secs_f64()
    );

    let report_path = report_path.unwrap_or_else(|| output.with_extension("report.json"));
    std::fs::write(&report_path, report.to_json()?)
        .with_context(|| format!("writing {}", report_path.display()))?;
    info!(
        "report : {} ({} annotated, {} fallback, {} detections)",
        report_path.display(),
        report.annotated,
        report.fallbacks,
        report.total_detections
    );
    Ok(())
}

fn with_extension(path: &Path, extension: &str) -> PathBuf {
    if path.extension().and_then(|e| e.to_str()) == Some(extension) {
        return path.to_path_buf();
    }
    warn!("output container is {extension}, adjusting {}", path.display());
    path.with_extension(extension)
}

// ── models / health ───────────────────────────────────────────────────────────

async fn cmd_models(config: PipelineConfig) -> Result<()> {
    let client = HttpDetectionClient::from_config(&config)?;
    let models = match client.list_models().await {
        Ok(models) => models,
        Err(e) => {
            warn!("detector unreachable ({e}), showing built-in catalog");
            KNOWN_MODELS.clone()
        }
    };
    for model in models {
        let marker = if model.id == config.model_id { "*" } else { " " };
        let status = if model.available { "" } else { " (unavailable)" };
        println!("{marker} {:<20} {}{status}", model.id, model.name);
    }
    Ok(())
}

async fn cmd_health(config: PipelineConfig) -> Result<()> {
    let client = HttpDetectionClient::from_config(&config)?;
    let status = client
        .health()
        .await
        .with_context(|| format!("querying {}/health", client.base_url()))?;
    println!("{}", serde_json::to_string_pretty(&status)?);
    if !status.is_healthy() {
        anyhow::bail!("detector reports status {:?}", status.status);
    }
    Ok(())
}
