//! visionagent - diagnose one MRI slice and print the diagnostic payload
//!
//! Usage:
//!   visionagent --volume study.json --slice 42 --pixel-spacing-cm 0.1
//!   visionagent --dump-config              → print the effective config

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use visionagent::VolumeFile;
use visionagent_model::{DualStreamEngine, ModelHost, ReferenceModel};
use visionagent_pipeline::{DiagnosisRequest, PipelineConfig, VisionAgent};

#[derive(Parser)]
#[command(
    name = "visionagent",
    about = "2.5D brain-tumor MRI vision agent",
    version = env!("CARGO_PKG_VERSION"),
    long_about = "visionagent diagnoses one slice of an MRI study.\n\
                  It prints the diagnostic payload as JSON on stdout.\n\
                  Warnings and logs go to stderr."
)]
struct Cli {
    /// Volume file: {"case_id": ..., "slices": [[[f32]]]}
    #[arg(long, required_unless_present = "dump_config")]
    volume: Option<PathBuf>,

    /// Index of the target slice
    #[arg(long, default_value_t = 0)]
    slice: usize,

    /// Path to pipeline config file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Physical pixel spacing in centimetres (overrides config)
    #[arg(long)]
    pixel_spacing_cm: Option<f64>,

    /// Directory for explanation artifacts (overrides config)
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Write logs to a file (in addition to stderr)
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Print the effective config as TOML and exit
    #[arg(long, default_value_t = false)]
    dump_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _guard = init_tracing(cli.log_file.as_deref())?;

    let mut config = match &cli.config {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    if let Some(spacing) = cli.pixel_spacing_cm {
        config = config.with_pixel_spacing(spacing);
    }
    if let Some(dir) = &cli.output_dir {
        config.explanation_output_dir = dir.clone();
    }

    if cli.dump_config {
        print!("{}", config.to_toml());
        return Ok(());
    }

    let Some(volume_path) = cli.volume else {
        anyhow::bail!("--volume is required");
    };
    let volume = VolumeFile::load(&volume_path)
        .await
        .with_context(|| format!("reading volume {}", volume_path.display()))?;
    let slices = volume.to_slices()?;
    info!(
        case = %volume.case_id,
        slices = slices.len(),
        "volume loaded from {}",
        volume_path.display()
    );

    let host = ModelHost::global();
    host.load(DualStreamEngine::from_model(
        Arc::new(ReferenceModel::default()),
        ReferenceModel::info(),
    ))
    .await;

    let result = run(host, config, DiagnosisRequest::new(volume.case_id, slices, cli.slice)).await;
    host.release().await;
    result
}

async fn run(
    host: &ModelHost,
    config: PipelineConfig,
    request: DiagnosisRequest,
) -> anyhow::Result<()> {
    let agent = VisionAgent::from_host(host, config).await?;
    let outcome = match agent.diagnose(&request).await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("diagnosis failed: {}", e);
            return Err(e.into());
        }
    };
    for warning in &outcome.warnings {
        warn!("{}", warning);
    }
    println!("{}", outcome.payload.to_json_pretty()?);
    Ok(())
}

fn init_tracing(
    log_file: Option<&std::path::Path>,
) -> anyhow::Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "visionagent=info,visionagent_model=info,visionagent_pipeline=info".into());
    let stderr = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let Some(path) = log_file else {
        tracing_subscriber::registry().with(filter).with(stderr).init();
        return Ok(None);
    };
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| std::path::Path::new("."));
    let name = path
        .file_name()
        .context("--log-file must name a file")?;
    let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
    tracing_subscriber::registry()
        .with(filter)
        .with(stderr)
        .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(writer))
        .init();
    Ok(Some(guard))
}
