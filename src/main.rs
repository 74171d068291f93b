use allsky_condition::{
    config::{ConfigStore, JsonConfigStore, MonitorConfig, OnnxConfig, ServerConfig},
    image::{FileImageSource, ImageLoader, ImagePreprocessor},
    models::{ClassifierProvider, OnnxModelProvider},
    web::serve,
    SafetyMonitor, SkyCondition,
};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "allsky-condition")]
#[command(about = "Sky condition safety monitor driven by an all-sky camera")]
struct Args {
    /// Log level
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// ONNX model path
    #[arg(long, default_value = "model.onnx", global = true)]
    model: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the host API and sample the sky periodically
    Serve {
        /// Server bind address
        #[arg(long, default_value = "0.0.0.0:11111")]
        bind: String,

        /// Monitor configuration file (JSON)
        #[arg(long, default_value = "allsky-condition.json")]
        config: PathBuf,

        /// Connect immediately instead of waiting for the host
        #[arg(long)]
        connect: bool,
    },
    /// Classify a single image and print the result
    Check {
        /// Image file to classify
        image: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 初始化日志系统
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .with_target(false)
        .init();

    let onnx_config = OnnxConfig::new(&args.model);
    tracing::info!("Model path: {}", onnx_config.model_path.display());

    match args.command {
        Command::Serve {
            bind,
            config,
            connect,
        } => run_server(onnx_config, bind, config, connect).await,
        Command::Check { image } => run_check(onnx_config, image).await,
    }
}

async fn run_server(
    onnx_config: OnnxConfig,
    bind: String,
    config_path: PathBuf,
    connect: bool,
) -> Result<()> {
    tracing::info!("Starting sky condition monitor...");
    let store = Arc::new(JsonConfigStore::new(config_path));
    tracing::info!("Config file: {}", store.path().display());
    let monitor_config: MonitorConfig = store.load().context("Failed to load monitor config")?;
    tracing::info!(
        "Image source: '{}', cycle {}min",
        monitor_config.image_source,
        monitor_config.cycle_period
    );

    let monitor = Arc::new(SafetyMonitor::new(
        store,
        Arc::new(OnnxModelProvider::new(onnx_config)),
        Arc::new(FileImageSource),
    ));

    if connect {
        let worker = Arc::clone(&monitor);
        let connected = tokio::task::spawn_blocking(move || worker.connect()).await?;
        if let Err(e) = connected {
            tracing::warn!("Initial connect failed, waiting for host to retry: {}", e);
        }
    }

    let server = serve(Arc::clone(&monitor), ServerConfig::new(bind));
    tokio::select! {
        result = server => result.context("Server failed")?,
        _ = tokio::signal::ctrl_c() => tracing::info!("Shutdown requested"),
    }

    monitor.disconnect();
    Ok(())
}

async fn run_check(onnx_config: OnnxConfig, image_path: PathBuf) -> Result<()> {
    let path = image_path
        .to_str()
        .context("Image path is not valid UTF-8")?
        .to_string();

    let condition = tokio::task::spawn_blocking(move || -> Result<(SkyCondition, Vec<f32>)> {
        let classifier = OnnxModelProvider::new(onnx_config).provision()?;
        let image = ImageLoader::from_path(&path)?;
        let tensor = ImagePreprocessor::preprocess(&image)?;
        let scores = classifier.classify(&tensor)?;
        Ok((SkyCondition::from_scores(&scores)?, scores))
    })
    .await??;

    let (condition, scores) = condition;
    for (label, score) in SkyCondition::ALL.iter().zip(scores.iter()) {
        println!("{:<8} {:.4}", label, score);
    }
    println!("Prediction: {}", condition);

    Ok(())
}
