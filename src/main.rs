//! pixelweave - Main Entry Point
//!
//! Loads a run configuration, starts the instrument and streams its frames
//! to every configured output until the instrument exits or Ctrl-C.

use anyhow::Context as _;
use clap::Parser;
use pixelweave::{
    app::Controller,
    config::{RunConfig, DEFAULT_CONFIG_FILE},
    pipeline::RunOutcome,
};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "pixelweave", version, about)]
struct Args {
    /// Run configuration (TOML).
    #[arg(default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Validate the configuration and model, then exit without running.
    #[arg(long, default_value_t = false)]
    check: bool,

    /// Also write logs to daily-rolling files in this directory.
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging; the guard flushes the file writer on exit
    let (file_layer, _log_guard) = match &args.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "pixelweave.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,pixelweave=debug")),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    tracing::info!("Starting pixelweave {}", env!("CARGO_PKG_VERSION"));

    let config = RunConfig::load(&args.config)
        .with_context(|| format!("Failed to load configuration {:?}", args.config))?;
    let controller = Controller::from_config(config)
        .await
        .context("Failed to prepare the run")?;

    if args.check {
        tracing::info!(
            "Configuration OK: {} pixels, {} output(s)",
            controller.model().pixel_count(),
            controller.output_count()
        );
        return Ok(());
    }

    let cancel = controller.cancel_token();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Interrupt received, stopping");
                cancel.cancel();
            }
            Err(e) => tracing::warn!("Failed to listen for Ctrl-C: {}", e),
        }
    });

    let summary = controller.run().await.context("Run failed")?;
    match summary.outcome {
        RunOutcome::StreamEnded => tracing::info!("Instrument finished"),
        RunOutcome::Cancelled => tracing::info!("Stopped by request"),
    }
    for sink in &summary.sinks {
        tracing::info!(
            "Output {}: {} delivered, {} failed, {} timed out{}",
            sink.name,
            sink.delivered,
            sink.failed,
            sink.timed_out,
            if sink.disabled { " (disabled)" } else { "" }
        );
    }

    Ok(())
}
