//! Controller: wires a run configuration into a running pipeline.
//!
//! Startup order: model, outputs (plus preview), instrument, scheduler. Any
//! failure before the scheduler starts aborts the run without dispatching a
//! frame.

use crate::config::RunConfig;
use crate::error::{Result, ResultExt};
use crate::instrument::{FrameSource, InstrumentProcess};
use crate::model::Model;
use crate::outputs::{build_outputs, AnyOutput, PreviewFeed, PreviewInfo, PreviewOutput};
use crate::pipeline::{FrameScheduler, OutputFanout, RunOutcome, SchedulerStats, SinkStats};
use tokio_util::sync::CancellationToken;

/// What a finished run reports
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub outcome: RunOutcome,
    pub stats: SchedulerStats,
    pub sinks: Vec<SinkStats>,
}

/// A configured run: model loaded and outputs connected, ready to start.
pub struct Controller {
    config: RunConfig,
    model: Model,
    fanout: OutputFanout,
    preview: Option<(PreviewFeed, PreviewInfo)>,
    cancel: CancellationToken,
}

impl Controller {
    /// Load the model named by `config` and build its outputs
    pub async fn from_config(config: RunConfig) -> Result<Self> {
        let model_path = config.model_path();
        let model = Model::load(&model_path)
            .with_context(|| format!("Failed to load model {:?}", model_path))?;
        Self::with_model(config, model).await
    }

    /// Build outputs for an already loaded model
    pub async fn with_model(config: RunConfig, model: Model) -> Result<Self> {
        config.validate()?;
        let mut outputs = build_outputs(&config.outputs, &model).await?;

        let preview = match &config.simulator {
            Some(simulator) => {
                let output = PreviewOutput::new();
                let feed = output.feed();
                let info = PreviewInfo::new(simulator, &model);
                tracing::info!(
                    "Preview enabled (simulator port {}, websocket port {})",
                    simulator.port,
                    info.web_socket_port
                );
                outputs.push(AnyOutput::from(output));
                Some((feed, info))
            }
            None => None,
        };

        if outputs.is_empty() {
            tracing::warn!("No outputs configured; frames will be computed and discarded");
        }
        let fanout = OutputFanout::new(outputs, config.fanout.clone());

        Ok(Self {
            config,
            model,
            fanout,
            preview,
            cancel: CancellationToken::new(),
        })
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    /// Token that stops the run when cancelled
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Frame feed for a preview transport, when the simulator is enabled
    pub fn preview_feed(&self) -> Option<PreviewFeed> {
        self.preview.as_ref().map(|(feed, _)| feed.clone())
    }

    /// Descriptor served to preview clients, when the simulator is enabled
    pub fn preview_info(&self) -> Option<&PreviewInfo> {
        self.preview.as_ref().map(|(_, info)| info)
    }

    /// Add a sink that was not described in the configuration
    pub fn add_output(&mut self, output: AnyOutput) {
        self.fanout.push(output);
    }

    pub fn output_count(&self) -> usize {
        self.fanout.len()
    }

    /// Spawn the configured instrument and run until it ends or is cancelled
    pub async fn run(self) -> Result<RunSummary> {
        let mut instrument = InstrumentProcess::spawn(
            &self.model,
            self.config.frames_per_second,
            &self.config.instrument,
        )?;
        Ok(self.run_with_source(&mut instrument).await)
    }

    /// Run the scheduler against any frame source
    pub async fn run_with_source<S: FrameSource>(mut self, source: &mut S) -> RunSummary {
        let mut scheduler =
            FrameScheduler::new(self.config.frame_period(), self.model.pixel_count());
        let outcome = scheduler.run(source, &mut self.fanout, &self.cancel).await;

        let stats = scheduler.stats().clone();
        tracing::info!(
            "Run finished ({:?}): {} frames, {} skip events ({} frames skipped)",
            outcome,
            stats.frames_dispatched,
            stats.skip_events,
            stats.skipped_frames
        );
        RunSummary {
            outcome,
            stats,
            sinks: self.fanout.sink_stats(),
        }
    }
}
