//! Configuration module for pixelweave
//!
//! This module handles the run configuration, read once at startup and
//! treated as immutable for the rest of the run:
//! - Frame rate and model location
//! - The instrument program to launch
//! - Optional live preview (simulator) settings
//! - Output descriptors, one per sink
//! - Fanout timeout behavior (see [`settings`])
//!
//! # File Format
//!
//! The configuration is a TOML document, normally `config.toml`:
//!
//! ```toml
//! framesPerSecond = 40
//! model = "model.json"
//!
//! [instrument]
//! program = "python3"
//! args = ["patterns/top_down_white.py"]
//!
//! [simulator]
//! port = 3000
//!
//! [[outputs]]
//! type = "e131"
//! host = "10.0.0.20"
//! channels = [{ universe = 1, firstPixel = 0, pixelCount = 170 }]
//! ```
//!
//! Output descriptors are a closed set: an entry whose `type` is not a known
//! sink kind fails deserialization, so the run aborts before the frame loop
//! starts.

pub mod settings;

pub use settings::*;

use crate::error::{PixelWeaveError, Result, ResultExt};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default configuration filename
pub const DEFAULT_CONFIG_FILE: &str = "config.toml";

/// Default number of complete frames buffered ahead of the scheduler
pub const DEFAULT_MAX_BUFFERED_FRAMES: usize = 64;

/// Default HTTP port of the preview simulator
pub const DEFAULT_SIMULATOR_PORT: u16 = 3000;

/// Default UDP port for E1.31 (sACN)
pub const DEFAULT_E131_PORT: u16 = 5568;

/// Default E1.31 source priority
pub const DEFAULT_E131_PRIORITY: u8 = 100;

/// Default E1.31 source name
pub const DEFAULT_E131_SOURCE_NAME: &str = "pixelweave";

/// Number of DMX slots in one universe
pub const DMX_UNIVERSE_SLOTS: usize = 512;

/// Highest valid E1.31 universe number
pub const MAX_E131_UNIVERSE: u16 = 63999;

// ==================== Run Configuration ====================

/// Top-level run configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunConfig {
    /// Target output frame rate
    pub frames_per_second: f64,

    /// Path to the model JSON, relative to the configuration file
    pub model: PathBuf,

    /// The pattern generator to run
    pub instrument: InstrumentConfig,

    /// Live preview settings; enables the preview sink when present
    #[serde(default)]
    pub simulator: Option<SimulatorConfig>,

    /// Fanout timeout behavior
    #[serde(default)]
    pub fanout: FanoutSettings,

    /// Output sinks
    #[serde(default)]
    pub outputs: Vec<OutputDescriptor>,

    /// Directory the configuration was loaded from
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

impl RunConfig {
    /// Parse a configuration from TOML text and validate it
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: RunConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;

        let mut config = Self::from_toml_str(&text)
            .with_context(|| format!("Failed to load config file {:?}", path))?;
        config.base_dir = path.parent().map(Path::to_path_buf);

        tracing::info!(
            "Loaded config {:?}: {} fps, {} output(s), simulator {}",
            path,
            config.frames_per_second,
            config.outputs.len(),
            if config.simulator.is_some() { "on" } else { "off" }
        );
        Ok(config)
    }

    /// Check values that TOML types alone cannot express
    pub fn validate(&self) -> Result<()> {
        period_from_rate(self.frames_per_second)?;
        self.instrument.validate()?;
        self.fanout.validate()?;
        for output in &self.outputs {
            output.validate()?;
        }
        Ok(())
    }

    /// Duration of one frame; `Duration::MAX` if the rate fails validation
    pub fn frame_period(&self) -> Duration {
        period_from_rate(self.frames_per_second).unwrap_or(Duration::MAX)
    }

    /// Model path resolved against the configuration directory
    pub fn model_path(&self) -> PathBuf {
        match &self.base_dir {
            Some(dir) if self.model.is_relative() => dir.join(&self.model),
            _ => self.model.clone(),
        }
    }
}

/// Frame period for a rate in frames per second.
///
/// The rate must be finite and positive, and its period must be non-zero
/// and fit in a `Duration`.
pub fn period_from_rate(frames_per_second: f64) -> Result<Duration> {
    if !frames_per_second.is_finite() || frames_per_second <= 0.0 {
        return Err(PixelWeaveError::Config(format!(
            "framesPerSecond must be a positive number, got {}",
            frames_per_second
        )));
    }
    match Duration::try_from_secs_f64(1.0 / frames_per_second) {
        Ok(period) if !period.is_zero() => Ok(period),
        _ => Err(PixelWeaveError::Config(format!(
            "framesPerSecond {} gives a frame period outside the supported range",
            frames_per_second
        ))),
    }
}

// ==================== Instrument ====================

/// External pattern generator invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstrumentConfig {
    /// Program to run, looked up on `PATH` (e.g. `python3`, `node`)
    pub program: String,

    /// Fixed arguments; the payload file path is appended after these
    #[serde(default)]
    pub args: Vec<String>,

    /// Complete frames buffered before the producer is paused
    #[serde(default = "default_max_buffered_frames")]
    pub max_buffered_frames: usize,
}

fn default_max_buffered_frames() -> usize {
    DEFAULT_MAX_BUFFERED_FRAMES
}

impl InstrumentConfig {
    /// Create an instrument invocation with default buffering
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            max_buffered_frames: DEFAULT_MAX_BUFFERED_FRAMES,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.program.trim().is_empty() {
            return Err(PixelWeaveError::Config(
                "instrument.program must not be empty".to_string(),
            ));
        }
        if self.max_buffered_frames == 0 {
            return Err(PixelWeaveError::Config(
                "instrument.maxBufferedFrames must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

// ==================== Simulator ====================

/// Live preview (simulator) settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulatorConfig {
    /// HTTP port of the preview web interface
    #[serde(default = "default_simulator_port")]
    pub port: u16,

    /// Port of the push-style frame feed; defaults to `port + 1`
    #[serde(default)]
    pub web_socket_port: Option<u16>,
}

fn default_simulator_port() -> u16 {
    DEFAULT_SIMULATOR_PORT
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_SIMULATOR_PORT,
            web_socket_port: None,
        }
    }
}

impl SimulatorConfig {
    /// Effective frame feed port
    pub fn web_socket_port(&self) -> u16 {
        self.web_socket_port
            .unwrap_or_else(|| self.port.wrapping_add(1))
    }
}

// ==================== Outputs ====================

/// One configured output sink
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OutputDescriptor {
    /// E1.31 (streaming ACN) sender
    E131(E131Descriptor),
}

impl OutputDescriptor {
    /// Short kind name used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            OutputDescriptor::E131(_) => "e131",
        }
    }

    fn validate(&self) -> Result<()> {
        match self {
            OutputDescriptor::E131(d) => d.validate(),
        }
    }
}

/// Parameters of an E1.31 sink
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct E131Descriptor {
    /// Receiver host name or address
    pub host: String,

    /// Receiver UDP port
    #[serde(default = "default_e131_port")]
    pub port: u16,

    /// Source priority (0-200)
    #[serde(default = "default_e131_priority")]
    pub priority: u8,

    /// Source name announced in every packet
    #[serde(default = "default_e131_source_name")]
    pub source_name: String,

    /// Pixel-to-channel mapping
    #[serde(default)]
    pub channels: Vec<ChannelMapping>,
}

fn default_e131_port() -> u16 {
    DEFAULT_E131_PORT
}

fn default_e131_priority() -> u8 {
    DEFAULT_E131_PRIORITY
}

fn default_e131_source_name() -> String {
    DEFAULT_E131_SOURCE_NAME.to_string()
}

impl E131Descriptor {
    /// Create a descriptor for `host` with default port, priority and name
    pub fn new(host: impl Into<String>, channels: Vec<ChannelMapping>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_E131_PORT,
            priority: DEFAULT_E131_PRIORITY,
            source_name: DEFAULT_E131_SOURCE_NAME.to_string(),
            channels,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(PixelWeaveError::Config(
                "e131 output requires a host".to_string(),
            ));
        }
        if self.priority > 200 {
            return Err(PixelWeaveError::Config(format!(
                "e131 priority must be 0-200, got {}",
                self.priority
            )));
        }
        if self.channels.is_empty() {
            return Err(PixelWeaveError::Config(format!(
                "e131 output for {} has no channel mappings",
                self.host
            )));
        }
        for mapping in &self.channels {
            mapping.validate()?;
        }
        Ok(())
    }
}

/// Maps a contiguous run of pixels onto consecutive DMX slots of a universe.
///
/// Each pixel takes three slots (R, G, B) starting at `start_channel`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelMapping {
    /// Destination universe (1-63999)
    pub universe: u16,

    /// First DMX slot, 1-based
    #[serde(default = "default_start_channel")]
    pub start_channel: u16,

    /// Index of the first pixel in model order
    pub first_pixel: usize,

    /// Number of pixels in the run
    pub pixel_count: usize,
}

fn default_start_channel() -> u16 {
    1
}

impl ChannelMapping {
    /// Last slot (1-based, inclusive) written by this mapping.
    ///
    /// Saturates instead of wrapping, so oversized mappings always land
    /// past the end of the universe.
    pub fn last_channel(&self) -> usize {
        (self.start_channel as usize)
            .saturating_add(self.pixel_count.saturating_mul(3))
            .saturating_sub(1)
    }

    /// Check universe and slot bounds
    pub fn validate(&self) -> Result<()> {
        if self.universe == 0 || self.universe > MAX_E131_UNIVERSE {
            return Err(PixelWeaveError::ChannelMapping {
                universe: self.universe,
                message: format!("universe must be 1-{}", MAX_E131_UNIVERSE),
            });
        }
        if self.start_channel == 0 {
            return Err(PixelWeaveError::ChannelMapping {
                universe: self.universe,
                message: "startChannel is 1-based".to_string(),
            });
        }
        if self.pixel_count == 0 {
            return Err(PixelWeaveError::ChannelMapping {
                universe: self.universe,
                message: "pixelCount must be at least 1".to_string(),
            });
        }
        if self.pixel_count > DMX_UNIVERSE_SLOTS / 3 || self.last_channel() > DMX_UNIVERSE_SLOTS {
            return Err(PixelWeaveError::ChannelMapping {
                universe: self.universe,
                message: format!(
                    "{} pixels from channel {} end at slot {}, past {}",
                    self.pixel_count,
                    self.start_channel,
                    self.last_channel(),
                    DMX_UNIVERSE_SLOTS
                ),
            });
        }
        Ok(())
    }
}
