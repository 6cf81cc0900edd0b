//! # pixelweave: frame pipeline for pixel lighting installations
//!
//! An external *instrument* program computes colors for every pixel of an
//! installation and streams them as raw frames over stdout. pixelweave paces
//! those frames against the wall clock and fans each one out to every
//! configured output (E1.31 / sACN controllers, a live preview feed, or
//! user-supplied sinks).
//!
//! ## Architecture
//!
//! - **Instrument**: subprocess launch, stdout drain into a bounded queue,
//!   chunk-independent frame reassembly
//! - **Pipeline**: wall-clock frame scheduler with skip detection, and a
//!   concurrent output fanout with optional per-sink timeouts
//! - **Outputs**: built-in sinks dispatched by enum, plus a plugin trait
//! - **Controller**: turns a [`config::RunConfig`] into a running pipeline
//!
//! ## Example
//!
//! ```ignore
//! use pixelweave::{app::Controller, config::RunConfig};
//!
//! #[tokio::main]
//! async fn main() -> pixelweave::Result<()> {
//!     let config = RunConfig::load("config.toml")?;
//!     let controller = Controller::from_config(config).await?;
//!
//!     let cancel = controller.cancel_token();
//!     tokio::spawn(async move {
//!         let _ = tokio::signal::ctrl_c().await;
//!         cancel.cancel();
//!     });
//!
//!     let summary = controller.run().await?;
//!     println!("{} frames dispatched", summary.stats.frames_dispatched);
//!     Ok(())
//! }
//! ```

pub mod app;
pub mod config;
pub mod error;
pub mod instrument;
pub mod model;
pub mod outputs;
pub mod pipeline;
pub mod types;

pub use app::{Controller, RunSummary};
pub use error::{PixelWeaveError, Result};
pub use model::Model;
pub use types::{FrameBuffer, Rgb};
