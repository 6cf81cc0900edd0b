//! Output sinks: where dispatched frames go.
//!
//! Two-layer design, as for pipeline nodes:
//! - **`BuiltinOutput` enum**: the closed set of sink kinds the controller
//!   knows how to build from configuration. Resolved once at startup;
//!   dispatch is a plain `match`.
//! - **`OutputPlugin` trait**: for sinks implemented outside the crate
//!   (e.g. a WebSocket broadcaster or a test recorder).
//!
//! `AnyOutput` wraps either so the fanout can handle both uniformly. Every
//! sink has exactly one capability: accept a frame buffer and deliver it.

pub mod e131;
pub mod preview;

pub use e131::E131Output;
pub use preview::{PreviewFeed, PreviewInfo, PreviewOutput};

use crate::config::OutputDescriptor;
use crate::error::{Result, ResultExt};
use crate::model::Model;
use crate::types::FrameBuffer;
use futures::future::BoxFuture;

/// Trait for pluggable/user-defined sinks.
///
/// Delivery failures are returned to the fanout, which logs them; a sink
/// that wants retries or reconnection does that itself.
pub trait OutputPlugin: Send {
    /// Human-readable name of this sink.
    fn name(&self) -> &str;

    /// Deliver one frame.
    fn send_frame<'a>(&'a mut self, frame: &'a FrameBuffer) -> BoxFuture<'a, Result<()>>;
}

/// Enum dispatch for built-in sinks.
pub enum BuiltinOutput {
    E131(E131Output),
    Preview(PreviewOutput),
}

impl BuiltinOutput {
    pub fn name(&self) -> &str {
        match self {
            BuiltinOutput::E131(o) => o.name(),
            BuiltinOutput::Preview(o) => o.name(),
        }
    }

    pub async fn send_frame(&mut self, frame: &FrameBuffer) -> Result<()> {
        match self {
            BuiltinOutput::E131(o) => o.send_frame(frame).await,
            BuiltinOutput::Preview(o) => o.send_frame(frame),
        }
    }
}

/// Wrapper that holds either a built-in sink or a plugin.
pub enum AnyOutput {
    Builtin(BuiltinOutput),
    Plugin(Box<dyn OutputPlugin>),
}

impl AnyOutput {
    /// Wrap a plugin sink
    pub fn plugin(output: impl OutputPlugin + 'static) -> Self {
        AnyOutput::Plugin(Box::new(output))
    }

    pub fn name(&self) -> &str {
        match self {
            AnyOutput::Builtin(o) => o.name(),
            AnyOutput::Plugin(o) => o.name(),
        }
    }

    pub async fn send_frame(&mut self, frame: &FrameBuffer) -> Result<()> {
        match self {
            AnyOutput::Builtin(o) => o.send_frame(frame).await,
            AnyOutput::Plugin(o) => o.send_frame(frame).await,
        }
    }
}

impl From<E131Output> for AnyOutput {
    fn from(output: E131Output) -> Self {
        AnyOutput::Builtin(BuiltinOutput::E131(output))
    }
}

impl From<PreviewOutput> for AnyOutput {
    fn from(output: PreviewOutput) -> Self {
        AnyOutput::Builtin(BuiltinOutput::Preview(output))
    }
}

/// Resolve configured output descriptors into live sinks.
///
/// Any failure is fatal for the run and is returned before the first cycle.
pub async fn build_outputs(descriptors: &[OutputDescriptor], model: &Model) -> Result<Vec<AnyOutput>> {
    let mut outputs: Vec<AnyOutput> = Vec::with_capacity(descriptors.len());
    for (i, descriptor) in descriptors.iter().enumerate() {
        let output: AnyOutput = match descriptor {
            OutputDescriptor::E131(d) => E131Output::connect(d, model.pixel_count())
                .await
                .with_context(|| format!("Failed to create output #{} ({})", i, descriptor.kind()))?
                .into(),
        };
        outputs.push(output);
    }
    Ok(outputs)
}
