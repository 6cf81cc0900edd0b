//! Mock output sinks

use futures::future::BoxFuture;
use pixelweave::outputs::OutputPlugin;
use pixelweave::{FrameBuffer, PixelWeaveError, Result, Rgb};
use std::sync::{Arc, Mutex};

/// Sink that records every frame it receives
pub struct RecordingOutput {
    name: String,
    frames: Arc<Mutex<Vec<Vec<Rgb>>>>,
}

impl RecordingOutput {
    /// The sink and a handle to the frames it will record
    pub fn new(name: &str) -> (Self, Arc<Mutex<Vec<Vec<Rgb>>>>) {
        let frames = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                name: name.to_string(),
                frames: frames.clone(),
            },
            frames,
        )
    }
}

impl OutputPlugin for RecordingOutput {
    fn name(&self) -> &str {
        &self.name
    }

    fn send_frame<'a>(&'a mut self, frame: &'a FrameBuffer) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.frames.lock().unwrap().push(frame.pixels().to_vec());
            Ok(())
        })
    }
}

/// Sink whose delivery never resolves; counts how often it was called
pub struct HangingOutput {
    calls: Arc<Mutex<usize>>,
}

impl HangingOutput {
    pub fn new() -> (Self, Arc<Mutex<usize>>) {
        let calls = Arc::new(Mutex::new(0));
        (
            Self {
                calls: calls.clone(),
            },
            calls,
        )
    }
}

impl OutputPlugin for HangingOutput {
    fn name(&self) -> &str {
        "hanging"
    }

    fn send_frame<'a>(&'a mut self, _frame: &'a FrameBuffer) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            *self.calls.lock().unwrap() += 1;
            std::future::pending::<()>().await;
            Ok(())
        })
    }
}

/// Sink that always fails
pub struct FailingOutput;

impl OutputPlugin for FailingOutput {
    fn name(&self) -> &str {
        "failing"
    }

    fn send_frame<'a>(&'a mut self, _frame: &'a FrameBuffer) -> BoxFuture<'a, Result<()>> {
        Box::pin(async { Err(PixelWeaveError::output("failing", "controller unreachable")) })
    }
}
