//! Test data builders for frames, sources and configurations

use pixelweave::instrument::{FrameSource, RawFrame};
use std::collections::VecDeque;
use std::future::Future;
use std::time::Duration;

/// Builder for raw instrument frames
pub struct FrameBuilder {
    sequence: u32,
    pixels: Vec<[u8; 4]>,
}

impl FrameBuilder {
    pub fn new(sequence: u32) -> Self {
        Self {
            sequence,
            pixels: Vec::new(),
        }
    }

    pub fn pixel(mut self, rgba: [u8; 4]) -> Self {
        self.pixels.push(rgba);
        self
    }

    /// `count` copies of one color
    pub fn fill(mut self, count: usize, rgba: [u8; 4]) -> Self {
        self.pixels.extend(std::iter::repeat(rgba).take(count));
        self
    }

    pub fn build(self) -> RawFrame {
        RawFrame::from_rgba(self.sequence, &self.pixels)
    }
}

/// Frame source that replays a script of frames, each after an optional delay.
pub struct ScriptedSource {
    frames: VecDeque<(Duration, RawFrame)>,
    pub served: usize,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self {
            frames: VecDeque::new(),
            served: 0,
        }
    }

    /// `count` solid frames with sequence numbers 1..=count
    pub fn steady(count: u32, pixel_count: usize) -> Self {
        (1..=count).fold(Self::new(), |source, seq| {
            source.frame(FrameBuilder::new(seq).fill(pixel_count, [seq as u8, 0, 0, 255]).build())
        })
    }

    pub fn frame(self, frame: RawFrame) -> Self {
        self.delayed_frame(Duration::ZERO, frame)
    }

    /// Serve `frame` only after `delay` has passed
    pub fn delayed_frame(mut self, delay: Duration, frame: RawFrame) -> Self {
        self.frames.push_back((delay, frame));
        self
    }
}

impl Default for ScriptedSource {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSource for ScriptedSource {
    fn next_frame(&mut self) -> impl Future<Output = Option<RawFrame>> + Send {
        let next = self.frames.pop_front();
        if next.is_some() {
            self.served += 1;
        }
        async move {
            let (delay, frame) = next?;
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            Some(frame)
        }
    }
}

/// Frame source that never produces a frame
pub struct PendingSource;

impl FrameSource for PendingSource {
    fn next_frame(&mut self) -> impl Future<Output = Option<RawFrame>> + Send {
        std::future::pending()
    }
}

/// Minimal valid configuration text with extra TOML appended
pub fn config_toml(extra: &str) -> String {
    format!(
        r#"framesPerSecond = 40
model = "model.json"

[instrument]
program = "true"

{}"#,
        extra
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_builder() {
        let frame = FrameBuilder::new(3).pixel([1, 2, 3, 4]).fill(2, [9, 9, 9, 9]).build();
        assert_eq!(frame.sequence(), 3);
        assert_eq!(frame.pixel_count(), 3);
        assert_eq!(frame.rgba(2), Some([9, 9, 9, 9]));
    }
}
