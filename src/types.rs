//! Core data types shared across the frame pipeline
//!
//! This module contains the pixel and frame buffer types that flow from the
//! scheduler into every output sink.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One pixel color as `[r, g, b]`
pub type Rgb = [u8; 3];

/// Black, the color every pixel is reset to at the start of a cycle
pub const BLACK: Rgb = [0, 0, 0];

/// Identifier of a pixel in the model's canonical ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PixelId(pub u64);

impl std::fmt::Display for PixelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "pixel#{}", self.0)
    }
}

/// Per-pixel colors for one display instant, in model order.
///
/// The length is fixed at construction and never changes; the scheduler
/// mutates the buffer in place every cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameBuffer {
    pixels: Vec<Rgb>,
}

impl FrameBuffer {
    /// Create an all-black buffer for `pixel_count` pixels
    pub fn new(pixel_count: usize) -> Self {
        Self {
            pixels: vec![BLACK; pixel_count],
        }
    }

    /// Build a buffer from explicit colors
    pub fn from_pixels(pixels: Vec<Rgb>) -> Self {
        Self { pixels }
    }

    /// Number of pixels
    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    /// True when the model has no pixels
    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    /// Reset every pixel to black
    pub fn clear(&mut self) {
        self.pixels.fill(BLACK);
    }

    /// Color of the pixel at `index`
    pub fn get(&self, index: usize) -> Option<Rgb> {
        self.pixels.get(index).copied()
    }

    /// Set the pixel at `index`. Out-of-range writes are ignored.
    pub fn set(&mut self, index: usize, color: Rgb) {
        if let Some(px) = self.pixels.get_mut(index) {
            *px = color;
        }
    }

    /// All pixels in model order
    pub fn pixels(&self) -> &[Rgb] {
        &self.pixels
    }

    /// True when every pixel is black
    pub fn is_black(&self) -> bool {
        self.pixels.iter().all(|px| *px == BLACK)
    }

    /// Owned, immutable copy for consumers that outlive the dispatch window
    pub fn snapshot(&self) -> Arc<[Rgb]> {
        Arc::from(self.pixels.as_slice())
    }
}
