//! Frame reassembly for the instrument byte protocol.
//!
//! An instrument writes an undelimited sequence of frames to stdout. Each
//! frame is `4 + 4 * P` bytes: a little-endian `u32` sequence number
//! followed by `P` groups of `[r, g, b, a]`. Frame boundaries are implied by
//! the model's pixel count alone, so the reassembler only has to count
//! bytes. Output is identical however the stream happens to be chunked.

use crate::error::{PixelWeaveError, Result};
use bytes::{Bytes, BytesMut};

/// Size of the sequence-number header
pub const FRAME_HEADER_LEN: usize = 4;

/// Bytes per pixel on the wire (`r, g, b, a`)
pub const BYTES_PER_PIXEL: usize = 4;

/// Wire size of one frame for `pixel_count` pixels
pub fn frame_size(pixel_count: usize) -> usize {
    FRAME_HEADER_LEN + BYTES_PER_PIXEL * pixel_count
}

/// One complete frame as produced by an instrument
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    bytes: Bytes,
}

impl RawFrame {
    /// Wrap wire bytes, checking that they hold a header and whole pixels
    pub fn from_bytes(bytes: Bytes) -> Result<Self> {
        if bytes.len() < FRAME_HEADER_LEN || (bytes.len() - FRAME_HEADER_LEN) % BYTES_PER_PIXEL != 0
        {
            return Err(PixelWeaveError::Serialization(format!(
                "a raw frame needs a {}-byte header and whole {}-byte pixels, got {} bytes",
                FRAME_HEADER_LEN,
                BYTES_PER_PIXEL,
                bytes.len()
            )));
        }
        Ok(Self { bytes })
    }

    /// Encode a frame from a sequence number and RGBA pixels
    pub fn from_rgba(sequence: u32, pixels: &[[u8; 4]]) -> Self {
        let mut buf = BytesMut::with_capacity(frame_size(pixels.len()));
        buf.extend_from_slice(&sequence.to_le_bytes());
        for px in pixels {
            buf.extend_from_slice(px);
        }
        Self { bytes: buf.freeze() }
    }

    /// Sequence number written by the instrument
    pub fn sequence(&self) -> u32 {
        let mut header = [0u8; FRAME_HEADER_LEN];
        header.copy_from_slice(&self.bytes[..FRAME_HEADER_LEN]);
        u32::from_le_bytes(header)
    }

    /// Number of pixels carried by this frame
    pub fn pixel_count(&self) -> usize {
        (self.bytes.len() - FRAME_HEADER_LEN) / BYTES_PER_PIXEL
    }

    /// `[r, g, b, a]` of pixel `index`
    pub fn rgba(&self, index: usize) -> Option<[u8; 4]> {
        let offset = FRAME_HEADER_LEN + index * BYTES_PER_PIXEL;
        self.bytes
            .get(offset..offset + BYTES_PER_PIXEL)
            .map(|px| [px[0], px[1], px[2], px[3]])
    }

    /// Pixels in order as `[r, g, b, a]`
    pub fn pixels(&self) -> impl Iterator<Item = [u8; 4]> + '_ {
        self.bytes[FRAME_HEADER_LEN..]
            .chunks_exact(BYTES_PER_PIXEL)
            .map(|px| [px[0], px[1], px[2], px[3]])
    }

    /// Total wire length
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Always false; a frame carries at least its header
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Wire bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Splits an arbitrarily chunked byte stream into fixed-size frames (FIFO).
#[derive(Debug)]
pub struct FrameReassembler {
    frame_size: usize,
    pending: BytesMut,
}

impl FrameReassembler {
    /// Create a reassembler for frames of `frame_size` bytes
    pub fn new(frame_size: usize) -> Self {
        debug_assert!(frame_size >= FRAME_HEADER_LEN);
        Self {
            frame_size,
            pending: BytesMut::with_capacity(frame_size * 2),
        }
    }

    /// Create a reassembler for a model with `pixel_count` pixels
    pub fn for_pixel_count(pixel_count: usize) -> Self {
        Self::new(frame_size(pixel_count))
    }

    /// Frame size in bytes
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Append bytes as they arrive from the stream
    pub fn push(&mut self, chunk: &[u8]) {
        self.pending.extend_from_slice(chunk);
    }

    /// Take the next complete frame from the front of the buffer
    pub fn next_frame(&mut self) -> Option<RawFrame> {
        if self.pending.len() < self.frame_size {
            return None;
        }
        let bytes = self.pending.split_to(self.frame_size).freeze();
        Some(RawFrame { bytes })
    }

    /// Bytes buffered that do not yet form a full frame
    pub fn buffered_len(&self) -> usize {
        self.pending.len()
    }

    /// End of stream: drops any partial frame and returns its length
    pub fn finish(&mut self) -> usize {
        let discarded = self.pending.len();
        self.pending.clear();
        discarded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn stream_of(frames: &[RawFrame]) -> Vec<u8> {
        frames.iter().flat_map(|f| f.as_bytes().to_vec()).collect()
    }

    fn sample_frames(pixel_count: usize, count: u32) -> Vec<RawFrame> {
        (0..count)
            .map(|seq| {
                let pixels: Vec<[u8; 4]> = (0..pixel_count)
                    .map(|i| [seq as u8, i as u8, (seq as u8).wrapping_mul(3), 255])
                    .collect();
                RawFrame::from_rgba(seq + 1, &pixels)
            })
            .collect()
    }

    #[test]
    fn test_frame_size() {
        assert_eq!(frame_size(0), 4);
        assert_eq!(frame_size(3), 16);
        assert_eq!(frame_size(170), 684);
    }

    #[test]
    fn test_decode_header_and_pixels() {
        let frame = RawFrame::from_rgba(
            1,
            &[[255, 0, 0, 255], [0, 255, 0, 255], [0, 0, 255, 255]],
        );
        assert_eq!(frame.len(), 16);
        assert_eq!(frame.sequence(), 1);
        assert_eq!(frame.pixel_count(), 3);
        assert_eq!(frame.rgba(1), Some([0, 255, 0, 255]));
        assert_eq!(frame.rgba(3), None);
        assert_eq!(frame.pixels().count(), 3);
    }

    #[test]
    fn test_sequence_is_little_endian() {
        let frame = RawFrame::from_bytes(Bytes::from_static(&[0x01, 0x02, 0x00, 0x00])).unwrap();
        assert_eq!(frame.sequence(), 0x0201);
    }

    #[test]
    fn test_from_bytes_rejects_partial_pixels() {
        assert!(RawFrame::from_bytes(Bytes::from_static(&[0, 0, 0])).is_err());
        assert!(RawFrame::from_bytes(Bytes::from_static(&[0, 0, 0, 0, 1, 2])).is_err());
        assert!(RawFrame::from_bytes(Bytes::from_static(&[0, 0, 0, 0])).is_ok());
    }

    #[test]
    fn test_contiguous_write() {
        let frames = sample_frames(3, 4);
        let mut framer = FrameReassembler::for_pixel_count(3);
        framer.push(&stream_of(&frames));

        let mut out = Vec::new();
        while let Some(f) = framer.next_frame() {
            out.push(f);
        }
        assert_eq!(out, frames);
        assert_eq!(framer.buffered_len(), 0);
    }

    #[test]
    fn test_one_byte_deliveries() {
        let frames = sample_frames(5, 3);
        let mut framer = FrameReassembler::for_pixel_count(5);
        let mut out = Vec::new();
        for byte in stream_of(&frames) {
            framer.push(&[byte]);
            while let Some(f) = framer.next_frame() {
                assert_eq!(f.len(), frame_size(5));
                out.push(f);
            }
        }
        assert_eq!(out, frames);
    }

    #[test]
    fn test_remainder_is_kept_then_discarded() {
        let frames = sample_frames(2, 2);
        let mut bytes = stream_of(&frames);
        bytes.extend_from_slice(&[1, 2, 3]);

        let mut framer = FrameReassembler::for_pixel_count(2);
        framer.push(&bytes);
        assert!(framer.next_frame().is_some());
        assert!(framer.next_frame().is_some());
        assert!(framer.next_frame().is_none());
        assert_eq!(framer.buffered_len(), 3);
        assert_eq!(framer.finish(), 3);
        assert_eq!(framer.buffered_len(), 0);
    }

    #[test]
    fn test_zero_pixel_model() {
        let mut framer = FrameReassembler::for_pixel_count(0);
        framer.push(&[7, 0, 0, 0, 8, 0]);
        let frame = framer.next_frame().unwrap();
        assert_eq!(frame.sequence(), 7);
        assert_eq!(frame.pixel_count(), 0);
        assert!(framer.next_frame().is_none());
    }

    proptest! {
        #[test]
        fn test_chunking_does_not_change_frames(
            pixel_count in 0usize..12,
            frame_count in 1u32..8,
            cuts in prop::collection::vec(1usize..40, 0..64),
        ) {
            let frames = sample_frames(pixel_count, frame_count);
            let bytes = stream_of(&frames);

            let mut framer = FrameReassembler::for_pixel_count(pixel_count);
            let mut out = Vec::new();
            let mut rest: &[u8] = &bytes;
            for cut in cuts {
                if rest.is_empty() {
                    break;
                }
                let n = cut.min(rest.len());
                framer.push(&rest[..n]);
                rest = &rest[n..];
                while let Some(f) = framer.next_frame() {
                    out.push(f);
                }
            }
            framer.push(rest);
            while let Some(f) = framer.next_frame() {
                out.push(f);
            }

            prop_assert_eq!(out.len(), frames.len());
            for f in &out {
                prop_assert_eq!(f.len(), frame_size(pixel_count));
            }
            prop_assert_eq!(out, frames);
        }
    }
}
