//! Background drain of an instrument's byte stream into a bounded frame queue.
//!
//! A task reads the stream as data arrives, independently of how fast the
//! scheduler consumes frames, and splits it into frames. At most
//! `max_buffered_frames` complete frames wait in the queue; once it is full
//! the task stops reading until the scheduler catches up, which in turn
//! blocks the producer on its pipe.

use crate::instrument::framing::{FrameReassembler, RawFrame};
use crate::instrument::FrameSource;
use std::future::Future;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;

/// Read buffer size for the drain loop
const READ_CHUNK_SIZE: usize = 16 * 1024;

/// Totals reported by the drain task when the stream ends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainSummary {
    /// Bytes read from the stream
    pub bytes_read: u64,
    /// Complete frames queued
    pub frames: u64,
    /// Trailing bytes dropped at end of stream
    pub discarded: usize,
    /// Times the queue was found full
    pub stalls: u64,
}

/// Frames reassembled from an async byte stream.
///
/// Must be created inside a tokio runtime; the drain task is aborted when
/// the stream is dropped.
pub struct FrameStream {
    rx: mpsc::Receiver<RawFrame>,
    frame_size: usize,
    drain: Option<JoinHandle<DrainSummary>>,
}

impl FrameStream {
    /// Start draining `reader` into frames of `frame_size` bytes
    pub fn from_reader<R>(reader: R, frame_size: usize, max_buffered_frames: usize) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(max_buffered_frames.max(1));
        let framer = FrameReassembler::new(frame_size);
        let drain = tokio::spawn(drain(reader, framer, tx));
        Self {
            rx,
            frame_size,
            drain: Some(drain),
        }
    }

    /// Frame size in bytes
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Next frame in stream order, or `None` once the stream has ended and
    /// no complete frame remains
    pub async fn get_frame(&mut self) -> Option<RawFrame> {
        self.rx.recv().await
    }

    /// Wait for the drain task to finish and return its totals
    pub async fn finish(mut self) -> DrainSummary {
        self.rx.close();
        match self.drain.take() {
            Some(handle) => handle.await.unwrap_or_default(),
            None => DrainSummary::default(),
        }
    }
}

impl FrameSource for FrameStream {
    fn next_frame(&mut self) -> impl Future<Output = Option<RawFrame>> + Send {
        self.get_frame()
    }
}

impl Drop for FrameStream {
    fn drop(&mut self) {
        if let Some(handle) = self.drain.take() {
            handle.abort();
        }
    }
}

async fn drain<R>(
    mut reader: R,
    mut framer: FrameReassembler,
    tx: mpsc::Sender<RawFrame>,
) -> DrainSummary
where
    R: AsyncRead + Unpin,
{
    let mut summary = DrainSummary::default();
    let mut chunk = vec![0u8; READ_CHUNK_SIZE];

    'read: loop {
        let n = match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                tracing::warn!("Instrument stream read failed: {}", e);
                break;
            }
        };
        summary.bytes_read += n as u64;
        framer.push(&chunk[..n]);

        while let Some(frame) = framer.next_frame() {
            match tx.try_send(frame) {
                Ok(()) => {}
                Err(TrySendError::Full(frame)) => {
                    if summary.stalls == 0 {
                        tracing::warn!(
                            "Instrument is {} frames ahead of playback; pausing reads until frames are consumed",
                            tx.max_capacity()
                        );
                    }
                    summary.stalls += 1;
                    if tx.send(frame).await.is_err() {
                        break 'read;
                    }
                }
                Err(TrySendError::Closed(_)) => break 'read,
            }
            summary.frames += 1;
        }
    }

    summary.discarded = framer.finish();
    if summary.discarded > 0 {
        tracing::debug!(
            "Instrument stream ended mid-frame; discarded {} trailing bytes",
            summary.discarded
        );
    }
    tracing::debug!(
        "Instrument stream drained: {} bytes, {} frames",
        summary.bytes_read,
        summary.frames
    );
    summary
}
