//! Instruments: external pattern generators feeding frames to the controller.
//!
//! An instrument is any program that reads a JSON payload
//! (`{ framesPerSecond, model }`) from the file named by its last argument
//! and writes raw frames to stdout. Keeping the boundary at the process
//! level means patterns can be written in any language.
//!
//! - [`framing`]: the wire format and the chunk-independent reassembler
//! - [`stream`]: background drain into a bounded frame queue
//! - [`process`]: spawning and supervising the instrument program

pub mod framing;
pub mod process;
pub mod stream;

pub use framing::{frame_size, FrameReassembler, RawFrame};
pub use process::{InstrumentPayload, InstrumentProcess};
pub use stream::{DrainSummary, FrameStream};

use std::future::Future;

/// Anything the scheduler can pull frames from.
///
/// `next_frame` resolves to `None` once no further frames will arrive;
/// that is the scheduler's normal termination signal.
pub trait FrameSource: Send {
    /// Wait for the next frame in stream order
    fn next_frame(&mut self) -> impl Future<Output = Option<RawFrame>> + Send;
}
