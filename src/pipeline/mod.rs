//! Frame pipeline: paced pull from a frame source, push to every output.
//!
//! # Architecture
//!
//! ```text
//! [InstrumentProcess] ──► [FrameScheduler] ──► [OutputFanout] ──► [E131Output]
//!                                                            ├──► [PreviewOutput]
//!                                                            └──► [OutputPlugin]
//! ```
//!
//! # Design
//!
//! - **Single cooperative timeline**: one cycle at a time; the only
//!   suspension points are the pacing sleep, the frame fetch, and the
//!   fanout join.
//! - **Owned frame buffer**: the scheduler owns it and lends it immutably
//!   to all sinks for the dispatch window, so no locking is needed.
//! - **Cancellation**: a `CancellationToken` is observed at every
//!   suspension point.

pub mod fanout;
pub mod scheduler;

pub use fanout::{FanoutReport, OutputFanout, SinkStats};
pub use scheduler::{
    decode_frame, FramePacer, FrameScheduler, FrameSkip, FrameTracker, RunOutcome, SchedulerStats,
};
