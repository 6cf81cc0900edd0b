//! Frame scheduler: the wall-clock paced main loop.
//!
//! Each cycle:
//! 1. Compute the frame index from elapsed time since the first run.
//! 2. Sleep until that frame's due time (no-op if already past).
//! 3. Reset the frame buffer to black.
//! 4. Fetch one frame from the source; end of stream stops the loop.
//! 5. Decode RGB into the buffer, dropping alpha.
//! 6. Warn when the frame index jumped by more than one.
//! 7. Dispatch to all outputs and wait for them.
//!
//! Time spent fetching or dispatching is charged to the next cycle, which
//! is what surfaces as a frame skip. Drift is never corrected.

use crate::config::period_from_rate;
use crate::error::Result;
use crate::instrument::{FrameSource, RawFrame};
use crate::pipeline::fanout::{FanoutReport, OutputFanout};
use crate::types::FrameBuffer;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Maps wall-clock time to 1-based frame indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramePacer {
    start: Instant,
    period: Duration,
}

impl FramePacer {
    pub fn new(start: Instant, period: Duration) -> Self {
        Self {
            start,
            period: period.max(Duration::from_nanos(1)),
        }
    }

    pub fn start(&self) -> Instant {
        self.start
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// `floor(elapsed / period) + 1`
    pub fn frame_index_at(&self, now: Instant) -> u64 {
        let elapsed = now.saturating_duration_since(self.start);
        (elapsed.as_nanos() / self.period.as_nanos()) as u64 + 1
    }

    /// `start + index * period`
    pub fn due_time(&self, index: u64) -> Instant {
        let nanos = self.period.as_nanos().saturating_mul(index as u128);
        self.start + Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }
}

/// A gap between consecutive dispatched frame indices
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSkip {
    pub previous: u64,
    pub current: u64,
}

impl FrameSkip {
    /// Frame slots that passed without a dispatch
    pub fn skipped(&self) -> u64 {
        self.current.saturating_sub(self.previous + 1)
    }
}

/// Remembers the last dispatched index and reports discontinuities.
#[derive(Debug, Clone, Default)]
pub struct FrameTracker {
    previous: Option<u64>,
}

impl FrameTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn previous(&self) -> Option<u64> {
        self.previous
    }

    /// Record `index` as dispatched
    pub fn observe(&mut self, index: u64) -> Option<FrameSkip> {
        let skip = match self.previous {
            Some(previous) if index != previous + 1 => Some(FrameSkip {
                previous,
                current: index,
            }),
            _ => None,
        };
        self.previous = Some(index);
        skip
    }
}

/// Counters accumulated over a run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub frames_dispatched: u64,
    pub skip_events: u64,
    pub skipped_frames: u64,
    pub last_skip: Option<FrameSkip>,
    /// Frames whose instrument sequence number did not follow the previous one
    pub sequence_discontinuities: u64,
    pub sink_failures: u64,
    pub sink_timeouts: u64,
}

impl SchedulerStats {
    fn record_skip(&mut self, skip: FrameSkip) {
        self.skip_events += 1;
        self.skipped_frames += skip.skipped();
        self.last_skip = Some(skip);
    }

    fn record_report(&mut self, report: &FanoutReport) {
        self.frames_dispatched += 1;
        self.sink_failures += report.failed as u64;
        self.sink_timeouts += report.timed_out as u64;
    }
}

/// Why a run stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The source reported end of stream
    StreamEnded,
    /// The cancellation token fired
    Cancelled,
}

/// Copy the RGB of each raw pixel into `buffer`; extra pixels are ignored.
pub fn decode_frame(raw: &RawFrame, buffer: &mut FrameBuffer) {
    for (i, [r, g, b, _alpha]) in raw.pixels().enumerate() {
        buffer.set(i, [r, g, b]);
    }
}

/// Owns the frame buffer and paces frames from a source to the outputs.
pub struct FrameScheduler {
    period: Duration,
    pacer: Option<FramePacer>,
    buffer: FrameBuffer,
    tracker: FrameTracker,
    last_sequence: Option<u32>,
    stats: SchedulerStats,
}

impl FrameScheduler {
    pub fn new(period: Duration, pixel_count: usize) -> Self {
        Self {
            period,
            pacer: None,
            buffer: FrameBuffer::new(pixel_count),
            tracker: FrameTracker::new(),
            last_sequence: None,
            stats: SchedulerStats::default(),
        }
    }

    /// Scheduler for a frame rate in frames per second. Fails for rates
    /// with no representable non-zero period.
    pub fn with_frame_rate(frames_per_second: f64, pixel_count: usize) -> Result<Self> {
        Ok(Self::new(period_from_rate(frames_per_second)?, pixel_count))
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Captured on the first call to `run`
    pub fn start_time(&self) -> Option<Instant> {
        self.pacer.map(|p| p.start())
    }

    pub fn stats(&self) -> &SchedulerStats {
        &self.stats
    }

    /// The buffer as of the most recent dispatch
    pub fn buffer(&self) -> &FrameBuffer {
        &self.buffer
    }

    /// Run cycles until the source ends or `cancel` fires.
    ///
    /// Cancellation is observed while sleeping, while fetching, and while
    /// waiting on the outputs.
    pub async fn run<S: FrameSource>(
        &mut self,
        source: &mut S,
        fanout: &mut OutputFanout,
        cancel: &CancellationToken,
    ) -> RunOutcome {
        let period = self.period;
        let pacer = *self
            .pacer
            .get_or_insert_with(|| FramePacer::new(Instant::now(), period));
        tracing::info!(
            "Scheduler running at {:.2} fps ({} pixels, {} outputs)",
            1.0 / pacer.period().as_secs_f64(),
            self.buffer.len(),
            fanout.len()
        );

        loop {
            let index = pacer.frame_index_at(Instant::now());

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return self.cancelled(),
                _ = tokio::time::sleep_until(pacer.due_time(index)) => {}
            }

            self.buffer.clear();

            let raw = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                frame = source.next_frame() => Some(frame),
            };
            let raw = match raw {
                Some(Some(raw)) => raw,
                Some(None) => {
                    tracing::info!(
                        "Frame source ended after {} frames",
                        self.stats.frames_dispatched
                    );
                    return RunOutcome::StreamEnded;
                }
                None => return self.cancelled(),
            };

            decode_frame(&raw, &mut self.buffer);
            self.check_sequence(raw.sequence());

            if let Some(skip) = self.tracker.observe(index) {
                tracing::warn!(
                    "Frame skip: previous index {}, current index {} ({} skipped)",
                    skip.previous,
                    skip.current,
                    skip.skipped()
                );
                self.stats.record_skip(skip);
            }

            let report = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                report = fanout.send_frame(&self.buffer) => Some(report),
            };
            let Some(report) = report else {
                return self.cancelled();
            };
            self.stats.record_report(&report);
            tracing::debug!(
                "Dispatched frame {} (seq {}): {} delivered, {} failed, {} timed out",
                index,
                raw.sequence(),
                report.delivered,
                report.failed,
                report.timed_out
            );
        }
    }

    fn check_sequence(&mut self, sequence: u32) {
        if let Some(previous) = self.last_sequence {
            if sequence != previous.wrapping_add(1) {
                self.stats.sequence_discontinuities += 1;
                tracing::debug!(
                    "Instrument sequence jumped from {} to {}",
                    previous,
                    sequence
                );
            }
        }
        self.last_sequence = Some(sequence);
    }

    fn cancelled(&self) -> RunOutcome {
        tracing::info!(
            "Scheduler cancelled after {} frames",
            self.stats.frames_dispatched
        );
        RunOutcome::Cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FanoutSettings;
    use std::collections::VecDeque;
    use std::future::Future;

    struct Queue(VecDeque<RawFrame>);

    impl FrameSource for Queue {
        fn next_frame(&mut self) -> impl Future<Output = Option<RawFrame>> + Send {
            let next = self.0.pop_front();
            async move { next }
        }
    }

    fn frames(count: u32, pixel_count: usize) -> Queue {
        Queue(
            (1..=count)
                .map(|seq| RawFrame::from_rgba(seq, &vec![[seq as u8, 0, 0, 255]; pixel_count]))
                .collect(),
        )
    }

    #[test]
    fn test_pacer_indices() {
        let start = Instant::now();
        let pacer = FramePacer::new(start, Duration::from_millis(25));
        assert_eq!(pacer.frame_index_at(start), 1);
        assert_eq!(pacer.frame_index_at(start + Duration::from_millis(24)), 1);
        assert_eq!(pacer.frame_index_at(start + Duration::from_millis(25)), 2);
        assert_eq!(pacer.frame_index_at(start + Duration::from_millis(155)), 7);
        assert_eq!(pacer.due_time(1), start + Duration::from_millis(25));
        assert_eq!(pacer.due_time(4), start + Duration::from_millis(100));
    }

    #[test]
    fn test_pacer_before_start() {
        let start = Instant::now() + Duration::from_secs(1);
        let pacer = FramePacer::new(start, Duration::from_millis(10));
        assert_eq!(pacer.frame_index_at(Instant::now()), 1);
    }

    #[test]
    fn test_tracker_reports_gaps() {
        let mut tracker = FrameTracker::new();
        assert_eq!(tracker.observe(1), None);
        assert_eq!(tracker.observe(2), None);
        let skip = tracker.observe(5).unwrap();
        assert_eq!(skip, FrameSkip { previous: 2, current: 5 });
        assert_eq!(skip.skipped(), 2);
        assert_eq!(tracker.observe(6), None);
        assert_eq!(tracker.previous(), Some(6));
    }

    #[test]
    fn test_decode_drops_alpha() {
        let raw = RawFrame::from_rgba(1, &[[255, 0, 0, 255], [0, 255, 0, 7], [0, 0, 255, 0]]);
        let mut buffer = FrameBuffer::new(3);
        decode_frame(&raw, &mut buffer);
        assert_eq!(buffer.pixels(), &[[255, 0, 0], [0, 255, 0], [0, 0, 255]]);
    }

    #[test]
    fn test_decode_ignores_extra_pixels() {
        let raw = RawFrame::from_rgba(1, &[[1, 2, 3, 4], [5, 6, 7, 8]]);
        let mut buffer = FrameBuffer::new(1);
        decode_frame(&raw, &mut buffer);
        assert_eq!(buffer.pixels(), &[[1, 2, 3]]);
    }

    #[test]
    fn test_with_frame_rate_rejects_bad_rates() {
        for fps in [0.0, -5.0, 1e-30, f64::NAN, f64::INFINITY] {
            assert!(FrameScheduler::with_frame_rate(fps, 1).is_err(), "fps {fps}");
        }
        let scheduler = FrameScheduler::with_frame_rate(40.0, 1).unwrap();
        assert_eq!(scheduler.period(), Duration::from_millis(25));
    }

    #[tokio::test(start_paused = true)]
    async fn test_steady_run_has_no_skips() {
        let mut scheduler = FrameScheduler::with_frame_rate(40.0, 2).unwrap();
        let mut fanout = OutputFanout::new(Vec::new(), FanoutSettings::default());
        let mut source = frames(10, 2);

        let outcome = scheduler
            .run(&mut source, &mut fanout, &CancellationToken::new())
            .await;
        assert_eq!(outcome, RunOutcome::StreamEnded);
        assert_eq!(scheduler.stats().frames_dispatched, 10);
        assert_eq!(scheduler.stats().skip_events, 0);
        assert_eq!(scheduler.stats().sequence_discontinuities, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_is_paced() {
        let mut scheduler = FrameScheduler::new(Duration::from_millis(25), 1);
        let mut fanout = OutputFanout::new(Vec::new(), FanoutSettings::default());
        let started = Instant::now();

        scheduler
            .run(&mut frames(4, 1), &mut fanout, &CancellationToken::new())
            .await;
        // Four due times plus the wait before discovering end of stream.
        assert_eq!(started.elapsed(), Duration::from_millis(125));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sequence_gaps_are_counted() {
        let mut scheduler = FrameScheduler::new(Duration::from_millis(10), 1);
        let mut fanout = OutputFanout::new(Vec::new(), FanoutSettings::default());
        let mut source = Queue(
            [1u32, 2, 7, 8]
                .iter()
                .map(|&seq| RawFrame::from_rgba(seq, &[[0, 0, 0, 0]]))
                .collect(),
        );

        scheduler
            .run(&mut source, &mut fanout, &CancellationToken::new())
            .await;
        assert_eq!(scheduler.stats().sequence_discontinuities, 1);
        assert_eq!(scheduler.stats().frames_dispatched, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_before_first_frame() {
        let mut scheduler = FrameScheduler::new(Duration::from_secs(10), 1);
        let mut fanout = OutputFanout::new(Vec::new(), FanoutSettings::default());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = scheduler.run(&mut frames(3, 1), &mut fanout, &cancel).await;
        assert_eq!(outcome, RunOutcome::Cancelled);
        assert_eq!(scheduler.stats().frames_dispatched, 0);
        assert!(scheduler.start_time().is_some());
    }
}
