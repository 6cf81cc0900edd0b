//! Concurrent delivery of one frame to every output sink.

use crate::config::{FanoutSettings, SinkTimeoutPolicy};
use crate::outputs::AnyOutput;
use crate::types::FrameBuffer;
use futures::future::join_all;

/// Outcome of delivering one frame to every sink
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanoutReport {
    /// Sinks that accepted the frame
    pub delivered: usize,
    /// Sinks that returned an error
    pub failed: usize,
    /// Sinks abandoned after exceeding the per-sink timeout
    pub timed_out: usize,
    /// Sinks already disabled by the `drop` policy
    pub skipped: usize,
}

impl FanoutReport {
    /// Every active sink accepted the frame
    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.timed_out == 0
    }
}

/// Per-sink delivery counters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkStats {
    pub name: String,
    pub delivered: u64,
    pub failed: u64,
    pub timed_out: u64,
    pub disabled: bool,
}

struct SinkSlot {
    output: AnyOutput,
    delivered: u64,
    failed: u64,
    timed_out: u64,
    disabled: bool,
}

enum Delivery {
    Delivered,
    Failed,
    TimedOut,
}

/// Submits the same frame buffer to all sinks and waits for all of them.
///
/// Failures are logged and counted, never retried, and never stop the other
/// sinks. Without a configured timeout a sink that never resolves stalls
/// `send_frame` indefinitely.
pub struct OutputFanout {
    slots: Vec<SinkSlot>,
    settings: FanoutSettings,
}

impl OutputFanout {
    pub fn new(outputs: Vec<AnyOutput>, settings: FanoutSettings) -> Self {
        let slots = outputs
            .into_iter()
            .map(|output| SinkSlot {
                output,
                delivered: 0,
                failed: 0,
                timed_out: 0,
                disabled: false,
            })
            .collect();
        Self { slots, settings }
    }

    /// Add another sink to the rotation
    pub fn push(&mut self, output: AnyOutput) {
        self.slots.push(SinkSlot {
            output,
            delivered: 0,
            failed: 0,
            timed_out: 0,
            disabled: false,
        });
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Sinks still receiving frames
    pub fn active_count(&self) -> usize {
        self.slots.iter().filter(|s| !s.disabled).count()
    }

    pub fn settings(&self) -> &FanoutSettings {
        &self.settings
    }

    /// Delivery counters for every sink, in configuration order
    pub fn sink_stats(&self) -> Vec<SinkStats> {
        self.slots
            .iter()
            .map(|s| SinkStats {
                name: s.output.name().to_string(),
                delivered: s.delivered,
                failed: s.failed,
                timed_out: s.timed_out,
                disabled: s.disabled,
            })
            .collect()
    }

    /// Deliver `frame` to every active sink concurrently.
    ///
    /// Resolves once every sink has either finished or, when a timeout is
    /// configured, been abandoned for this frame.
    pub async fn send_frame(&mut self, frame: &FrameBuffer) -> FanoutReport {
        let timeout = self.settings.sink_timeout();
        let policy = self.settings.on_sink_timeout;
        let mut report = FanoutReport::default();

        let mut pending = Vec::with_capacity(self.slots.len());
        for slot in self.slots.iter_mut() {
            if slot.disabled {
                report.skipped += 1;
            } else {
                pending.push(deliver(slot, frame, timeout));
            }
        }

        for (slot, delivery) in join_all(pending).await {
            match delivery {
                Delivery::Delivered => {
                    slot.delivered += 1;
                    report.delivered += 1;
                }
                Delivery::Failed => {
                    slot.failed += 1;
                    report.failed += 1;
                }
                Delivery::TimedOut => {
                    slot.timed_out += 1;
                    report.timed_out += 1;
                    if policy == SinkTimeoutPolicy::Drop {
                        slot.disabled = true;
                        tracing::warn!(
                            "Output {} disabled for the rest of the run after timing out",
                            slot.output.name()
                        );
                    }
                }
            }
        }

        report
    }
}

async fn deliver<'a>(
    slot: &'a mut SinkSlot,
    frame: &'a FrameBuffer,
    timeout: Option<std::time::Duration>,
) -> (&'a mut SinkSlot, Delivery) {
    let result = match timeout {
        Some(limit) => {
            let outcome = tokio::time::timeout(limit, slot.output.send_frame(frame)).await;
            match outcome {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!(
                        "Output {} did not accept the frame within {:?}",
                        slot.output.name(),
                        limit
                    );
                    return (slot, Delivery::TimedOut);
                }
            }
        }
        None => slot.output.send_frame(frame).await,
    };

    let delivery = match result {
        Ok(()) => Delivery::Delivered,
        Err(e) => {
            tracing::warn!("Output {} failed to send frame: {}", slot.output.name(), e);
            Delivery::Failed
        }
    };
    (slot, delivery)
}
