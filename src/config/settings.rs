//! Fanout settings controlling how slow output sinks are handled
//!
//! Every frame is delivered to all sinks concurrently and the scheduler
//! waits for all of them. Without a timeout one hung sink stalls every
//! following cycle; with a timeout the fanout stops waiting for it and
//! applies a [`SinkTimeoutPolicy`].

use crate::error::{PixelWeaveError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What happens to a sink whose delivery exceeded the timeout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SinkTimeoutPolicy {
    /// Keep delivering to the sink on later frames
    #[default]
    Retain,
    /// Stop delivering to the sink for the rest of the run
    Drop,
}

impl std::fmt::Display for SinkTimeoutPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SinkTimeoutPolicy::Retain => write!(f, "retain"),
            SinkTimeoutPolicy::Drop => write!(f, "drop"),
        }
    }
}

/// Fanout timeout configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct FanoutSettings {
    /// Per-sink delivery timeout in milliseconds; `None` waits forever
    #[serde(default)]
    pub sink_timeout_ms: Option<u64>,

    /// Policy applied when a sink times out
    #[serde(default)]
    pub on_sink_timeout: SinkTimeoutPolicy,
}

impl FanoutSettings {
    /// Settings with a per-sink timeout
    pub fn with_timeout(timeout: Duration, policy: SinkTimeoutPolicy) -> Self {
        Self {
            sink_timeout_ms: Some(timeout.as_millis() as u64),
            on_sink_timeout: policy,
        }
    }

    /// The per-sink timeout, if any
    pub fn sink_timeout(&self) -> Option<Duration> {
        self.sink_timeout_ms.map(Duration::from_millis)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.sink_timeout_ms == Some(0) {
            return Err(PixelWeaveError::Config(
                "fanout.sinkTimeoutMs must be positive; omit it to wait forever".to_string(),
            ));
        }
        Ok(())
    }
}
