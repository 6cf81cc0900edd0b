//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;
pub mod mock_helpers;

use std::time::Duration;

/// Frame period used by pacing tests (40 fps)
pub fn test_period() -> Duration {
    Duration::from_millis(25)
}

/// Upper bound for awaiting something that is expected to stall
pub fn test_timeout() -> Duration {
    Duration::from_secs(5)
}
