//! Preview sink. Publishes frame snapshots for a live simulator.
//!
//! The simulator's HTTP and WebSocket surfaces live outside this crate.
//! They describe themselves with [`PreviewInfo`] and receive frames by
//! subscribing to a [`PreviewFeed`].

use crate::config::SimulatorConfig;
use crate::error::Result;
use crate::model::Model;
use crate::types::{FrameBuffer, Rgb};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Frames a slow subscriber may fall behind before it starts missing them
pub const PREVIEW_CHANNEL_CAPACITY: usize = 8;

/// Payload served to preview clients so they can connect to the frame feed
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewInfo {
    pub web_socket_port: u16,
    pub model: serde_json::Value,
}

impl PreviewInfo {
    pub fn new(config: &SimulatorConfig, model: &Model) -> Self {
        Self {
            web_socket_port: config.web_socket_port(),
            model: model.export(),
        }
    }
}

/// Cloneable handle used by external transports to receive frames
#[derive(Clone)]
pub struct PreviewFeed {
    tx: broadcast::Sender<Arc<[Rgb]>>,
}

impl PreviewFeed {
    /// Receive every frame published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<[Rgb]>> {
        self.tx.subscribe()
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// PreviewOutput: broadcasts an immutable snapshot of each frame.
pub struct PreviewOutput {
    tx: broadcast::Sender<Arc<[Rgb]>>,
    published: u64,
    unobserved: u64,
}

impl PreviewOutput {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(PREVIEW_CHANNEL_CAPACITY);
        Self {
            tx,
            published: 0,
            unobserved: 0,
        }
    }

    pub fn name(&self) -> &str {
        "preview"
    }

    /// Handle for subscribers
    pub fn feed(&self) -> PreviewFeed {
        PreviewFeed {
            tx: self.tx.clone(),
        }
    }

    /// Frames delivered to at least one subscriber
    pub fn published(&self) -> u64 {
        self.published
    }

    /// Frames dispatched while nobody was watching
    pub fn unobserved(&self) -> u64 {
        self.unobserved
    }

    pub fn send_frame(&mut self, frame: &FrameBuffer) -> Result<()> {
        if self.tx.receiver_count() == 0 {
            self.unobserved += 1;
            return Ok(());
        }
        match self.tx.send(frame.snapshot()) {
            Ok(_) => self.published += 1,
            // Last subscriber went away between the check and the send
            Err(_) => self.unobserved += 1,
        }
        Ok(())
    }
}

impl Default for PreviewOutput {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_subscribers_is_not_an_error() {
        let mut output = PreviewOutput::new();
        output.send_frame(&FrameBuffer::new(3)).unwrap();
        assert_eq!(output.unobserved(), 1);
        assert_eq!(output.published(), 0);
    }

    #[tokio::test]
    async fn test_subscriber_gets_snapshot() {
        let mut output = PreviewOutput::new();
        let feed = output.feed();
        let mut rx = feed.subscribe();
        assert_eq!(feed.subscriber_count(), 1);

        let mut frame = FrameBuffer::new(2);
        frame.set(1, [1, 2, 3]);
        output.send_frame(&frame).unwrap();
        frame.clear();

        let got = rx.recv().await.unwrap();
        assert_eq!(&got[..], &[[0, 0, 0], [1, 2, 3]]);
        assert_eq!(output.published(), 1);
    }

    #[test]
    fn test_preview_info_payload() {
        let config = SimulatorConfig {
            port: 3000,
            web_socket_port: None,
        };
        let info = PreviewInfo::new(&config, &Model::with_pixel_count(1));
        let value = serde_json::to_value(&info).unwrap();
        assert_eq!(value["webSocketPort"], 3001);
        assert!(value["model"]["pixels"].is_array());
    }
}
