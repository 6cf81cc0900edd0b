//! Spawning and supervising an instrument program.

use crate::config::InstrumentConfig;
use crate::error::{PixelWeaveError, Result, ResultExt};
use crate::instrument::framing::{frame_size, RawFrame};
use crate::instrument::stream::FrameStream;
use crate::instrument::FrameSource;
use crate::model::Model;
use serde::Serialize;
use std::future::Future;
use std::io::Write;
use std::path::Path;
use std::process::Stdio;
use tempfile::NamedTempFile;
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

/// One-shot configuration handed to the instrument through a temp file
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstrumentPayload {
    pub frames_per_second: f64,
    pub model: serde_json::Value,
}

/// A running instrument and the frames reassembled from its stdout.
///
/// Dropping it stops the drain task and kills the child if it is still
/// running. The payload file is removed at the same time.
pub struct InstrumentProcess {
    program: String,
    pid: Option<u32>,
    frames: FrameStream,
    supervisor: JoinHandle<()>,
    stderr_forward: JoinHandle<()>,
    payload_file: NamedTempFile,
}

impl InstrumentProcess {
    /// Write the payload, launch `program <args...> <payload file>` and
    /// start draining its stdout.
    ///
    /// Must be called inside a tokio runtime.
    pub fn spawn(model: &Model, frames_per_second: f64, config: &InstrumentConfig) -> Result<Self> {
        let payload = InstrumentPayload {
            frames_per_second,
            model: model.export(),
        };
        let payload_file = write_payload(&payload)?;
        let frame_size = frame_size(model.pixel_count());

        let mut child = Command::new(&config.program)
            .args(&config.args)
            .arg(payload_file.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| PixelWeaveError::SpawnFailure {
                program: config.program.clone(),
                source,
            })?;

        let pid = child.id();
        tracing::info!(
            "Started instrument {} {:?} (pid {:?}, payload {:?}, frame size {} bytes)",
            config.program,
            config.args,
            pid,
            payload_file.path(),
            frame_size
        );

        let stdout = child.stdout.take().ok_or_else(|| PixelWeaveError::SpawnFailure {
            program: config.program.clone(),
            source: std::io::Error::other("instrument stdout was not captured"),
        })?;
        let stderr_forward = match child.stderr.take() {
            Some(mut stderr) => tokio::spawn(async move {
                let mut out = tokio::io::stderr();
                if let Err(e) = tokio::io::copy(&mut stderr, &mut out).await {
                    tracing::debug!("Instrument stderr forwarding stopped: {}", e);
                }
            }),
            None => tokio::spawn(async {}),
        };

        let frames = FrameStream::from_reader(stdout, frame_size, config.max_buffered_frames);
        let supervisor = tokio::spawn(supervise(child, config.program.clone()));

        Ok(Self {
            program: config.program.clone(),
            pid,
            frames,
            supervisor,
            stderr_forward,
            payload_file,
        })
    }

    /// Next frame from the instrument, or `None` once its output has ended
    pub async fn get_frame(&mut self) -> Option<RawFrame> {
        self.frames.get_frame().await
    }

    /// Frame size in bytes (`4 + 4 * pixel_count`)
    pub fn frame_size(&self) -> usize {
        self.frames.frame_size()
    }

    /// Program name
    pub fn program(&self) -> &str {
        &self.program
    }

    /// OS process id, if the child was still running at spawn time
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Location of the payload file passed to the program
    pub fn payload_path(&self) -> &Path {
        self.payload_file.path()
    }
}

impl FrameSource for InstrumentProcess {
    fn next_frame(&mut self) -> impl Future<Output = Option<RawFrame>> + Send {
        self.get_frame()
    }
}

impl Drop for InstrumentProcess {
    fn drop(&mut self) {
        // Aborting the supervisor drops the Child, which kills it.
        self.supervisor.abort();
        self.stderr_forward.abort();
    }
}

fn write_payload(payload: &InstrumentPayload) -> Result<NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix("pixelweave-instrument-")
        .suffix(".json")
        .tempfile()
        .context("Failed to create instrument payload file")?;
    serde_json::to_writer(file.as_file_mut(), payload)?;
    file.as_file_mut()
        .flush()
        .context("Failed to write instrument payload file")?;
    Ok(file)
}

async fn supervise(mut child: Child, program: String) {
    match child.wait().await {
        Ok(status) if status.success() => {
            tracing::info!("Instrument {} exited with {}", program, status);
        }
        Ok(status) => {
            tracing::warn!("Instrument {} exited abnormally: {}", program, status);
        }
        Err(e) => {
            tracing::warn!("Failed to wait for instrument {}: {}", program, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_shape() {
        let model = Model::with_pixel_count(2);
        let payload = InstrumentPayload {
            frames_per_second: 40.0,
            model: model.export(),
        };
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["framesPerSecond"], 40.0);
        assert_eq!(value["model"]["pixels"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_write_payload_round_trips() {
        let payload = InstrumentPayload {
            frames_per_second: 30.0,
            model: Model::with_pixel_count(1).export(),
        };
        let file = write_payload(&payload).unwrap();
        let text = std::fs::read_to_string(file.path()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["framesPerSecond"], 30.0);
    }

    #[tokio::test]
    async fn test_spawn_failure_is_reported() {
        let model = Model::with_pixel_count(3);
        let config = InstrumentConfig::new("pixelweave-no-such-instrument", vec![]);
        let err = InstrumentProcess::spawn(&model, 40.0, &config)
            .err()
            .expect("spawning a missing program must fail");
        assert!(matches!(err, PixelWeaveError::SpawnFailure { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_frames_from_real_subprocess() {
        // Two frames for P=1 with sequence numbers 0x01010101 and 0x01010102.
        let script = r#"printf '\001\001\001\001\377\001\002\377\002\001\001\001\003\377\004\200'"#;
        let config = InstrumentConfig::new("sh", vec!["-c".into(), script.into()]);
        let model = Model::with_pixel_count(1);

        let mut instrument = InstrumentProcess::spawn(&model, 40.0, &config).unwrap();
        assert_eq!(instrument.frame_size(), 8);

        let first = instrument.get_frame().await.unwrap();
        assert_eq!(first.sequence(), 0x0101_0101);
        assert_eq!(first.rgba(0), Some([255, 1, 2, 255]));

        let second = instrument.get_frame().await.unwrap();
        assert_eq!(second.sequence(), 0x0101_0102);
        assert_eq!(second.rgba(0), Some([3, 255, 4, 128]));

        assert!(instrument.get_frame().await.is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_payload_path_is_last_argument() {
        // `sh -c` binds the payload path to $0; emit one frame only if it
        // holds the expected payload.
        let script = r#"grep -q framesPerSecond "$0" && printf '\001\001\001\001\011\012\013\377'"#;
        let config = InstrumentConfig::new("sh", vec!["-c".into(), script.into()]);
        let model = Model::with_pixel_count(1);

        let mut instrument = InstrumentProcess::spawn(&model, 40.0, &config).unwrap();
        assert!(instrument.payload_path().exists());
        let frame = instrument.get_frame().await.expect("instrument saw its payload");
        assert_eq!(frame.rgba(0), Some([9, 10, 11, 255]));
        assert!(instrument.get_frame().await.is_none());
    }
}
