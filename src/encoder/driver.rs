use super::args::build_hls_args;
use super::progress::{parse_duration_secs, parse_out_time_us, running_percent};
use crate::domain::Resolution;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

/// Kept stderr lines for failure diagnostics.
const STDERR_TAIL_LINES: usize = 12;

#[derive(Debug, Error)]
pub enum EncodeError {
    /// Raised lazily on first use when the binary is absent.
    #[error("failed to launch encoder (is ffmpeg installed and on PATH?): {0}")]
    Spawn(#[source] std::io::Error),
    #[error("encoder exited with status {status}: {detail}")]
    Failed { status: i32, detail: String },
    #[error("encoder I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Runs one rendition to completion, reporting raw percent on every progress
/// line. Resolves with the playlist path on a clean exit.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn transcode(
        &self,
        input: &Path,
        output_dir: &Path,
        resolution: Resolution,
        progress: UnboundedSender<f64>,
    ) -> Result<PathBuf, EncodeError>;
}

pub struct FfmpegTranscoder {
    binary: PathBuf,
}

impl FfmpegTranscoder {
    pub fn new() -> Self {
        Self {
            binary: PathBuf::from("ffmpeg"),
        }
    }

    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for FfmpegTranscoder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn transcode(
        &self,
        input: &Path,
        output_dir: &Path,
        resolution: Resolution,
        progress: UnboundedSender<f64>,
    ) -> Result<PathBuf, EncodeError> {
        tokio::fs::create_dir_all(output_dir).await?;

        let args = build_hls_args(input, output_dir, resolution);
        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(EncodeError::Spawn)?;

        // Duration arrives on the stderr banner; progress keys on stdout.
        // Both pipes must be drained or ffmpeg stalls on a full buffer.
        let duration = Arc::new(Mutex::new(None::<f64>));
        let tail = Arc::new(Mutex::new(Vec::<String>::new()));

        let stderr = child.stderr.take().expect("stderr piped");
        let stderr_task = {
            let duration = duration.clone();
            let tail = tail.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if duration.lock().unwrap().is_none() {
                        if let Some(secs) = parse_duration_secs(&line) {
                            *duration.lock().unwrap() = Some(secs);
                        }
                    }
                    let mut tail = tail.lock().unwrap();
                    if tail.len() == STDERR_TAIL_LINES {
                        tail.remove(0);
                    }
                    tail.push(line);
                }
            })
        };

        let stdout = child.stdout.take().expect("stdout piped");
        let mut lines = BufReader::new(stdout).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if let Some(micros) = parse_out_time_us(&line) {
                let known_duration = *duration.lock().unwrap();
                if let Some(total) = known_duration {
                    let percent = running_percent(micros as f64 / 1_000_000.0, total);
                    // Receiver gone means the job was abandoned; keep
                    // encoding, the exit status still matters.
                    let _ = progress.send(percent);
                }
            }
        }

        let status = child.wait().await?;
        let _ = stderr_task.await;

        if status.success() {
            let _ = progress.send(100.0);
            debug!(output = %output_dir.display(), %resolution, "encode finished");
            Ok(output_dir.join("playlist.m3u8"))
        } else {
            let detail = tail.lock().unwrap().join(" | ");
            Err(EncodeError::Failed {
                status: status.code().unwrap_or(-1),
                detail,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn missing_binary_surfaces_as_a_clear_spawn_error() {
        let dir = tempdir().unwrap();
        let transcoder = FfmpegTranscoder::with_binary("caruso-test-no-such-encoder");
        let (tx, _rx) = mpsc::unbounded_channel();

        let err = transcoder
            .transcode(
                &dir.path().join("in.mp4"),
                &dir.path().join("out"),
                Resolution::Low,
                tx,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, EncodeError::Spawn(_)));
        assert!(err.to_string().contains("ffmpeg installed"));
    }
}
