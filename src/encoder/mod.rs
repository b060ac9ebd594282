//! Encoder driver - the only place the core touches an external program.
//!
//! Builds the ffmpeg argument vector per resolution, parses the duration
//! banner and the machine-readable progress stream, and reports percent
//! through a channel.

pub mod args;
pub mod driver;
pub mod progress;

pub use args::build_hls_args;
pub use driver::{EncodeError, FfmpegTranscoder, Transcoder};
