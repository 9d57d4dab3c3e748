pub mod backend;
pub mod codec;
pub mod error;
pub mod fifo;
pub mod format;
pub mod frame;
pub mod job;
pub mod packet;
pub mod prepare;
pub mod rational;
pub mod scaler;
pub mod stream;
pub mod stream_map;
pub mod transcode;

/// FFmpeg implementations of the backend traits.
#[cfg(feature = "ffmpeg")]
pub mod ffmpeg;

#[cfg(test)]
mod synthetic;

pub use error::{Result, TranscodeError};
pub use format::{ContainerId, InputContext, OutputContext, OutputSet, OutputStreamRef};
pub use job::JobConfig;
pub use rational::{Rational, TIME_BASE, TIME_BASE_Q, rescale_q, rescale_ts};
pub use stream_map::StreamMap;
pub use transcode::{TranscodeOptions, TranscodeState, TranscodeSummary, Transcoder};
