//! Contracts for the codec/container library the core drives.
//!
//! Every call is blocking and is made from the transcode thread only. Backend
//! failures come back as `anyhow::Error`; the core wraps them into
//! [`TranscodeError::Backend`](crate::TranscodeError::Backend) naming the
//! failed operation.

use bytes::BytesMut;

use crate::codec::{CodecParameters, CodedFrame, MediaType};
use crate::format::Pacing;
use crate::frame::{FrameGeometry, VideoFrame};
use crate::packet::Packet;
use crate::rational::Rational;
use crate::scaler::ScaleAlgorithm;

/// A stream discovered by the demuxer.
#[derive(Clone, Debug, PartialEq)]
pub struct StreamInfo {
    pub index: usize,
    pub time_base: Rational,
    /// In `time_base` units; 0 when unknown.
    pub duration: i64,
    pub parameters: CodecParameters,
}

impl StreamInfo {
    pub fn media_type(&self) -> MediaType {
        self.parameters.media_type
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadStatus {
    Packet,
    EndOfStream,
}

pub trait Demuxer {
    /// Probe the input so every stream reports codec parameters.
    fn find_stream_info(&mut self) -> anyhow::Result<()>;

    fn streams(&self) -> Vec<StreamInfo>;

    /// Fill `packet` (already cleaned) with the next packet of any stream.
    fn read_packet(&mut self, packet: &mut Packet) -> anyhow::Result<ReadStatus>;

    /// Create and open the decoder for stream `index`.
    fn open_decoder(&mut self, index: usize) -> anyhow::Result<DecoderHandle>;
}

pub enum DecoderHandle {
    Audio(Box<dyn AudioDecoder>),
    Video(Box<dyn VideoDecoder>),
}

impl DecoderHandle {
    pub fn media_type(&self) -> MediaType {
        match self {
            DecoderHandle::Audio(_) => MediaType::Audio,
            DecoderHandle::Video(_) => MediaType::Video,
        }
    }

    pub fn parameters(&self) -> &CodecParameters {
        match self {
            DecoderHandle::Audio(decoder) => decoder.parameters(),
            DecoderHandle::Video(decoder) => decoder.parameters(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AudioDecoded {
    /// Input bytes used by this call.
    pub consumed: usize,
    /// Bytes of packed samples written to the scratch buffer.
    pub sample_bytes: usize,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct VideoDecoded {
    pub got_picture: bool,
    pub consumed: usize,
}

/// Audio decoder producing packed samples of `parameters().bytes_per_sample`.
pub trait AudioDecoder {
    fn parameters(&self) -> &CodecParameters;

    /// Decode from `input` into `samples`. Empty `input` flushes buffered
    /// state; a flush returning no sample bytes means the decoder is drained.
    fn decode(&mut self, samples: &mut [u8], input: &[u8]) -> anyhow::Result<AudioDecoded>;
}

pub trait VideoDecoder {
    fn parameters(&self) -> &CodecParameters;

    /// Decode at most one picture into `frame`. Empty `input` flushes.
    fn decode(&mut self, frame: &mut VideoFrame, input: &[u8]) -> anyhow::Result<VideoDecoded>;
}

pub trait AudioEncoder {
    fn parameters(&self) -> &CodecParameters;
    fn parameters_mut(&mut self) -> &mut CodecParameters;

    /// Open with the current parameters. `frame_size` is known afterwards.
    fn open(&mut self) -> anyhow::Result<()>;

    /// Encode exactly one frame of packed samples stamped `pts` (encoder time
    /// base). Returns the encoded size written to `out`, 0 while buffering.
    fn encode(&mut self, samples: &[u8], pts: i64, out: &mut BytesMut) -> anyhow::Result<usize>;

    fn coded_frame(&self) -> Option<CodedFrame>;

    /// Emit one buffered packet after end of input; 0 once empty.
    fn drain(&mut self, _out: &mut BytesMut) -> anyhow::Result<usize> {
        Ok(0)
    }
}

pub trait VideoEncoder {
    fn parameters(&self) -> &CodecParameters;
    fn parameters_mut(&mut self) -> &mut CodecParameters;

    fn open(&mut self) -> anyhow::Result<()>;

    /// Encode `frame` (pts already set, encoder time base).
    fn encode(&mut self, frame: &VideoFrame, out: &mut BytesMut) -> anyhow::Result<usize>;

    fn coded_frame(&self) -> Option<CodedFrame>;

    fn drain(&mut self, _out: &mut BytesMut) -> anyhow::Result<usize> {
        Ok(0)
    }
}

pub trait Muxer {
    fn write_header(&mut self, pacing: &Pacing) -> anyhow::Result<()>;

    /// Write `packet`, whose timestamps are in `time_base`, with the
    /// container's interleaving. Returns bytes written.
    fn interleaved_write(&mut self, packet: &Packet, time_base: Rational) -> anyhow::Result<usize>;

    fn write_trailer(&mut self) -> anyhow::Result<()>;
}

pub trait FrameConverter {
    fn convert(&mut self, src: &VideoFrame, dst: &mut VideoFrame) -> anyhow::Result<()>;
}

pub trait ScalerFactory {
    fn create(
        &mut self,
        src: FrameGeometry,
        dst: FrameGeometry,
        algorithm: ScaleAlgorithm,
    ) -> anyhow::Result<Box<dyn FrameConverter>>;
}
