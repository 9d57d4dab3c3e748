//! In-memory backend for tests: scripted demuxing, pass-through decoding,
//! encoders with configurable delay and a muxer that records every call.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use bytes::BytesMut;

use crate::backend::{
    AudioDecoded, AudioDecoder, AudioEncoder, DecoderHandle, Demuxer, FrameConverter, Muxer,
    ReadStatus, ScalerFactory, StreamInfo, VideoDecoded, VideoDecoder, VideoEncoder,
};
use crate::codec::{CodecParameters, CodedFrame, MediaType, SAMPLE_BYTES};
use crate::format::Pacing;
use crate::frame::{FrameGeometry, PixelFormat, VideoFrame};
use crate::packet::Packet;
use crate::rational::Rational;
use crate::scaler::ScaleAlgorithm;

pub fn video_stream(index: usize, time_base: Rational, width: u32, height: u32) -> StreamInfo {
    let mut parameters = CodecParameters::new(MediaType::Video, "rawvideo", time_base);
    parameters.width = width;
    parameters.height = height;
    parameters.pixel_format = Some(PixelFormat::Gray8);
    StreamInfo {
        index,
        time_base,
        duration: 0,
        parameters,
    }
}

pub fn audio_stream(index: usize, time_base: Rational, sample_rate: u32, channels: u16) -> StreamInfo {
    let mut parameters = CodecParameters::new(MediaType::Audio, "pcm_s16le", time_base);
    parameters.sample_rate = sample_rate;
    parameters.channels = channels;
    parameters.bytes_per_sample = SAMPLE_BYTES;
    StreamInfo {
        index,
        time_base,
        duration: 0,
        parameters,
    }
}

pub fn packet(index: usize, pts: Option<i64>, dts: Option<i64>, size: usize) -> Packet {
    let mut packet = Packet::new(index);
    packet
        .set_pts(pts)
        .set_dts(dts)
        .set_data(&vec![(index as u8).wrapping_add(1); size]);
    packet
}

/// Serves a fixed list of packets.
pub struct ScriptedDemuxer {
    streams: Vec<StreamInfo>,
    packets: VecDeque<Packet>,
    pub probes: Rc<Cell<usize>>,
    pub audio_hold_back: usize,
    pub video_delay: usize,
    pub failing_decoder: Option<usize>,
}

impl ScriptedDemuxer {
    pub fn new(streams: Vec<StreamInfo>, packets: Vec<Packet>) -> Self {
        Self {
            streams,
            packets: packets.into(),
            probes: Rc::new(Cell::new(0)),
            audio_hold_back: 0,
            video_delay: 0,
            failing_decoder: None,
        }
    }

    /// Stream 0: 4x4 gray video at 1/90000; stream 1: stereo 44.1 kHz audio.
    pub fn av(packets: Vec<Packet>) -> Self {
        Self::new(
            vec![
                video_stream(0, Rational::new(1, 90000), 4, 4),
                audio_stream(1, Rational::new(1, 44100), 44100, 2),
            ],
            packets,
        )
    }

    pub fn streams_mut(&mut self) -> &mut Vec<StreamInfo> {
        &mut self.streams
    }
}

impl Demuxer for ScriptedDemuxer {
    fn find_stream_info(&mut self) -> anyhow::Result<()> {
        self.probes.set(self.probes.get() + 1);
        Ok(())
    }

    fn streams(&self) -> Vec<StreamInfo> {
        self.streams.clone()
    }

    fn read_packet(&mut self, packet: &mut Packet) -> anyhow::Result<ReadStatus> {
        match self.packets.pop_front() {
            Some(next) => {
                *packet = next;
                Ok(ReadStatus::Packet)
            }
            None => Ok(ReadStatus::EndOfStream),
        }
    }

    fn open_decoder(&mut self, index: usize) -> anyhow::Result<DecoderHandle> {
        let info = self
            .streams
            .iter()
            .find(|s| s.index == index)
            .ok_or_else(|| anyhow::anyhow!("no stream {index}"))?;
        let fail = self.failing_decoder == Some(index);
        match info.media_type() {
            MediaType::Audio => Ok(DecoderHandle::Audio(Box::new(PassthroughAudioDecoder {
                parameters: info.parameters.clone(),
                pending: Vec::new(),
                hold_back: self.audio_hold_back,
                fail,
            }))),
            MediaType::Video => Ok(DecoderHandle::Video(Box::new(PictureDecoder {
                parameters: info.parameters.clone(),
                delay: self.video_delay,
                seen: 0,
                buffered: 0,
                fail,
            }))),
            other => anyhow::bail!("no {other} decoder"),
        }
    }
}

/// Treats packet payload as already decoded samples, optionally holding the
/// last `hold_back` bytes until flushed.
pub struct PassthroughAudioDecoder {
    parameters: CodecParameters,
    pending: Vec<u8>,
    hold_back: usize,
    fail: bool,
}

impl AudioDecoder for PassthroughAudioDecoder {
    fn parameters(&self) -> &CodecParameters {
        &self.parameters
    }

    fn decode(&mut self, samples: &mut [u8], input: &[u8]) -> anyhow::Result<AudioDecoded> {
        if self.fail {
            anyhow::bail!("corrupt audio");
        }
        self.pending.extend_from_slice(input);
        let available = if input.is_empty() {
            self.pending.len()
        } else {
            self.pending.len().saturating_sub(self.hold_back)
        };
        let n = available.min(samples.len());
        samples[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(AudioDecoded {
            consumed: input.len(),
            sample_bytes: n,
        })
    }
}

/// One picture per packet after an initial `delay` packets, which come out
/// on flush.
pub struct PictureDecoder {
    parameters: CodecParameters,
    delay: usize,
    seen: usize,
    buffered: usize,
    fail: bool,
}

impl PictureDecoder {
    fn fill(&self, frame: &mut VideoFrame) {
        frame.width = self.parameters.width;
        frame.height = self.parameters.height;
        frame.format = self.parameters.pixel_format;
        let size = frame
            .format
            .map_or(0, |f| f.picture_size(frame.width, frame.height));
        frame.data.resize(size, 0x80);
        frame.key_frame = true;
    }
}

impl VideoDecoder for PictureDecoder {
    fn parameters(&self) -> &CodecParameters {
        &self.parameters
    }

    fn decode(&mut self, frame: &mut VideoFrame, input: &[u8]) -> anyhow::Result<VideoDecoded> {
        if self.fail {
            anyhow::bail!("corrupt picture");
        }
        if input.is_empty() {
            if self.buffered == 0 {
                return Ok(VideoDecoded::default());
            }
            self.buffered -= 1;
        } else if self.seen < self.delay {
            self.seen += 1;
            self.buffered += 1;
            return Ok(VideoDecoded {
                got_picture: false,
                consumed: input.len(),
            });
        }
        self.fill(frame);
        Ok(VideoDecoded {
            got_picture: true,
            consumed: input.len(),
        })
    }
}

/// Emits one small packet per input frame, `delay` frames late.
pub struct DelayedAudioEncoder {
    parameters: CodecParameters,
    frame_size: usize,
    delay: usize,
    queue: VecDeque<i64>,
    coded: Option<CodedFrame>,
    pub report_pts: bool,
}

impl DelayedAudioEncoder {
    pub fn new(parameters: CodecParameters, frame_size: usize, delay: usize) -> Self {
        Self {
            parameters,
            frame_size,
            delay,
            queue: VecDeque::new(),
            coded: None,
            report_pts: true,
        }
    }

    fn emit(&mut self, out: &mut BytesMut) -> usize {
        let Some(pts) = self.queue.pop_front() else {
            return 0;
        };
        self.coded = Some(CodedFrame {
            pts: self.report_pts.then_some(pts),
            dts: self.report_pts.then_some(pts),
            key_frame: true,
        });
        out.extend_from_slice(&[0xA0; 16]);
        16
    }
}

impl AudioEncoder for DelayedAudioEncoder {
    fn parameters(&self) -> &CodecParameters {
        &self.parameters
    }

    fn parameters_mut(&mut self) -> &mut CodecParameters {
        &mut self.parameters
    }

    fn open(&mut self) -> anyhow::Result<()> {
        self.parameters.frame_size = self.frame_size;
        Ok(())
    }

    fn encode(&mut self, samples: &[u8], pts: i64, out: &mut BytesMut) -> anyhow::Result<usize> {
        if samples.len() != self.parameters.audio_frame_bytes() {
            anyhow::bail!("partial audio frame of {} bytes", samples.len());
        }
        self.queue.push_back(pts);
        if self.queue.len() > self.delay {
            return Ok(self.emit(out));
        }
        self.coded = None;
        Ok(0)
    }

    fn coded_frame(&self) -> Option<CodedFrame> {
        self.coded
    }

    fn drain(&mut self, out: &mut BytesMut) -> anyhow::Result<usize> {
        Ok(self.emit(out))
    }
}

/// Emits one packet per picture, `delay` pictures late; every `gop`-th
/// picture is a keyframe.
pub struct DelayedVideoEncoder {
    parameters: CodecParameters,
    delay: usize,
    gop: i64,
    queue: VecDeque<i64>,
    coded: Option<CodedFrame>,
    pub report_pts: bool,
}

impl DelayedVideoEncoder {
    pub fn new(parameters: CodecParameters, delay: usize) -> Self {
        Self {
            parameters,
            delay,
            gop: 5,
            queue: VecDeque::new(),
            coded: None,
            report_pts: true,
        }
    }

    fn emit(&mut self, out: &mut BytesMut) -> usize {
        let Some(pts) = self.queue.pop_front() else {
            return 0;
        };
        self.coded = Some(CodedFrame {
            pts: self.report_pts.then_some(pts),
            dts: None,
            key_frame: pts % self.gop == 0,
        });
        out.extend_from_slice(&[0xB0; 32]);
        32
    }
}

impl VideoEncoder for DelayedVideoEncoder {
    fn parameters(&self) -> &CodecParameters {
        &self.parameters
    }

    fn parameters_mut(&mut self) -> &mut CodecParameters {
        &mut self.parameters
    }

    fn open(&mut self) -> anyhow::Result<()> {
        if self.parameters.width == 0 || self.parameters.height == 0 {
            anyhow::bail!("video encoder needs a size");
        }
        Ok(())
    }

    fn encode(&mut self, frame: &VideoFrame, out: &mut BytesMut) -> anyhow::Result<usize> {
        if frame.width != self.parameters.width || frame.height != self.parameters.height {
            anyhow::bail!(
                "got {}x{}, expected {}x{}",
                frame.width,
                frame.height,
                self.parameters.width,
                self.parameters.height
            );
        }
        let pts = frame.pts.ok_or_else(|| anyhow::anyhow!("frame without pts"))?;
        self.queue.push_back(pts);
        if self.queue.len() > self.delay {
            return Ok(self.emit(out));
        }
        self.coded = None;
        Ok(0)
    }

    fn coded_frame(&self) -> Option<CodedFrame> {
        self.coded
    }

    fn drain(&mut self, out: &mut BytesMut) -> anyhow::Result<usize> {
        Ok(self.emit(out))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct WrittenPacket {
    pub container: &'static str,
    pub stream: usize,
    pub pts: Option<i64>,
    pub dts: Option<i64>,
    pub size: usize,
    pub key: bool,
    pub time_base: Rational,
}

#[derive(Debug, Default)]
pub struct MuxLog {
    pub headers: usize,
    pub trailers: usize,
    pub packets: Vec<WrittenPacket>,
    /// "header a", "trailer b", ... across every muxer sharing the log.
    pub events: Vec<String>,
    pub pacing: Option<Pacing>,
}

impl MuxLog {
    pub fn shared() -> Rc<RefCell<MuxLog>> {
        Rc::new(RefCell::new(MuxLog::default()))
    }

    pub fn stream(&self, container: &str, stream: usize) -> Vec<WrittenPacket> {
        self.packets
            .iter()
            .filter(|p| p.container == container && p.stream == stream)
            .cloned()
            .collect()
    }
}

pub struct RecordingMuxer {
    name: &'static str,
    log: Rc<RefCell<MuxLog>>,
}

impl RecordingMuxer {
    pub fn new(log: Rc<RefCell<MuxLog>>) -> Self {
        Self::named("out", log)
    }

    pub fn named(name: &'static str, log: Rc<RefCell<MuxLog>>) -> Self {
        Self { name, log }
    }
}

impl Muxer for RecordingMuxer {
    fn write_header(&mut self, pacing: &Pacing) -> anyhow::Result<()> {
        let mut log = self.log.borrow_mut();
        log.headers += 1;
        log.pacing = Some(*pacing);
        log.events.push(format!("header {}", self.name));
        Ok(())
    }

    fn interleaved_write(&mut self, packet: &Packet, time_base: Rational) -> anyhow::Result<usize> {
        self.log.borrow_mut().packets.push(WrittenPacket {
            container: self.name,
            stream: packet.index(),
            pts: packet.pts(),
            dts: packet.dts(),
            size: packet.size(),
            key: packet.is_key(),
            time_base,
        });
        Ok(packet.size())
    }

    fn write_trailer(&mut self) -> anyhow::Result<()> {
        let mut log = self.log.borrow_mut();
        log.trailers += 1;
        log.events.push(format!("trailer {}", self.name));
        Ok(())
    }
}

/// Nearest-neighbour gray conversion that counts how often it was built.
#[derive(Default)]
pub struct CountingScalerFactory {
    pub created: Rc<Cell<usize>>,
}

struct NearestConverter {
    src: FrameGeometry,
    dst: FrameGeometry,
}

impl FrameConverter for NearestConverter {
    fn convert(&mut self, src: &VideoFrame, dst: &mut VideoFrame) -> anyhow::Result<()> {
        let format = self.dst.format.unwrap_or(PixelFormat::Gray8);
        dst.data.clear();
        dst.data
            .resize(format.picture_size(self.dst.width, self.dst.height), 0);
        let (sw, sh) = (self.src.width.max(1) as usize, self.src.height.max(1) as usize);
        let (dw, dh) = (self.dst.width as usize, self.dst.height as usize);
        for y in 0..dh {
            for x in 0..dw {
                let from = (y * sh / dh.max(1)) * sw + x * sw / dw.max(1);
                if let (Some(value), Some(to)) = (src.data.get(from), dst.data.get_mut(y * dw + x)) {
                    *to = *value;
                }
            }
        }
        Ok(())
    }
}

impl ScalerFactory for CountingScalerFactory {
    fn create(
        &mut self,
        src: FrameGeometry,
        dst: FrameGeometry,
        _algorithm: ScaleAlgorithm,
    ) -> anyhow::Result<Box<dyn FrameConverter>> {
        self.created.set(self.created.get() + 1);
        Ok(Box::new(NearestConverter { src, dst }))
    }
}
