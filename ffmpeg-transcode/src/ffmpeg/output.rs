use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;

use bytes::BytesMut;
use ffmpeg_next::codec::{self, encoder};
use ffmpeg_next::format::{Sample, sample};
use ffmpeg_next::software::resampling;
use ffmpeg_next::{ChannelLayout, Dictionary, frame};

use super::{PACKED_S16, format_to_pixel, unpack_picture};
use crate::backend::{AudioEncoder, Muxer, VideoEncoder};
use crate::codec::{CodecParameters, CodedFrame};
use crate::format::{LoopOutput, Pacing};
use crate::frame::VideoFrame;
use crate::packet::Packet;
use crate::rational::Rational;

/// One output container, shared by its muxer and the encoders feeding it.
pub type SharedOutput = Rc<RefCell<ffmpeg_next::format::context::Output>>;

fn dictionary(options: &BTreeMap<String, String>) -> Dictionary<'static> {
    let mut dict = Dictionary::new();
    for (key, value) in options {
        dict.set(key, value);
    }
    dict
}

pub struct FfmpegMuxer {
    inner: SharedOutput,
}

impl FfmpegMuxer {
    pub fn new(inner: SharedOutput) -> Self {
        Self { inner }
    }
}

impl Muxer for FfmpegMuxer {
    fn write_header(&mut self, pacing: &Pacing) -> anyhow::Result<()> {
        let mut options = Dictionary::new();
        options.set("max_delay", &pacing.max_delay.to_string());
        options.set("preload", &pacing.preload.to_string());
        let loop_count = match pacing.loop_output {
            LoopOutput::Disabled => "-1".to_string(),
            LoopOutput::Infinite => "0".to_string(),
            LoopOutput::Count(n) => n.to_string(),
        };
        options.set("loop", &loop_count);
        let unused = self.inner.borrow_mut().write_header_with(options)?;
        for (key, value) in unused.iter() {
            log::debug!("muxer ignored option {}={}", key, value);
        }
        Ok(())
    }

    fn interleaved_write(&mut self, packet: &Packet, time_base: Rational) -> anyhow::Result<usize> {
        let mut octx = self.inner.borrow_mut();
        let out_time_base = octx
            .stream(packet.index())
            .ok_or_else(|| anyhow::anyhow!("stream not found"))?
            .time_base();

        let mut p = ffmpeg_next::Packet::copy(packet.data());
        p.set_stream(packet.index());
        p.set_pts(packet.pts());
        p.set_dts(packet.dts());
        p.set_duration(packet.duration());
        if packet.is_key() {
            p.set_flags(codec::packet::Flags::KEY);
        }
        p.set_position(-1);
        // the muxer may have replaced the declared time base in write_header
        p.rescale_ts(time_base, out_time_base);
        p.write_interleaved(&mut octx)?;
        Ok(packet.size())
    }

    fn write_trailer(&mut self) -> anyhow::Result<()> {
        self.inner.borrow_mut().write_trailer()?;
        Ok(())
    }
}

enum EncoderType {
    Video(encoder::Video),
    Audio(encoder::Audio),
}

impl EncoderType {
    fn send_eof(&mut self) -> anyhow::Result<()> {
        match self {
            EncoderType::Video(encoder) => encoder.send_eof()?,
            EncoderType::Audio(encoder) => encoder.send_eof()?,
        }
        Ok(())
    }

    fn receive_packet(&mut self) -> anyhow::Result<Option<ffmpeg_next::Packet>> {
        let mut packet = ffmpeg_next::Packet::empty();
        let encode_result = match self {
            EncoderType::Video(encoder) => encoder.receive_packet(&mut packet),
            EncoderType::Audio(encoder) => encoder.receive_packet(&mut packet),
        };

        match encode_result {
            Ok(()) => Ok(Some(packet)),
            Err(ffmpeg_next::Error::Other { errno }) if errno == ffmpeg_next::util::error::EAGAIN => {
                Ok(None)
            }
            Err(ffmpeg_next::Error::Eof) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

/// An opened encoder and the packets it produced but nobody took yet.
struct OpenEncoder {
    inner: EncoderType,
    queue: VecDeque<ffmpeg_next::Packet>,
    coded: Option<CodedFrame>,
    eof_sent: bool,
}

impl OpenEncoder {
    fn new(inner: EncoderType) -> Self {
        Self {
            inner,
            queue: VecDeque::new(),
            coded: None,
            eof_sent: false,
        }
    }

    fn collect(&mut self) -> anyhow::Result<()> {
        while let Some(packet) = self.inner.receive_packet()? {
            self.queue.push_back(packet);
        }
        Ok(())
    }

    fn send_video(&mut self, frame: &frame::Video) -> anyhow::Result<()> {
        let EncoderType::Video(encoder) = &mut self.inner else {
            anyhow::bail!("invalid frame type");
        };
        match encoder.send_frame(frame) {
            Err(ffmpeg_next::Error::Other { errno }) if errno == ffmpeg_next::util::error::EAGAIN => {
                self.collect()?;
                match &mut self.inner {
                    EncoderType::Video(encoder) => encoder.send_frame(frame)?,
                    EncoderType::Audio(_) => anyhow::bail!("invalid frame type"),
                }
            }
            result => result?,
        }
        self.collect()
    }

    fn send_audio(&mut self, frame: &frame::Audio) -> anyhow::Result<()> {
        let EncoderType::Audio(encoder) = &mut self.inner else {
            anyhow::bail!("invalid frame type");
        };
        match encoder.send_frame(frame) {
            Err(ffmpeg_next::Error::Other { errno }) if errno == ffmpeg_next::util::error::EAGAIN => {
                self.collect()?;
                match &mut self.inner {
                    EncoderType::Audio(encoder) => encoder.send_frame(frame)?,
                    EncoderType::Video(_) => anyhow::bail!("invalid frame type"),
                }
            }
            result => result?,
        }
        self.collect()
    }

    /// Move the oldest pending packet into `out`.
    fn take(&mut self, out: &mut BytesMut) -> usize {
        let Some(packet) = self.queue.pop_front() else {
            return 0;
        };
        let data = packet.data().unwrap_or_default();
        out.extend_from_slice(data);
        self.coded = Some(CodedFrame {
            pts: packet.pts(),
            dts: packet.dts(),
            key_frame: packet.is_key(),
        });
        data.len()
    }

    fn drain(&mut self, out: &mut BytesMut) -> anyhow::Result<usize> {
        if !self.eof_sent {
            self.eof_sent = true;
            self.inner.send_eof()?;
            self.collect()?;
        }
        Ok(self.take(out))
    }
}

/// Copy the output stream's codec parameters and time base from the opened
/// encoder so the muxer can write a header.
fn attach_stream<P>(
    output: &SharedOutput,
    index: usize,
    time_base: Rational,
    opened: P,
) -> anyhow::Result<()>
where
    P: Into<codec::Parameters>,
{
    let mut octx = output.borrow_mut();
    let mut ost = octx
        .stream_mut(index)
        .ok_or_else(|| anyhow::anyhow!("output stream {} not found", index))?;
    ost.set_parameters(opened);
    ost.set_time_base(time_base);
    Ok(())
}

/// Rate-control fields ffmpeg-next has no setter for.
fn apply_rate_control(context: &mut codec::Context, parameters: &CodecParameters) {
    unsafe {
        let ptr = context.as_mut_ptr();
        (*ptr).bit_rate_tolerance = parameters.bit_rate_tolerance.clamp(0, i32::MAX as i64) as i32;
        if parameters.rc_buffer_size > 0 {
            (*ptr).rc_buffer_size = parameters.rc_buffer_size.min(i32::MAX as i64) as i32;
        }
        if parameters.rc_initial_buffer_occupancy > 0 {
            (*ptr).rc_initial_buffer_occupancy =
                parameters.rc_initial_buffer_occupancy.min(i32::MAX as i64) as i32;
        }
    }
}

pub struct FfmpegVideoEncoder {
    codec: ffmpeg_next::Codec,
    parameters: CodecParameters,
    output: SharedOutput,
    stream_index: usize,
    stream_time_base: Rational,
    inner: Option<OpenEncoder>,
}

impl FfmpegVideoEncoder {
    pub fn new(
        codec: ffmpeg_next::Codec,
        parameters: CodecParameters,
        output: SharedOutput,
        stream_index: usize,
        stream_time_base: Rational,
    ) -> Self {
        Self {
            codec,
            parameters,
            output,
            stream_index,
            stream_time_base,
            inner: None,
        }
    }

    fn opened(&mut self) -> anyhow::Result<&mut OpenEncoder> {
        self.inner
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("{}: encoder not open", self.parameters.codec_name))
    }
}

impl VideoEncoder for FfmpegVideoEncoder {
    fn parameters(&self) -> &CodecParameters {
        &self.parameters
    }

    fn parameters_mut(&mut self) -> &mut CodecParameters {
        &mut self.parameters
    }

    fn open(&mut self) -> anyhow::Result<()> {
        let params = &self.parameters;
        let format = params
            .pixel_format
            .ok_or_else(|| anyhow::anyhow!("{}: no pixel format", params.codec_name))?;

        let mut video = codec::Context::new_with_codec(self.codec).encoder().video()?;
        video.set_width(params.width);
        video.set_height(params.height);
        video.set_format(format_to_pixel(format));
        video.set_time_base(ffmpeg_next::Rational::from(params.time_base));
        video.set_frame_rate(params.frame_rate.map(ffmpeg_next::Rational::from));
        video.set_bit_rate(params.bit_rate.max(0) as usize);
        if params.global_header {
            video.set_flags(codec::Flags::GLOBAL_HEADER);
        }
        apply_rate_control(&mut video, params);

        let opened = video.open_with(dictionary(&params.options))?;
        log::info!(
            "encoder opened: {} {}x{} {} @ {}",
            params.codec_name,
            params.width,
            params.height,
            format,
            params.time_base
        );
        attach_stream(&self.output, self.stream_index, self.stream_time_base, &opened)?;
        self.inner = Some(OpenEncoder::new(EncoderType::Video(opened)));
        Ok(())
    }

    fn encode(&mut self, frame: &VideoFrame, out: &mut BytesMut) -> anyhow::Result<usize> {
        let picture = unpack_picture(frame)?;
        let encoder = self.opened()?;
        encoder.send_video(&picture)?;
        Ok(encoder.take(out))
    }

    fn coded_frame(&self) -> Option<CodedFrame> {
        self.inner.as_ref().and_then(|encoder| encoder.coded)
    }

    fn drain(&mut self, out: &mut BytesMut) -> anyhow::Result<usize> {
        self.opened()?.drain(out)
    }
}

fn preferred_sample_format(codec: ffmpeg_next::Codec) -> Sample {
    let fallback = Sample::F32(sample::Type::Planar);
    let Ok(audio) = codec.audio() else {
        return fallback;
    };
    audio
        .formats()
        .and_then(|mut formats| formats.next())
        .unwrap_or(fallback)
}

/// Audio encoder fed packed signed 16-bit samples, converted to the codec's
/// native sample format before encoding.
pub struct FfmpegAudioEncoder {
    codec: ffmpeg_next::Codec,
    parameters: CodecParameters,
    output: SharedOutput,
    stream_index: usize,
    stream_time_base: Rational,
    layout: ChannelLayout,
    resampler: Option<resampling::Context>,
    inner: Option<OpenEncoder>,
}

impl FfmpegAudioEncoder {
    pub fn new(
        codec: ffmpeg_next::Codec,
        parameters: CodecParameters,
        output: SharedOutput,
        stream_index: usize,
        stream_time_base: Rational,
    ) -> Self {
        let layout = ChannelLayout::default(parameters.channels.into());
        Self {
            codec,
            parameters,
            output,
            stream_index,
            stream_time_base,
            layout,
            resampler: None,
            inner: None,
        }
    }
}

impl AudioEncoder for FfmpegAudioEncoder {
    fn parameters(&self) -> &CodecParameters {
        &self.parameters
    }

    fn parameters_mut(&mut self) -> &mut CodecParameters {
        &mut self.parameters
    }

    fn open(&mut self) -> anyhow::Result<()> {
        self.layout = ChannelLayout::default(self.parameters.channels.into());
        let params = &self.parameters;
        let rate = params.sample_rate as i32;

        let mut audio = codec::Context::new_with_codec(self.codec).encoder().audio()?;
        audio.set_format(preferred_sample_format(self.codec));
        audio.set_rate(rate);
        audio.set_channel_layout(self.layout);
        audio.set_bit_rate(params.bit_rate.max(0) as usize);
        audio.set_time_base(ffmpeg_next::Rational::from(params.time_base));
        if params.global_header {
            audio.set_flags(codec::Flags::GLOBAL_HEADER);
        }
        apply_rate_control(&mut audio, params);

        let opened = audio.open_with(dictionary(&params.options))?;
        let resampler = resampling::Context::get(
            PACKED_S16,
            self.layout,
            params.sample_rate,
            opened.format(),
            opened.channel_layout(),
            opened.rate(),
        )?;
        log::info!(
            "encoder opened: {} {} Hz {} ch, frame size {}",
            params.codec_name,
            opened.rate(),
            opened.channels(),
            opened.frame_size()
        );
        attach_stream(&self.output, self.stream_index, self.stream_time_base, &opened)?;

        self.parameters.frame_size = opened.frame_size() as usize;
        self.resampler = Some(resampler);
        self.inner = Some(OpenEncoder::new(EncoderType::Audio(opened)));
        Ok(())
    }

    fn encode(&mut self, samples: &[u8], pts: i64, out: &mut BytesMut) -> anyhow::Result<usize> {
        let stride = self.parameters.channels as usize * self.parameters.bytes_per_sample;
        if stride == 0 || samples.len() % stride != 0 {
            anyhow::bail!("{} sample bytes do not fill whole frames of {} bytes", samples.len(), stride);
        }
        let mut input = frame::Audio::new(PACKED_S16, samples.len() / stride, self.layout);
        input.set_rate(self.parameters.sample_rate);
        input.data_mut(0)[..samples.len()].copy_from_slice(samples);

        let (Some(resampler), Some(encoder)) = (self.resampler.as_mut(), self.inner.as_mut()) else {
            anyhow::bail!("{}: encoder not open", self.parameters.codec_name);
        };
        let mut converted = frame::Audio::empty();
        resampler.run(&input, &mut converted)?;
        converted.set_pts(Some(pts));
        encoder.send_audio(&converted)?;
        Ok(encoder.take(out))
    }

    fn coded_frame(&self) -> Option<CodedFrame> {
        self.inner.as_ref().and_then(|encoder| encoder.coded)
    }

    fn drain(&mut self, out: &mut BytesMut) -> anyhow::Result<usize> {
        match self.inner.as_mut() {
            Some(encoder) => encoder.drain(out),
            None => anyhow::bail!("{}: encoder not open", self.parameters.codec_name),
        }
    }
}
