use std::collections::VecDeque;
use std::ffi::CString;
use std::path::Path;

use ffmpeg_next::codec::decoder;
use ffmpeg_next::software::{resampling, scaling};
use ffmpeg_next::{ChannelLayout, Dictionary, frame};

use super::{PACKED_S16, pack_picture, pixel_to_format};
use crate::backend::{
    AudioDecoded, AudioDecoder, DecoderHandle, Demuxer, ReadStatus, StreamInfo, VideoDecoded,
    VideoDecoder,
};
use crate::codec::{CodecParameters, MediaType, SAMPLE_BYTES};
use crate::frame::{PixelFormat, VideoFrame};
use crate::packet::Packet;

fn is_again(err: &ffmpeg_next::Error) -> bool {
    matches!(err, ffmpeg_next::Error::Other { errno } if *errno == ffmpeg_next::util::error::EAGAIN)
}

/// Resolve input format by name (e.g. "wav", "v4l2") via FFmpeg's av_find_input_format.
fn find_input_format(name: &str) -> anyhow::Result<ffmpeg_next::format::format::Input> {
    let cname =
        CString::new(name).map_err(|e| anyhow::anyhow!("invalid format name {:?}: {}", name, e))?;
    let ptr = unsafe { ffmpeg_next::ffi::av_find_input_format(cname.as_ptr()) };
    if ptr.is_null() {
        return Err(anyhow::anyhow!("input format not found: {}", name));
    }
    Ok(unsafe { ffmpeg_next::format::format::Input::wrap(ptr as *mut _) })
}

/// Layout for `channels`, trusting the codec's own layout when it agrees.
fn audio_layout(layout: ChannelLayout, channels: u16) -> ChannelLayout {
    if layout.is_empty() || layout.channels() != channels as i32 {
        ChannelLayout::default(channels.into())
    } else {
        layout
    }
}

fn stream_parameters(stream: &ffmpeg_next::format::stream::Stream) -> anyhow::Result<CodecParameters> {
    let media_type = MediaType::from(stream.parameters().medium());
    let context = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())?;
    let mut params = CodecParameters::new(media_type, context.id().name(), stream.time_base().into());
    let ptr = unsafe { context.as_ptr() };
    params.bit_rate = unsafe { (*ptr).bit_rate };
    match media_type {
        MediaType::Video => {
            let pixel = ffmpeg_next::format::Pixel::from(unsafe { (*ptr).pix_fmt });
            params.width = unsafe { (*ptr).width }.max(0) as u32;
            params.height = unsafe { (*ptr).height }.max(0) as u32;
            params.pixel_format = pixel_to_format(pixel);
            let rate = stream.avg_frame_rate();
            if rate.numerator() > 0 && rate.denominator() > 0 {
                params.frame_rate = Some(rate.into());
            }
        }
        MediaType::Audio => {
            params.sample_rate = unsafe { (*ptr).sample_rate }.max(0) as u32;
            params.channels = unsafe { (*ptr).ch_layout.nb_channels }.max(0) as u16;
            params.bytes_per_sample = SAMPLE_BYTES;
        }
        _ => {}
    }
    Ok(params)
}

pub struct FfmpegDemuxer {
    inner: ffmpeg_next::format::context::Input,
    streams: Vec<StreamInfo>,
}

impl FfmpegDemuxer {
    pub fn open(url: &str, format: Option<&str>) -> anyhow::Result<Self> {
        use ffmpeg_next::format::format::Format;

        let path = Path::new(url);
        let input = match format {
            Some(name) => {
                let fmt = find_input_format(name)?;
                ffmpeg_next::format::open_with(path, &Format::Input(fmt), Dictionary::new())?.input()
            }
            None => ffmpeg_next::format::input(path)?,
        };
        log::info!("opened input {} ({})", url, input.format().name());
        Ok(Self {
            inner: input,
            streams: Vec::new(),
        })
    }
}

impl Demuxer for FfmpegDemuxer {
    fn find_stream_info(&mut self) -> anyhow::Result<()> {
        // avformat_find_stream_info already ran when the input was opened
        let mut streams = Vec::new();
        for stream in self.inner.streams() {
            let info = StreamInfo {
                index: stream.index(),
                time_base: stream.time_base().into(),
                duration: stream.duration().max(0),
                parameters: stream_parameters(&stream)?,
            };
            log::debug!(
                "input stream #{}: {} {} time base {}",
                info.index,
                info.media_type(),
                info.parameters.codec_name,
                info.time_base
            );
            streams.push(info);
        }
        self.streams = streams;
        Ok(())
    }

    fn streams(&self) -> Vec<StreamInfo> {
        self.streams.clone()
    }

    fn read_packet(&mut self, packet: &mut Packet) -> anyhow::Result<ReadStatus> {
        let mut raw = ffmpeg_next::Packet::empty();
        match raw.read(&mut self.inner) {
            Ok(()) => {}
            Err(ffmpeg_next::Error::Eof) => return Ok(ReadStatus::EndOfStream),
            Err(err) => return Err(err.into()),
        }
        packet
            .set_index(raw.stream())
            .set_pts(raw.pts())
            .set_dts(raw.dts())
            .set_duration(raw.duration())
            .set_data(raw.data().unwrap_or_default())
            .set_key(raw.is_key());
        Ok(ReadStatus::Packet)
    }

    fn open_decoder(&mut self, index: usize) -> anyhow::Result<DecoderHandle> {
        let stream = self
            .inner
            .stream(index)
            .ok_or_else(|| anyhow::anyhow!("stream {} not found", index))?;
        let mut params = match self.streams.iter().find(|info| info.index == index) {
            Some(info) => info.parameters.clone(),
            None => stream_parameters(&stream)?,
        };

        let mut decoder_ctx = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())?;
        unsafe {
            (*decoder_ctx.as_mut_ptr()).time_base = stream.time_base().into();
        }

        match params.media_type {
            MediaType::Video => {
                let video_decoder = decoder_ctx.decoder().video()?;
                if video_decoder.format() == ffmpeg_next::format::Pixel::None
                    || video_decoder.width() == 0
                    || video_decoder.height() == 0
                {
                    return Err(anyhow::anyhow!("missing codec parameters"));
                }
                params.width = video_decoder.width();
                params.height = video_decoder.height();
                // formats the core cannot size are converted on the way out
                params.pixel_format =
                    Some(pixel_to_format(video_decoder.format()).unwrap_or(PixelFormat::Yuv420p));
                // one tick per picture
                if let Some(rate) = params.frame_rate {
                    params.time_base = rate.invert();
                }
                Ok(DecoderHandle::Video(Box::new(FfmpegVideoDecoder::new(
                    video_decoder,
                    params,
                ))))
            }
            MediaType::Audio => {
                let audio_decoder = decoder_ctx.decoder().audio()?;
                params.sample_rate = audio_decoder.rate();
                params.channels = audio_decoder.channels();
                params.bytes_per_sample = SAMPLE_BYTES;
                Ok(DecoderHandle::Audio(Box::new(FfmpegAudioDecoder::new(
                    audio_decoder,
                    params,
                ))))
            }
            other => Err(anyhow::anyhow!("unsupported stream type: {}", other)),
        }
    }
}

/// Audio decoder emitting packed signed 16-bit samples at the source rate.
pub struct FfmpegAudioDecoder {
    inner: decoder::Audio,
    parameters: CodecParameters,
    resampler: Option<resampling::Context>,
    pending: VecDeque<u8>,
    flushing: bool,
}

impl FfmpegAudioDecoder {
    pub fn new(inner: decoder::Audio, parameters: CodecParameters) -> Self {
        Self {
            inner,
            parameters,
            resampler: None,
            pending: VecDeque::new(),
            flushing: false,
        }
    }

    fn send(&mut self, packet: &ffmpeg_next::Packet) -> anyhow::Result<()> {
        match self.inner.send_packet(packet) {
            Ok(()) => Ok(()),
            Err(err) if is_again(&err) => {
                self.receive_all()?;
                self.inner.send_packet(packet).map_err(|e| e.into())
            }
            Err(err) => Err(err.into()),
        }
    }

    fn receive_all(&mut self) -> anyhow::Result<()> {
        loop {
            let mut decoded = frame::Audio::empty();
            match self.inner.receive_frame(&mut decoded) {
                Ok(()) => self.push(&decoded)?,
                Err(ffmpeg_next::Error::Eof) => return Ok(()),
                Err(err) if is_again(&err) => return Ok(()),
                Err(err) => return Err(err.into()),
            }
        }
    }

    fn push(&mut self, decoded: &frame::Audio) -> anyhow::Result<()> {
        let channels = decoded.channels();
        let layout = audio_layout(decoded.channel_layout(), channels);
        if self.resampler.is_none() {
            self.resampler = Some(resampling::Context::get(
                decoded.format(),
                layout,
                decoded.rate(),
                PACKED_S16,
                layout,
                decoded.rate(),
            )?);
        }
        let mut packed = frame::Audio::empty();
        if let Some(resampler) = self.resampler.as_mut() {
            resampler.run(decoded, &mut packed)?;
        }
        let bytes = packed.samples() * channels as usize * SAMPLE_BYTES;
        self.pending.extend(&packed.data(0)[..bytes]);
        Ok(())
    }
}

impl AudioDecoder for FfmpegAudioDecoder {
    fn parameters(&self) -> &CodecParameters {
        &self.parameters
    }

    fn decode(&mut self, samples: &mut [u8], input: &[u8]) -> anyhow::Result<AudioDecoded> {
        if input.is_empty() {
            if !self.flushing {
                self.flushing = true;
                self.inner.send_eof()?;
            }
        } else {
            self.send(&ffmpeg_next::Packet::copy(input))?;
        }
        self.receive_all()?;

        let n = self.pending.len().min(samples.len());
        for (dst, src) in samples[..n].iter_mut().zip(self.pending.drain(..n)) {
            *dst = src;
        }
        Ok(AudioDecoded {
            consumed: input.len(),
            sample_bytes: n,
        })
    }
}

/// Video decoder emitting packed pictures, converting formats the core
/// cannot size to yuv420p.
pub struct FfmpegVideoDecoder {
    inner: decoder::Video,
    parameters: CodecParameters,
    queue: VecDeque<frame::Video>,
    converter: Option<scaling::Context>,
    flushing: bool,
}

impl FfmpegVideoDecoder {
    pub fn new(inner: decoder::Video, parameters: CodecParameters) -> Self {
        Self {
            inner,
            parameters,
            queue: VecDeque::new(),
            converter: None,
            flushing: false,
        }
    }

    fn receive(&mut self) -> anyhow::Result<Option<frame::Video>> {
        let mut decoded = frame::Video::empty();
        match self.inner.receive_frame(&mut decoded) {
            Ok(()) => Ok(Some(decoded)),
            Err(ffmpeg_next::Error::Eof) => Ok(None),
            Err(err) if is_again(&err) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn send(&mut self, packet: &ffmpeg_next::Packet) -> anyhow::Result<()> {
        match self.inner.send_packet(packet) {
            Ok(()) => Ok(()),
            Err(err) if is_again(&err) => {
                while let Some(decoded) = self.receive()? {
                    self.queue.push_back(decoded);
                }
                self.inner.send_packet(packet).map_err(|e| e.into())
            }
            Err(err) => Err(err.into()),
        }
    }

    fn output(&mut self, decoded: &frame::Video, frame: &mut VideoFrame) -> anyhow::Result<()> {
        if let Some(format) = pixel_to_format(decoded.format()) {
            pack_picture(decoded, format, frame);
            return Ok(());
        }
        if self.converter.is_none() {
            self.converter = Some(scaling::Context::get(
                decoded.format(),
                decoded.width(),
                decoded.height(),
                ffmpeg_next::format::Pixel::YUV420P,
                decoded.width(),
                decoded.height(),
                scaling::Flags::BICUBIC,
            )?);
        }
        let mut converted = frame::Video::empty();
        if let Some(converter) = self.converter.as_mut() {
            converter.run(decoded, &mut converted)?;
        }
        pack_picture(&converted, PixelFormat::Yuv420p, frame);
        frame.key_frame = decoded.is_key();
        Ok(())
    }
}

impl VideoDecoder for FfmpegVideoDecoder {
    fn parameters(&self) -> &CodecParameters {
        &self.parameters
    }

    fn decode(&mut self, frame: &mut VideoFrame, input: &[u8]) -> anyhow::Result<VideoDecoded> {
        if input.is_empty() {
            if !self.flushing {
                self.flushing = true;
                self.inner.send_eof()?;
            }
        } else {
            self.send(&ffmpeg_next::Packet::copy(input))?;
        }

        let decoded = match self.queue.pop_front() {
            Some(decoded) => Some(decoded),
            None => self.receive()?,
        };
        let got_picture = match decoded {
            Some(decoded) => {
                self.output(&decoded, frame)?;
                true
            }
            None => false,
        };
        Ok(VideoDecoded {
            got_picture,
            consumed: input.len(),
        })
    }
}
