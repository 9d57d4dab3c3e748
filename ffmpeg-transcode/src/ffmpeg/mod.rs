mod input;
mod output;
mod scale;

use std::cell::RefCell;
use std::rc::Rc;

use ffmpeg_next::format::{Pixel, Sample, sample};
use ffmpeg_next::media;

use crate::codec::MediaType;
use crate::error::{Result, TranscodeError};
use crate::format::{InputContext, OutputContext, OutputSet};
use crate::frame::{PixelFormat, VideoFrame};
use crate::job::JobConfig;
use crate::rational::Rational;
use crate::stream::{OutputCodec, OutputStream};
use crate::stream_map::StreamMap;
use crate::transcode::Transcoder;

pub use input::{FfmpegAudioDecoder, FfmpegDemuxer, FfmpegVideoDecoder};
pub use output::{FfmpegAudioEncoder, FfmpegMuxer, FfmpegVideoEncoder, SharedOutput};
pub use scale::{SwsConverter, SwsScalerFactory};

/// Sample layout every decoder produces and every encoder consumes.
pub(crate) const PACKED_S16: Sample = Sample::I16(sample::Type::Packed);

pub fn init() -> anyhow::Result<()> {
    ffmpeg_next::init().map_err(|e| anyhow::anyhow!("ffmpeg_next init: {}", e))
}

impl From<ffmpeg_next::Rational> for Rational {
    fn from(value: ffmpeg_next::Rational) -> Self {
        Rational {
            num: value.numerator(),
            den: value.denominator(),
        }
    }
}

impl From<Rational> for ffmpeg_next::Rational {
    fn from(value: Rational) -> Self {
        ffmpeg_next::Rational::new(value.num, value.den)
    }
}

impl From<media::Type> for MediaType {
    fn from(value: media::Type) -> Self {
        match value {
            media::Type::Audio => MediaType::Audio,
            media::Type::Video => MediaType::Video,
            media::Type::Subtitle => MediaType::Subtitle,
            media::Type::Data => MediaType::Data,
            media::Type::Attachment => MediaType::Attachment,
            media::Type::Unknown => MediaType::Unknown,
        }
    }
}

pub(crate) fn pixel_to_format(pixel: Pixel) -> Option<PixelFormat> {
    match pixel {
        Pixel::YUV420P => Some(PixelFormat::Yuv420p),
        Pixel::YUV422P => Some(PixelFormat::Yuv422p),
        Pixel::YUV444P => Some(PixelFormat::Yuv444p),
        Pixel::NV12 => Some(PixelFormat::Nv12),
        Pixel::RGB24 => Some(PixelFormat::Rgb24),
        Pixel::BGR24 => Some(PixelFormat::Bgr24),
        Pixel::GRAY8 => Some(PixelFormat::Gray8),
        _ => None,
    }
}

pub(crate) fn format_to_pixel(format: PixelFormat) -> Pixel {
    match format {
        PixelFormat::Yuv420p => Pixel::YUV420P,
        PixelFormat::Yuv422p => Pixel::YUV422P,
        PixelFormat::Yuv444p => Pixel::YUV444P,
        PixelFormat::Nv12 => Pixel::NV12,
        PixelFormat::Rgb24 => Pixel::RGB24,
        PixelFormat::Bgr24 => Pixel::BGR24,
        PixelFormat::Gray8 => Pixel::GRAY8,
    }
}

/// Copy the visible rows of every plane of `src` into `dst.data`.
pub(crate) fn pack_picture(src: &ffmpeg_next::frame::Video, format: PixelFormat, dst: &mut VideoFrame) {
    dst.width = src.width();
    dst.height = src.height();
    dst.format = Some(format);
    dst.key_frame = src.is_key();
    dst.data.clear();
    for (plane, (row_bytes, rows)) in format.planes(src.width(), src.height()).into_iter().enumerate() {
        let stride = src.stride(plane);
        let data = src.data(plane);
        for row in 0..rows {
            let start = row * stride;
            dst.data.extend_from_slice(&data[start..start + row_bytes]);
        }
    }
}

/// Inverse of [`pack_picture`]: spread a packed picture into an ffmpeg frame.
pub(crate) fn unpack_picture(src: &VideoFrame) -> anyhow::Result<ffmpeg_next::frame::Video> {
    let format = src
        .format
        .ok_or_else(|| anyhow::anyhow!("picture without pixel format"))?;
    let expected = format.picture_size(src.width, src.height);
    if src.data.len() < expected {
        anyhow::bail!(
            "short picture: {} bytes, {}x{} {} needs {}",
            src.data.len(),
            src.width,
            src.height,
            format,
            expected
        );
    }
    let mut frame = ffmpeg_next::frame::Video::new(format_to_pixel(format), src.width, src.height);
    let mut offset = 0;
    for (plane, (row_bytes, rows)) in format.planes(src.width, src.height).into_iter().enumerate() {
        let stride = frame.stride(plane);
        let data = frame.data_mut(plane);
        for row in 0..rows {
            let start = row * stride;
            data[start..start + row_bytes].copy_from_slice(&src.data[offset..offset + row_bytes]);
            offset += row_bytes;
        }
    }
    frame.set_pts(src.pts);
    Ok(frame)
}

fn supported_pixel_formats(codec: &ffmpeg_next::Codec) -> Vec<PixelFormat> {
    let Ok(video) = codec.video() else {
        return Vec::new();
    };
    video
        .formats()
        .map(|formats| formats.filter_map(pixel_to_format).collect())
        .unwrap_or_default()
}

fn open_output(url: &str, format: Option<&str>) -> Result<ffmpeg_next::format::context::Output> {
    let output = match format {
        Some(format) => ffmpeg_next::format::output_as(url, format),
        None => ffmpeg_next::format::output(url),
    };
    output.map_err(|e| TranscodeError::backend("open output", e))
}

/// Turn a job description into a ready, unprepared [`Transcoder`].
pub fn build_job(job: &JobConfig) -> Result<Transcoder> {
    init().map_err(|e| TranscodeError::backend("init", e))?;

    let demuxer = FfmpegDemuxer::open(&job.input, job.input_format.as_deref())
        .map_err(|e| TranscodeError::backend("open input", e))?;
    let input = InputContext::open(&job.input, Box::new(demuxer));

    let mut outputs = OutputSet::new();
    let mut map = StreamMap::builder();
    for output in &job.outputs {
        let octx = open_output(&output.url, output.format.as_deref())?;
        let global_header = octx
            .format()
            .flags()
            .contains(ffmpeg_next::format::Flags::GLOBAL_HEADER);
        let octx: SharedOutput = Rc::new(RefCell::new(octx));
        let container = outputs.add(OutputContext::new(
            &output.url,
            Box::new(FfmpegMuxer::new(octx.clone())),
        ));

        for stream in &output.streams {
            let codec = ffmpeg_next::encoder::find_by_name(&stream.encoder.codec).ok_or_else(|| {
                TranscodeError::configuration(format!("encoder not found: {}", stream.encoder.codec))
            })?;
            let params = stream
                .encoder
                .to_parameters(&supported_pixel_formats(&codec), global_header)?;
            let time_base = stream.time_base.unwrap_or(params.time_base);
            let index = {
                let mut octx = octx.borrow_mut();
                let ost = octx
                    .add_stream(codec)
                    .map_err(|e| TranscodeError::backend("add stream", e))?;
                ost.index()
            };

            let encoder = match params.media_type {
                MediaType::Audio => OutputCodec::audio(Box::new(FfmpegAudioEncoder::new(
                    codec,
                    params,
                    octx.clone(),
                    index,
                    time_base,
                ))),
                MediaType::Video => OutputCodec::video(Box::new(FfmpegVideoEncoder::new(
                    codec,
                    params,
                    octx.clone(),
                    index,
                    time_base,
                ))),
                other => OutputCodec::unsupported(other),
            };
            let output_ref = outputs.add_stream(
                container,
                OutputStream::new(time_base, encoder).with_duration(stream.duration),
            )?;
            if output_ref.stream != index {
                return Err(TranscodeError::configuration(format!(
                    "{}: stream {} landed at container index {}",
                    output.url, output_ref.stream, index
                )));
            }
            log::info!(
                "{}: input #{} -> {} ({}, time base {})",
                output.url,
                stream.input_index,
                output_ref,
                stream.encoder.codec,
                time_base
            );
            map = map.route(stream.input_index, output_ref);
        }
    }

    Ok(Transcoder::new(
        input,
        outputs,
        map.build()?,
        Box::new(SwsScalerFactory),
        job.options.clone(),
    ))
}
