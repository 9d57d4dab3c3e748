use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::error::{Result, TranscodeError};
use crate::frame::PixelFormat;
use crate::rational::Rational;

/// Default output frame rate when a video stream does not name one.
pub const DEFAULT_FRAME_RATE: Rational = Rational::new(25, 1);
/// Default output sample rate when an audio stream does not name one.
pub const DEFAULT_SAMPLE_RATE: u32 = 44100;
/// Encoders in this crate consume packed signed 16-bit samples.
pub const SAMPLE_BYTES: usize = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Audio,
    Video,
    Subtitle,
    Data,
    Attachment,
    Unknown,
}

impl Display for MediaType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            MediaType::Audio => "audio",
            MediaType::Video => "video",
            MediaType::Subtitle => "subtitle",
            MediaType::Data => "data",
            MediaType::Attachment => "attachment",
            MediaType::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Codec-context fields the core reads or defaults. Zero means "unset" for
/// the numeric fields, matching how codec libraries report them.
#[derive(Clone, Debug, PartialEq)]
pub struct CodecParameters {
    pub media_type: MediaType,
    pub codec_name: String,
    pub time_base: Rational,

    pub width: u32,
    pub height: u32,
    pub pixel_format: Option<PixelFormat>,
    pub frame_rate: Option<Rational>,

    pub bit_rate: i64,
    pub bit_rate_tolerance: i64,
    pub rc_buffer_size: i64,
    pub rc_initial_buffer_occupancy: i64,

    pub sample_rate: u32,
    pub channels: u16,
    pub bytes_per_sample: usize,
    /// Samples per channel in one encoder frame; 0 until the encoder is open.
    pub frame_size: usize,

    pub global_header: bool,
    /// Codec private options handed to the backend on open.
    pub options: BTreeMap<String, String>,
}

impl CodecParameters {
    pub fn new(media_type: MediaType, codec_name: impl Into<String>, time_base: Rational) -> Self {
        Self {
            media_type,
            codec_name: codec_name.into(),
            time_base,
            width: 0,
            height: 0,
            pixel_format: None,
            frame_rate: None,
            bit_rate: 0,
            bit_rate_tolerance: 0,
            rc_buffer_size: 0,
            rc_initial_buffer_occupancy: 0,
            sample_rate: 0,
            channels: 0,
            bytes_per_sample: 0,
            frame_size: 0,
            global_header: false,
            options: BTreeMap::new(),
        }
    }

    /// Bytes the encoder consumes per audio frame.
    pub fn audio_frame_bytes(&self) -> usize {
        self.frame_size * self.bytes_per_sample * self.channels as usize
    }
}

/// What an encoder reports about the frame it just produced.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CodedFrame {
    pub pts: Option<i64>,
    pub dts: Option<i64>,
    pub key_frame: bool,
}

/// User-facing description of an output stream's encoder.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderSettings {
    #[serde(rename = "type")]
    pub media_type: Option<MediaType>,
    pub codec: String,
    pub bit_rate: Option<i64>,
    pub bit_rate_tolerance: Option<i64>,
    pub rc_buffer_size: Option<i64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub pixel_format: Option<PixelFormat>,
    pub frame_rate: Option<Rational>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u16>,
    pub options: BTreeMap<String, String>,
}

impl EncoderSettings {
    pub fn media_type(&self) -> Result<MediaType> {
        self.media_type
            .ok_or_else(|| TranscodeError::configuration(format!("{}: missing stream type", self.codec)))
    }

    /// Validate required options and fill in defaults.
    ///
    /// `supported_pixel_formats` is the codec's own list, first entry
    /// preferred; `global_header` is whether the target container wants codec
    /// headers out of band.
    pub fn to_parameters(
        &self,
        supported_pixel_formats: &[PixelFormat],
        global_header: bool,
    ) -> Result<CodecParameters> {
        let media_type = self.media_type()?;
        let bit_rate = self.require("bit_rate", self.bit_rate)?;

        let mut params = match media_type {
            MediaType::Video => {
                let width = self.require("width", self.width)?;
                let height = self.require("height", self.height)?;
                let frame_rate = self.frame_rate.unwrap_or(DEFAULT_FRAME_RATE);
                if !frame_rate.is_valid() {
                    return Err(TranscodeError::configuration(format!(
                        "{}: invalid frame rate {frame_rate}",
                        self.codec
                    )));
                }
                let mut params =
                    CodecParameters::new(MediaType::Video, &self.codec, frame_rate.invert());
                params.width = width;
                params.height = height;
                params.frame_rate = Some(frame_rate);
                params.pixel_format = self
                    .pixel_format
                    .or_else(|| supported_pixel_formats.first().copied());
                params
            }
            MediaType::Audio => {
                let channels = self.require("channels", self.channels)?;
                let sample_rate = self.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE);
                if sample_rate == 0 || sample_rate > i32::MAX as u32 {
                    return Err(TranscodeError::configuration(format!(
                        "{}: invalid sample rate {sample_rate}",
                        self.codec
                    )));
                }
                let mut params = CodecParameters::new(
                    MediaType::Audio,
                    &self.codec,
                    Rational::new(1, sample_rate as i32),
                );
                params.sample_rate = sample_rate;
                params.channels = channels;
                params.bytes_per_sample = SAMPLE_BYTES;
                params
            }
            other => {
                return Err(TranscodeError::unsupported(format!(
                    "cannot encode {other} stream with {}",
                    self.codec
                )));
            }
        };

        params.bit_rate = bit_rate;
        params.bit_rate_tolerance = self.bit_rate_tolerance.unwrap_or(bit_rate * 10 / 100);
        params.rc_buffer_size = self.rc_buffer_size.unwrap_or(0);
        params.global_header = global_header;
        params.options = self.options.clone();
        Ok(params)
    }

    fn require<T: Copy>(&self, name: &str, value: Option<T>) -> Result<T> {
        value.ok_or_else(|| {
            TranscodeError::configuration(format!("{}: required option `{name}` is missing", self.codec))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video() -> EncoderSettings {
        EncoderSettings {
            media_type: Some(MediaType::Video),
            codec: "mpeg4".into(),
            bit_rate: Some(400_000),
            width: Some(320),
            height: Some(240),
            ..Default::default()
        }
    }

    fn audio() -> EncoderSettings {
        EncoderSettings {
            media_type: Some(MediaType::Audio),
            codec: "aac".into(),
            bit_rate: Some(128_000),
            channels: Some(2),
            ..Default::default()
        }
    }

    #[test]
    fn test_video_defaults() {
        let params = video()
            .to_parameters(&[PixelFormat::Yuv420p, PixelFormat::Nv12], true)
            .unwrap();
        assert_eq!(params.time_base, Rational::new(1, 25));
        assert_eq!(params.frame_rate, Some(DEFAULT_FRAME_RATE));
        assert_eq!(params.pixel_format, Some(PixelFormat::Yuv420p));
        assert_eq!(params.bit_rate_tolerance, 40_000);
        assert!(params.global_header);
    }

    #[test]
    fn test_explicit_settings_win() {
        let mut settings = video();
        settings.pixel_format = Some(PixelFormat::Yuv444p);
        settings.frame_rate = Some(Rational::new(30000, 1001));
        settings.bit_rate_tolerance = Some(1);
        let params = settings.to_parameters(&[PixelFormat::Yuv420p], false).unwrap();
        assert_eq!(params.pixel_format, Some(PixelFormat::Yuv444p));
        assert_eq!(params.time_base, Rational::new(1001, 30000));
        assert_eq!(params.bit_rate_tolerance, 1);
        assert!(!params.global_header);
    }

    #[test]
    fn test_audio_defaults() {
        let params = audio().to_parameters(&[], false).unwrap();
        assert_eq!(params.sample_rate, DEFAULT_SAMPLE_RATE);
        assert_eq!(params.time_base, Rational::new(1, 44100));
        assert_eq!(params.bytes_per_sample, SAMPLE_BYTES);
        assert_eq!(params.bit_rate_tolerance, 12_800);
    }

    #[test]
    fn test_missing_required_option() {
        let mut settings = video();
        settings.height = None;
        let err = settings.to_parameters(&[], false).unwrap_err();
        assert!(matches!(err, TranscodeError::Configuration(ref m) if m.contains("height")));

        let mut settings = audio();
        settings.channels = None;
        assert!(matches!(
            settings.to_parameters(&[], false),
            Err(TranscodeError::Configuration(_))
        ));

        let mut settings = audio();
        settings.bit_rate = None;
        assert!(matches!(
            settings.to_parameters(&[], false),
            Err(TranscodeError::Configuration(_))
        ));
    }

    #[test]
    fn test_other_types_unsupported() {
        let mut settings = audio();
        settings.media_type = Some(MediaType::Subtitle);
        assert!(matches!(
            settings.to_parameters(&[], false),
            Err(TranscodeError::Unsupported(_))
        ));
    }

    #[test]
    fn test_frame_bytes() {
        let mut params = audio().to_parameters(&[], false).unwrap();
        params.frame_size = 1024;
        assert_eq!(params.audio_frame_bytes(), 4096);
    }
}
