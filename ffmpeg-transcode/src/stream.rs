use crate::backend::{AudioEncoder, DecoderHandle, StreamInfo, VideoEncoder};
use crate::codec::{CodecParameters, MediaType};
use crate::fifo::AudioFifo;
use crate::format::ContainerId;
use crate::rational::Rational;

/// An input stream and its decode position.
pub struct InputStream {
    index: usize,
    time_base: Rational,
    duration: i64,
    parameters: CodecParameters,
    pub(crate) decoder: Option<DecoderHandle>,
    /// Decode position in `TIME_BASE_Q` units.
    pub(crate) pts: i64,
    /// Expected position of the next decode; `None` until the first packet.
    pub(crate) next_pts: Option<i64>,
}

impl InputStream {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn time_base(&self) -> Rational {
        self.time_base
    }

    pub fn duration(&self) -> i64 {
        self.duration
    }

    pub fn parameters(&self) -> &CodecParameters {
        &self.parameters
    }

    pub fn media_type(&self) -> MediaType {
        self.parameters.media_type
    }

    pub fn is_video(&self) -> bool {
        self.media_type() == MediaType::Video
    }

    pub fn is_audio(&self) -> bool {
        self.media_type() == MediaType::Audio
    }

    pub fn pts(&self) -> i64 {
        self.pts
    }

    pub fn next_pts(&self) -> Option<i64> {
        self.next_pts
    }

    pub fn decoder_opened(&self) -> bool {
        self.decoder.is_some()
    }
}

impl From<StreamInfo> for InputStream {
    fn from(info: StreamInfo) -> Self {
        Self {
            index: info.index,
            time_base: info.time_base,
            duration: info.duration,
            parameters: info.parameters,
            decoder: None,
            pts: 0,
            next_pts: None,
        }
    }
}

pub struct AudioOutput {
    pub(crate) encoder: Box<dyn AudioEncoder>,
    pub(crate) fifo: Option<AudioFifo>,
}

pub struct VideoOutput {
    pub(crate) encoder: Box<dyn VideoEncoder>,
}

/// Per-type state of an output stream.
pub enum OutputCodec {
    Audio(AudioOutput),
    Video(VideoOutput),
    /// A declared stream the transcoder cannot encode; routing a packet to it
    /// fails.
    Unsupported(MediaType),
}

impl OutputCodec {
    pub fn audio(encoder: Box<dyn AudioEncoder>) -> Self {
        OutputCodec::Audio(AudioOutput {
            encoder,
            fifo: None,
        })
    }

    pub fn video(encoder: Box<dyn VideoEncoder>) -> Self {
        OutputCodec::Video(VideoOutput { encoder })
    }

    pub fn unsupported(media_type: MediaType) -> Self {
        OutputCodec::Unsupported(media_type)
    }

    pub fn media_type(&self) -> MediaType {
        match self {
            OutputCodec::Audio(_) => MediaType::Audio,
            OutputCodec::Video(_) => MediaType::Video,
            OutputCodec::Unsupported(media_type) => *media_type,
        }
    }
}

/// An output stream. `container` names the owning output context without
/// owning it.
pub struct OutputStream {
    pub(crate) index: usize,
    pub(crate) container: ContainerId,
    pub(crate) time_base: Rational,
    /// Next frame timestamp in encoder time base units.
    pub(crate) sync_pts: i64,
    /// In `time_base` units; 0 means derive from the input.
    pub(crate) duration: i64,
    pub(crate) codec: OutputCodec,
}

impl OutputStream {
    pub fn new(time_base: Rational, codec: OutputCodec) -> Self {
        Self {
            index: 0,
            container: ContainerId(0),
            time_base,
            sync_pts: 0,
            duration: 0,
            codec,
        }
    }

    pub fn with_duration(mut self, duration: i64) -> Self {
        self.duration = duration;
        self
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn container(&self) -> ContainerId {
        self.container
    }

    pub fn time_base(&self) -> Rational {
        self.time_base
    }

    pub fn sync_pts(&self) -> i64 {
        self.sync_pts
    }

    pub fn duration(&self) -> i64 {
        self.duration
    }

    pub fn media_type(&self) -> MediaType {
        self.codec.media_type()
    }

    pub fn codec(&self) -> &OutputCodec {
        &self.codec
    }

    /// Encoder parameters, `None` for unsupported streams.
    pub fn encoder_parameters(&self) -> Option<&CodecParameters> {
        match &self.codec {
            OutputCodec::Audio(audio) => Some(audio.encoder.parameters()),
            OutputCodec::Video(video) => Some(video.encoder.parameters()),
            OutputCodec::Unsupported(_) => None,
        }
    }

    /// Bytes waiting in the audio FIFO.
    pub fn buffered_audio(&self) -> usize {
        match &self.codec {
            OutputCodec::Audio(AudioOutput {
                fifo: Some(fifo), ..
            }) => fifo.size(),
            _ => 0,
        }
    }
}
