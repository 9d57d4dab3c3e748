use std::cell::OnceCell;
use std::fmt::{Display, Formatter};

use crate::backend::{Demuxer, Muxer, ReadStatus};
use crate::error::{Result, TranscodeError};
use crate::packet::Packet;
use crate::rational::{Rational, TIME_BASE};
use crate::stream::{InputStream, OutputStream};

/// Demuxed input and the streams it owns.
pub struct InputContext {
    url: String,
    demuxer: Box<dyn Demuxer>,
    streams: Vec<InputStream>,
    stream_info_loaded: bool,
    first_video: OnceCell<Option<usize>>,
    first_audio: OnceCell<Option<usize>>,
}

impl InputContext {
    pub fn open(url: impl Into<String>, demuxer: Box<dyn Demuxer>) -> Self {
        let streams = demuxer.streams().into_iter().map(InputStream::from).collect();
        Self {
            url: url.into(),
            demuxer,
            streams,
            stream_info_loaded: false,
            first_video: OnceCell::new(),
            first_audio: OnceCell::new(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Probe stream parameters. Only the first call reaches the demuxer.
    pub fn find_stream_info(&mut self) -> Result<()> {
        if self.stream_info_loaded {
            return Ok(());
        }
        self.demuxer
            .find_stream_info()
            .map_err(TranscodeError::at("find stream info"))?;
        self.streams = self
            .demuxer
            .streams()
            .into_iter()
            .map(InputStream::from)
            .collect();
        self.first_video.take();
        self.first_audio.take();
        self.stream_info_loaded = true;
        log::debug!("{}: {} streams", self.url, self.streams.len());
        Ok(())
    }

    pub fn stream_info_loaded(&self) -> bool {
        self.stream_info_loaded
    }

    pub fn streams(&self) -> &[InputStream] {
        &self.streams
    }

    pub fn stream(&self, index: usize) -> Option<&InputStream> {
        self.streams.iter().find(|s| s.index() == index)
    }

    pub(crate) fn stream_mut(&mut self, index: usize) -> Option<&mut InputStream> {
        self.streams.iter_mut().find(|s| s.index() == index)
    }

    pub fn first_video_stream(&self) -> Option<&InputStream> {
        let pos = *self
            .first_video
            .get_or_init(|| self.streams.iter().position(InputStream::is_video));
        pos.map(|pos| &self.streams[pos])
    }

    pub fn first_audio_stream(&self) -> Option<&InputStream> {
        let pos = *self
            .first_audio
            .get_or_init(|| self.streams.iter().position(InputStream::is_audio));
        pos.map(|pos| &self.streams[pos])
    }

    pub fn has_video(&self) -> bool {
        self.first_video_stream().is_some()
    }

    pub fn has_audio(&self) -> bool {
        self.first_audio_stream().is_some()
    }

    pub(crate) fn demuxer_mut(&mut self) -> &mut dyn Demuxer {
        self.demuxer.as_mut()
    }

    pub(crate) fn read_packet(&mut self, packet: &mut Packet) -> Result<ReadStatus> {
        self.demuxer
            .read_packet(packet)
            .map_err(TranscodeError::at("read packet"))
    }
}

/// Position of an output context inside an [`OutputSet`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContainerId(pub usize);

impl Display for ContainerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Non-owning handle to one output stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutputStreamRef {
    pub container: ContainerId,
    pub stream: usize,
}

impl Display for OutputStreamRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.container, self.stream)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LoopOutput {
    #[default]
    Disabled,
    Infinite,
    Count(u32),
}

/// Container-level multiplexing pace, `TIME_BASE` units.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Pacing {
    pub preload: i64,
    pub max_delay: i64,
    pub loop_output: LoopOutput,
}

impl Pacing {
    /// Half a second of pre-roll, 0.7 s of muxing delay, no looping.
    pub const fn transcoding() -> Self {
        Self {
            preload: TIME_BASE / 2,
            max_delay: TIME_BASE * 7 / 10,
            loop_output: LoopOutput::Disabled,
        }
    }
}

/// An output container and the streams written into it.
pub struct OutputContext {
    url: String,
    muxer: Box<dyn Muxer>,
    streams: Vec<OutputStream>,
    pacing: Pacing,
    have_written_header: bool,
    have_written_trailer: bool,
}

impl OutputContext {
    pub fn new(url: impl Into<String>, muxer: Box<dyn Muxer>) -> Self {
        Self {
            url: url.into(),
            muxer,
            streams: Vec::new(),
            pacing: Pacing::default(),
            have_written_header: false,
            have_written_trailer: false,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn streams(&self) -> &[OutputStream] {
        &self.streams
    }

    pub fn stream(&self, index: usize) -> Option<&OutputStream> {
        self.streams.get(index)
    }

    pub(crate) fn stream_mut(&mut self, index: usize) -> Option<&mut OutputStream> {
        self.streams.get_mut(index)
    }

    pub fn pacing(&self) -> Pacing {
        self.pacing
    }

    pub fn set_pacing(&mut self, pacing: Pacing) {
        self.pacing = pacing;
    }

    pub fn have_written_header(&self) -> bool {
        self.have_written_header
    }

    pub fn have_written_trailer(&self) -> bool {
        self.have_written_trailer
    }

    /// Write the container header unless already written.
    pub fn write_header(&mut self) -> Result<()> {
        if self.have_written_header {
            return Ok(());
        }
        self.muxer
            .write_header(&self.pacing)
            .map_err(TranscodeError::at("write header"))?;
        self.have_written_header = true;
        log::info!("{}: header written", self.url);
        Ok(())
    }

    /// Write the trailer once, and only after a header.
    pub fn finish(&mut self) -> Result<()> {
        if self.have_written_header && !self.have_written_trailer {
            self.have_written_trailer = true;
            self.muxer
                .write_trailer()
                .map_err(TranscodeError::at("write trailer"))?;
            log::info!("{}: trailer written", self.url);
        }
        Ok(())
    }

    /// Borrow one stream together with a writer into this container.
    pub(crate) fn stream_writer(&mut self, index: usize) -> Option<(&mut OutputStream, PacketWriter<'_>)> {
        let stream = self.streams.get_mut(index)?;
        let writer = PacketWriter {
            url: &self.url,
            muxer: &mut self.muxer,
            pacing: &self.pacing,
            have_written_header: &mut self.have_written_header,
        };
        Some((stream, writer))
    }
}

/// Interleaved writes into one container, writing the header first if no
/// one has yet.
pub(crate) struct PacketWriter<'a> {
    url: &'a str,
    muxer: &'a mut Box<dyn Muxer>,
    pacing: &'a Pacing,
    have_written_header: &'a mut bool,
}

impl PacketWriter<'_> {
    pub(crate) fn write(&mut self, packet: &Packet, time_base: Rational) -> Result<usize> {
        if !*self.have_written_header {
            self.muxer
                .write_header(self.pacing)
                .map_err(TranscodeError::at("write header"))?;
            *self.have_written_header = true;
            log::info!("{}: header written", self.url);
        }
        self.muxer
            .interleaved_write(packet, time_base)
            .map_err(TranscodeError::at("interleaved write"))
    }
}

/// Every output container of a job, addressed by [`ContainerId`].
#[derive(Default)]
pub struct OutputSet {
    contexts: Vec<OutputContext>,
}

impl OutputSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, context: OutputContext) -> ContainerId {
        self.contexts.push(context);
        ContainerId(self.contexts.len() - 1)
    }

    /// Attach `stream` to `container`, assigning its index there.
    pub fn add_stream(&mut self, container: ContainerId, mut stream: OutputStream) -> Result<OutputStreamRef> {
        let context = self.contexts.get_mut(container.0).ok_or_else(|| {
            TranscodeError::configuration(format!("no output container {container}"))
        })?;
        let index = context.streams.len();
        stream.index = index;
        stream.container = container;
        context.streams.push(stream);
        Ok(OutputStreamRef {
            container,
            stream: index,
        })
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    pub fn get(&self, id: ContainerId) -> Option<&OutputContext> {
        self.contexts.get(id.0)
    }

    pub fn get_mut(&mut self, id: ContainerId) -> Option<&mut OutputContext> {
        self.contexts.get_mut(id.0)
    }

    pub fn stream(&self, output: OutputStreamRef) -> Option<&OutputStream> {
        self.get(output.container)?.stream(output.stream)
    }

    pub(crate) fn stream_mut(&mut self, output: OutputStreamRef) -> Option<&mut OutputStream> {
        self.get_mut(output.container)?.stream_mut(output.stream)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ContainerId, &OutputContext)> {
        self.contexts
            .iter()
            .enumerate()
            .map(|(i, context)| (ContainerId(i), context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::MediaType;
    use crate::stream::OutputCodec;
    use crate::synthetic::{MuxLog, RecordingMuxer, ScriptedDemuxer};

    #[test]
    fn test_first_streams_are_memoized() {
        let demuxer = ScriptedDemuxer::av(Vec::new());
        let mut input = InputContext::open("synthetic", Box::new(demuxer));
        input.find_stream_info().unwrap();
        input.find_stream_info().unwrap();
        assert!(input.stream_info_loaded());
        assert_eq!(input.first_video_stream().map(InputStream::index), Some(0));
        assert_eq!(input.first_audio_stream().map(InputStream::index), Some(1));
        assert!(input.has_video() && input.has_audio());
    }

    #[test]
    fn test_header_and_trailer_once() {
        let log = MuxLog::shared();
        let mut context = OutputContext::new("out", Box::new(RecordingMuxer::new(log.clone())));

        // no header yet, so no trailer
        context.finish().unwrap();
        assert_eq!(log.borrow().trailers, 0);

        context.write_header().unwrap();
        context.write_header().unwrap();
        context.finish().unwrap();
        context.finish().unwrap();
        assert_eq!(log.borrow().headers, 1);
        assert_eq!(log.borrow().trailers, 1);
    }

    #[test]
    fn test_writer_writes_header_first() {
        let log = MuxLog::shared();
        let mut outputs = OutputSet::new();
        let id = outputs.add(OutputContext::new("out", Box::new(RecordingMuxer::new(log.clone()))));
        let output = outputs
            .add_stream(id, OutputStream::new(Rational::new(1, 25), OutputCodec::unsupported(MediaType::Data)))
            .unwrap();

        let context = outputs.get_mut(output.container).unwrap();
        let (_, mut writer) = context.stream_writer(output.stream).unwrap();
        let packet = Packet::new(0);
        writer.write(&packet, Rational::new(1, 25)).unwrap();
        writer.write(&packet, Rational::new(1, 25)).unwrap();
        assert_eq!(log.borrow().headers, 1);
        assert_eq!(log.borrow().packets.len(), 2);
        assert!(context.have_written_header());
    }

    #[test]
    fn test_add_stream_assigns_indices() {
        let mut outputs = OutputSet::new();
        let a = outputs.add(OutputContext::new("a", Box::new(RecordingMuxer::new(MuxLog::shared()))));
        let b = outputs.add(OutputContext::new("b", Box::new(RecordingMuxer::new(MuxLog::shared()))));
        let tb = Rational::new(1, 25);
        let first = outputs
            .add_stream(b, OutputStream::new(tb, OutputCodec::unsupported(MediaType::Data)))
            .unwrap();
        let second = outputs
            .add_stream(b, OutputStream::new(tb, OutputCodec::unsupported(MediaType::Data)))
            .unwrap();
        assert_eq!(first, OutputStreamRef { container: b, stream: 0 });
        assert_eq!(second.stream, 1);
        assert_eq!(outputs.stream(second).unwrap().container(), b);
        assert!(outputs.get(a).unwrap().streams().is_empty());
        assert!(outputs.add_stream(ContainerId(9), OutputStream::new(tb, OutputCodec::unsupported(MediaType::Data))).is_err());
    }
}
