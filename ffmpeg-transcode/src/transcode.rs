//! The read, decode, encode, write loop.
//!
//! A [`Transcoder`] moves through `Running -> EofPending -> Done` and never
//! back. While running, each [`Transcoder::step`] processes one input packet
//! end to end. The step that finds end of input only records it; the next
//! one drains buffered decoder, FIFO and encoder state (unless disabled) and
//! reaches `Done`. [`Transcoder::finish`] then writes one trailer per output
//! container.

use bytes::BytesMut;
use serde::{Deserialize, Serialize};

use crate::backend::{DecoderHandle, ReadStatus, ScalerFactory};
use crate::codec::{CodedFrame, MediaType};
use crate::error::{Result, TranscodeError};
use crate::format::{InputContext, OutputSet, OutputStreamRef, PacketWriter};
use crate::frame::{FrameGeometry, VideoFrame};
use crate::packet::Packet;
use crate::rational::{MAX_AUDIO_FRAME_SIZE, Rational, TIME_BASE, TIME_BASE_Q, rescale_q, rescale_ts};
use crate::scaler::{ScaleAlgorithm, ScalerCache};
use crate::stream::{AudioOutput, InputStream, OutputCodec};
use crate::stream_map::StreamMap;

/// Initial size of the encoded-packet buffer.
pub const VIDEO_BUFFER_SIZE: usize = 1024 * 1024;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscodeOptions {
    /// Added to every packet timestamp, in `TIME_BASE_Q` units.
    pub timestamp_offset: i64,
    /// Stream whose time base the offset is expressed in. Defaults to the
    /// first video stream, then the first stream.
    pub offset_base_stream: Option<usize>,
    pub scale_algorithm: ScaleAlgorithm,
    /// Flush decoders, FIFOs and encoders at end of input.
    pub drain_on_eof: bool,
    /// Pad a trailing partial audio frame with silence instead of dropping it.
    pub pad_final_audio_frame: bool,
}

impl Default for TranscodeOptions {
    fn default() -> Self {
        Self {
            timestamp_offset: 0,
            offset_base_stream: None,
            scale_algorithm: ScaleAlgorithm::default(),
            drain_on_eof: true,
            pad_final_audio_frame: false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TranscodeState {
    Running,
    EofPending,
    Done,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TranscodeSummary {
    pub packets_read: u64,
    /// Read but not mapped to any output.
    pub packets_discarded: u64,
    pub packets_written: u64,
    pub audio_frames_encoded: u64,
    pub video_frames_encoded: u64,
    /// Trailing audio that did not fill an encoder frame.
    pub audio_bytes_dropped: u64,
}

/// Encoder output staging shared by every route.
struct EncodeBuffers {
    encoded: BytesMut,
    packet: Packet,
}

pub struct Transcoder {
    input: InputContext,
    outputs: OutputSet,
    map: StreamMap,
    options: TranscodeOptions,
    scalers: ScalerCache,
    state: TranscodeState,
    prepared: bool,
    /// `timestamp_offset` in the offset base stream's time base.
    offset: i64,
    summary: TranscodeSummary,
    packet: Packet,
    samples: Vec<u8>,
    frame: VideoFrame,
    buffers: EncodeBuffers,
}

impl Transcoder {
    pub fn new(
        input: InputContext,
        outputs: OutputSet,
        map: StreamMap,
        scaler_factory: Box<dyn ScalerFactory>,
        options: TranscodeOptions,
    ) -> Self {
        let scalers = ScalerCache::new(scaler_factory, options.scale_algorithm);
        Self {
            input,
            outputs,
            map,
            options,
            scalers,
            state: TranscodeState::Running,
            prepared: false,
            offset: 0,
            summary: TranscodeSummary::default(),
            packet: Packet::default(),
            samples: Vec::new(),
            frame: VideoFrame::default(),
            buffers: EncodeBuffers {
                encoded: BytesMut::new(),
                packet: Packet::default(),
            },
        }
    }

    pub fn state(&self) -> TranscodeState {
        self.state
    }

    pub fn summary(&self) -> TranscodeSummary {
        self.summary
    }

    pub fn options(&self) -> &TranscodeOptions {
        &self.options
    }

    pub fn input(&self) -> &InputContext {
        &self.input
    }

    pub fn outputs(&self) -> &OutputSet {
        &self.outputs
    }

    pub fn map(&self) -> &StreamMap {
        &self.map
    }

    pub fn scalers(&self) -> &ScalerCache {
        &self.scalers
    }

    /// Offset added to packet timestamps, in the base stream's time base.
    pub fn timestamp_offset(&self) -> i64 {
        self.offset
    }

    /// Open codecs, settle output parameters and allocate scratch buffers.
    /// Runs once; later calls do nothing.
    pub fn prepare(&mut self) -> Result<()> {
        if self.prepared {
            return Ok(());
        }
        crate::prepare::prepare(&mut self.input, &mut self.outputs, &self.map)?;
        self.offset = self.offset_in_base()?;

        self.samples
            .try_reserve_exact(MAX_AUDIO_FRAME_SIZE)
            .map_err(|e| TranscodeError::allocation(format!("audio scratch: {e}")))?;
        self.samples.resize(MAX_AUDIO_FRAME_SIZE, 0);
        self.buffers.encoded.reserve(VIDEO_BUFFER_SIZE);

        self.prepared = true;
        Ok(())
    }

    fn offset_in_base(&self) -> Result<i64> {
        if self.options.timestamp_offset == 0 {
            return Ok(0);
        }
        let base = match self.options.offset_base_stream {
            Some(index) => self.input.stream(index),
            None => self
                .input
                .first_video_stream()
                .or_else(|| self.input.streams().first()),
        }
        .ok_or_else(|| TranscodeError::configuration("timestamp offset without a base stream"))?;

        let offset = rescale_q(self.options.timestamp_offset, TIME_BASE_Q, base.time_base())
            .ok_or_else(|| {
                TranscodeError::configuration(format!(
                    "timestamp offset {} does not fit time base {}",
                    self.options.timestamp_offset,
                    base.time_base()
                ))
            })?;
        log::debug!(
            "timestamp offset {} us = {offset} in {} (stream {})",
            self.options.timestamp_offset,
            base.time_base(),
            base.index()
        );
        Ok(offset)
    }

    /// Write every mapped container's header, in route order.
    pub fn write_headers(&mut self) -> Result<()> {
        for container in self.map.output_containers() {
            if let Some(context) = self.outputs.get_mut(container) {
                context.write_header()?;
            }
        }
        Ok(())
    }

    /// Advance the state machine by one transition.
    pub fn step(&mut self) -> Result<TranscodeState> {
        self.prepare()?;
        match self.state {
            TranscodeState::Running => self.process_next_packet()?,
            TranscodeState::EofPending => {
                if self.options.drain_on_eof {
                    self.drain()?;
                } else {
                    let dropped = self.discard_buffered();
                    log::info!("end of input, not draining ({dropped} buffered audio bytes dropped)");
                }
                self.state = TranscodeState::Done;
            }
            TranscodeState::Done => {}
        }
        Ok(self.state)
    }

    /// Write one trailer per output container, in route order.
    pub fn finish(&mut self) -> Result<()> {
        if self.state != TranscodeState::Done {
            return Err(TranscodeError::configuration(format!(
                "cannot finish a transcode in state {:?}",
                self.state
            )));
        }
        for container in self.map.output_containers() {
            if let Some(context) = self.outputs.get_mut(container) {
                context.finish()?;
            }
        }
        Ok(())
    }

    /// Prepare, write headers, process the whole input and write trailers.
    pub fn run(&mut self) -> Result<TranscodeSummary> {
        self.prepare()?;
        self.write_headers()?;
        while self.step()? != TranscodeState::Done {}
        self.finish()?;

        let s = &self.summary;
        log::info!(
            "{}: {} packets read ({} discarded), {} written, {} audio / {} video frames encoded",
            self.input.url(),
            s.packets_read,
            s.packets_discarded,
            s.packets_written,
            s.audio_frames_encoded,
            s.video_frames_encoded
        );
        Ok(self.summary)
    }

    fn process_next_packet(&mut self) -> Result<()> {
        self.packet.clean();
        if self.input.read_packet(&mut self.packet)? == ReadStatus::EndOfStream {
            log::info!(
                "{}: end of input after {} packets",
                self.input.url(),
                self.summary.packets_read
            );
            self.state = TranscodeState::EofPending;
            return Ok(());
        }
        self.summary.packets_read += 1;

        self.packet.offset(self.offset);
        let index = self.packet.index();
        if self.packet.pts().is_none() {
            return Err(TranscodeError::MissingTimestamp {
                stream_index: index,
            });
        }

        let Self {
            input,
            outputs,
            map,
            scalers,
            summary,
            packet,
            samples,
            frame,
            buffers,
            ..
        } = self;

        let routes = map.outputs_for(index);
        if routes.is_empty() {
            summary.packets_discarded += 1;
            log::trace!("discard packet of unmapped stream {index}");
            return Ok(());
        }
        log::trace!(
            "stream {index}: {} bytes pts {:?} dts {:?} -> {} outputs",
            packet.size(),
            packet.pts(),
            packet.dts(),
            routes.len()
        );

        for output in routes {
            let stream = outputs
                .stream(*output)
                .ok_or_else(|| TranscodeError::configuration(format!("route to missing output {output}")))?;
            if let OutputCodec::Unsupported(media_type) = stream.codec() {
                return Err(TranscodeError::unsupported(format!(
                    "cannot transcode {media_type} stream {index} into {output}"
                )));
            }
        }

        let stream = input
            .stream_mut(index)
            .ok_or_else(|| TranscodeError::configuration(format!("route from missing input stream {index}")))?;
        let mut sink = Sink {
            routes,
            outputs,
            buffers,
            summary,
        };
        match stream.media_type() {
            MediaType::Audio => output_audio(stream, Some(&*packet), samples, &mut sink),
            MediaType::Video => output_video(stream, Some(&*packet), frame, scalers, &mut sink),
            other => Err(TranscodeError::unsupported(format!(
                "cannot decode {other} stream {index}"
            ))),
        }
    }

    /// Flush decoders into their outputs, encode whole FIFO frames, then
    /// flush encoders.
    fn drain(&mut self) -> Result<()> {
        let Self {
            input,
            outputs,
            map,
            scalers,
            summary,
            samples,
            frame,
            buffers,
            options,
            ..
        } = self;

        for index in map.input_indices() {
            let Some(stream) = input.stream_mut(index) else {
                continue;
            };
            let routes = map.outputs_for(index);
            let mut sink = Sink {
                routes,
                outputs: &mut *outputs,
                buffers: &mut *buffers,
                summary: &mut *summary,
            };
            match stream.media_type() {
                MediaType::Audio => output_audio(stream, None, samples, &mut sink)?,
                MediaType::Video => output_video(stream, None, frame, scalers, &mut sink)?,
                _ => {}
            }
        }

        for (_, output) in map.routes() {
            let Some(context) = outputs.get_mut(output.container) else {
                continue;
            };
            let Some((stream, mut writer)) = context.stream_writer(output.stream) else {
                continue;
            };
            let (index, time_base, sync_pts) = (stream.index, stream.time_base, stream.sync_pts);
            match &mut stream.codec {
                OutputCodec::Audio(audio) => {
                    let remainder = audio.fifo.as_ref().map_or(0, |fifo| fifo.size());
                    if remainder > 0 {
                        if options.pad_final_audio_frame {
                            pad_audio_fifo(audio)?;
                            stream.sync_pts = flush_audio_fifo(
                                audio,
                                (index, time_base, sync_pts),
                                &mut writer,
                                buffers,
                                summary,
                            )?;
                            log::debug!("output {output}: padded final {remainder} audio bytes");
                        } else {
                            if let Some(fifo) = audio.fifo.as_mut() {
                                fifo.clear();
                            }
                            summary.audio_bytes_dropped += remainder as u64;
                            log::warn!("output {output}: dropped {remainder} trailing audio bytes");
                        }
                    }
                    let time_base_enc = audio.encoder.parameters().time_base;
                    let frame_size = audio.encoder.parameters().frame_size as i64;
                    loop {
                        buffers.encoded.clear();
                        let size = audio
                            .encoder
                            .drain(&mut buffers.encoded)
                            .map_err(TranscodeError::at("drain audio encoder"))?;
                        if size == 0 {
                            break;
                        }
                        let coded = audio.encoder.coded_frame();
                        let stamp = Stamp {
                            index,
                            time_base,
                            encoder_time_base: time_base_enc,
                            sync_pts: stream.sync_pts,
                        };
                        write_encoded(stamp, coded, true, size, &mut writer, buffers, summary)?;
                        stream.sync_pts += frame_size;
                    }
                }
                OutputCodec::Video(video) => {
                    let time_base_enc = video.encoder.parameters().time_base;
                    loop {
                        buffers.encoded.clear();
                        let size = video
                            .encoder
                            .drain(&mut buffers.encoded)
                            .map_err(TranscodeError::at("drain video encoder"))?;
                        if size == 0 {
                            break;
                        }
                        let coded = video.encoder.coded_frame();
                        let key = coded.is_some_and(|c| c.key_frame);
                        let stamp = Stamp {
                            index,
                            time_base,
                            encoder_time_base: time_base_enc,
                            sync_pts: stream.sync_pts,
                        };
                        write_encoded(stamp, coded, key, size, &mut writer, buffers, summary)?;
                        stream.sync_pts += 1;
                    }
                }
                OutputCodec::Unsupported(_) => {}
            }
        }
        log::info!("{}: drained", input.url());
        Ok(())
    }

    /// Drop buffered audio when stopping without a drain.
    fn discard_buffered(&mut self) -> usize {
        let mut dropped = 0;
        for (_, output) in self.map.routes() {
            if let Some(stream) = self.outputs.stream_mut(output) {
                if let OutputCodec::Audio(AudioOutput {
                    fifo: Some(fifo), ..
                }) = &mut stream.codec
                {
                    dropped += fifo.clear();
                }
            }
        }
        self.summary.audio_bytes_dropped += dropped as u64;
        dropped
    }
}

/// Where decoded data of one input stream goes.
struct Sink<'a> {
    routes: &'a [OutputStreamRef],
    outputs: &'a mut OutputSet,
    buffers: &'a mut EncodeBuffers,
    summary: &'a mut TranscodeSummary,
}

/// Output stream fields needed to timestamp an encoded packet.
#[derive(Clone, Copy)]
struct Stamp {
    index: usize,
    time_base: Rational,
    encoder_time_base: Rational,
    sync_pts: i64,
}

/// Set `pts`/`next_pts` from the packet before decoding.
fn sync_decode_position(stream: &mut InputStream, packet: Option<&Packet>) {
    if stream.next_pts.is_none() {
        stream.next_pts = Some(stream.pts);
    }
    if let Some(dts) = packet.and_then(Packet::dts) {
        if let Some(pts) = rescale_q(dts, stream.time_base(), TIME_BASE_Q) {
            stream.pts = pts;
            stream.next_pts = Some(pts);
        }
    }
}

/// Decode one audio packet (or flush the decoder when `packet` is `None`)
/// and feed the samples to every routed output.
fn output_audio(
    stream: &mut InputStream,
    packet: Option<&Packet>,
    samples: &mut Vec<u8>,
    sink: &mut Sink<'_>,
) -> Result<()> {
    let index = stream.index();
    sync_decode_position(stream, packet);

    let Some(DecoderHandle::Audio(decoder)) = stream.decoder.as_mut() else {
        return Err(TranscodeError::configuration(format!(
            "input stream {index} has no open audio decoder"
        )));
    };
    let (bytes_per_sample, channels, sample_rate) = {
        let params = decoder.parameters();
        (
            params.bytes_per_sample as i64,
            params.channels as i64,
            params.sample_rate as i64,
        )
    };

    let data = packet.map(Packet::data).unwrap_or(&[]);
    let wanted = (data.len() * bytes_per_sample.max(1) as usize).max(MAX_AUDIO_FRAME_SIZE);
    if wanted > samples.len() {
        samples
            .try_reserve_exact(wanted - samples.len())
            .map_err(|e| TranscodeError::allocation(format!("audio scratch: {e}")))?;
        samples.resize(wanted, 0);
    }

    let mut offset = 0;
    loop {
        let remaining = &data[offset..];
        if packet.is_some() && remaining.is_empty() {
            break;
        }
        if let Some(next_pts) = stream.next_pts {
            stream.pts = next_pts;
        }

        let decoded = decoder
            .decode(samples, remaining)
            .map_err(TranscodeError::at("decode audio"))?;
        if decoded.consumed > remaining.len() || decoded.sample_bytes > samples.len() {
            return Err(TranscodeError::backend(
                "decode audio",
                anyhow::anyhow!(
                    "decoder reported {} bytes consumed and {} produced for {} in, {} out",
                    decoded.consumed,
                    decoded.sample_bytes,
                    remaining.len(),
                    samples.len()
                ),
            ));
        }
        offset += decoded.consumed;

        if decoded.sample_bytes == 0 {
            if packet.is_none() {
                break;
            }
            if decoded.consumed == 0 {
                return Err(TranscodeError::backend(
                    "decode audio",
                    anyhow::anyhow!("decoder made no progress on stream {index}"),
                ));
            }
            continue;
        }

        if bytes_per_sample > 0 && channels > 0 && sample_rate > 0 {
            let advance =
                TIME_BASE / bytes_per_sample * decoded.sample_bytes as i64 / (channels * sample_rate);
            stream.next_pts = Some(stream.pts + advance);
        }

        let decoded_samples = &samples[..decoded.sample_bytes];
        for output in sink.routes {
            let context = sink
                .outputs
                .get_mut(output.container)
                .ok_or_else(|| TranscodeError::configuration(format!("route to missing output {output}")))?;
            let (out, mut writer) = context
                .stream_writer(output.stream)
                .ok_or_else(|| TranscodeError::configuration(format!("route to missing output {output}")))?;
            let target = (out.index, out.time_base, out.sync_pts);
            let OutputCodec::Audio(audio) = &mut out.codec else {
                return Err(TranscodeError::unsupported(format!(
                    "audio stream {index} routed to {} output {output}",
                    out.codec.media_type()
                )));
            };
            let fifo = audio.fifo.as_mut().ok_or_else(|| {
                TranscodeError::configuration(format!("output {output} was not prepared"))
            })?;
            fifo.reserve(decoded_samples.len())?;
            fifo.write(decoded_samples);
            out.sync_pts = flush_audio_fifo(audio, target, &mut writer, sink.buffers, sink.summary)?;
        }
    }
    Ok(())
}

/// Encode every whole frame buffered in the FIFO. Returns the advanced
/// `sync_pts`.
fn flush_audio_fifo(
    audio: &mut AudioOutput,
    (index, time_base, mut sync_pts): (usize, Rational, i64),
    writer: &mut PacketWriter<'_>,
    buffers: &mut EncodeBuffers,
    summary: &mut TranscodeSummary,
) -> Result<i64> {
    let params = audio.encoder.parameters();
    let frame_bytes = params.audio_frame_bytes();
    let frame_size = params.frame_size as i64;
    let encoder_time_base = params.time_base;
    if frame_bytes == 0 {
        return Err(TranscodeError::unsupported(format!(
            "{}: zero-byte audio frames",
            params.codec_name
        )));
    }
    let Some(fifo) = audio.fifo.as_mut() else {
        return Ok(sync_pts);
    };

    while let Some(frame) = fifo.read(frame_bytes) {
        buffers.encoded.clear();
        let size = audio
            .encoder
            .encode(&frame, sync_pts, &mut buffers.encoded)
            .map_err(TranscodeError::at("encode audio"))?;
        summary.audio_frames_encoded += 1;
        let stamp = Stamp {
            index,
            time_base,
            encoder_time_base,
            sync_pts,
        };
        write_encoded(stamp, audio.encoder.coded_frame(), true, size, writer, buffers, summary)?;
        sync_pts += frame_size;
    }
    Ok(sync_pts)
}

/// Top the FIFO up with silence to a whole encoder frame.
fn pad_audio_fifo(audio: &mut AudioOutput) -> Result<()> {
    let frame_bytes = audio.encoder.parameters().audio_frame_bytes();
    let Some(fifo) = audio.fifo.as_mut() else {
        return Ok(());
    };
    if frame_bytes == 0 || fifo.size() % frame_bytes == 0 {
        return Ok(());
    }
    let missing = frame_bytes - fifo.size() % frame_bytes;
    fifo.reserve(missing)?;
    fifo.write(&vec![0; missing]);
    Ok(())
}

/// Decode at most one picture from the packet (or keep flushing the decoder
/// while it yields pictures) and encode it into every routed output.
fn output_video(
    stream: &mut InputStream,
    packet: Option<&Packet>,
    frame: &mut VideoFrame,
    scalers: &mut ScalerCache,
    sink: &mut Sink<'_>,
) -> Result<()> {
    let index = stream.index();
    sync_decode_position(stream, packet);

    let Some(DecoderHandle::Video(decoder)) = stream.decoder.as_mut() else {
        return Err(TranscodeError::configuration(format!(
            "input stream {index} has no open video decoder"
        )));
    };
    let decoder_time_base = decoder.parameters().time_base;
    let data = packet.map(Packet::data).unwrap_or(&[]);

    loop {
        if let Some(next_pts) = stream.next_pts {
            stream.pts = next_pts;
        }
        frame.defaults();
        let decoded = decoder
            .decode(frame, data)
            .map_err(TranscodeError::at("decode video"))?;
        // every decode call moves the position, picture or not
        if decoder_time_base.num != 0 {
            if let Some(duration) = rescale_q(1, decoder_time_base, TIME_BASE_Q) {
                stream.next_pts = Some(stream.pts + duration);
            }
        }
        if !decoded.got_picture {
            break;
        }

        for output in sink.routes {
            encode_video_frame(index, *output, frame, scalers, sink)?;
        }

        // one picture per packet; a flush continues until the decoder is dry
        if packet.is_some() {
            break;
        }
    }
    Ok(())
}

fn encode_video_frame(
    index: usize,
    output: OutputStreamRef,
    frame: &mut VideoFrame,
    scalers: &mut ScalerCache,
    sink: &mut Sink<'_>,
) -> Result<()> {
    let context = sink
        .outputs
        .get_mut(output.container)
        .ok_or_else(|| TranscodeError::configuration(format!("route to missing output {output}")))?;
    let (out, mut writer) = context
        .stream_writer(output.stream)
        .ok_or_else(|| TranscodeError::configuration(format!("route to missing output {output}")))?;
    let OutputCodec::Video(video) = &mut out.codec else {
        return Err(TranscodeError::unsupported(format!(
            "video stream {index} routed to {} output {output}",
            out.codec.media_type()
        )));
    };

    let params = video.encoder.parameters();
    let encoder_time_base = params.time_base;
    let dst = FrameGeometry {
        width: params.width,
        height: params.height,
        format: params.pixel_format.or(frame.format),
    };
    frame.pts = Some(out.sync_pts);
    let scaler = scalers.acquire(index, output, frame.geometry(), dst)?;
    let scaled = scaler.scale(frame)?;

    sink.buffers.encoded.clear();
    let size = video
        .encoder
        .encode(scaled, &mut sink.buffers.encoded)
        .map_err(TranscodeError::at("encode video"))?;
    sink.summary.video_frames_encoded += 1;

    let coded = video.encoder.coded_frame();
    let key = coded.is_some_and(|c| c.key_frame);
    let stamp = Stamp {
        index: out.index,
        time_base: out.time_base,
        encoder_time_base,
        sync_pts: out.sync_pts,
    };
    write_encoded(stamp, coded, key, size, &mut writer, sink.buffers, sink.summary)?;

    // pacing follows decoded pictures, not emitted packets
    out.sync_pts += 1;
    Ok(())
}

/// Wrap `size` encoded bytes in a packet and write it. Empty output (an
/// encoder still buffering) writes nothing.
fn write_encoded(
    stamp: Stamp,
    coded: Option<CodedFrame>,
    key: bool,
    size: usize,
    writer: &mut PacketWriter<'_>,
    buffers: &mut EncodeBuffers,
    summary: &mut TranscodeSummary,
) -> Result<()> {
    if size == 0 {
        return Ok(());
    }
    let payload = buffers.encoded.get(..size).ok_or_else(|| {
        TranscodeError::backend(
            "encode",
            anyhow::anyhow!("encoder reported {size} bytes but wrote {}", buffers.encoded.len()),
        )
    })?;

    let pts = coded
        .and_then(|c| rescale_ts(c.pts, stamp.encoder_time_base, stamp.time_base))
        .or_else(|| rescale_q(stamp.sync_pts, stamp.encoder_time_base, stamp.time_base));
    let dts = coded.and_then(|c| rescale_ts(c.dts, stamp.encoder_time_base, stamp.time_base));

    let packet = &mut buffers.packet;
    packet
        .clean()
        .set_index(stamp.index)
        .set_data(payload)
        .set_pts(pts)
        .set_dts(dts)
        .set_key(key);
    writer.write(packet, stamp.time_base)?;
    summary.packets_written += 1;
    Ok(())
}

#[cfg(test)]
#[path = "transcode_test.rs"]
mod transcode_test;
