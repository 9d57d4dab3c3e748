use crate::codec::{CodecParameters, MediaType};
use crate::error::{Result, TranscodeError};
use crate::fifo::AudioFifo;
use crate::format::{InputContext, OutputSet, Pacing};
use crate::rational::rescale_q;
use crate::stream::OutputCodec;
use crate::stream_map::StreamMap;

/// Open every mapped decoder and encoder and settle output parameters before
/// the first packet is read. Any failure aborts the job.
pub fn prepare(input: &mut InputContext, outputs: &mut OutputSet, map: &StreamMap) -> Result<()> {
    input.find_stream_info()?;

    for index in map.input_indices() {
        if input.stream(index).is_none() {
            return Err(TranscodeError::configuration(format!(
                "{}: route from missing input stream {index}",
                input.url()
            )));
        }
        let decoder = input
            .demuxer_mut()
            .open_decoder(index)
            .map_err(TranscodeError::at("open decoder"))?;
        let Some(stream) = input.stream_mut(index) else {
            continue;
        };
        if decoder.media_type() != stream.media_type() {
            return Err(TranscodeError::configuration(format!(
                "input stream {index} is {} but its decoder is {}",
                stream.media_type(),
                decoder.media_type()
            )));
        }
        log::debug!("input stream {index}: {} decoder open", decoder.parameters().codec_name);
        stream.decoder = Some(decoder);
        stream.pts = 0;
        stream.next_pts = None;
    }

    for (index, output) in map.routes() {
        let Some(source) = input.stream(index) else {
            continue;
        };
        let decoder = source
            .decoder
            .as_ref()
            .map(|decoder| decoder.parameters().clone())
            .unwrap_or_else(|| source.parameters().clone());
        let (in_time_base, in_duration, in_type) =
            (source.time_base(), source.duration(), source.media_type());

        let context = outputs.get_mut(output.container).ok_or_else(|| {
            TranscodeError::configuration(format!("route to missing output {output}"))
        })?;
        context.set_pacing(Pacing::transcoding());
        let url = context.url().to_string();
        let stream = context
            .stream_mut(output.stream)
            .ok_or_else(|| TranscodeError::configuration(format!("route to missing output {output}")))?;

        stream.sync_pts = 0;
        if stream.duration == 0 {
            stream.duration = rescale_q(in_duration, in_time_base, stream.time_base).unwrap_or(0);
        }

        let out_type = stream.media_type();
        if matches!(out_type, MediaType::Audio | MediaType::Video) && out_type != in_type {
            return Err(TranscodeError::configuration(format!(
                "{url}: {out_type} output {output} fed from {in_type} input stream {index}"
            )));
        }

        match &mut stream.codec {
            OutputCodec::Audio(audio) => {
                audio.fifo = Some(AudioFifo::new());
                audio
                    .encoder
                    .open()
                    .map_err(TranscodeError::at("open audio encoder"))?;
                let params = audio.encoder.parameters();
                if params.frame_size <= 1 {
                    return Err(TranscodeError::unsupported(format!(
                        "{}: audio encoders without multi-sample frames (frame size {})",
                        params.codec_name, params.frame_size
                    )));
                }
                log::debug!(
                    "{url}: audio output {output} <- {index}, {} frame {} samples, duration {}",
                    params.codec_name,
                    params.frame_size,
                    stream.duration
                );
            }
            OutputCodec::Video(video) => {
                apply_video_defaults(video.encoder.parameters_mut(), &decoder);
                video
                    .encoder
                    .open()
                    .map_err(TranscodeError::at("open video encoder"))?;
                let params = video.encoder.parameters();
                log::debug!(
                    "{url}: video output {output} <- {index}, {} {}x{} {:?}, duration {}",
                    params.codec_name,
                    params.width,
                    params.height,
                    params.pixel_format,
                    stream.duration
                );
            }
            OutputCodec::Unsupported(media_type) => {
                log::warn!("{url}: output {output} is a {media_type} stream and cannot be encoded");
            }
        }
    }

    log::info!(
        "{}: prepared {} routes into {} outputs",
        input.url(),
        map.routes().count(),
        map.output_containers().len()
    );
    Ok(())
}

/// Fill the video encoder settings left unset from the decoder.
fn apply_video_defaults(encoder: &mut CodecParameters, decoder: &CodecParameters) {
    if encoder.width == 0 {
        encoder.width = decoder.width;
        encoder.height = decoder.height;
    }
    if encoder.bit_rate_tolerance == 0 {
        encoder.bit_rate_tolerance = encoder.bit_rate * 20 / 100;
    }
    if encoder.pixel_format.is_none() {
        encoder.pixel_format = decoder.pixel_format;
    }
    if encoder.rc_initial_buffer_occupancy <= 1 {
        encoder.rc_initial_buffer_occupancy = encoder.rc_buffer_size * 3 / 4;
    }
}
