//! Timestamp-preserving video re-encode with verbatim stream copy.
//!
//! [`Muxer`] owns the output container. It encodes each [`OutputFrame`] with
//! the encoder time base set to the input video stream's time base, so the
//! frame's `pts`/`duration` go into the encoder unchanged; encoded packets are
//! then rescaled (a linear rational rescale) into whatever time base the
//! output container picked.
//!
//! Every track of the [`StreamSet`] is copied packet by packet from the input
//! without decoding, together with its metadata tags and disposition.
//! Copied packets are merged with the encoded video in timestamp order, so
//! neither side is buffered for long. Attachments are only kept for
//! Matroska outputs, and data tracks only when the output format accepts
//! their codec; anything else is dropped with a warning.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::io::Error as IoError;
use std::path::{Path, PathBuf};

use ffmpeg_next::codec::{self, Id};
use ffmpeg_next::format::context::{Input, Output};
use ffmpeg_next::format::{Flags as FormatFlags, Pixel};
use ffmpeg_next::frame::Video as VideoFrame;
use ffmpeg_next::media::Type;
use ffmpeg_next::software::scaling::{Context as ScalingContext, Flags as ScalingFlags};
use ffmpeg_next::{Error as FfmpegError, Packet, Rational};
use image::RgbImage;
use image::imageops::{self, FilterType};

use crate::encode::EncoderOptions;
use crate::error::ReframeError;
use crate::frame::{OutputFrame, StreamSet, VideoStreamInfo};
use crate::timing::compare_timestamps;

/// What a finished [`Muxer`] wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MuxSummary {
    /// Video frames sent to the encoder.
    pub frames_written: u64,
    /// Tracks copied without re-encoding.
    pub passthrough_streams: usize,
    /// Packets copied from pass-through streams.
    pub passthrough_packets: u64,
    /// Name of the encoder used.
    pub encoder: String,
    /// Encoded width.
    pub width: u32,
    /// Encoded height.
    pub height: u32,
}

/// Reads pass-through packets from a second handle on the input and
/// releases them up to a given timestamp.
struct Passthrough {
    input: Input,
    /// Input stream index → output stream index.
    stream_map: Vec<Option<usize>>,
    input_time_bases: Vec<Rational>,
    /// Packet read ahead of the current limit.
    pending: Option<Packet>,
    exhausted: bool,
    copied: u64,
}

impl Passthrough {
    /// Write every pass-through packet whose decode time is at or before
    /// `limit` (a timestamp and its time base); all remaining packets when
    /// `limit` is `None`.
    fn copy_until(
        &mut self,
        output: &mut Output,
        limit: Option<(i64, Rational)>,
    ) -> Result<(), ReframeError> {
        loop {
            let packet = match self.pending.take() {
                Some(packet) => packet,
                None => match self.read()? {
                    Some(packet) => packet,
                    None => return Ok(()),
                },
            };

            let input_index = packet.stream();
            let input_time_base = self.input_time_bases[input_index];
            if let (Some((limit_ts, limit_base)), Some(ts)) =
                (limit, packet.dts().or_else(|| packet.pts()))
                && compare_timestamps(ts, input_time_base, limit_ts, limit_base)
                    == Ordering::Greater
            {
                self.pending = Some(packet);
                return Ok(());
            }

            self.write(output, packet)?;
        }
    }

    /// Next packet belonging to a mapped stream.
    fn read(&mut self) -> Result<Option<Packet>, ReframeError> {
        if self.exhausted {
            return Ok(None);
        }
        loop {
            let mut packet = Packet::empty();
            match packet.read(&mut self.input) {
                Ok(()) => {
                    if self.stream_map.get(packet.stream()).copied().flatten().is_some() {
                        return Ok(Some(packet));
                    }
                }
                Err(FfmpegError::Eof) => {
                    self.exhausted = true;
                    return Ok(None);
                }
                Err(error) => {
                    return Err(ReframeError::Ffmpeg(format!(
                        "stream copy read failed: {error}"
                    )));
                }
            }
        }
    }

    fn write(&mut self, output: &mut Output, mut packet: Packet) -> Result<(), ReframeError> {
        let input_index = packet.stream();
        let Some(output_index) = self.stream_map.get(input_index).copied().flatten() else {
            return Ok(());
        };
        let output_time_base = output
            .stream(output_index)
            .map(|stream| stream.time_base())
            .ok_or_else(|| ReframeError::Ffmpeg(format!("missing output stream {output_index}")))?;

        packet.set_stream(output_index);
        packet.rescale_ts(self.input_time_bases[input_index], output_time_base);
        packet.set_position(-1);
        packet.write_interleaved(output).map_err(|error| {
            IoError::other(format!("writing copied packet for stream {input_index} failed: {error}"))
        })?;
        self.copied += 1;
        Ok(())
    }
}

/// Encodes output frames and muxes them with the copied tracks.
pub struct Muxer {
    output_path: PathBuf,
    output: Output,
    encoder: ffmpeg_next::encoder::Video,
    encoder_name: String,
    scaler: ScalingContext,
    video_index: usize,
    encoder_time_base: Rational,
    width: u32,
    height: u32,
    passthrough: Option<Passthrough>,
    frames_written: u64,
    last_index: u64,
    /// Duration of every frame still inside the encoder, keyed by pts.
    durations: BTreeMap<i64, i64>,
    /// Reused RGB staging frame.
    source_frame: VideoFrame,
}

impl Muxer {
    /// Create the output container at `path` and write its header.
    ///
    /// The video track is encoded at `width`×`height`; frames of any other
    /// size are resized to match. Streams of `streams` are copied from
    /// `streams.input_path`, keeping their input order around the video
    /// track.
    ///
    /// # Errors
    ///
    /// - [`ReframeError::Encode`] if the encoder is unavailable or refuses
    ///   the configuration.
    /// - [`ReframeError::Demux`] if the input cannot be reopened for stream
    ///   copy.
    /// - [`ReframeError::Io`] if the output cannot be created.
    pub fn create<P: AsRef<Path>>(
        path: P,
        video: &VideoStreamInfo,
        streams: &StreamSet,
        width: u32,
        height: u32,
        options: &EncoderOptions,
    ) -> Result<Self, ReframeError> {
        let output_path = path.as_ref().to_path_buf();
        log::debug!(
            "Creating output {} ({}x{}, {} pass-through stream(s))",
            output_path.display(),
            width,
            height,
            streams.len()
        );

        let encode_error = |reason: String| ReframeError::Encode { index: 0, reason };

        let codec = options.find_encoder()?;
        let encoder_name = codec.name().to_string();
        let target_pixel = options.output_pixel()?;

        let mut output = ffmpeg_next::format::output(&output_path).map_err(|error| {
            IoError::other(format!("cannot create {}: {error}", output_path.display()))
        })?;
        let needs_global_header = output.format().flags().contains(FormatFlags::GLOBAL_HEADER);

        let mut passthrough = if streams.is_empty() {
            None
        } else {
            let input = ffmpeg_next::format::input(&streams.input_path).map_err(|error| {
                ReframeError::Demux {
                    path: streams.input_path.clone(),
                    reason: format!("cannot reopen for stream copy: {error}"),
                }
            })?;
            let input_time_bases = input.streams().map(|stream| stream.time_base()).collect();
            let stream_count = input.streams().count();
            Some(Passthrough {
                input,
                stream_map: vec![None; stream_count],
                input_time_bases,
                pending: None,
                exhausted: false,
                copied: 0,
            })
        };

        // Output streams follow input order, with the encoded track in the
        // original video stream's slot.
        let mut order: Vec<usize> = streams.streams.iter().map(|s| s.stream_index).collect();
        order.push(video.stream_index);
        order.sort_unstable();

        let mut video_index = None;
        for input_index in order {
            if input_index == video.stream_index {
                let mut stream = output.add_stream(codec).map_err(|error| {
                    encode_error(format!("cannot add video stream: {error}"))
                })?;
                stream.set_time_base(video.time_base);
                if video.frame_rate.numerator() > 0 {
                    stream.set_avg_frame_rate(video.frame_rate);
                }
                video_index = Some(stream.index());
                continue;
            }

            let Some(passthrough) = passthrough.as_mut() else {
                continue;
            };
            let Some(in_stream) = passthrough.input.stream(input_index) else {
                return Err(ReframeError::Demux {
                    path: streams.input_path.clone(),
                    reason: format!("stream {input_index} disappeared"),
                });
            };
            let parameters = in_stream.parameters();
            let metadata = in_stream.metadata().to_owned();
            let disposition = in_stream.disposition().bits();

            if let Some(reason) = unsupported_copy(&output, parameters.medium(), parameters.id()) {
                log::warn!("Dropping stream {input_index} ({:?}): {reason}", parameters.id());
                continue;
            }

            let mut out_stream = output.add_stream(ffmpeg_next::encoder::find(Id::None))?;
            out_stream.set_parameters(parameters);
            out_stream.set_metadata(metadata);
            // SAFETY: plain integer fields of a stream owned by `output`.
            unsafe {
                // Let the output muxer choose its own codec tag.
                (*out_stream.parameters().as_mut_ptr()).codec_tag = 0;
                (*out_stream.as_mut_ptr()).disposition = disposition;
            }
            passthrough.stream_map[input_index] = Some(out_stream.index());
        }
        let video_index =
            video_index.ok_or_else(|| encode_error("video stream was not added".to_string()))?;

        let mut encoder = codec::Context::new_with_codec(codec)
            .encoder()
            .video()
            .map_err(|error| encode_error(format!("cannot create video encoder: {error}")))?;
        encoder.set_width(width);
        encoder.set_height(height);
        encoder.set_format(target_pixel);
        encoder.set_time_base(video.time_base);
        if video.frame_rate.numerator() > 0 {
            encoder.set_frame_rate(Some(video.frame_rate));
        }
        if let Some(bitrate) = options.bitrate {
            encoder.set_bit_rate(bitrate);
        }
        if needs_global_header {
            unsafe {
                (*encoder.as_mut_ptr()).flags |=
                    ffmpeg_sys_next::AV_CODEC_FLAG_GLOBAL_HEADER as i32;
            }
        }

        let encoder = encoder
            .open_as_with(codec, options.dictionary())
            .map_err(|error| encode_error(format!("cannot open encoder {encoder_name}: {error}")))?;

        output
            .stream_mut(video_index)
            .ok_or_else(|| encode_error("video stream missing after setup".to_string()))?
            .set_parameters(&encoder);

        output.write_header().map_err(|error| {
            IoError::other(format!("cannot write header to {}: {error}", output_path.display()))
        })?;

        let scaler = ScalingContext::get(
            Pixel::RGB24,
            width,
            height,
            target_pixel,
            width,
            height,
            ScalingFlags::BILINEAR,
        )
        .map_err(|error| encode_error(format!("cannot create colour converter: {error}")))?;

        log::info!(
            "Encoding {}x{} with {} ({:?}), time base {}/{}",
            width,
            height,
            encoder_name,
            target_pixel,
            video.time_base.numerator(),
            video.time_base.denominator(),
        );

        Ok(Self {
            output_path,
            output,
            encoder,
            encoder_name,
            scaler,
            video_index,
            encoder_time_base: video.time_base,
            width,
            height,
            passthrough,
            frames_written: 0,
            last_index: 0,
            durations: BTreeMap::new(),
            source_frame: VideoFrame::new(Pixel::RGB24, width, height),
        })
    }

    /// Encoded dimensions.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Path being written.
    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// Encode one frame and write whatever packets the encoder releases.
    ///
    /// # Errors
    ///
    /// [`ReframeError::Encode`] on codec failure; [`ReframeError::Io`] if a
    /// packet cannot be written.
    pub fn write_frame(&mut self, frame: &OutputFrame) -> Result<(), ReframeError> {
        let encode_error = |reason: String| ReframeError::Encode {
            index: frame.index,
            reason,
        };

        if frame.pixels.width() == self.width && frame.pixels.height() == self.height {
            fill_rgb_frame(&mut self.source_frame, &frame.pixels);
        } else {
            log::warn!(
                "Frame {} is {}x{}, resizing to {}x{}",
                frame.index,
                frame.pixels.width(),
                frame.pixels.height(),
                self.width,
                self.height
            );
            let resized =
                imageops::resize(&*frame.pixels, self.width, self.height, FilterType::Lanczos3);
            fill_rgb_frame(&mut self.source_frame, &resized);
        }

        let mut encoder_frame = VideoFrame::empty();
        self.scaler
            .run(&self.source_frame, &mut encoder_frame)
            .map_err(|error| encode_error(format!("colour conversion failed: {error}")))?;

        encoder_frame.set_pts(Some(frame.pts));
        // SAFETY: plain integer field of a frame we own.
        unsafe {
            (*encoder_frame.as_mut_ptr()).duration = frame.duration;
        }

        self.encoder
            .send_frame(&encoder_frame)
            .map_err(|error| encode_error(format!("send_frame failed: {error}")))?;
        self.durations.insert(frame.pts, frame.duration);
        self.last_index = frame.index;
        self.frames_written += 1;

        self.drain_encoder()
    }

    /// Flush the encoder, copy the remaining pass-through packets, and write
    /// the trailer.
    ///
    /// # Errors
    ///
    /// Same as [`write_frame`](Muxer::write_frame).
    pub fn finish(mut self) -> Result<MuxSummary, ReframeError> {
        self.encoder.send_eof().map_err(|error| ReframeError::Encode {
            index: self.last_index,
            reason: format!("send_eof failed: {error}"),
        })?;
        self.drain_encoder()?;

        if let Some(passthrough) = self.passthrough.as_mut() {
            passthrough.copy_until(&mut self.output, None)?;
        }

        self.output.write_trailer().map_err(|error| {
            IoError::other(format!(
                "cannot write trailer to {}: {error}",
                self.output_path.display()
            ))
        })?;

        let passthrough_packets = self.passthrough.as_ref().map_or(0, |p| p.copied);
        let passthrough_streams = self.passthrough.as_ref().map_or(0, |p| {
            p.stream_map.iter().filter(|index| index.is_some()).count()
        });
        log::debug!(
            "Wrote {} video frame(s) and {} copied packet(s) to {}",
            self.frames_written,
            passthrough_packets,
            self.output_path.display()
        );

        Ok(MuxSummary {
            frames_written: self.frames_written,
            passthrough_streams,
            passthrough_packets,
            encoder: self.encoder_name,
            width: self.width,
            height: self.height,
        })
    }

    fn drain_encoder(&mut self) -> Result<(), ReframeError> {
        let output_time_base = self
            .output
            .stream(self.video_index)
            .map(|stream| stream.time_base())
            .ok_or_else(|| ReframeError::Ffmpeg("video output stream missing".to_string()))?;

        let mut packet = Packet::empty();
        while self.encoder.receive_packet(&mut packet).is_ok() {
            packet.set_stream(self.video_index);
            // Delayed encoders leave the duration unset; restore the frame's.
            if let Some(pts) = packet.pts()
                && let Some(duration) = self.durations.remove(&pts)
                && packet.duration() <= 0
            {
                packet.set_duration(duration);
            }
            packet.rescale_ts(self.encoder_time_base, output_time_base);

            if let Some(passthrough) = self.passthrough.as_mut() {
                let limit = packet.dts().or_else(|| packet.pts());
                passthrough.copy_until(
                    &mut self.output,
                    Some((limit.unwrap_or(i64::MAX), output_time_base)),
                )?;
            }

            packet.write_interleaved(&mut self.output).map_err(|error| {
                IoError::other(format!(
                    "writing video packet to {} failed: {error}",
                    self.output_path.display()
                ))
            })?;
        }
        Ok(())
    }
}

/// Why a stream of `medium`/`id` cannot be copied into `output`, if it
/// cannot.
fn unsupported_copy(output: &Output, medium: Type, id: Id) -> Option<&'static str> {
    match medium {
        Type::Attachment if output.format().name() != "matroska" => {
            Some("attachments are only kept in Matroska outputs")
        }
        Type::Data => {
            // SAFETY: `output.format()` wraps the muxer description owned by
            // the open output context.
            let accepted = unsafe {
                ffmpeg_sys_next::avformat_query_codec(
                    output.format().as_ptr(),
                    id.into(),
                    codec::Compliance::Normal.into(),
                )
            };
            (accepted == 0).then_some("the output format does not accept this data codec")
        }
        _ => None,
    }
}

/// Copy tightly packed RGB rows into an FFmpeg frame, honouring its stride.
fn fill_rgb_frame(frame: &mut VideoFrame, image: &RgbImage) {
    let row_len = image.width() as usize * 3;
    let stride = frame.stride(0);
    let source = image.as_raw();
    let destination = frame.data_mut(0);
    for (row, chunk) in source.chunks_exact(row_len).enumerate() {
        let start = row * stride;
        destination[start..start + row_len].copy_from_slice(chunk);
    }
}
