//! Presentation-order frame timing extraction.
//!
//! [`TimestampExtractor`] opens the original container, picks the best video
//! stream, and lazily yields one [`Frame`] per decodable frame. It decodes
//! (rather than only demuxing) so that streams with B-frames report their
//! frames in presentation order.
//!
//! # Duration convention
//!
//! A frame's duration is the gap to the next frame's timestamp. The final
//! frame has no successor, so its duration is, in order of preference:
//!
//! 1. the frame duration the container/decoder declares, when positive;
//! 2. the previous frame interval;
//! 3. one period of the stream's average frame rate (single-frame streams);
//! 4. zero.
//!
//! # Example
//!
//! ```no_run
//! use reframe::{ReframeError, TimestampExtractor};
//!
//! let extractor = TimestampExtractor::open("input.mkv")?;
//! for frame in extractor {
//!     let frame = frame?;
//!     println!("#{} pts={} duration={}", frame.index, frame.pts, frame.duration);
//! }
//! # Ok::<(), ReframeError>(())
//! ```

use std::path::{Path, PathBuf};

use ffmpeg_next::{
    Error as FfmpegError, Packet, codec::context::Context as CodecContext,
    decoder::Video as VideoDecoder, format::context::Input, frame::Video as VideoFrame,
    media::Type,
};

use crate::error::ReframeError;
use crate::frame::{Frame, PassthroughStream, StreamSet, VideoStreamInfo};
use crate::timing::frame_period_ticks;

/// A decoded timestamp that passed the monotonicity check.
#[derive(Debug, Clone, Copy)]
struct Stamp {
    pts: i64,
    declared_duration: i64,
}

/// Lazy, non-restartable sequence of [`Frame`] timing records.
pub struct TimestampExtractor {
    input_path: PathBuf,
    input_context: Input,
    decoder: VideoDecoder,
    info: VideoStreamInfo,
    stream_set: StreamSet,
    decoded_frame: VideoFrame,
    /// Timestamp read ahead to compute the previous frame's duration.
    pending: Option<Stamp>,
    previous_pts: Option<i64>,
    last_interval: Option<i64>,
    /// Number of timestamps decoded so far.
    decoded_count: u64,
    /// Index of the next frame to yield.
    next_index: u64,
    eof_sent: bool,
    done: bool,
}

impl TimestampExtractor {
    /// Open `path` and prepare to extract timings from its best video stream.
    ///
    /// # Errors
    ///
    /// Returns [`ReframeError::Demux`] if the container cannot be opened,
    /// has no video stream, or its video decoder cannot be created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ReframeError> {
        let input_path = path.as_ref().to_path_buf();
        log::debug!("Opening input for timestamp extraction: {}", input_path.display());

        let demux_error = |reason: String| ReframeError::Demux {
            path: input_path.clone(),
            reason,
        };

        ffmpeg_next::init()
            .map_err(|error| demux_error(format!("FFmpeg initialisation failed: {error}")))?;

        let input_context = ffmpeg_next::format::input(&input_path)
            .map_err(|error| demux_error(error.to_string()))?;

        let stream = input_context
            .streams()
            .best(Type::Video)
            .ok_or_else(|| demux_error("no video stream found".to_string()))?;
        let stream_index = stream.index();
        let time_base = stream.time_base();
        let frame_rate = stream.avg_frame_rate();
        let declared_frames = u64::try_from(stream.frames()).ok().filter(|&n| n > 0);

        let decoder_context = CodecContext::from_parameters(stream.parameters())
            .map_err(|error| demux_error(format!("cannot read video codec parameters: {error}")))?;
        let decoder = decoder_context
            .decoder()
            .video()
            .map_err(|error| demux_error(format!("cannot create video decoder: {error}")))?;

        let codec = decoder
            .codec()
            .map(|codec| codec.name().to_string())
            .unwrap_or_else(|| "unknown".to_string());

        let info = VideoStreamInfo {
            stream_index,
            time_base,
            frame_rate,
            width: decoder.width(),
            height: decoder.height(),
            codec,
            declared_frames,
        };

        let mut streams = Vec::new();
        for stream in input_context.streams() {
            if stream.index() == stream_index {
                continue;
            }
            let medium = stream.parameters().medium();
            match medium {
                Type::Audio | Type::Subtitle | Type::Data | Type::Attachment => {
                    streams.push(PassthroughStream {
                        stream_index: stream.index(),
                        medium,
                        codec: stream.parameters().id().name().to_string(),
                        time_base: stream.time_base(),
                    });
                }
                Type::Video => log::warn!(
                    "Ignoring additional video stream {} in {}",
                    stream.index(),
                    input_path.display()
                ),
                Type::Unknown => {}
            }
        }

        log::debug!(
            "Video stream {} ({}x{}, {}, time base {}/{}), {} pass-through stream(s)",
            stream_index,
            info.width,
            info.height,
            info.codec,
            time_base.numerator(),
            time_base.denominator(),
            streams.len(),
        );

        Ok(Self {
            stream_set: StreamSet {
                input_path: input_path.clone(),
                streams,
            },
            input_path,
            input_context,
            decoder,
            info,
            decoded_frame: VideoFrame::empty(),
            pending: None,
            previous_pts: None,
            last_interval: None,
            decoded_count: 0,
            next_index: 0,
            eof_sent: false,
            done: false,
        })
    }

    /// The primary video stream being extracted.
    pub fn video_info(&self) -> &VideoStreamInfo {
        &self.info
    }

    /// Non-video tracks of the input.
    pub fn stream_set(&self) -> &StreamSet {
        &self.stream_set
    }

    /// Path of the input container.
    pub fn input_path(&self) -> &Path {
        &self.input_path
    }

    /// Decode forward until the next frame timestamp, checking that it
    /// strictly increases.
    fn next_stamp(&mut self) -> Result<Option<Stamp>, ReframeError> {
        loop {
            if self.decoder.receive_frame(&mut self.decoded_frame).is_ok() {
                let index = self.decoded_count;
                let pts = self
                    .decoded_frame
                    .timestamp()
                    .or_else(|| self.decoded_frame.pts())
                    .ok_or_else(|| ReframeError::Demux {
                        path: self.input_path.clone(),
                        reason: format!("frame {index} has no presentation timestamp"),
                    })?;

                check_monotonic(index, self.previous_pts, pts)?;

                // SAFETY: the frame was just filled by the decoder and
                // `duration` is a plain integer field.
                let declared_duration = unsafe { (*self.decoded_frame.as_ptr()).duration };

                self.previous_pts = Some(pts);
                self.decoded_count += 1;
                return Ok(Some(Stamp {
                    pts,
                    declared_duration: declared_duration.max(0),
                }));
            }

            if self.eof_sent {
                return Ok(None);
            }

            let mut packet = Packet::empty();
            match packet.read(&mut self.input_context) {
                Ok(()) => {
                    if packet.stream() != self.info.stream_index {
                        continue;
                    }
                    match self.decoder.send_packet(&packet) {
                        Ok(()) => {}
                        Err(FfmpegError::InvalidData) => {
                            log::warn!(
                                "Skipping undecodable video packet (pts {:?}) in {}",
                                packet.pts(),
                                self.input_path.display()
                            );
                        }
                        Err(error) => {
                            return Err(ReframeError::Demux {
                                path: self.input_path.clone(),
                                reason: format!("video decode failed: {error}"),
                            });
                        }
                    }
                }
                Err(FfmpegError::Eof) => {
                    self.decoder.send_eof().map_err(|error| ReframeError::Demux {
                        path: self.input_path.clone(),
                        reason: format!("cannot flush video decoder: {error}"),
                    })?;
                    self.eof_sent = true;
                }
                Err(error) => {
                    return Err(ReframeError::Demux {
                        path: self.input_path.clone(),
                        reason: format!("packet read failed: {error}"),
                    });
                }
            }
        }
    }

    fn final_duration(&self, stamp: Stamp) -> i64 {
        if stamp.declared_duration > 0 {
            return stamp.declared_duration;
        }
        if let Some(interval) = self.last_interval {
            return interval;
        }
        frame_period_ticks(self.info.frame_rate, self.info.time_base).unwrap_or(0)
    }

    fn advance(&mut self) -> Result<Option<Frame>, ReframeError> {
        let current = match self.pending.take() {
            Some(stamp) => stamp,
            None => match self.next_stamp()? {
                Some(stamp) => stamp,
                None => return Ok(None),
            },
        };

        let duration = match self.next_stamp()? {
            Some(next) => {
                let interval = next.pts - current.pts;
                self.last_interval = Some(interval);
                self.pending = Some(next);
                interval
            }
            None => self.final_duration(current),
        };

        let frame = Frame {
            index: self.next_index,
            pts: current.pts,
            duration,
            time_base: self.info.time_base,
        };
        self.next_index += 1;
        Ok(Some(frame))
    }
}

impl Iterator for TimestampExtractor {
    type Item = Result<Frame, ReframeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.advance() {
            Ok(Some(frame)) => Some(Ok(frame)),
            Ok(None) => {
                self.done = true;
                log::debug!("Extracted {} frame timestamps", self.next_index);
                None
            }
            Err(error) => {
                self.done = true;
                Some(Err(error))
            }
        }
    }
}

/// A frame's timestamp must be strictly greater than the one before it.
fn check_monotonic(index: u64, previous: Option<i64>, current: i64) -> Result<(), ReframeError> {
    match previous {
        Some(previous) if current <= previous => {
            Err(ReframeError::TimestampMonotonicityViolation {
                index,
                previous,
                current,
            })
        }
        _ => Ok(()),
    }
}
