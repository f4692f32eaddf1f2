//! Frame-level data model shared by the pipeline stages.
//!
//! - [`Frame`]: timing record of one presented frame of the original.
//! - [`SubstituteImage`]: one decoded replacement image.
//! - [`OutputFrame`]: replacement pixels stamped with original timing.
//! - [`VideoStreamInfo`] and [`StreamSet`]: what the muxer needs to know
//!   about the input container.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use ffmpeg_next::{Rational, media::Type};
use image::RgbImage;

use crate::timing::{ticks_to_duration, ticks_to_seconds};

/// Timing record of one presented video frame.
///
/// `pts` and `duration` are tick counts in `time_base`, so
/// `pts × time_base` is the exact presentation time in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    /// Zero-based position in presentation order.
    pub index: u64,
    /// Presentation timestamp in ticks.
    pub pts: i64,
    /// Display duration in ticks.
    pub duration: i64,
    /// Time base of `pts` and `duration`.
    pub time_base: Rational,
}

impl Frame {
    /// Presentation time as a [`Duration`]. Lossy.
    pub fn presentation_time(&self) -> Duration {
        ticks_to_duration(self.pts, self.time_base)
    }

    /// Presentation time in seconds. Lossy.
    pub fn pts_seconds(&self) -> f64 {
        ticks_to_seconds(self.pts, self.time_base)
    }
}

/// A decoded replacement image.
#[derive(Debug, Clone)]
pub struct SubstituteImage {
    /// Zero-based frame index this image was requested for.
    pub index: u64,
    /// File the pixels were decoded from.
    pub source_path: PathBuf,
    /// RGB pixels, already scaled. Shared so a reused frame costs no copy.
    pub pixels: Arc<RgbImage>,
}

impl SubstituteImage {
    /// Pixel width.
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    /// Pixel height.
    pub fn height(&self) -> u32 {
        self.pixels.height()
    }
}

/// Substitute pixels carrying the original frame's timing.
#[derive(Debug, Clone)]
pub struct OutputFrame {
    /// Index of the original frame.
    pub index: u64,
    /// Pixels to encode.
    pub pixels: Arc<RgbImage>,
    /// Presentation timestamp, bit-identical to the original frame's.
    pub pts: i64,
    /// Duration, bit-identical to the original frame's.
    pub duration: i64,
    /// Time base of `pts` and `duration`.
    pub time_base: Rational,
    /// Set when the substitute was missing and the pixels of an earlier
    /// frame were reused; holds that frame's index.
    pub reused_from: Option<u64>,
}

/// Description of the primary video stream of the input.
#[derive(Debug, Clone)]
pub struct VideoStreamInfo {
    /// Stream index inside the input container.
    pub stream_index: usize,
    /// Stream time base.
    pub time_base: Rational,
    /// Average frame rate (0/1 when unknown).
    pub frame_rate: Rational,
    /// Coded width.
    pub width: u32,
    /// Coded height.
    pub height: u32,
    /// Decoder name.
    pub codec: String,
    /// Frame count declared by the container, if any.
    pub declared_frames: Option<u64>,
}

/// One non-video track to copy verbatim.
#[derive(Debug, Clone)]
pub struct PassthroughStream {
    /// Stream index inside the input container.
    pub stream_index: usize,
    /// Media type (audio, subtitle, data, attachment).
    pub medium: Type,
    /// Codec name.
    pub codec: String,
    /// Stream time base.
    pub time_base: Rational,
}

/// All non-video tracks of the input, referenced by path and index.
#[derive(Debug, Clone)]
pub struct StreamSet {
    /// Input container the streams live in.
    pub input_path: PathBuf,
    /// Tracks to copy, in input order.
    pub streams: Vec<PassthroughStream>,
}

impl StreamSet {
    /// A set with no tracks to copy.
    pub fn empty(input_path: impl Into<PathBuf>) -> Self {
        Self {
            input_path: input_path.into(),
            streams: Vec::new(),
        }
    }

    /// Whether there is nothing to copy.
    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    /// Number of tracks to copy.
    pub fn len(&self) -> usize {
        self.streams.len()
    }
}
