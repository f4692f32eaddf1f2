//! Error types for the `reframe` crate.
//!
//! [`ReframeError`] is returned by every fallible operation. Variants carry
//! the offending frame index and file path where one exists, so a single
//! diagnostic line is enough to locate the problem.

use std::{io::Error as IoError, path::PathBuf};

use ffmpeg_next::Error as FfmpegError;
use image::ImageError;
use thiserror::Error;

/// The unified error type for all `reframe` operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ReframeError {
    /// An I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// The input container is unreadable, unsupported, or has no usable
    /// video stream.
    #[error("Failed to demux {path}: {reason}")]
    Demux {
        /// Path of the input container.
        path: PathBuf,
        /// Underlying reason.
        reason: String,
    },

    /// No substitute image exists for a frame.
    ///
    /// Only fatal for the first frame; later gaps are bridged by the
    /// synchronizer.
    #[error("Missing substitute frame for frame {index} (expected {path})")]
    MissingSubstituteFrame {
        /// Zero-based index of the original frame.
        index: u64,
        /// The path that was looked up.
        path: PathBuf,
    },

    /// A decoded frame's timestamp did not strictly increase.
    #[error(
        "Timestamp monotonicity violated at frame {index}: pts {current} follows {previous}"
    )]
    TimestampMonotonicityViolation {
        /// Zero-based index of the offending frame.
        index: u64,
        /// Timestamp of the previous frame, in stream time base ticks.
        previous: i64,
        /// Timestamp of the offending frame, in stream time base ticks.
        current: i64,
    },

    /// Frame indices from the extractor skipped or repeated a value.
    #[error("Frame index {found} arrived where {expected} was expected")]
    FrameIndexGap {
        /// Index the synchronizer expected next.
        expected: u64,
        /// Index it received.
        found: u64,
    },

        /// The video encoder failed.
    #[error("Failed to encode frame {index}: {reason}")]
    Encode {
        /// Zero-based index of the frame being encoded, if any.
        index: u64,
        /// Underlying reason.
        reason: String,
    },

    /// A substitute image exists but could not be decoded.
    #[error("Failed to decode substitute image {path}: {source}")]
    Image {
        /// Path of the image file.
        path: PathBuf,
        /// Error reported by the `image` crate.
        #[source]
        source: ImageError,
    },

    /// The replacement path pattern has no usable numeric placeholder.
    #[error("Invalid replacement pattern `{pattern}`: {reason}")]
    InvalidPattern {
        /// The pattern as given.
        pattern: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The scale factor must be a positive integer.
    #[error("Scale factor must be at least 1 (got {0})")]
    InvalidScale(u32),

    /// The output file already exists and overwriting was not requested.
    #[error("Output already exists: {0} (use --overwrite to replace)")]
    OutputExists(PathBuf),

    /// The output path resolves to the input file.
    #[error("Output path {0} is the input file")]
    OutputIsInput(PathBuf),

    /// An error originating from the FFmpeg libraries outside of frame
    /// encoding (output setup, muxing, stream copy).
    #[error("FFmpeg error: {0}")]
    Ffmpeg(String),

    /// The operation was cancelled via a
    /// [`CancellationToken`](crate::CancellationToken).
    #[error("Operation cancelled")]
    Cancelled,
}

impl From<FfmpegError> for ReframeError {
    fn from(error: FfmpegError) -> Self {
        ReframeError::Ffmpeg(error.to_string())
    }
}

impl ReframeError {
    /// Process exit code for this error kind.
    ///
    /// | Code | Kind |
    /// |------|------|
    /// | 2 | I/O |
    /// | 3 | demux |
    /// | 4 | missing substitute frame |
    /// | 5 | timestamp monotonicity violation |
    /// | 6 | encode |
    /// | 1 | everything else |
    pub fn exit_code(&self) -> i32 {
        match self {
            ReframeError::Io(_) => 2,
            ReframeError::Demux { .. } => 3,
            ReframeError::MissingSubstituteFrame { .. } => 4,
            ReframeError::TimestampMonotonicityViolation { .. } => 5,
            ReframeError::Encode { .. } => 6,
            _ => 1,
        }
    }
}
