//! # reframe
//!
//! Replace every frame of a video with an externally produced image (for
//! example a super-resolved version) while keeping each frame's original
//! presentation timestamp and duration, including irregular
//! variable-frame-rate intervals. Audio, subtitle, and other tracks are
//! copied without re-encoding. Powered by FFmpeg via the
//! [`ffmpeg-next`](https://crates.io/crates/ffmpeg-next) crate.
//!
//! ## Quick Start
//!
//! ```no_run
//! use reframe::{FrameReplacer, ReplaceOptions};
//!
//! let report = FrameReplacer::new("input.mkv", "upscaled/frame_%05d.png", "output.mkv")
//!     .options(ReplaceOptions::new().with_scale(2))
//!     .run()
//!     .unwrap();
//! println!("replaced {} frames", report.frames);
//! ```
//!
//! ## Building blocks
//!
//! The pipeline is four components connected by iterators:
//!
//! - [`TimestampExtractor`] yields the timing of every original frame in
//!   presentation order.
//! - [`ImageSequence`] decodes numbered images on a background thread
//!   behind the [`SubstituteSource`] trait.
//! - [`FrameSynchronizer`] pairs them by index. A frame without a
//!   substitute reuses the most recent one.
//! - [`Muxer`] encodes the result with the input's time base and copies the
//!   remaining tracks.
//!
//! ```no_run
//! use reframe::{
//!     EncoderOptions, FrameSynchronizer, ImageSequence, Muxer, ReframeError,
//!     TimestampExtractor,
//! };
//!
//! let extractor = TimestampExtractor::open("input.mkv")?;
//! let video = extractor.video_info().clone();
//! let streams = extractor.stream_set().clone();
//! let source = ImageSequence::open("frames/*.png", 1, 1)?;
//!
//! let mut muxer = Muxer::create(
//!     "output.mkv",
//!     &video,
//!     &streams,
//!     video.width,
//!     video.height,
//!     &EncoderOptions::default(),
//! )?;
//! for frame in FrameSynchronizer::new(extractor, source) {
//!     muxer.write_frame(&frame?)?;
//! }
//! muxer.finish()?;
//! # Ok::<(), ReframeError>(())
//! ```

pub mod configuration;
pub mod encode;
pub mod error;
pub mod extractor;
pub mod ffmpeg;
pub mod frame;
pub mod muxer;
pub mod pattern;
pub mod progress;
pub mod replace;
pub mod substitute;
pub mod synchronizer;
pub mod timing;

pub use configuration::ReplaceOptions;
pub use encode::{EncoderOptions, VideoCodec};
pub use error::ReframeError;
pub use extractor::TimestampExtractor;
pub use ffmpeg::{FfmpegLogLevel, set_ffmpeg_log_level};
pub use frame::{
    Frame, OutputFrame, PassthroughStream, StreamSet, SubstituteImage, VideoStreamInfo,
};
pub use muxer::{MuxSummary, Muxer};
pub use pattern::PathPattern;
pub use progress::{CancellationToken, ProgressCallback, ProgressInfo};
pub use replace::{FrameReplacer, ReplaceReport};
pub use substitute::{ImageSequence, SubstituteSource};
pub use synchronizer::{FrameSynchronizer, SyncStats};
pub use timing::TimingSummary;
