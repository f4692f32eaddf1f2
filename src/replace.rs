//! End-to-end frame replacement.
//!
//! [`FrameReplacer`] wires a [`TimestampExtractor`], an [`ImageSequence`],
//! a [`FrameSynchronizer`], and a [`Muxer`] into one pass over the input.
//! The output is written to a temporary file next to the destination and
//! renamed into place only after the trailer is written, so a failed or
//! cancelled run leaves no output behind.
//!
//! # Example
//!
//! ```no_run
//! use reframe::{FrameReplacer, ReframeError, ReplaceOptions};
//!
//! let report = FrameReplacer::new("input.mkv", "sr/frame_%05d.png", "output.mkv")
//!     .options(ReplaceOptions::new().with_scale(2))
//!     .run()?;
//! println!("{} frames, {} reused", report.frames, report.reused);
//! # Ok::<(), ReframeError>(())
//! ```

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ffmpeg_next::Rational;
use serde_json::{Value, json};
use tempfile::{Builder as TempBuilder, TempPath};

use crate::configuration::ReplaceOptions;
use crate::error::ReframeError;
use crate::extractor::TimestampExtractor;
use crate::muxer::Muxer;
use crate::pattern::PathPattern;
use crate::progress::ProgressTracker;
use crate::substitute::{ImageSequence, SubstituteSource};
use crate::synchronizer::FrameSynchronizer;
use crate::timing::{TimingSummary, ticks_to_duration};

/// Outcome of a successful run.
#[derive(Debug, Clone)]
pub struct ReplaceReport {
    /// Output file.
    pub output: PathBuf,
    /// Frames written; always the input's frame count.
    pub frames: u64,
    /// Frames that reused an earlier substitute.
    pub reused: u64,
    /// First frame that had no substitute of its own.
    pub first_reused_index: Option<u64>,
    /// Sum of frame durations, in `time_base` ticks.
    pub total_duration_ticks: i64,
    /// Time base of the input and output video stream.
    pub time_base: Rational,
    /// Encoded width.
    pub width: u32,
    /// Encoded height.
    pub height: u32,
    /// FFmpeg encoder name.
    pub encoder: String,
    /// Tracks copied without re-encoding.
    pub passthrough_streams: usize,
    /// Packets copied from those tracks.
    pub passthrough_packets: u64,
    /// Frame interval statistics.
    pub timing: TimingSummary,
    /// Whether a substitute exists past the last frame.
    pub unused_substitutes: bool,
}

impl ReplaceReport {
    /// Total duration as wall-clock time.
    pub fn total_duration(&self) -> Duration {
        ticks_to_duration(self.total_duration_ticks, self.time_base)
    }

    /// Machine-readable form of the report.
    pub fn to_json(&self) -> Value {
        json!({
            "output": self.output.display().to_string(),
            "frames": self.frames,
            "reused": self.reused,
            "first_reused_index": self.first_reused_index,
            "total_duration_ticks": self.total_duration_ticks,
            "time_base": format!(
                "{}/{}",
                self.time_base.numerator(),
                self.time_base.denominator()
            ),
            "duration_seconds": self.total_duration().as_secs_f64(),
            "width": self.width,
            "height": self.height,
            "encoder": self.encoder,
            "passthrough_streams": self.passthrough_streams,
            "passthrough_packets": self.passthrough_packets,
            "timing": {
                "min_interval_ticks": self.timing.min_interval(),
                "max_interval_ticks": self.timing.max_interval(),
                "mean_interval_seconds": self.timing.mean_interval_seconds(),
                "interval_stddev_seconds": self.timing.interval_stddev_seconds(),
                "variable_frame_rate": self.timing.is_variable_frame_rate(),
            },
            "unused_substitutes": self.unused_substitutes,
        })
    }
}

/// Replaces every frame of a video with a numbered image.
#[derive(Debug, Clone)]
pub struct FrameReplacer {
    input: PathBuf,
    replacement: String,
    output: PathBuf,
    options: ReplaceOptions,
}

impl FrameReplacer {
    /// Replace the frames of `input` with the images matching `replacement`
    /// (`frame_%05d.png` or `frames/*.png`), writing `output`.
    pub fn new(
        input: impl Into<PathBuf>,
        replacement: impl Into<String>,
        output: impl Into<PathBuf>,
    ) -> Self {
        Self {
            input: input.into(),
            replacement: replacement.into(),
            output: output.into(),
            options: ReplaceOptions::default(),
        }
    }

    /// Set the run options.
    #[must_use]
    pub fn options(mut self, options: ReplaceOptions) -> Self {
        self.options = options;
        self
    }

    /// Run the replacement.
    ///
    /// # Errors
    ///
    /// Any [`ReframeError`]. On error no output file is created and an
    /// existing one is left untouched.
    pub fn run(&self) -> Result<ReplaceReport, ReframeError> {
        self.check_paths()?;

        let extractor = TimestampExtractor::open(&self.input)?;
        let video = extractor.video_info().clone();
        let streams = extractor.stream_set().clone();

        let pattern = PathPattern::parse(&self.replacement)?;
        let start_number = self.options.start_number_for(&pattern);
        let source = ImageSequence::new(pattern, start_number, self.options.scale)?;
        if let (Some(declared), Some(available)) = (video.declared_frames, source.count_hint())
            && declared != available as u64
        {
            log::warn!(
                "Input declares {declared} frame(s) but `{}` matches {available} file(s)",
                self.replacement
            );
        }

        log::info!(
            "Replacing frames of {} ({} stream, time base {}/{}) with `{}`",
            self.input.display(),
            video.codec,
            video.time_base.numerator(),
            video.time_base.denominator(),
            self.replacement
        );

        let temp_path = self.temp_output()?;
        let mut tracker = ProgressTracker::new(
            self.options.progress.clone(),
            video.declared_frames,
            self.options.batch_size,
        );

        let mut synchronizer = FrameSynchronizer::new(extractor, source);
        let mut muxer: Option<Muxer> = None;

        loop {
            if self.options.is_cancelled() {
                log::info!("Replacement cancelled");
                return Err(ReframeError::Cancelled);
            }
            let Some(frame) = synchronizer.next().transpose()? else {
                break;
            };

            // Output size follows the first substitute.
            let active = match muxer.take() {
                Some(active) => active,
                None => Muxer::create(
                    &temp_path,
                    &video,
                    &streams,
                    frame.pixels.width(),
                    frame.pixels.height(),
                    &self.options.encoder,
                )?,
            };
            muxer.insert(active).write_frame(&frame)?;
            tracker.advance(
                frame.index,
                ticks_to_duration(frame.pts, frame.time_base),
                frame.reused_from.is_some(),
            );
        }

        let Some(muxer) = muxer else {
            return Err(ReframeError::Demux {
                path: self.input.clone(),
                reason: "no decodable video frames".to_string(),
            });
        };
        let summary = muxer.finish()?;
        tracker.finish();

        let stats = synchronizer.stats().clone();
        let timing = synchronizer
            .timing()
            .cloned()
            .unwrap_or_else(|| TimingSummary::new(video.time_base));
        let unused_substitutes = synchronizer.source().exists(stats.frames);
        if unused_substitutes {
            log::warn!(
                "Substitutes continue past the last frame ({}); extra images were ignored",
                stats.frames
            );
        }
        drop(synchronizer);

        self.persist(temp_path)?;

        log::info!(
            "Wrote {} frame(s) to {} ({} reused, {:.3}s)",
            stats.frames,
            self.output.display(),
            stats.reused,
            timing.total_duration().as_secs_f64()
        );

        Ok(ReplaceReport {
            output: self.output.clone(),
            frames: stats.frames,
            reused: stats.reused,
            first_reused_index: stats.first_reused_index,
            total_duration_ticks: stats.total_duration,
            time_base: video.time_base,
            width: summary.width,
            height: summary.height,
            encoder: summary.encoder,
            passthrough_streams: summary.passthrough_streams,
            passthrough_packets: summary.passthrough_packets,
            timing,
            unused_substitutes,
        })
    }

    /// Refuse to clobber an existing output or the input itself.
    fn check_paths(&self) -> Result<(), ReframeError> {
        if !self.output.exists() {
            return Ok(());
        }
        if let (Ok(input), Ok(output)) = (fs::canonicalize(&self.input), fs::canonicalize(&self.output))
            && input == output
        {
            return Err(ReframeError::OutputIsInput(self.output.clone()));
        }
        if !self.options.overwrite {
            return Err(ReframeError::OutputExists(self.output.clone()));
        }
        Ok(())
    }

    /// A uniquely named file beside the output, removed on drop.
    ///
    /// It keeps the output's extension so FFmpeg picks the same container.
    fn temp_output(&self) -> Result<TempPath, ReframeError> {
        let directory = match self.output.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let suffix = self
            .output
            .extension()
            .map(|extension| format!(".{}", extension.to_string_lossy()))
            .unwrap_or_default();

        let file = TempBuilder::new()
            .prefix(".reframe-")
            .suffix(&suffix)
            .tempfile_in(directory)?;
        let path = file.into_temp_path();
        log::debug!("Writing to temporary file {}", path.display());
        Ok(path)
    }

    fn persist(&self, temp_path: TempPath) -> Result<(), ReframeError> {
        let result = if self.options.overwrite {
            temp_path.persist(&self.output)
        } else {
            temp_path.persist_noclobber(&self.output)
        };
        result.map_err(|error| match error.error.kind() {
            ErrorKind::AlreadyExists => ReframeError::OutputExists(self.output.clone()),
            _ => ReframeError::Io(error.error),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn existing_output_is_refused_without_overwrite() {
        let directory = tempfile::tempdir().unwrap();
        let input = directory.path().join("in.mkv");
        let output = directory.path().join("out.mkv");
        fs::write(&input, b"x").unwrap();
        fs::write(&output, b"keep").unwrap();

        let replacer = FrameReplacer::new(&input, "f_%d.png", &output);
        assert!(matches!(replacer.check_paths(), Err(ReframeError::OutputExists(_))));

        let replacer = replacer.options(ReplaceOptions::new().with_overwrite(true));
        assert!(replacer.check_paths().is_ok());
        assert_eq!(fs::read(&output).unwrap(), b"keep");
    }

    #[test]
    fn output_equal_to_input_is_refused_even_with_overwrite() {
        let directory = tempfile::tempdir().unwrap();
        let input = directory.path().join("in.mkv");
        fs::write(&input, b"x").unwrap();
        let aliased = directory.path().join(".").join("in.mkv");

        let replacer = FrameReplacer::new(&input, "f_%d.png", aliased)
            .options(ReplaceOptions::new().with_overwrite(true));
        assert!(matches!(replacer.check_paths(), Err(ReframeError::OutputIsInput(_))));
    }

    #[test]
    fn temp_output_keeps_extension_and_is_removed_on_drop() {
        let directory = tempfile::tempdir().unwrap();
        let replacer = FrameReplacer::new("in.mkv", "f_%d.png", directory.path().join("out.mkv"));

        let temp = replacer.temp_output().unwrap();
        let path = temp.to_path_buf();
        assert_eq!(path.parent(), Some(directory.path()));
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("mkv"));
        assert!(path.exists());
        drop(temp);
        assert!(!path.exists());
    }

    #[test]
    fn report_json_carries_exact_ticks() {
        let mut timing = TimingSummary::new(Rational::new(1, 1000));
        for duration in [40, 20, 60] {
            timing.record(duration);
        }
        let report = ReplaceReport {
            output: PathBuf::from("out.mkv"),
            frames: 3,
            reused: 1,
            first_reused_index: Some(2),
            total_duration_ticks: 120,
            time_base: Rational::new(1, 1000),
            width: 64,
            height: 48,
            encoder: "mpeg4".to_string(),
            passthrough_streams: 0,
            passthrough_packets: 0,
            timing,
            unused_substitutes: false,
        };

        let value = report.to_json();
        assert_eq!(value["frames"], 3);
        assert_eq!(value["total_duration_ticks"], 120);
        assert_eq!(value["time_base"], "1/1000");
        assert_eq!(value["first_reused_index"], 2);
        assert_eq!(value["timing"]["max_interval_ticks"], 60);
        assert_eq!(report.total_duration(), Duration::from_millis(120));
    }
}
