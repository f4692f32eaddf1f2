//! Aligns original frame timings with substitute images.
//!
//! [`FrameSynchronizer`] walks the original frames in order, asks the
//! [`SubstituteSource`] for the image with the same index, and yields an
//! [`OutputFrame`] carrying the substitute's pixels and the original's
//! `pts`/`duration` untouched.
//!
//! # Missing substitutes
//!
//! - If frame *i* has no substitute but an earlier frame did, the most
//!   recently obtained pixels are reused and a warning is logged.
//! - If no substitute has been obtained yet, the run fails with
//!   [`ReframeError::MissingSubstituteFrame`].
//! - Substitutes past the last original frame are never requested.
//!
//! Output length and total duration therefore always equal the original's.
//! The walk is streaming: only the current frame, the current substitute,
//! and the last obtained pixels are held.

use std::sync::Arc;

use image::RgbImage;

use crate::error::ReframeError;
use crate::frame::{Frame, OutputFrame};
use crate::substitute::SubstituteSource;
use crate::timing::TimingSummary;

/// Counters kept while synchronising.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Output frames produced.
    pub frames: u64,
    /// Frames that reused an earlier substitute.
    pub reused: u64,
    /// First frame index that had to reuse an earlier substitute.
    pub first_reused_index: Option<u64>,
    /// Sum of output durations, in stream ticks.
    pub total_duration: i64,
}

/// Lazy iterator of [`OutputFrame`]s.
///
/// Fused after the first error.
pub struct FrameSynchronizer<F, S> {
    frames: F,
    source: S,
    /// Index of the frame whose substitute was obtained last, and its pixels.
    last: Option<(u64, Arc<RgbImage>)>,
    /// Whether the previous frame reused pixels, to log one warning per gap.
    in_gap: bool,
    stats: SyncStats,
    timing: Option<TimingSummary>,
    done: bool,
}

impl<F, S> FrameSynchronizer<F, S>
where
    F: Iterator<Item = Result<Frame, ReframeError>>,
    S: SubstituteSource,
{
    /// Pair `frames` with substitutes from `source`.
    pub fn new(frames: F, source: S) -> Self {
        Self {
            frames,
            source,
            last: None,
            in_gap: false,
            stats: SyncStats::default(),
            timing: None,
            done: false,
        }
    }

    /// Counters so far.
    pub fn stats(&self) -> &SyncStats {
        &self.stats
    }

    /// Interval statistics of the frames emitted so far.
    pub fn timing(&self) -> Option<&TimingSummary> {
        self.timing.as_ref()
    }

    /// The substitute source.
    pub fn source(&self) -> &S {
        &self.source
    }

    fn step(&mut self) -> Result<Option<OutputFrame>, ReframeError> {
        let Some(frame) = self.frames.next().transpose()? else {
            return Ok(None);
        };
        if frame.index != self.stats.frames {
            return Err(ReframeError::FrameIndexGap {
                expected: self.stats.frames,
                found: frame.index,
            });
        }

        let (pixels, reused_from) = match self.source.get(frame.index) {
            Ok(substitute) => {
                if self.in_gap {
                    log::debug!("Substitutes resume at frame {}", frame.index);
                    self.in_gap = false;
                }
                self.last = Some((frame.index, Arc::clone(&substitute.pixels)));
                (substitute.pixels, None)
            }
            Err(ReframeError::MissingSubstituteFrame { index, path }) => {
                let Some((source_index, pixels)) = &self.last else {
                    return Err(ReframeError::MissingSubstituteFrame { index, path });
                };
                if !self.in_gap {
                    log::warn!(
                        "No substitute for frame {index} ({}); reusing frame {source_index}",
                        path.display()
                    );
                    self.in_gap = true;
                } else {
                    log::debug!("No substitute for frame {index}; reusing frame {source_index}");
                }
                self.stats.reused += 1;
                self.stats.first_reused_index.get_or_insert(index);
                (Arc::clone(pixels), Some(*source_index))
            }
            Err(error) => return Err(error),
        };

        self.stats.frames += 1;
        self.stats.total_duration += frame.duration;
        self.timing
            .get_or_insert_with(|| TimingSummary::new(frame.time_base))
            .record(frame.duration);

        Ok(Some(OutputFrame {
            index: frame.index,
            pixels,
            pts: frame.pts,
            duration: frame.duration,
            time_base: frame.time_base,
            reused_from,
        }))
    }
}

impl<F, S> Iterator for FrameSynchronizer<F, S>
where
    F: Iterator<Item = Result<Frame, ReframeError>>,
    S: SubstituteSource,
{
    type Item = Result<OutputFrame, ReframeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.step() {
            Ok(Some(frame)) => Some(Ok(frame)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(error) => {
                self.done = true;
                Some(Err(error))
            }
        }
    }
}
