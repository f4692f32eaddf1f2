//! Replacement run configuration.
//!
//! [`ReplaceOptions`] threads the substitute layout, encoder settings,
//! progress reporting, and cancellation through [`FrameReplacer`]
//! without widening its constructor.
//!
//! [`FrameReplacer`]: crate::FrameReplacer
//!
//! # Example
//!
//! ```
//! use reframe::{CancellationToken, EncoderOptions, ReplaceOptions, VideoCodec};
//!
//! let token = CancellationToken::new();
//! let options = ReplaceOptions::new()
//!     .with_scale(2)
//!     .with_start_number(0)
//!     .with_encoder(EncoderOptions::default().codec(VideoCodec::Mpeg4))
//!     .with_cancellation(token.clone())
//!     .with_batch_size(25);
//! assert_eq!(options.scale(), 2);
//! ```

use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::Arc;

use crate::encode::EncoderOptions;
use crate::pattern::PathPattern;
use crate::progress::{CancellationToken, NoOpProgress, ProgressCallback};

/// Settings for one replacement run.
#[derive(Clone)]
pub struct ReplaceOptions {
    pub(crate) scale: u32,
    pub(crate) start_number: Option<u64>,
    pub(crate) overwrite: bool,
    pub(crate) encoder: EncoderOptions,
    pub(crate) progress: Arc<dyn ProgressCallback>,
    pub(crate) cancellation: Option<CancellationToken>,
    pub(crate) batch_size: u64,
}

impl Debug for ReplaceOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("ReplaceOptions")
            .field("scale", &self.scale)
            .field("start_number", &self.start_number)
            .field("overwrite", &self.overwrite)
            .field("encoder", &self.encoder)
            .field("has_cancellation", &self.cancellation.is_some())
            .field("batch_size", &self.batch_size)
            .finish()
    }
}

impl Default for ReplaceOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl ReplaceOptions {
    /// Defaults: scale 1, files numbered from 1 (printf patterns) or from
    /// the smallest matched number (wildcards), no overwrite, H.264, no
    /// progress callback, no cancellation, batch size 1.
    pub fn new() -> Self {
        Self {
            scale: 1,
            start_number: None,
            overwrite: false,
            encoder: EncoderOptions::default(),
            progress: Arc::new(NoOpProgress),
            cancellation: None,
            batch_size: 1,
        }
    }

    /// Upscale every substitute by an integer factor. Zero is rejected
    /// when the run starts.
    #[must_use]
    pub fn with_scale(mut self, scale: u32) -> Self {
        self.scale = scale;
        self
    }

    /// File number of the substitute for the first frame.
    #[must_use]
    pub fn with_start_number(mut self, start_number: u64) -> Self {
        self.start_number = Some(start_number);
        self
    }

    /// Allow replacing an existing output file.
    #[must_use]
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Encoder settings for the video track.
    #[must_use]
    pub fn with_encoder(mut self, encoder: EncoderOptions) -> Self {
        self.encoder = encoder;
        self
    }

    /// Attach a progress callback.
    #[must_use]
    pub fn with_progress(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress = callback;
        self
    }

    /// Attach a cancellation token, checked before every frame.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Fire the progress callback every `size` frames (minimum 1).
    #[must_use]
    pub fn with_batch_size(mut self, size: u64) -> Self {
        self.batch_size = size.max(1);
        self
    }

    pub fn scale(&self) -> u32 {
        self.scale
    }

    /// The explicit start number, if one was set.
    pub fn start_number(&self) -> Option<u64> {
        self.start_number
    }

    pub fn overwrite(&self) -> bool {
        self.overwrite
    }

    pub fn encoder(&self) -> &EncoderOptions {
        &self.encoder
    }

    /// Start number used with `pattern`: the explicit one, else the first
    /// matched number of a wildcard, else 1.
    pub(crate) fn start_number_for(&self, pattern: &PathPattern) -> u64 {
        self.start_number
            .or_else(|| pattern.first_number())
            .unwrap_or(1)
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(|token| token.is_cancelled())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let options = ReplaceOptions::default();
        assert_eq!(options.scale(), 1);
        assert_eq!(options.start_number(), None);
        assert!(!options.overwrite());
        assert!(!options.is_cancelled());
        assert_eq!(options.batch_size, 1);
    }

    #[test]
    fn start_number_follows_pattern_unless_set() {
        let directory = tempfile::tempdir().unwrap();
        for name in ["f_0000.png", "f_0001.png"] {
            std::fs::write(directory.path().join(name), b"").unwrap();
        }
        let wildcard =
            PathPattern::parse(&format!("{}/f_*.png", directory.path().display())).unwrap();
        let printf = PathPattern::parse("f_%04d.png").unwrap();

        let options = ReplaceOptions::new();
        assert_eq!(options.start_number_for(&wildcard), 0);
        assert_eq!(options.start_number_for(&printf), 1);

        let explicit = ReplaceOptions::new().with_start_number(5);
        assert_eq!(explicit.start_number_for(&wildcard), 5);
        assert_eq!(explicit.start_number_for(&printf), 5);
    }

    #[test]
    fn batch_size_is_clamped() {
        assert_eq!(ReplaceOptions::new().with_batch_size(0).batch_size, 1);
    }

    #[test]
    fn cancellation_is_observed() {
        let token = CancellationToken::new();
        let options = ReplaceOptions::new().with_cancellation(token.clone());
        token.cancel();
        assert!(options.is_cancelled());
    }

    #[test]
    fn debug_hides_callback() {
        let text = format!("{:?}", ReplaceOptions::new().with_scale(3));
        assert!(text.contains("scale: 3"));
        assert!(text.contains("has_cancellation: false"));
    }
}
