//! Lazily decoded replacement frames.
//!
//! [`ImageSequence`] implements [`SubstituteSource`] over a numbered image
//! set. Images are decoded (and optionally upscaled) on a background loader
//! thread that walks the file numbers in order and hands each result over a
//! bounded channel with room for one image. Decoding the next image thus
//! overlaps encoding of the current frame, and memory stays bounded no
//! matter how long the video is.
//!
//! Dropping the sequence closes the channel, which stops the loader at its
//! next hand-over; the thread is then joined.
//!
//! # Example
//!
//! ```no_run
//! use reframe::{ImageSequence, ReframeError, SubstituteSource};
//!
//! let mut sequence = ImageSequence::open("sr/frame_%05d.png", 1, 2)?;
//! let first = sequence.get(0)?;
//! println!("{} is {}x{}", first.source_path.display(), first.width(), first.height());
//! # Ok::<(), ReframeError>(())
//! ```

use std::io::Error as IoError;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::{Receiver, SyncSender, sync_channel};
use std::thread::{self, JoinHandle};

use image::ImageError;
use image::imageops::FilterType;

use crate::error::ReframeError;
use crate::frame::SubstituteImage;
use crate::pattern::PathPattern;

/// Images decoded ahead of the consumer.
const LOOKAHEAD: usize = 1;

/// Index-addressable source of replacement frames.
///
/// Indices are zero-based frame positions and must be requested in
/// increasing order.
pub trait SubstituteSource {
    /// Decode the substitute for frame `index`.
    ///
    /// # Errors
    ///
    /// [`ReframeError::MissingSubstituteFrame`] when no file exists for the
    /// index; any other error is fatal.
    fn get(&mut self, index: u64) -> Result<SubstituteImage, ReframeError>;

    /// Whether a file exists for `index`, without decoding it.
    fn exists(&self, index: u64) -> bool;
}

struct Loaded {
    index: u64,
    result: Result<SubstituteImage, ReframeError>,
}

/// A numbered image set decoded by a background loader.
pub struct ImageSequence {
    pattern: Arc<PathPattern>,
    start_number: u64,
    scale: u32,
    receiver: Option<Receiver<Loaded>>,
    loader: Option<JoinHandle<()>>,
}

impl ImageSequence {
    /// Parse `pattern` and start loading from file number `start_number`.
    ///
    /// # Errors
    ///
    /// [`ReframeError::InvalidPattern`] for a malformed pattern,
    /// [`ReframeError::InvalidScale`] for a zero scale factor.
    pub fn open(pattern: &str, start_number: u64, scale: u32) -> Result<Self, ReframeError> {
        Self::new(PathPattern::parse(pattern)?, start_number, scale)
    }

    /// Start loading `pattern` from file number `start_number`, upscaling
    /// every image by `scale` in both dimensions.
    ///
    /// # Errors
    ///
    /// [`ReframeError::InvalidScale`] if `scale` is zero, or
    /// [`ReframeError::Io`] if the loader thread cannot be spawned.
    pub fn new(pattern: PathPattern, start_number: u64, scale: u32) -> Result<Self, ReframeError> {
        if scale == 0 {
            return Err(ReframeError::InvalidScale(scale));
        }
        let pattern = Arc::new(pattern);
        let (sender, receiver) = sync_channel(LOOKAHEAD);

        let loader = {
            let pattern = Arc::clone(&pattern);
            thread::Builder::new()
                .name("reframe-substitute-loader".to_string())
                .spawn(move || run_loader(&pattern, start_number, scale, &sender))?
        };

        log::debug!("Substitute loader started (start number {start_number}, scale {scale})");

        Ok(Self {
            pattern,
            start_number,
            scale,
            receiver: Some(receiver),
            loader: Some(loader),
        })
    }

    /// Number of substitute files, when the pattern lists them up front.
    pub fn count_hint(&self) -> Option<usize> {
        self.pattern.count_hint()
    }

    /// The scale factor applied to every image.
    pub fn scale(&self) -> u32 {
        self.scale
    }

    fn path_of(&self, index: u64) -> Option<PathBuf> {
        self.start_number
            .checked_add(index)
            .and_then(|number| self.pattern.resolve(number))
    }
}

impl SubstituteSource for ImageSequence {
    fn get(&mut self, index: u64) -> Result<SubstituteImage, ReframeError> {
        let receiver = self
            .receiver
            .as_ref()
            .ok_or_else(|| IoError::other("substitute loader already shut down"))?;

        loop {
            let loaded = receiver
                .recv()
                .map_err(|_| IoError::other("substitute loader stopped unexpectedly"))?;
            if loaded.index < index {
                continue;
            }
            if loaded.index > index {
                // Asked for an index the loader already went past.
                return Err(ReframeError::MissingSubstituteFrame {
                    index,
                    path: self.path_of(index).unwrap_or_default(),
                });
            }
            return loaded.result;
        }
    }

    fn exists(&self, index: u64) -> bool {
        self.path_of(index).is_some_and(|path| path.is_file())
    }
}

impl Drop for ImageSequence {
    fn drop(&mut self) {
        // Disconnect first so a loader blocked on a full channel wakes up.
        drop(self.receiver.take());
        if let Some(loader) = self.loader.take()
            && loader.join().is_err()
        {
            log::warn!("Substitute loader thread panicked");
        }
    }
}

fn run_loader(pattern: &PathPattern, start_number: u64, scale: u32, sender: &SyncSender<Loaded>) {
    let mut index: u64 = 0;
    while let Some(number) = start_number.checked_add(index) {
        let result = load_image(pattern, number, index, scale);
        if sender.send(Loaded { index, result }).is_err() {
            break;
        }
        index += 1;
    }
}

fn load_image(
    pattern: &PathPattern,
    number: u64,
    index: u64,
    scale: u32,
) -> Result<SubstituteImage, ReframeError> {
    let path = match pattern.resolve(number) {
        Some(path) if path.is_file() => path,
        Some(path) => return Err(ReframeError::MissingSubstituteFrame { index, path }),
        None => {
            return Err(ReframeError::MissingSubstituteFrame {
                index,
                path: pattern.describe(number),
            });
        }
    };

    let image = image::open(&path).map_err(|source| image_error(&path, source))?;

    let pixels = if scale > 1 {
        let width = image.width().checked_mul(scale);
        let height = image.height().checked_mul(scale);
        let (Some(width), Some(height)) = (width, height) else {
            return Err(ReframeError::InvalidScale(scale));
        };
        image.resize_exact(width, height, FilterType::Lanczos3).into_rgb8()
    } else {
        image.into_rgb8()
    };

    log::trace!(
        "Decoded substitute {} ({}x{})",
        path.display(),
        pixels.width(),
        pixels.height()
    );

    Ok(SubstituteImage {
        index,
        source_path: path,
        pixels: Arc::new(pixels),
    })
}

/// Read failures are I/O errors; everything else is a bad image.
fn image_error(path: &Path, source: ImageError) -> ReframeError {
    match source {
        ImageError::IoError(error) => ReframeError::Io(error),
        source => ReframeError::Image {
            path: path.to_path_buf(),
            source,
        },
    }
}
