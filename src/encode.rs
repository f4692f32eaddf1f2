//! Video encoder settings.
//!
//! [`EncoderOptions`] selects the codec and quality knobs used by the
//! [`Muxer`](crate::Muxer) when it re-encodes the substituted video track.
//!
//! # Example
//!
//! ```
//! use reframe::{EncoderOptions, VideoCodec};
//!
//! let options = EncoderOptions::default()
//!     .codec(VideoCodec::H265)
//!     .encoder_name("hevc_nvenc")
//!     .option("preset", "slow")
//!     .crf(17);
//! assert_eq!(options.codec, VideoCodec::H265);
//! ```

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use ffmpeg_next::codec::{Codec, Id};
use ffmpeg_next::{Dictionary, format::Pixel};

use crate::error::ReframeError;

/// Supported output video codecs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VideoCodec {
    /// H.264 / AVC.
    #[default]
    H264,
    /// H.265 / HEVC.
    H265,
    /// MPEG-4 Part 2. Always built into FFmpeg.
    Mpeg4,
}

impl VideoCodec {
    fn to_codec_id(self) -> Id {
        match self {
            VideoCodec::H264 => Id::H264,
            VideoCodec::H265 => Id::HEVC,
            VideoCodec::Mpeg4 => Id::MPEG4,
        }
    }
}

impl FromStr for VideoCodec {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "h264" | "avc" | "x264" => Ok(VideoCodec::H264),
            "h265" | "hevc" | "x265" => Ok(VideoCodec::H265),
            "mpeg4" | "mp4v" => Ok(VideoCodec::Mpeg4),
            other => Err(format!("unsupported codec `{other}` (h264, h265, mpeg4)")),
        }
    }
}

impl Display for VideoCodec {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let name = match self {
            VideoCodec::H264 => "h264",
            VideoCodec::H265 => "h265",
            VideoCodec::Mpeg4 => "mpeg4",
        };
        f.write_str(name)
    }
}

/// Encoder settings for the replacement video track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderOptions {
    /// Codec family. Default is H.264.
    pub codec: VideoCodec,
    /// Specific encoder implementation (e.g. `hevc_nvenc`, `libx265`).
    /// Overrides the default encoder for `codec`.
    pub encoder_name: Option<String>,
    /// Constant Rate Factor, passed as the `crf` codec option.
    pub crf: Option<u32>,
    /// Target bitrate in bits per second.
    pub bitrate: Option<usize>,
    /// Output pixel format name. Default `yuv420p`.
    pub pixel_format: String,
    /// Extra private codec options, applied in order.
    pub options: Vec<(String, String)>,
}

impl Default for EncoderOptions {
    fn default() -> Self {
        Self {
            codec: VideoCodec::H264,
            encoder_name: None,
            crf: None,
            bitrate: None,
            pixel_format: "yuv420p".to_string(),
            options: Vec::new(),
        }
    }
}

impl EncoderOptions {
    /// Set the codec family.
    #[must_use]
    pub fn codec(mut self, codec: VideoCodec) -> Self {
        self.codec = codec;
        self
    }

    /// Use a specific encoder by FFmpeg name.
    #[must_use]
    pub fn encoder_name(mut self, name: impl Into<String>) -> Self {
        self.encoder_name = Some(name.into());
        self
    }

    /// Set the CRF quality value.
    #[must_use]
    pub fn crf(mut self, crf: u32) -> Self {
        self.crf = Some(crf);
        self
    }

    /// Set the target bitrate in bits per second.
    #[must_use]
    pub fn bitrate(mut self, bitrate: usize) -> Self {
        self.bitrate = Some(bitrate);
        self
    }

    /// Set the output pixel format by FFmpeg name.
    #[must_use]
    pub fn pixel_format(mut self, name: impl Into<String>) -> Self {
        self.pixel_format = name.into();
        self
    }

    /// Add a private codec option.
    #[must_use]
    pub fn option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.push((key.into(), value.into()));
        self
    }

    /// Look up the encoder to use.
    pub(crate) fn find_encoder(&self) -> Result<Codec, ReframeError> {
        let found = match &self.encoder_name {
            Some(name) => ffmpeg_next::encoder::find_by_name(name),
            None => ffmpeg_next::encoder::find(self.codec.to_codec_id()),
        };
        found.ok_or_else(|| ReframeError::Encode {
            index: 0,
            reason: match &self.encoder_name {
                Some(name) => format!("encoder `{name}` not available"),
                None => format!("no {} encoder available", self.codec),
            },
        })
    }

    /// Resolve the output pixel format.
    pub(crate) fn output_pixel(&self) -> Result<Pixel, ReframeError> {
        Pixel::from_str(&self.pixel_format).map_err(|_| ReframeError::Encode {
            index: 0,
            reason: format!("unknown pixel format `{}`", self.pixel_format),
        })
    }

    /// Codec options dictionary passed when opening the encoder.
    pub(crate) fn dictionary(&self) -> Dictionary<'static> {
        let mut dictionary = Dictionary::new();
        if let Some(crf) = self.crf {
            dictionary.set("crf", &crf.to_string());
        }
        for (key, value) in &self.options {
            dictionary.set(key, value);
        }
        dictionary
    }
}
