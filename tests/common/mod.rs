//! Shared fixture builders for integration tests.
//!
//! Test videos are synthesised with the crate's own [`Muxer`] using the
//! MPEG-4 Part 2 encoder, which every FFmpeg build ships. Matroska with a
//! 1/1000 time base keeps the timestamps exact and within what that
//! encoder accepts. Extra tracks (raw PCM audio, a font attachment) are
//! added by remuxing that video.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ffmpeg_next::codec::{self, Id};
use ffmpeg_next::media::Type;
use ffmpeg_next::util::channel_layout::ChannelLayout;
use ffmpeg_next::util::format::sample::{Sample, Type as SampleType};
use ffmpeg_next::{Dictionary, Packet, Rational};
use image::{Rgb, RgbImage};
use reframe::{
    EncoderOptions, Frame, Muxer, OutputFrame, ReframeError, StreamSet, TimestampExtractor,
    VideoCodec, VideoStreamInfo,
};

pub const TIME_BASE: Rational = Rational(1, 1000);

/// Irregular frame timestamps in milliseconds.
pub const VFR_PTS: [i64; 6] = [0, 40, 60, 130, 170, 200];
/// Differs from the last interval (30) so a lost duration is noticed.
pub const VFR_LAST_DURATION: i64 = 55;

pub const AUDIO_RATE: i32 = 8000;
/// Samples per generated audio packet (50 ms).
pub const AUDIO_PACKET_SAMPLES: usize = 400;

pub const FONT_NAME: &str = "font.ttf";
pub const FONT_MIME: &str = "application/x-truetype-font";
pub const FONT_BYTES: &[u8] = b"\x00\x01\x00\x00 not really a font";

/// Tracks to add next to the video in [`write_vfr_video_with_extras`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Extras {
    /// PCM audio packets to write.
    pub audio_packets: usize,
    pub font_attachment: bool,
}

pub fn mpeg4() -> EncoderOptions {
    EncoderOptions::default().codec(VideoCodec::Mpeg4)
}

/// Write a video-only Matroska file whose frames start at `pts`.
///
/// Returns `None` when the MPEG-4 encoder is unavailable so the caller can
/// skip.
pub fn write_vfr_video(
    path: &Path,
    pts: &[i64],
    last_duration: i64,
    width: u32,
    height: u32,
) -> Option<()> {
    ffmpeg_next::init().ok()?;

    let video = VideoStreamInfo {
        stream_index: 0,
        time_base: TIME_BASE,
        frame_rate: Rational(0, 1),
        width,
        height,
        codec: "mpeg4".to_string(),
        declared_frames: None,
    };
    let mut muxer = match Muxer::create(
        path,
        &video,
        &StreamSet::empty(path),
        width,
        height,
        &mpeg4(),
    ) {
        Ok(muxer) => muxer,
        Err(ReframeError::Encode { reason, .. }) => {
            eprintln!("Skipping: MPEG-4 encoder not available ({reason})");
            return None;
        }
        Err(error) => panic!("cannot create fixture {}: {error}", path.display()),
    };

    for (index, &frame_pts) in pts.iter().enumerate() {
        let duration = pts
            .get(index + 1)
            .map_or(last_duration, |next| next - frame_pts);
        let shade = (index as u8).wrapping_mul(37);
        muxer
            .write_frame(&OutputFrame {
                index: index as u64,
                pixels: Arc::new(RgbImage::from_pixel(width, height, Rgb([shade, 64, 255 - shade]))),
                pts: frame_pts,
                duration,
                time_base: TIME_BASE,
                reused_from: None,
            })
            .expect("write fixture frame");
    }
    muxer.finish().expect("finish fixture");
    Some(())
}

/// Write a Matroska file with the video of [`write_vfr_video`] followed by
/// the requested extra tracks.
///
/// Audio is mono `pcm_s16le` at [`AUDIO_RATE`], one packet per
/// [`AUDIO_PACKET_SAMPLES`] samples, each holding a distinct ramp so that
/// any change to a payload shows up. Returns `None` when an encoder is
/// unavailable.
pub fn write_vfr_video_with_extras(
    path: &Path,
    pts: &[i64],
    last_duration: i64,
    width: u32,
    height: u32,
    extras: Extras,
) -> Option<()> {
    let video_only = path.with_extension("video-only.mkv");
    write_vfr_video(&video_only, pts, last_duration, width, height)?;

    let mut input = ffmpeg_next::format::input(&video_only).expect("open video-only fixture");
    let mut output = ffmpeg_next::format::output(&path).expect("create fixture");

    let (video_in_index, video_in_time_base, video_parameters) = {
        let stream = input.streams().best(Type::Video).expect("fixture video stream");
        (stream.index(), stream.time_base(), stream.parameters())
    };
    let mut video_out = output
        .add_stream(ffmpeg_next::encoder::find(Id::None))
        .expect("add video stream");
    video_out.set_parameters(video_parameters);
    unsafe {
        (*video_out.parameters().as_mut_ptr()).codec_tag = 0;
    }
    let video_out_index = video_out.index();

    let mut audio_out_index = None;
    if extras.audio_packets > 0 {
        let Some(pcm) = ffmpeg_next::encoder::find(Id::PCM_S16LE) else {
            eprintln!("Skipping: pcm_s16le encoder not available");
            return None;
        };
        let mut context = codec::Context::new_with_codec(pcm);
        context.set_time_base(Rational(1, AUDIO_RATE));
        let mut audio = context.encoder().audio().expect("audio encoder");
        audio.set_rate(AUDIO_RATE);
        audio.set_format(Sample::I16(SampleType::Packed));
        audio.set_channel_layout(ChannelLayout::MONO);
        let audio = audio.open_as(pcm).expect("open pcm_s16le");

        let mut stream = output.add_stream(pcm).expect("add audio stream");
        stream.set_time_base(Rational(1, AUDIO_RATE));
        stream.set_parameters(&audio);
        audio_out_index = Some(stream.index());
    }

    if extras.font_attachment {
        let mut stream = output
            .add_stream(ffmpeg_next::encoder::find(Id::None))
            .expect("add attachment stream");
        let mut metadata = Dictionary::new();
        metadata.set("filename", FONT_NAME);
        metadata.set("mimetype", FONT_MIME);
        stream.set_metadata(metadata);
        // SAFETY: the stream's codec parameters are owned by `output`; the
        // extradata buffer is allocated with FFmpeg's allocator and padded
        // as FFmpeg requires, and ownership passes to the parameters.
        unsafe {
            let parameters = (*stream.as_mut_ptr()).codecpar;
            (*parameters).codec_type = ffmpeg_sys_next::AVMediaType::AVMEDIA_TYPE_ATTACHMENT;
            (*parameters).codec_id = ffmpeg_sys_next::AVCodecID::AV_CODEC_ID_TTF;
            let padded =
                FONT_BYTES.len() + ffmpeg_sys_next::AV_INPUT_BUFFER_PADDING_SIZE as usize;
            let extradata = ffmpeg_sys_next::av_mallocz(padded).cast::<u8>();
            assert!(!extradata.is_null(), "av_mallocz failed");
            std::ptr::copy_nonoverlapping(FONT_BYTES.as_ptr(), extradata, FONT_BYTES.len());
            (*parameters).extradata = extradata;
            (*parameters).extradata_size = FONT_BYTES.len() as i32;
        }
    }

    output.write_header().expect("write fixture header");
    let video_out_time_base = output.stream(video_out_index).unwrap().time_base();

    for (stream, mut packet) in input.packets() {
        if stream.index() != video_in_index {
            continue;
        }
        packet.set_stream(video_out_index);
        packet.rescale_ts(video_in_time_base, video_out_time_base);
        packet.set_position(-1);
        packet.write_interleaved(&mut output).expect("copy fixture video");
    }

    if let Some(audio_index) = audio_out_index {
        let audio_time_base = output.stream(audio_index).unwrap().time_base();
        for (number, payload) in audio_payloads(extras.audio_packets).into_iter().enumerate() {
            let start = (number * AUDIO_PACKET_SAMPLES) as i64;
            let mut packet = Packet::copy(&payload);
            packet.set_stream(audio_index);
            packet.set_pts(Some(start));
            packet.set_dts(Some(start));
            packet.set_duration(AUDIO_PACKET_SAMPLES as i64);
            packet.set_flags(ffmpeg_next::packet::Flags::KEY);
            packet.rescale_ts(Rational(1, AUDIO_RATE), audio_time_base);
            packet.write_interleaved(&mut output).expect("write fixture audio");
        }
    }

    output.write_trailer().expect("finish fixture");
    drop(input);
    let _ = std::fs::remove_file(&video_only);
    Some(())
}

/// The exact audio payloads [`write_vfr_video_with_extras`] writes.
pub fn audio_payloads(count: usize) -> Vec<Vec<u8>> {
    (0..count)
        .map(|number| {
            (0..AUDIO_PACKET_SAMPLES)
                .flat_map(|sample| {
                    let value = ((number * AUDIO_PACKET_SAMPLES + sample) as i16).wrapping_mul(97);
                    value.to_le_bytes()
                })
                .collect()
        })
        .collect()
}

/// Write PNG substitutes `frame_0001.png`, `frame_0002.png`, … for the
/// given file numbers.
pub fn write_substitutes(directory: &Path, numbers: impl IntoIterator<Item = u64>, width: u32, height: u32) {
    for number in numbers {
        let shade = (number as u8).wrapping_mul(50);
        RgbImage::from_pixel(width, height, Rgb([255 - shade, shade, 128]))
            .save(directory.join(format!("frame_{number:04}.png")))
            .expect("write substitute");
    }
}

pub fn substitute_pattern(directory: &Path) -> String {
    format!("{}/frame_%04d.png", directory.display())
}

pub fn read_timings(path: &Path) -> Vec<Frame> {
    TimestampExtractor::open(path)
        .expect("open for timing")
        .collect::<Result<Vec<_>, _>>()
        .expect("extract timings")
}

/// Files the replacer may have left behind in `directory`.
pub fn leftover_temp_files(directory: &Path) -> Vec<PathBuf> {
    std::fs::read_dir(directory)
        .expect("list directory")
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with(".reframe-"))
        })
        .collect()
}
