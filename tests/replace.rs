//! End-to-end replacement tests on synthesised variable-frame-rate videos.

mod common;

use std::fs;

use reframe::{CancellationToken, FrameReplacer, ReframeError, ReplaceOptions, TimestampExtractor};

use common::{
    VFR_LAST_DURATION, VFR_PTS, leftover_temp_files, mpeg4, read_timings, substitute_pattern,
    write_substitutes, write_vfr_video,
};

fn options() -> ReplaceOptions {
    ReplaceOptions::new().with_encoder(mpeg4())
}

#[test]
fn timestamps_survive_replacement() {
    let directory = tempfile::tempdir().unwrap();
    let input = directory.path().join("input.mkv");
    let output = directory.path().join("output.mkv");
    if write_vfr_video(&input, &VFR_PTS, VFR_LAST_DURATION, 64, 48).is_none() {
        return;
    }
    write_substitutes(directory.path(), 1..=6, 64, 48);

    let report = FrameReplacer::new(&input, substitute_pattern(directory.path()), &output)
        .options(options())
        .run()
        .expect("replace");

    let original = read_timings(&input);
    let replaced = read_timings(&output);

    assert_eq!(report.frames, original.len() as u64);
    assert_eq!(report.reused, 0);
    assert_eq!(replaced.len(), original.len());
    for (out, source) in replaced.iter().zip(&original) {
        assert_eq!(out.pts, source.pts, "frame {}", source.index);
        assert_eq!(out.time_base, source.time_base);
    }
    let pts: Vec<i64> = replaced.iter().map(|frame| frame.pts).collect();
    assert_eq!(pts, VFR_PTS);

    let durations = |frames: &[reframe::Frame]| -> Vec<i64> {
        frames.iter().map(|f| f.duration).collect()
    };
    assert_eq!(durations(&original), [40, 20, 70, 40, 30, VFR_LAST_DURATION]);
    assert_eq!(durations(&replaced), durations(&original));

    let total = |frames: &[reframe::Frame]| -> i64 { frames.iter().map(|f| f.duration).sum() };
    assert_eq!(total(&original), 200 + VFR_LAST_DURATION);
    assert_eq!(total(&replaced), total(&original));
    assert_eq!(report.total_duration_ticks, total(&original));
    assert!(report.timing.is_variable_frame_rate());
    assert!(leftover_temp_files(directory.path()).is_empty());
}

#[test]
fn short_substitute_set_reuses_last_image() {
    let directory = tempfile::tempdir().unwrap();
    let input = directory.path().join("input.mkv");
    let output = directory.path().join("output.mkv");
    let pts = [0, 33, 100, 120, 190];
    if write_vfr_video(&input, &pts, 40, 64, 48).is_none() {
        return;
    }
    write_substitutes(directory.path(), 1..=3, 64, 48);

    let report = FrameReplacer::new(&input, substitute_pattern(directory.path()), &output)
        .options(options())
        .run()
        .expect("replace with short set");

    assert_eq!(report.frames, 5);
    assert_eq!(report.reused, 2);
    assert_eq!(report.first_reused_index, Some(3));
    assert!(!report.unused_substitutes);

    let replaced: Vec<i64> = read_timings(&output).iter().map(|f| f.pts).collect();
    assert_eq!(replaced, pts);
}

#[test]
fn missing_first_substitute_leaves_no_output() {
    let directory = tempfile::tempdir().unwrap();
    let input = directory.path().join("input.mkv");
    let output = directory.path().join("output.mkv");
    if write_vfr_video(&input, &VFR_PTS, VFR_LAST_DURATION, 64, 48).is_none() {
        return;
    }
    write_substitutes(directory.path(), 2..=6, 64, 48);

    let result = FrameReplacer::new(&input, substitute_pattern(directory.path()), &output)
        .options(options())
        .run();

    match result {
        Err(error @ ReframeError::MissingSubstituteFrame { index: 0, .. }) => {
            assert_eq!(error.exit_code(), 4);
        }
        other => panic!("expected missing frame 0, got {other:?}"),
    }
    assert!(!output.exists());
    assert!(leftover_temp_files(directory.path()).is_empty());
}

#[test]
fn vscale_doubles_output_dimensions() {
    let directory = tempfile::tempdir().unwrap();
    let input = directory.path().join("input.mkv");
    let output = directory.path().join("output.mkv");
    if write_vfr_video(&input, &VFR_PTS, VFR_LAST_DURATION, 32, 24).is_none() {
        return;
    }
    write_substitutes(directory.path(), 1..=6, 32, 24);

    let report = FrameReplacer::new(&input, substitute_pattern(directory.path()), &output)
        .options(options().with_scale(2))
        .run()
        .expect("replace with scale");

    assert_eq!((report.width, report.height), (64, 48));
    let extractor = TimestampExtractor::open(&output).unwrap();
    assert_eq!(extractor.video_info().width, 64);
    assert_eq!(extractor.video_info().height, 48);
}

#[test]
fn wildcard_pattern_and_extra_substitutes() {
    let directory = tempfile::tempdir().unwrap();
    let input = directory.path().join("input.mkv");
    let output = directory.path().join("output.mkv");
    let frames = directory.path().join("frames");
    fs::create_dir(&frames).unwrap();
    if write_vfr_video(&input, &[0, 50, 70], 50, 64, 48).is_none() {
        return;
    }
    write_substitutes(&frames, 1..=5, 64, 48);

    let report = FrameReplacer::new(&input, format!("{}/*.png", frames.display()), &output)
        .options(options())
        .run()
        .expect("replace with wildcard");

    assert_eq!(report.frames, 3);
    assert!(report.unused_substitutes);
}

#[test]
fn zero_based_wildcard_starts_at_its_first_file() {
    let directory = tempfile::tempdir().unwrap();
    let input = directory.path().join("input.mkv");
    let output = directory.path().join("output.mkv");
    let frames = directory.path().join("frames");
    fs::create_dir(&frames).unwrap();
    if write_vfr_video(&input, &[0, 50, 70], 50, 64, 48).is_none() {
        return;
    }
    write_substitutes(&frames, 0..=2, 64, 48);

    let report = FrameReplacer::new(&input, format!("{}/frame_*.png", frames.display()), &output)
        .options(options())
        .run()
        .expect("replace with zero-based wildcard");

    assert_eq!(report.frames, 3);
    assert_eq!(report.reused, 0);
    assert_eq!(report.first_reused_index, None);
    assert!(!report.unused_substitutes);
}

#[test]
fn explicit_start_number_overrides_wildcard() {
    let directory = tempfile::tempdir().unwrap();
    let input = directory.path().join("input.mkv");
    let output = directory.path().join("output.mkv");
    let frames = directory.path().join("frames");
    fs::create_dir(&frames).unwrap();
    if write_vfr_video(&input, &[0, 50, 70], 50, 64, 48).is_none() {
        return;
    }
    write_substitutes(&frames, 0..=2, 64, 48);

    let report = FrameReplacer::new(&input, format!("{}/frame_*.png", frames.display()), &output)
        .options(options().with_start_number(1))
        .run()
        .expect("replace from file 1");

    assert_eq!(report.reused, 1);
    assert_eq!(report.first_reused_index, Some(2));
}

#[test]
fn corrupt_input_is_a_demux_error() {
    let directory = tempfile::tempdir().unwrap();
    let input = directory.path().join("input.mkv");
    let output = directory.path().join("output.mkv");
    fs::write(&input, b"definitely not a matroska file").unwrap();
    write_substitutes(directory.path(), 1..=2, 16, 16);

    let result = FrameReplacer::new(&input, substitute_pattern(directory.path()), &output)
        .options(options())
        .run();

    assert!(matches!(result, Err(ReframeError::Demux { .. })), "got {result:?}");
    assert!(!output.exists());
    assert!(leftover_temp_files(directory.path()).is_empty());
}

#[test]
fn existing_output_is_not_touched() {
    let directory = tempfile::tempdir().unwrap();
    let input = directory.path().join("input.mkv");
    let output = directory.path().join("output.mkv");
    if write_vfr_video(&input, &VFR_PTS, VFR_LAST_DURATION, 64, 48).is_none() {
        return;
    }
    write_substitutes(directory.path(), 1..=6, 64, 48);
    fs::write(&output, b"previous result").unwrap();

    let replacer = FrameReplacer::new(&input, substitute_pattern(directory.path()), &output);
    let result = replacer.clone().options(options()).run();
    assert!(matches!(result, Err(ReframeError::OutputExists(_))));
    assert_eq!(fs::read(&output).unwrap(), b"previous result");

    replacer
        .options(options().with_overwrite(true))
        .run()
        .expect("overwrite");
    assert_ne!(fs::read(&output).unwrap(), b"previous result");
}

#[test]
fn cancelled_run_leaves_no_output() {
    let directory = tempfile::tempdir().unwrap();
    let input = directory.path().join("input.mkv");
    let output = directory.path().join("output.mkv");
    if write_vfr_video(&input, &VFR_PTS, VFR_LAST_DURATION, 64, 48).is_none() {
        return;
    }
    write_substitutes(directory.path(), 1..=6, 64, 48);

    let token = CancellationToken::new();
    token.cancel();
    let result = FrameReplacer::new(&input, substitute_pattern(directory.path()), &output)
        .options(options().with_cancellation(token))
        .run();

    assert!(matches!(result, Err(ReframeError::Cancelled)));
    assert!(!output.exists());
    assert!(leftover_temp_files(directory.path()).is_empty());
}
