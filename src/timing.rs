//! Exact timestamp arithmetic and variable frame rate (VFR) statistics.
//!
//! Timestamps stay integer tick counts in their stream's time base for the
//! whole pipeline, so equality and sums are exact. Conversions to seconds
//! exist only for logging and reporting.
//!
//! [`TimingSummary`] accumulates per-frame interval statistics in O(1)
//! memory while frames stream past, and decides whether the stream is
//! variable frame rate.

use std::cmp::Ordering;
use std::time::Duration;

use ffmpeg_next::Rational;

/// Convert a tick count to seconds. Lossy; use only for display.
pub fn ticks_to_seconds(ticks: i64, time_base: Rational) -> f64 {
    ticks as f64 * time_base.numerator() as f64 / time_base.denominator().max(1) as f64
}

/// Convert a non-negative tick count to a [`Duration`]. Lossy.
pub fn ticks_to_duration(ticks: i64, time_base: Rational) -> Duration {
    Duration::from_secs_f64(ticks_to_seconds(ticks, time_base).max(0.0))
}

/// Compare two timestamps expressed in different time bases, exactly.
///
/// Cross-multiplies in 128-bit integers, so no rounding is involved.
pub fn compare_timestamps(a: i64, a_base: Rational, b: i64, b_base: Rational) -> Ordering {
    let (a_num, a_den) = normalized(a_base);
    let (b_num, b_den) = normalized(b_base);
    let left = a as i128 * a_num * b_den;
    let right = b as i128 * b_num * a_den;
    left.cmp(&right)
}

/// Ticks spanned by one frame period at `frame_rate`, in `time_base`.
///
/// Returns `None` when the frame rate is unknown (zero) or the period
/// rounds to zero ticks.
pub fn frame_period_ticks(frame_rate: Rational, time_base: Rational) -> Option<i64> {
    let (rate_num, rate_den) = normalized(frame_rate);
    let (base_num, base_den) = normalized(time_base);
    if rate_num <= 0 || base_num <= 0 {
        return None;
    }
    // period = rate_den / rate_num seconds = (rate_den * base_den) / (rate_num * base_num) ticks
    let numerator = rate_den * base_den;
    let denominator = rate_num * base_num;
    let ticks = (numerator + denominator / 2) / denominator;
    if ticks > 0 { i64::try_from(ticks).ok() } else { None }
}

fn normalized(rational: Rational) -> (i128, i128) {
    let num = rational.numerator() as i128;
    let den = rational.denominator() as i128;
    if den < 0 { (-num, -den) } else { (num, den.max(1)) }
}

/// Streaming frame-interval statistics.
///
/// Fed one frame duration at a time by the synchronizer. The exact total is
/// kept in ticks; mean and deviation are tracked in seconds with Welford's
/// algorithm.
#[derive(Debug, Clone)]
pub struct TimingSummary {
    time_base: Rational,
    frames: u64,
    total_ticks: i64,
    min_ticks: Option<i64>,
    max_ticks: Option<i64>,
    intervals: u64,
    mean: f64,
    sum_squared_deviation: f64,
}

impl TimingSummary {
    /// Create an empty summary for a stream with the given time base.
    pub fn new(time_base: Rational) -> Self {
        Self {
            time_base,
            frames: 0,
            total_ticks: 0,
            min_ticks: None,
            max_ticks: None,
            intervals: 0,
            mean: 0.0,
            sum_squared_deviation: 0.0,
        }
    }

    /// Record one frame's duration in ticks.
    ///
    /// Zero-length durations count towards the frame total but are left
    /// out of the interval statistics.
    pub fn record(&mut self, duration: i64) {
        self.frames += 1;
        self.total_ticks += duration;
        if duration <= 0 {
            return;
        }

        self.min_ticks = Some(self.min_ticks.map_or(duration, |m| m.min(duration)));
        self.max_ticks = Some(self.max_ticks.map_or(duration, |m| m.max(duration)));

        let seconds = ticks_to_seconds(duration, self.time_base);
        self.intervals += 1;
        let delta = seconds - self.mean;
        self.mean += delta / self.intervals as f64;
        self.sum_squared_deviation += delta * (seconds - self.mean);
    }

    /// Number of frames recorded.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Exact sum of all recorded durations, in ticks.
    pub fn total_ticks(&self) -> i64 {
        self.total_ticks
    }

    /// Time base of the recorded ticks.
    pub fn time_base(&self) -> Rational {
        self.time_base
    }

    /// Shortest positive frame interval, in ticks.
    pub fn min_interval(&self) -> Option<i64> {
        self.min_ticks
    }

    /// Longest frame interval, in ticks.
    pub fn max_interval(&self) -> Option<i64> {
        self.max_ticks
    }

    /// Mean frame interval in seconds (0 when nothing was recorded).
    pub fn mean_interval_seconds(&self) -> f64 {
        self.mean
    }

    /// Population standard deviation of frame intervals in seconds.
    pub fn interval_stddev_seconds(&self) -> f64 {
        if self.intervals == 0 {
            0.0
        } else {
            (self.sum_squared_deviation / self.intervals as f64).max(0.0).sqrt()
        }
    }

    /// Whether the stream looks variable frame rate: the interval standard
    /// deviation exceeds 10% of the mean interval.
    pub fn is_variable_frame_rate(&self) -> bool {
        self.mean > 0.0 && self.interval_stddev_seconds() / self.mean > 0.10
    }

    /// Exact total duration as wall-clock time. Lossy.
    pub fn total_duration(&self) -> Duration {
        ticks_to_duration(self.total_ticks, self.time_base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compare_across_time_bases_is_exact() {
        // 1001/30000 s == 3003/90000 s
        assert_eq!(
            compare_timestamps(1001, Rational::new(1, 30000), 3003, Rational::new(1, 90000)),
            Ordering::Equal
        );
        assert_eq!(
            compare_timestamps(1, Rational::new(1, 1000), 89, Rational::new(1, 90000)),
            Ordering::Greater
        );
        assert_eq!(
            compare_timestamps(-5, Rational::new(1, 1000), 0, Rational::new(1, 48000)),
            Ordering::Less
        );
    }

    #[test]
    fn frame_period_in_ticks() {
        assert_eq!(
            frame_period_ticks(Rational::new(25, 1), Rational::new(1, 1000)),
            Some(40)
        );
        assert_eq!(
            frame_period_ticks(Rational::new(30000, 1001), Rational::new(1, 90000)),
            Some(3003)
        );
        assert_eq!(frame_period_ticks(Rational::new(0, 1), Rational::new(1, 1000)), None);
    }

    #[test]
    fn constant_rate_is_not_vfr() {
        let mut summary = TimingSummary::new(Rational::new(1, 1000));
        for _ in 0..10 {
            summary.record(40);
        }
        assert_eq!(summary.frames(), 10);
        assert_eq!(summary.total_ticks(), 400);
        assert!(!summary.is_variable_frame_rate());
        assert!((summary.mean_interval_seconds() - 0.040).abs() < 1e-9);
        assert!(summary.interval_stddev_seconds() < 1e-9);
    }

    #[test]
    fn irregular_intervals_are_vfr() {
        let mut summary = TimingSummary::new(Rational::new(1, 1000));
        for duration in [40, 33, 67, 20, 100] {
            summary.record(duration);
        }
        assert_eq!(summary.total_ticks(), 260);
        assert_eq!(summary.min_interval(), Some(20));
        assert_eq!(summary.max_interval(), Some(100));
        assert!(summary.is_variable_frame_rate());
    }

    #[test]
    fn zero_durations_count_as_frames_only() {
        let mut summary = TimingSummary::new(Rational::new(1, 90000));
        summary.record(3000);
        summary.record(0);
        assert_eq!(summary.frames(), 2);
        assert_eq!(summary.total_ticks(), 3000);
        assert_eq!(summary.min_interval(), Some(3000));
    }
}
