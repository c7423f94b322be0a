use serde::Serialize;
use tracing::{debug, instrument};

use crate::analysis_error::AnalysisError;
use crate::series::{Observation, TimeSeries, SAMPLE_INTERVAL_MINUTES};

/// Fewest common instants accepted for a correlation. Two points always
/// correlate perfectly, so a handful of tide samples is the useful floor.
pub const DEFAULT_MIN_OVERLAP: usize = 8;

/// Correlations (in percent) closer than this are treated as tied.
pub const TIE_TOLERANCE: f64 = 1e-9;

/// Largest shift, either way, a search or a single correlation may use.
pub const MAX_SHIFT_MINUTES: i64 = 7 * 24 * 60;

/// Most candidate shifts a single search may evaluate.
pub const MAX_SHIFTS: i64 = 2_000;

/// Candidate shifts: `start` inclusive, `end` exclusive, every `step` minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ShiftRange {
    pub start_minutes: i64,
    pub end_minutes: i64,
    pub step_minutes: i64,
}

impl ShiftRange {
    /// Shifts must stay within [`MAX_SHIFT_MINUTES`] and number at most
    /// [`MAX_SHIFTS`].
    pub fn new(start_minutes: i64, end_minutes: i64, step_minutes: i64) -> Result<Self, AnalysisError> {
        let range = Self {
            start_minutes,
            end_minutes,
            step_minutes,
        };
        range.validate()?;
        Ok(range)
    }

    /// `-range..range` in steps of `step`.
    pub fn symmetric(range_minutes: i64, step_minutes: i64) -> Result<Self, AnalysisError> {
        let start = range_minutes.checked_neg().ok_or_else(|| {
            AnalysisError::InvalidShiftRange(format!("range {range_minutes} is out of bounds"))
        })?;
        Self::new(start, range_minutes, step_minutes)
    }

    pub fn validate(&self) -> Result<(), AnalysisError> {
        let (start, end, step) = (self.start_minutes, self.end_minutes, self.step_minutes);
        if step <= 0 {
            return Err(AnalysisError::InvalidShiftRange(format!(
                "step must be positive, got {step}"
            )));
        }
        if start >= end {
            return Err(AnalysisError::InvalidShiftRange(format!(
                "empty range {start}..{end}"
            )));
        }
        if start < -MAX_SHIFT_MINUTES || end > MAX_SHIFT_MINUTES {
            return Err(AnalysisError::InvalidShiftRange(format!(
                "range {start}..{end} exceeds {MAX_SHIFT_MINUTES} minutes either way"
            )));
        }
        let count = (end - start - 1) / step + 1;
        if count > MAX_SHIFTS {
            return Err(AnalysisError::InvalidShiftRange(format!(
                "{count} shifts requested, at most {MAX_SHIFTS} allowed"
            )));
        }
        Ok(())
    }

    pub fn shifts(&self) -> impl Iterator<Item = i64> {
        let step = usize::try_from(self.step_minutes).unwrap_or(1).max(1);
        (self.start_minutes..self.end_minutes).step_by(step)
    }
}

impl Default for ShiftRange {
    /// Six hours either side in steps of one sampling interval.
    fn default() -> Self {
        Self {
            start_minutes: -6 * 60,
            end_minutes: 6 * 60,
            step_minutes: SAMPLE_INTERVAL_MINUTES,
        }
    }
}

/// Correlation (percent) of series A against series B moved by `shift_minutes`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ShiftCorrelation {
    pub shift_minutes: i64,
    pub correlation: f64,
    pub overlap: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationResult {
    pub best: ShiftCorrelation,
    /// Every evaluated shift, in iteration order.
    pub samples: Vec<ShiftCorrelation>,
    /// Shifts whose overlap was too small or flat to correlate.
    pub skipped_shifts: Vec<i64>,
}

impl CorrelationResult {
    /// Minutes a feature of A takes to show up in B. Positive when B lags A.
    pub fn travel_time_minutes(&self) -> i64 {
        -self.best.shift_minutes
    }

    pub fn best_shift_label(&self) -> String {
        format_shift(self.best.shift_minutes)
    }
}

/// Formats a shift as `1h30m`, with a leading `-` when negative.
pub fn format_shift(minutes: i64) -> String {
    let magnitude = minutes.unsigned_abs();
    let label = format!("{}h{}m", magnitude / 60, magnitude % 60);
    if minutes < 0 {
        format!("-{label}")
    } else {
        label
    }
}

/// Pearson correlation between two level series joined on common instants.
///
/// Shifting moves series B: `shifted_correlation(a, b, s)` pairs `A(t)` with
/// `B(t - s)`. When B repeats A's curve 30 minutes later the best shift is
/// therefore `-30`, reported as a travel time of 30 minutes.
///
/// Ties in the shift search go to the shift closest to zero; between `+s`
/// and `-s` the negative one wins.
#[derive(Debug, Clone, Copy)]
pub struct CorrelationEngine {
    min_overlap: usize,
}

impl CorrelationEngine {
    pub fn new(min_overlap: usize) -> Self {
        Self {
            min_overlap: min_overlap.max(2),
        }
    }

    pub fn min_overlap(&self) -> usize {
        self.min_overlap
    }

    pub fn zero_shift_correlation(&self, a: &TimeSeries, b: &TimeSeries) -> Result<f64, AnalysisError> {
        self.correlate(a, b).map(|(correlation, _)| correlation)
    }

    pub fn shifted_correlation(
        &self,
        a: &TimeSeries,
        b: &TimeSeries,
        shift_minutes: i64,
    ) -> Result<f64, AnalysisError> {
        self.correlate(a, &shift_series(b, shift_minutes)?)
            .map(|(correlation, _)| correlation)
    }

    #[instrument(skip(self, a, b), fields(a_len = a.len(), b_len = b.len()))]
    pub fn search_best_shift(
        &self,
        a: &TimeSeries,
        b: &TimeSeries,
        range: ShiftRange,
    ) -> Result<CorrelationResult, AnalysisError> {
        range.validate()?;

        let mut samples = Vec::new();
        let mut skipped_shifts = Vec::new();
        let mut nearest_error: Option<(i64, AnalysisError)> = None;

        for shift in range.shifts() {
            match shift_series(b, shift).and_then(|shifted| self.correlate(a, &shifted)) {
                Ok((correlation, overlap)) => {
                    debug!("{:>4} mins ---> {:.1}% correlation ({} points)", shift, correlation, overlap);
                    samples.push(ShiftCorrelation {
                        shift_minutes: shift,
                        correlation,
                        overlap,
                    });
                }
                Err(e) => {
                    debug!("{:>4} mins ---> skipped: {}", shift, e);
                    skipped_shifts.push(shift);
                    if nearest_error
                        .as_ref()
                        .map_or(true, |(s, _)| closer_to_zero(shift, *s))
                    {
                        nearest_error = Some((shift, e));
                    }
                }
            }
        }

        let Some(best) = pick_best(&samples) else {
            return Err(nearest_error.map(|(_, e)| e).unwrap_or(AnalysisError::InsufficientOverlap {
                found: 0,
                required: self.min_overlap,
            }));
        };

        debug!(
            "Best shift {} with {:.2}% correlation over {} evaluated shifts",
            format_shift(best.shift_minutes),
            best.correlation,
            samples.len()
        );

        Ok(CorrelationResult {
            best,
            samples,
            skipped_shifts,
        })
    }

    /// Correlation in percent plus the number of common instants.
    fn correlate(&self, a: &TimeSeries, b: &TimeSeries) -> Result<(f64, usize), AnalysisError> {
        let (xs, ys) = inner_join(a.observations(), b.observations());
        if xs.len() < self.min_overlap {
            return Err(AnalysisError::InsufficientOverlap {
                found: xs.len(),
                required: self.min_overlap,
            });
        }
        pearson(&xs, &ys).map(|r| (r * 100.0, xs.len()))
    }
}

impl Default for CorrelationEngine {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_OVERLAP)
    }
}

fn shift_series(series: &TimeSeries, shift_minutes: i64) -> Result<TimeSeries, AnalysisError> {
    if shift_minutes.unsigned_abs() > MAX_SHIFT_MINUTES.unsigned_abs() {
        return Err(AnalysisError::InvalidShiftRange(format!(
            "shift {shift_minutes} exceeds {MAX_SHIFT_MINUTES} minutes"
        )));
    }
    series.shifted(shift_minutes).ok_or_else(|| {
        AnalysisError::InvalidShiftRange(format!("shift {shift_minutes} leaves the representable time range"))
    })
}

fn closer_to_zero(candidate: i64, current: i64) -> bool {
    (candidate.unsigned_abs(), candidate) < (current.unsigned_abs(), current)
}

/// Highest correlation; among tied maxima the shift closest to zero,
/// negative before positive.
fn pick_best(samples: &[ShiftCorrelation]) -> Option<ShiftCorrelation> {
    let max = samples
        .iter()
        .map(|s| s.correlation)
        .fold(f64::NEG_INFINITY, f64::max);

    samples
        .iter()
        .filter(|s| s.correlation >= max - TIE_TOLERANCE)
        .min_by_key(|s| (s.shift_minutes.unsigned_abs(), s.shift_minutes))
        .copied()
}

/// Levels at instants present in both series. Both inputs are sorted.
fn inner_join(a: &[Observation], b: &[Observation]) -> (Vec<f64>, Vec<f64>) {
    let mut xs = Vec::with_capacity(a.len().min(b.len()));
    let mut ys = Vec::with_capacity(a.len().min(b.len()));
    let (mut i, mut j) = (0, 0);

    while i < a.len() && j < b.len() {
        match a[i].instant.cmp(&b[j].instant) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                xs.push(a[i].level);
                ys.push(b[j].level);
                i += 1;
                j += 1;
            }
        }
    }

    (xs, ys)
}

/// Two-pass Pearson coefficient in [-1, 1].
fn pearson(xs: &[f64], ys: &[f64]) -> Result<f64, AnalysisError> {
    // Flat input is detected on the raw levels, not on the computed variance.
    if xs.iter().all(|x| *x == xs[0]) {
        return Err(AnalysisError::DegenerateSeries { series: "first" });
    }
    if ys.iter().all(|y| *y == ys[0]) {
        return Err(AnalysisError::DegenerateSeries { series: "second" });
    }

    let n = xs.len() as f64;
    let mean_x = xs.iter().sum::<f64>() / n;
    let mean_y = ys.iter().sum::<f64>() / n;

    let (mut sxx, mut syy, mut sxy) = (0.0, 0.0, 0.0);
    for (x, y) in xs.iter().zip(ys) {
        let dx = x - mean_x;
        let dy = y - mean_y;
        sxx += dx * dx;
        syy += dy * dy;
        sxy += dx * dy;
    }

    if sxx == 0.0 {
        return Err(AnalysisError::DegenerateSeries { series: "first" });
    }
    if syy == 0.0 {
        return Err(AnalysisError::DegenerateSeries { series: "second" });
    }

    Ok((sxy / (sxx.sqrt() * syy.sqrt())).clamp(-1.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::SourceOrder;
    use crate::series::{SeriesBuilder, Window};
    use chrono::{Duration, TimeZone};
    use chrono_tz::Europe::London;

    fn series_from(offset_minutes: i64, levels: &[f64]) -> TimeSeries {
        let base = London.with_ymd_and_hms(2020, 1, 14, 0, 0, 0).unwrap();
        SeriesBuilder::new(Window::All)
            .build(
                levels.iter().enumerate().map(|(i, &level)| {
                    Observation::new(base + Duration::minutes(offset_minutes + i as i64 * 15), level)
                }),
                SourceOrder::OldestFirst,
            )
            .unwrap()
    }

    /// Semidiurnal tide around 3 m, sampled every 15 minutes.
    fn tide(samples: usize, offset_minutes: i64) -> TimeSeries {
        let period = 12.42 * 60.0;
        let levels: Vec<f64> = (0..samples)
            .map(|i| {
                let t = (offset_minutes + i as i64 * 15) as f64;
                3.0 + 2.5 * (2.0 * std::f64::consts::PI * t / period).sin()
            })
            .collect();
        series_from(0, &levels)
    }

    #[test]
    fn test_identical_series_correlate_fully() {
        let a = tide(192, 0);
        let r = CorrelationEngine::default().zero_shift_correlation(&a, &a).unwrap();
        assert!((r - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_inverted_series_anticorrelate() {
        let a = series_from(0, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
        let b = series_from(0, &[8.0, 7.0, 6.0, 5.0, 4.0, 3.0, 2.0, 1.0]);
        let r = CorrelationEngine::default().zero_shift_correlation(&a, &b).unwrap();
        assert!((r + 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_only_matching_instants_are_joined() {
        // B is offset by 5 minutes, so nothing lines up.
        let a = series_from(0, &[1.0; 10]);
        let b = series_from(5, &[1.0; 10]);
        let result = CorrelationEngine::default().zero_shift_correlation(&a, &b);
        assert_eq!(
            result,
            Err(AnalysisError::InsufficientOverlap {
                found: 0,
                required: DEFAULT_MIN_OVERLAP
            })
        );
    }

    #[test]
    fn test_overlap_below_minimum() {
        let a = series_from(0, &[1.0, 2.0, 3.0, 4.0, 5.0]);
        let result = CorrelationEngine::default().zero_shift_correlation(&a, &a);
        assert!(matches!(result, Err(AnalysisError::InsufficientOverlap { found: 5, .. })));
    }

    #[test]
    fn test_minimum_overlap_never_below_two() {
        assert_eq!(CorrelationEngine::new(0).min_overlap(), 2);
    }

    #[test]
    fn test_flat_series_is_degenerate() {
        let a = series_from(0, &[3.0; 10]);
        let b = series_from(0, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0]);
        let engine = CorrelationEngine::default();

        assert_eq!(
            engine.zero_shift_correlation(&a, &b),
            Err(AnalysisError::DegenerateSeries { series: "first" })
        );
        assert_eq!(
            engine.zero_shift_correlation(&b, &a),
            Err(AnalysisError::DegenerateSeries { series: "second" })
        );
    }

    #[test]
    fn test_flat_level_not_exact_in_binary_is_degenerate() {
        let rising: Vec<f64> = (1..=10).map(f64::from).collect();
        let engine = CorrelationEngine::default();

        for level in [0.1, 0.585, 3.3] {
            let flat = series_from(0, &[level; 10]);
            assert_eq!(
                engine.zero_shift_correlation(&flat, &series_from(0, &rising)),
                Err(AnalysisError::DegenerateSeries { series: "first" }),
                "level {level}"
            );
            assert_eq!(
                engine.zero_shift_correlation(&series_from(0, &rising), &flat),
                Err(AnalysisError::DegenerateSeries { series: "second" }),
                "level {level}"
            );
        }
    }

    #[test]
    fn test_shifted_correlation_rejects_oversized_shift() {
        let a = tide(16, 0);
        let engine = CorrelationEngine::default();

        for shift in [MAX_SHIFT_MINUTES + 15, -MAX_SHIFT_MINUTES - 15, i64::MAX / 1000, i64::MIN] {
            assert!(
                matches!(
                    engine.shifted_correlation(&a, &a, shift),
                    Err(AnalysisError::InvalidShiftRange(_))
                ),
                "expected shift {shift} to be rejected"
            );
        }
    }

    #[test]
    fn test_search_rejects_unvalidated_range() {
        let a = tide(16, 0);
        let range = ShiftRange {
            start_minutes: -1_000_000_000,
            end_minutes: 1_000_000_000,
            step_minutes: 1,
        };
        let result = CorrelationEngine::default().search_best_shift(&a, &a, range);
        assert!(matches!(result, Err(AnalysisError::InvalidShiftRange(_))));
    }

    #[test]
    fn test_small_variance_on_large_levels_is_stable() {
        let base: Vec<f64> = (0..20).map(|i| ((i * 7) % 11) as f64 * 1e-6).collect();
        let a: Vec<f64> = base.iter().map(|v| 1e6 + v).collect();
        let b: Vec<f64> = base.iter().map(|v| 2e6 + 2.0 * v).collect();
        let r = CorrelationEngine::default()
            .zero_shift_correlation(&series_from(0, &a), &series_from(0, &b))
            .unwrap();
        assert!(r > 99.9, "got {r}");
    }

    #[test]
    fn test_shifted_correlation_realigns_lagging_series() {
        let a = tide(96, 0);
        // B reads what A read 45 minutes earlier.
        let b = tide(96, -45);
        let engine = CorrelationEngine::default();

        assert!(engine.zero_shift_correlation(&a, &b).unwrap() < 99.0);
        let r = engine.shifted_correlation(&a, &b, -45).unwrap();
        assert!((r - 100.0).abs() < 1e-6);
    }

    #[test]
    fn test_search_on_identical_series_finds_zero() {
        let a = tide(192, 0);
        let result = CorrelationEngine::default()
            .search_best_shift(&a, &a.clone(), ShiftRange::default())
            .unwrap();

        assert_eq!(result.best.shift_minutes, 0);
        assert!((result.best.correlation - 100.0).abs() < 1e-9);
        assert_eq!(result.samples.len(), 48);
        assert!(result.skipped_shifts.is_empty());
    }

    #[test]
    fn test_search_finds_thirty_minute_lag() {
        // B's curve at t+30 equals A's curve at t.
        let a = series_from(0, &[1.0, 2.0, 3.0, 2.0, 1.0]);
        let b = series_from(30, &[1.0, 2.0, 3.0, 2.0, 1.0]);
        let engine = CorrelationEngine::new(3);
        let range = ShiftRange::symmetric(60, 15).unwrap();

        let result = engine.search_best_shift(&a, &b, range).unwrap();

        assert_eq!(result.best.shift_minutes, -30);
        assert_eq!(result.travel_time_minutes(), 30);
        assert!((result.best.correlation - 100.0).abs() < 1e-9);
        assert_eq!(result.best.overlap, 5);
    }

    #[test]
    fn test_tie_goes_to_negative_shift_nearest_zero() {
        // Alternating levels: shifts of +/-15 and +/-45 all line up perfectly.
        let levels: Vec<f64> = (0..16).map(|i| if i % 2 == 0 { 1.0 } else { 2.0 }).collect();
        let a = series_from(0, &levels);
        let b = series_from(15, &levels);
        let range = ShiftRange::symmetric(60, 15).unwrap();

        let result = CorrelationEngine::default().search_best_shift(&a, &b, range).unwrap();

        let perfect: Vec<i64> = result
            .samples
            .iter()
            .filter(|s| (s.correlation - 100.0).abs() < 1e-6)
            .map(|s| s.shift_minutes)
            .collect();
        assert!(perfect.contains(&15) && perfect.contains(&-15));
        assert_eq!(result.best.shift_minutes, -15);
    }

    #[test]
    fn test_every_shift_is_recorded_in_order() {
        let a = tide(96, 0);
        let range = ShiftRange::new(-30, 30, 15).unwrap();
        let result = CorrelationEngine::default().search_best_shift(&a, &a, range).unwrap();
        let shifts: Vec<i64> = result.samples.iter().map(|s| s.shift_minutes).collect();
        assert_eq!(shifts, vec![-30, -15, 0, 15]);
    }

    #[test]
    fn test_search_without_any_overlap_fails() {
        let a = series_from(0, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
        let b = series_from(5, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
        let result = CorrelationEngine::default().search_best_shift(&a, &b, ShiftRange::default());
        assert!(matches!(result, Err(AnalysisError::InsufficientOverlap { found: 0, .. })));
    }

    #[test]
    fn test_invalid_ranges() {
        assert!(ShiftRange::new(0, 60, 0).is_err());
        assert!(ShiftRange::new(60, 0, 15).is_err());
        assert!(ShiftRange::symmetric(0, 15).is_err());
    }

    #[test]
    fn test_range_bounds() {
        assert!(ShiftRange::symmetric(MAX_SHIFT_MINUTES, 15).is_ok());
        assert!(ShiftRange::symmetric(MAX_SHIFT_MINUTES + 1, 15).is_err());
        // Within bounds, but too many shifts
        assert!(ShiftRange::symmetric(MAX_SHIFT_MINUTES, 1).is_err());
        assert!(ShiftRange::symmetric(1_000_000_000, 1).is_err());
        assert!(ShiftRange::symmetric(i64::MAX, 15).is_err());
        assert!(ShiftRange::symmetric(i64::MIN, 15).is_err());
        assert!(ShiftRange::new(-10, 10, i64::MAX).is_ok());
        assert_eq!(ShiftRange::new(-10, 10, i64::MAX).unwrap().shifts().count(), 1);
    }

    #[test]
    fn test_format_shift() {
        assert_eq!(format_shift(0), "0h0m");
        assert_eq!(format_shift(90), "1h30m");
        assert_eq!(format_shift(-45), "-0h45m");
        assert_eq!(format_shift(-360), "-6h0m");
    }
}
