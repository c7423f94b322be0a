use chrono::DateTime;
use chrono_tz::Tz;
use serde::Serialize;

use crate::analysis_error::AnalysisError;
use crate::series::TimeSeries;

/// Rate of change between two consecutive readings, stamped with the later
/// reading's instant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RatePoint {
    pub instant: DateTime<Tz>,
    pub cm_per_min: f64,
}

/// One rate per consecutive pair of observations, aligned to `series[1..]`.
pub type RateSeries = Vec<RatePoint>;

/// Summary statistics over a windowed level series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LevelSummary {
    pub from: DateTime<Tz>,
    pub to: DateTime<Tz>,
    pub observations: usize,
    pub current_level: f64,
    pub current_rate: f64,
    pub min_level: f64,
    pub max_level: f64,
    pub mean_level: f64,
    pub amplitude: f64,
    pub max_rise_rate: f64,
    pub max_fall_rate: f64,
    pub rates: RateSeries,
}

/// Rate series in cm/min using the actual elapsed time between readings.
pub fn rate_series(series: &TimeSeries) -> RateSeries {
    series
        .observations()
        .windows(2)
        .map(|pair| {
            let elapsed = (pair[1].instant - pair[0].instant).num_seconds() as f64 / 60.0;
            RatePoint {
                instant: pair[1].instant,
                cm_per_min: (pair[1].level - pair[0].level) * 100.0 / elapsed,
            }
        })
        .collect()
}

pub fn summarize_levels(series: &TimeSeries) -> Result<LevelSummary, AnalysisError> {
    let observations = series.observations();
    let (Some(first), Some(last)) = (observations.first(), observations.last()) else {
        return Err(AnalysisError::InsufficientData {
            found: 0,
            required: 2,
        });
    };
    if observations.len() < 2 {
        return Err(AnalysisError::InsufficientData {
            found: observations.len(),
            required: 2,
        });
    }

    let min_level = series.levels().fold(f64::INFINITY, f64::min);
    let max_level = series.levels().fold(f64::NEG_INFINITY, f64::max);
    let mean_level = series.levels().sum::<f64>() / observations.len() as f64;

    let rates = rate_series(series);
    let max_rise_rate = rates.iter().map(|r| r.cm_per_min).fold(f64::NEG_INFINITY, f64::max);
    let max_fall_rate = rates.iter().map(|r| r.cm_per_min).fold(f64::INFINITY, f64::min);
    let current_rate = rates.last().map(|r| r.cm_per_min).unwrap_or_default();

    Ok(LevelSummary {
        from: first.instant,
        to: last.instant,
        observations: observations.len(),
        current_level: last.level,
        current_rate,
        min_level,
        max_level,
        mean_level,
        amplitude: max_level - min_level,
        max_rise_rate,
        max_fall_rate,
        rates,
    })
}
