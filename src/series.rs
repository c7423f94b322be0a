use chrono::{DateTime, Duration};
use chrono_tz::Tz;
use serde::Serialize;
use tracing::{debug, warn};

use crate::analysis_error::AnalysisError;
use crate::parser::SourceOrder;

/// Native sampling interval of the station pages.
pub const SAMPLE_INTERVAL_MINUTES: i64 = 15;

/// Longest window accepted from configuration or requests: 30 days.
pub const MAX_WINDOW_HOURS: i64 = 30 * 24;

/// One reading: an instant in station time and a level in metres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Observation {
    pub instant: DateTime<Tz>,
    pub level: f64,
}

impl Observation {
    pub fn new(instant: DateTime<Tz>, level: f64) -> Self {
        Self { instant, level }
    }
}

/// Chronologically ordered readings for one station. Instants are strictly
/// increasing; an empty series means the station had no data.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeSeries {
    observations: Vec<Observation>,
}

impl TimeSeries {
    pub fn empty() -> Self {
        Self {
            observations: Vec::new(),
        }
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn first(&self) -> Option<&Observation> {
        self.observations.first()
    }

    pub fn last(&self) -> Option<&Observation> {
        self.observations.last()
    }

    pub fn levels(&self) -> impl Iterator<Item = f64> + '_ {
        self.observations.iter().map(|o| o.level)
    }

    /// A copy with every instant moved by `minutes`, or `None` when an
    /// instant would leave the representable range.
    pub fn shifted(&self, minutes: i64) -> Option<Self> {
        let offset = Duration::try_minutes(minutes)?;
        let observations = self
            .observations
            .iter()
            .map(|o| {
                o.instant
                    .checked_add_signed(offset)
                    .map(|instant| Observation::new(instant, o.level))
            })
            .collect::<Option<Vec<_>>>()?;
        Some(Self { observations })
    }
}

/// Trailing horizon applied after assembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Window {
    /// Keep everything the page provided.
    All,
    /// Keep the `n` most recent observations.
    LastSamples(usize),
    /// Keep observations no older than this, measured back from the most
    /// recent instant. The boundary instant itself is kept.
    LastDuration(Duration),
}

impl Window {
    /// Two days of readings, measured by timestamp.
    pub fn two_days() -> Self {
        Window::LastDuration(Duration::hours(48))
    }

    /// `0` means no truncation. Negative values and horizons longer than
    /// [`MAX_WINDOW_HOURS`] are rejected.
    pub fn from_hours(hours: i64) -> Result<Self, AnalysisError> {
        if hours == 0 {
            return Ok(Window::All);
        }
        if !(1..=MAX_WINDOW_HOURS).contains(&hours) {
            return Err(AnalysisError::InvalidWindow(format!(
                "{hours} hours is outside 0..={MAX_WINDOW_HOURS}"
            )));
        }
        Duration::try_hours(hours)
            .map(Window::LastDuration)
            .ok_or_else(|| AnalysisError::InvalidWindow(format!("{hours} hours is out of bounds")))
    }
}

impl Default for Window {
    fn default() -> Self {
        Self::two_days()
    }
}

/// What to do when two readings share an instant or arrive out of order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicatePolicy {
    /// Sort chronologically and keep the first occurrence of each instant.
    #[default]
    KeepFirst,
    /// Refuse the input.
    Reject,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SeriesError {
    #[error("non-monotonic series: {previous} is followed by {next}")]
    NonMonotonic { previous: String, next: String },
}

/// Assembles normalized readings into a [`TimeSeries`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SeriesBuilder {
    window: Window,
    duplicates: DuplicatePolicy,
}

impl SeriesBuilder {
    pub fn new(window: Window) -> Self {
        Self {
            window,
            duplicates: DuplicatePolicy::default(),
        }
    }

    pub fn with_duplicate_policy(mut self, duplicates: DuplicatePolicy) -> Self {
        self.duplicates = duplicates;
        self
    }

    pub fn window(&self) -> Window {
        self.window
    }

    pub fn build<I>(&self, readings: I, order: SourceOrder) -> Result<TimeSeries, SeriesError>
    where
        I: IntoIterator<Item = Observation>,
    {
        let mut observations: Vec<Observation> = readings.into_iter().collect();
        if order == SourceOrder::NewestFirst {
            observations.reverse();
        }

        let anomalies = observations
            .windows(2)
            .filter(|pair| pair[1].instant <= pair[0].instant)
            .count();

        if anomalies > 0 {
            if let (DuplicatePolicy::Reject, Some(pair)) = (
                self.duplicates,
                observations
                    .windows(2)
                    .find(|pair| pair[1].instant <= pair[0].instant),
            ) {
                return Err(SeriesError::NonMonotonic {
                    previous: pair[0].instant.to_rfc3339(),
                    next: pair[1].instant.to_rfc3339(),
                });
            }

            // Stable sort, so the earlier occurrence of an instant stays in front.
            observations.sort_by_key(|o| o.instant);
            let before = observations.len();
            observations.dedup_by_key(|o| o.instant);
            warn!(
                "Found {} out-of-order readings, dropped {} duplicate instants",
                anomalies,
                before - observations.len()
            );
        }

        let assembled = observations.len();
        let observations = self.truncate(observations);
        debug!(
            "Built series with {} of {} observations ({:?})",
            observations.len(),
            assembled,
            self.window
        );

        Ok(TimeSeries { observations })
    }

    fn truncate(&self, mut observations: Vec<Observation>) -> Vec<Observation> {
        match self.window {
            Window::All => observations,
            Window::LastSamples(n) => {
                let start = observations.len().saturating_sub(n);
                observations.split_off(start)
            }
            Window::LastDuration(horizon) => {
                let Some(latest) = observations.last().map(|o| o.instant) else {
                    return observations;
                };
                let Some(cutoff) = latest.checked_sub_signed(horizon) else {
                    return observations;
                };
                let start = observations.partition_point(|o| o.instant < cutoff);
                observations.split_off(start)
            }
        }
    }
}
