use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::analysis::{Extraction, Extractor};
use crate::analysis_error::AnalysisError;
use crate::correlation::{CorrelationEngine, CorrelationResult, ShiftRange};
use crate::fetcher::DocumentSource;
use crate::metrics::{summarize_levels, LevelSummary};
use crate::parser::SourceOrder;
use crate::series::{SeriesBuilder, TimeSeries, Window};
use crate::stations::{Station, StationRegistry};
use crate::timestamps::TimeNormalizer;

/// Stations fetched at once by [`TideService::summarize_all`].
const PARALLEL_FETCHES: usize = 4;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Unknown station: {0}")]
    UnknownStation(String),
    #[error(transparent)]
    Analysis(#[from] AnalysisError),
}

#[derive(Debug, Clone, Serialize)]
pub struct StationSummary {
    pub station: Station,
    pub source_order: SourceOrder,
    pub skipped_rows: usize,
    pub summary: LevelSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct Comparison {
    pub first: Station,
    pub second: Station,
    /// `None` when the unshifted series do not overlap enough to correlate.
    pub zero_shift_correlation: Option<f64>,
    pub travel_time_minutes: i64,
    pub alignment: CorrelationResult,
}

/// Fetches station pages and runs them through the analysis pipeline.
///
/// A page that cannot be fetched counts as a station without data; it never
/// aborts a multi-station run.
pub struct TideService<S> {
    source: Arc<S>,
    registry: Arc<StationRegistry>,
    normalizer: TimeNormalizer,
    window: Window,
    engine: CorrelationEngine,
    shift_range: ShiftRange,
}

impl<S> Clone for TideService<S> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            registry: Arc::clone(&self.registry),
            normalizer: self.normalizer,
            window: self.window,
            engine: self.engine,
            shift_range: self.shift_range,
        }
    }
}

impl<S: DocumentSource> TideService<S> {
    pub fn new(source: S, registry: StationRegistry) -> Self {
        Self {
            source: Arc::new(source),
            registry: Arc::new(registry),
            normalizer: TimeNormalizer::default(),
            window: Window::default(),
            engine: CorrelationEngine::default(),
            shift_range: ShiftRange::default(),
        }
    }

    pub fn with_timezone(mut self, normalizer: TimeNormalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn with_window(mut self, window: Window) -> Self {
        self.window = window;
        self
    }

    pub fn with_engine(mut self, engine: CorrelationEngine) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_shift_range(mut self, shift_range: ShiftRange) -> Self {
        self.shift_range = shift_range;
        self
    }

    pub fn registry(&self) -> &StationRegistry {
        &self.registry
    }

    pub fn shift_range(&self) -> ShiftRange {
        self.shift_range
    }

    pub fn resolve(&self, name: &str) -> Result<&Station, ServiceError> {
        self.registry
            .find(name)
            .ok_or_else(|| ServiceError::UnknownStation(name.to_string()))
    }

    /// Fetch and extract one station. Fetch failures become an empty series.
    #[instrument(skip(self, station), fields(station = %station.name))]
    pub async fn extract_station(&self, station: &Station, window: Window) -> Result<Extraction, ServiceError> {
        let markup = match self.source.fetch(station).await {
            Ok(markup) => markup,
            Err(e) => {
                warn!("Couldn't fetch page for {}: {}", station.name, e);
                return Ok(Extraction {
                    station: station.clone(),
                    series: TimeSeries::empty(),
                    source_order: SourceOrder::NewestFirst,
                    rows_seen: 0,
                    skipped_rows: 0,
                });
            }
        };

        let extractor = Extractor::new(self.normalizer, SeriesBuilder::new(window));
        Ok(extractor.extract(station, &markup)?)
    }

    pub async fn summarize_station(&self, name: &str) -> Result<StationSummary, ServiceError> {
        self.summarize_station_with_window(name, self.window).await
    }

    pub async fn summarize_station_with_window(
        &self,
        name: &str,
        window: Window,
    ) -> Result<StationSummary, ServiceError> {
        let station = self.resolve(name)?;
        self.summarize_resolved(station, window).await
    }

    async fn summarize_resolved(&self, station: &Station, window: Window) -> Result<StationSummary, ServiceError> {
        let extraction = self.extract_station(station, window).await?;
        let extraction = require_data(extraction)?;
        let summary = summarize_levels(&extraction.series)?;

        info!(
            "{}: {} observations, level {:.2}m, amplitude {:.2}m",
            station.name, summary.observations, summary.current_level, summary.amplitude
        );

        Ok(StationSummary {
            station: extraction.station,
            source_order: extraction.source_order,
            skipped_rows: extraction.skipped_rows,
            summary,
        })
    }

    /// Every registered station, in registry order.
    #[instrument(skip(self))]
    pub async fn summarize_all(&self) -> Vec<(Station, Result<StationSummary, ServiceError>)> {
        let mut results: Vec<_> = stream::iter(self.registry.stations().iter().enumerate())
            .map(|(index, station)| async move {
                let result = self.summarize_resolved(station, self.window).await;
                (index, station.clone(), result)
            })
            .buffer_unordered(PARALLEL_FETCHES)
            .collect()
            .await;

        results.sort_by_key(|(index, _, _)| *index);
        let failed = results.iter().filter(|(_, _, r)| r.is_err()).count();
        info!("Summarized {} stations, {} without usable data", results.len(), failed);

        results
            .into_iter()
            .map(|(_, station, result)| (station, result))
            .collect()
    }

    pub async fn compare(&self, first: &str, second: &str) -> Result<Comparison, ServiceError> {
        self.compare_with_range(first, second, self.shift_range).await
    }

    /// Fetches both stations concurrently, then searches for the best shift.
    #[instrument(skip(self, range))]
    pub async fn compare_with_range(
        &self,
        first: &str,
        second: &str,
        range: ShiftRange,
    ) -> Result<Comparison, ServiceError> {
        let station_a = self.resolve(first)?;
        let station_b = self.resolve(second)?;

        let (a, b) = tokio::join!(
            self.extract_station(station_a, self.window),
            self.extract_station(station_b, self.window)
        );
        let a = require_data(a?)?;
        let b = require_data(b?)?;

        let zero_shift_correlation = match self.engine.zero_shift_correlation(&a.series, &b.series) {
            Ok(correlation) => Some(correlation),
            Err(e) => {
                debug!("No zero-shift correlation: {}", e);
                None
            }
        };
        let alignment = self.engine.search_best_shift(&a.series, &b.series, range)?;

        info!(
            "{} vs {}: best shift {} at {:.1}% correlation",
            station_a.name,
            station_b.name,
            alignment.best_shift_label(),
            alignment.best.correlation
        );

        Ok(Comparison {
            first: a.station,
            second: b.station,
            zero_shift_correlation,
            travel_time_minutes: alignment.travel_time_minutes(),
            alignment,
        })
    }
}

fn require_data(extraction: Extraction) -> Result<Extraction, AnalysisError> {
    if extraction.is_no_data() {
        return Err(AnalysisError::NoData {
            station: extraction.station.name,
        });
    }
    Ok(extraction)
}
