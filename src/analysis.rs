//! Entry points used by the service, CLIs and API: page → series → metrics
//! or two-station alignment.

use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::analysis_error::AnalysisError;
use crate::correlation::{CorrelationEngine, CorrelationResult, ShiftRange};
use crate::metrics::{summarize_levels, LevelSummary};
use crate::parser::{SourceOrder, TidePage};
use crate::series::{Observation, SeriesBuilder, TimeSeries};
use crate::stations::Station;
use crate::timestamps::TimeNormalizer;

/// Series extracted from one station page, with parse diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Extraction {
    pub station: Station,
    pub series: TimeSeries,
    pub source_order: SourceOrder,
    pub rows_seen: usize,
    pub skipped_rows: usize,
}

impl Extraction {
    pub fn is_no_data(&self) -> bool {
        self.series.is_empty()
    }
}

/// Page-to-series pipeline with its time zone and window settings.
#[derive(Debug, Clone, Copy, Default)]
pub struct Extractor {
    normalizer: TimeNormalizer,
    builder: SeriesBuilder,
}

impl Extractor {
    pub fn new(normalizer: TimeNormalizer, builder: SeriesBuilder) -> Self {
        Self {
            normalizer,
            builder,
        }
    }

    /// Bad rows are skipped and counted; only the series-level duplicate
    /// policy can fail the extraction. A page without readings yields an
    /// empty series.
    #[instrument(skip(self, markup), fields(station = %station.name, markup_size = markup.len()))]
    pub fn extract(&self, station: &Station, markup: &str) -> Result<Extraction, AnalysisError> {
        let page = TidePage::parse(markup);
        let source_order = page.source_order();

        let mut readings = Vec::new();
        let mut rows_seen = 0;
        let mut skipped_rows = 0;

        for row in page.rows() {
            rows_seen += 1;
            let row = match row {
                Ok(row) => row,
                Err(defect) => {
                    warn!("Skipping row {}: {}", rows_seen, defect);
                    skipped_rows += 1;
                    continue;
                }
            };

            match self.normalizer.normalize(&row.timestamp_text) {
                Ok(instant) => readings.push(Observation::new(instant, row.level)),
                Err(e) => {
                    warn!("Skipping row {}: {} (level='{}')", rows_seen, e, row.level_text);
                    skipped_rows += 1;
                }
            }
        }

        if skipped_rows > 0 {
            warn!("Skipped {} unparseable rows out of {}", skipped_rows, rows_seen);
        }

        let series = self.builder.build(readings, source_order)?;
        if series.is_empty() {
            warn!("No data for station {}", station.name);
        } else {
            debug!(
                "Extracted {} observations for {} ({:?})",
                series.len(),
                station.name,
                source_order
            );
        }

        Ok(Extraction {
            station: station.clone(),
            series,
            source_order,
            rows_seen,
            skipped_rows,
        })
    }
}

/// Extracts with London time and the default two-day window.
pub fn extract(station: &Station, markup: &str) -> Result<Extraction, AnalysisError> {
    Extractor::default().extract(station, markup)
}

pub fn summarize(series: &TimeSeries) -> Result<LevelSummary, AnalysisError> {
    summarize_levels(series)
}

/// Zero-shift correlation in percent.
pub fn correlate(a: &TimeSeries, b: &TimeSeries) -> Result<f64, AnalysisError> {
    CorrelationEngine::default().zero_shift_correlation(a, b)
}

pub fn best_alignment(
    a: &TimeSeries,
    b: &TimeSeries,
    range: ShiftRange,
) -> Result<CorrelationResult, AnalysisError> {
    CorrelationEngine::default().search_best_shift(a, b, range)
}
