use crate::series::SeriesError;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AnalysisError {
    #[error("No data for station {station}")]
    NoData { station: String },
    #[error("Insufficient data: {found} observations, at least {required} needed")]
    InsufficientData { found: usize, required: usize },
    #[error("Insufficient overlap: {found} common instants, at least {required} needed")]
    InsufficientOverlap { found: usize, required: usize },
    #[error("Degenerate series: {series} has zero variance over the overlap")]
    DegenerateSeries { series: &'static str },
    #[error("Invalid shift range: {0}")]
    InvalidShiftRange(String),
    #[error("Invalid window: {0}")]
    InvalidWindow(String),
    #[error(transparent)]
    NonMonotonic(#[from] SeriesError),
}
