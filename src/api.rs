use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

use crate::analysis_error::AnalysisError;
use crate::correlation::ShiftRange;
use crate::fetcher::DocumentSource;
use crate::series::Window;
use crate::services::{Comparison, ServiceError, StationSummary, TideService};
use crate::stations::Station;

pub struct AppState<S> {
    pub tide_service: TideService<S>,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            tide_service: self.tide_service.clone(),
        }
    }
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Deserialize)]
pub struct SummaryParams {
    pub window_hours: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CorrelationParams {
    pub station1: String,
    pub station2: String,
    pub range_minutes: Option<i64>,
    pub step_minutes: Option<i64>,
}

pub struct ApiError(ServiceError);

impl From<ServiceError> for ApiError {
    fn from(e: ServiceError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ServiceError::UnknownStation(_) => StatusCode::NOT_FOUND,
            ServiceError::Analysis(AnalysisError::InvalidShiftRange(_) | AnalysisError::InvalidWindow(_)) => {
                StatusCode::BAD_REQUEST
            }
            ServiceError::Analysis(_) => StatusCode::UNPROCESSABLE_ENTITY,
        };
        if status == StatusCode::NOT_FOUND {
            warn!("{}", self.0);
        } else {
            error!("Request failed: {}", self.0);
        }
        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

pub fn create_router<S>(state: AppState<S>) -> Router
where
    S: DocumentSource + 'static,
{
    let api_routes = Router::new()
        .route("/health", get(health))
        .route("/stations", get(list_stations::<S>))
        .route("/stations/{name}/summary", get(get_summary::<S>))
        .route("/correlation", get(get_correlation::<S>))
        .with_state(state);

    Router::new().nest("/api/v1", api_routes)
}

#[instrument]
async fn health() -> impl IntoResponse {
    debug!("Health check requested");
    let response = HealthResponse {
        status: "healthy".to_string(),
    };
    (StatusCode::OK, Json(response))
}

#[instrument(skip(state))]
async fn list_stations<S: DocumentSource>(State(state): State<AppState<S>>) -> Json<Vec<Station>> {
    let stations = state.tide_service.registry().stations().to_vec();
    debug!("Listing {} stations", stations.len());
    Json(stations)
}

#[instrument(skip(state), fields(name = %name))]
async fn get_summary<S: DocumentSource>(
    State(state): State<AppState<S>>,
    Path(name): Path<String>,
    Query(params): Query<SummaryParams>,
) -> Result<Json<StationSummary>, ApiError> {
    let summary = match params.window_hours {
        Some(hours) => {
            let window = Window::from_hours(hours).map_err(ServiceError::from)?;
            state
                .tide_service
                .summarize_station_with_window(&name, window)
                .await?
        }
        None => state.tide_service.summarize_station(&name).await?,
    };

    info!(
        "Summarized {} over {} observations",
        summary.station.name, summary.summary.observations
    );
    Ok(Json(summary))
}

#[instrument(skip(state))]
async fn get_correlation<S: DocumentSource>(
    State(state): State<AppState<S>>,
    Query(params): Query<CorrelationParams>,
) -> Result<Json<Comparison>, ApiError> {
    let default = state.tide_service.shift_range();
    let range = match (params.range_minutes, params.step_minutes) {
        (None, None) => default,
        (range, step) => ShiftRange::symmetric(
            range.unwrap_or(default.end_minutes),
            step.unwrap_or(default.step_minutes),
        )
        .map_err(ServiceError::from)?,
    };

    let comparison = state
        .tide_service
        .compare_with_range(&params.station1, &params.station2, range)
        .await?;

    info!(
        "Correlated {} and {}: travel time {} minutes",
        comparison.first.name, comparison.second.name, comparison.travel_time_minutes
    );
    Ok(Json(comparison))
}
