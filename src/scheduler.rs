use std::time::Duration;
use tokio::time;
use tracing::{debug, error, info, instrument};

use crate::fetcher::DocumentSource;
use crate::report::station_report;
use crate::services::{StationSummary, TideService};

/// Logs a fresh report for `station` every `interval_minutes`, forever.
#[instrument(skip(service), fields(interval_minutes = %interval_minutes))]
pub async fn start_report_scheduler<S: DocumentSource>(
    service: TideService<S>,
    station: String,
    interval_minutes: u64,
) {
    let mut interval = time::interval(Duration::from_secs(interval_minutes.max(1) * 60));

    info!("Report scheduler started with {} minute interval", interval_minutes);

    loop {
        interval.tick().await;
        debug!("Scheduler tick - refreshing report");

        if let Some(summary) = refresh(&service, &station).await {
            info!(
                "\n{}",
                station_report(&summary.station.label, &summary.summary, summary.skipped_rows)
            );
        }
    }
}

#[instrument(skip(service))]
pub async fn refresh<S: DocumentSource>(service: &TideService<S>, station: &str) -> Option<StationSummary> {
    match service.summarize_station(station).await {
        Ok(summary) => Some(summary),
        Err(e) => {
            error!("Failed to refresh report for {}: {}", station, e);
            None
        }
    }
}
