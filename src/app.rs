use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::api::{create_router, AppState};
use crate::config::Config;
use crate::correlation::CorrelationEngine;
use crate::fetch_error::FetchError;
use crate::fetcher::StationPageFetcher;
use crate::scheduler;
use crate::services::TideService;
use crate::stations::StationRegistry;
use crate::timestamps::TimeNormalizer;

/// Running HTTP server plus the optional periodic report task.
pub struct Application {
    pub server_handle: JoinHandle<Result<(), std::io::Error>>,
    pub report_scheduler_handle: Option<JoinHandle<()>>,
}

/// Service wired from configuration, fetching pages over HTTP.
pub fn build_service(
    config: &Config,
    registry: StationRegistry,
) -> Result<TideService<StationPageFetcher>, FetchError> {
    let fetcher = StationPageFetcher::new(config.station_url_template.clone(), config.fetch_timeout())?
        .with_retries(config.fetch_retries, std::time::Duration::from_millis(500));

    Ok(TideService::new(fetcher, registry)
        .with_timezone(TimeNormalizer::new(config.target_timezone))
        .with_window(config.window())
        .with_engine(CorrelationEngine::new(config.min_overlap))
        .with_shift_range(config.shift_range()))
}

impl Application {
    pub async fn build(config: Config) -> Result<Self, Box<dyn std::error::Error>> {
        info!("Initializing application components");

        let registry = StationRegistry::thames();
        info!("Loaded {} stations", registry.len());
        let tide_service = build_service(&config, registry)?;

        // Validate the configured report station before spawning anything.
        let report_scheduler_handle = if config.report_interval_minutes > 0 {
            tide_service.resolve(&config.report_station)?;
            let service = tide_service.clone();
            let station = config.report_station.clone();
            let interval = config.report_interval_minutes;
            Some(tokio::spawn(async move {
                scheduler::start_report_scheduler(service, station, interval).await;
            }))
        } else {
            info!("Periodic report disabled");
            None
        };

        let app = create_router(AppState { tide_service }).layer(TraceLayer::new_for_http());

        let addr = config.server_addr();
        info!("Starting HTTP server on {}", addr);

        let server_handle = tokio::spawn(async move {
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            axum::serve(listener, app).await
        });

        info!("Application initialized successfully");

        Ok(Self {
            server_handle,
            report_scheduler_handle,
        })
    }

    pub async fn run_until_stopped(self) -> Result<(), Box<dyn std::error::Error>> {
        self.server_handle.await??;
        Ok(())
    }
}
