use std::path::PathBuf;
use std::time::Duration;

use chrono_tz::Tz;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use thames_tide_service::analysis::Extractor;
use thames_tide_service::fetcher::{DocumentSource, FileSource, StationPageFetcher, DEFAULT_URL_TEMPLATE};
use thames_tide_service::metrics::summarize_levels;
use thames_tide_service::report::station_report;
use thames_tide_service::scheduler;
use thames_tide_service::series::{SeriesBuilder, Window};
use thames_tide_service::services::TideService;
use thames_tide_service::stations::{Station, StationRegistry};
use thames_tide_service::timestamps::TimeNormalizer;

#[derive(Parser)]
#[command(name = "tides")]
#[command(about = "Report Thames water levels and tide speed for a station", long_about = None)]
struct Cli {
    /// List all stations
    #[arg(long)]
    list: bool,

    /// Report every station
    #[arg(long)]
    all: bool,

    /// Station to report
    #[arg(long, env = "REPORT_STATION", default_value = "Chelsea")]
    station: String,

    /// Analyse a saved page instead of fetching (reported as --station)
    #[arg(long)]
    file: Option<PathBuf>,

    /// Read saved pages named <identifier>.html from this directory
    #[arg(long)]
    dir: Option<PathBuf>,

    /// Use everything on the page (about five days) instead of the last two days
    #[arg(long)]
    five: bool,

    /// Repeat the report every --interval-minutes
    #[arg(long)]
    continuous: bool,

    #[arg(long, default_value = "10")]
    interval_minutes: u64,

    /// Print JSON instead of text
    #[arg(long)]
    json: bool,

    #[arg(long, env = "STATION_URL_TEMPLATE", default_value = DEFAULT_URL_TEMPLATE)]
    url_template: String,

    /// IANA zone used for report timestamps
    #[arg(long, env = "TARGET_TIMEZONE", default_value = "Europe/London")]
    timezone: String,

    #[arg(long, env = "FETCH_TIMEOUT_SECONDS", default_value = "30")]
    timeout_seconds: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let registry = StationRegistry::thames();

    if cli.list {
        for name in registry.names() {
            println!("{name}");
        }
        return Ok(());
    }

    let timezone: Tz = cli.timezone.parse().map_err(|e| format!("invalid timezone {}: {e}", cli.timezone))?;
    let window = if cli.five { Window::All } else { Window::two_days() };

    if let Some(path) = &cli.file {
        let station = registry
            .find(&cli.station)
            .cloned()
            .unwrap_or_else(|| Station::new(cli.station.clone(), 0, cli.station.clone()));
        let markup = tokio::fs::read_to_string(path).await?;
        let extraction = Extractor::new(TimeNormalizer::new(timezone), SeriesBuilder::new(window))
            .extract(&station, &markup)?;
        if extraction.is_no_data() {
            println!("No data!");
            return Ok(());
        }
        let summary = summarize_levels(&extraction.series)?;
        if cli.json {
            println!("{}", serde_json::to_string_pretty(&summary)?);
        } else {
            println!("{}", station_report(&station.label, &summary, extraction.skipped_rows));
        }
        return Ok(());
    }

    match &cli.dir {
        Some(dir) => {
            let service = TideService::new(FileSource::new(dir), registry)
                .with_timezone(TimeNormalizer::new(timezone))
                .with_window(window);
            run(service, &cli).await
        }
        None => {
            let fetcher = StationPageFetcher::new(cli.url_template.clone(), Duration::from_secs(cli.timeout_seconds))?;
            let service = TideService::new(fetcher, registry)
                .with_timezone(TimeNormalizer::new(timezone))
                .with_window(window);
            run(service, &cli).await
        }
    }
}

async fn run<S: DocumentSource>(service: TideService<S>, cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    if cli.all {
        for (station, result) in service.summarize_all().await {
            match result {
                Ok(summary) if cli.json => println!("{}", serde_json::to_string_pretty(&summary)?),
                Ok(summary) => println!(
                    "\n{}",
                    station_report(&station.label, &summary.summary, summary.skipped_rows)
                ),
                Err(e) => println!("\n=== {}\n{}", station.label, e),
            }
        }
        return Ok(());
    }

    service.resolve(&cli.station)?;

    if cli.continuous {
        scheduler::start_report_scheduler(service, cli.station.clone(), cli.interval_minutes).await;
        return Ok(());
    }

    let summary = service.summarize_station(&cli.station).await?;
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!(
            "{}",
            station_report(&summary.station.label, &summary.summary, summary.skipped_rows)
        );
    }
    Ok(())
}
