use std::path::PathBuf;
use std::time::Duration;

use chrono_tz::Tz;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use thames_tide_service::correlation::{CorrelationEngine, ShiftRange, DEFAULT_MIN_OVERLAP};
use thames_tide_service::fetcher::{DocumentSource, FileSource, StationPageFetcher, DEFAULT_URL_TEMPLATE};
use thames_tide_service::report::alignment_report;
use thames_tide_service::series::Window;
use thames_tide_service::services::TideService;
use thames_tide_service::stations::StationRegistry;
use thames_tide_service::timestamps::TimeNormalizer;

#[derive(Parser)]
#[command(name = "tide-correlation")]
#[command(
    about = "Find the time between high tides at two stations. Default stations are Chelsea and Dover.",
    long_about = None
)]
struct Cli {
    /// List all stations
    #[arg(long)]
    list: bool,

    #[arg(long, requires = "station2")]
    station1: Option<String>,

    #[arg(long, requires = "station1")]
    station2: Option<String>,

    /// Search shifts in -range..range minutes
    #[arg(long, env = "SHIFT_RANGE_MINUTES", default_value = "360")]
    range_minutes: i64,

    #[arg(long, env = "SHIFT_STEP_MINUTES", default_value = "15")]
    step_minutes: i64,

    /// Fewest common instants accepted for a correlation
    #[arg(long, env = "MIN_OVERLAP", default_value_t = DEFAULT_MIN_OVERLAP)]
    min_overlap: usize,

    /// Hours of data to use, 0 for everything on the page
    #[arg(long, env = "WINDOW_HOURS", default_value = "48")]
    window_hours: i64,

    /// Read saved pages named <identifier>.html from this directory
    #[arg(long)]
    dir: Option<PathBuf>,

    /// Print JSON instead of text
    #[arg(long)]
    json: bool,

    #[arg(long, env = "STATION_URL_TEMPLATE", default_value = DEFAULT_URL_TEMPLATE)]
    url_template: String,

    #[arg(long, env = "TARGET_TIMEZONE", default_value = "Europe/London")]
    timezone: String,
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
    let range = ShiftRange::symmetric(cli.range_minutes, cli.step_minutes)?;
    let window = Window::from_hours(cli.window_hours)?;

    match &cli.dir {
        Some(dir) => {
            let service = configure(TideService::new(FileSource::new(dir), registry), &cli, timezone, window, range);
            run(service, &cli).await
        }
        None => {
            let fetcher = StationPageFetcher::new(cli.url_template.clone(), Duration::from_secs(30))?;
            let service = configure(TideService::new(fetcher, registry), &cli, timezone, window, range);
            run(service, &cli).await
        }
    }
}

fn configure<S: DocumentSource>(
    service: TideService<S>,
    cli: &Cli,
    timezone: Tz,
    window: Window,
    range: ShiftRange,
) -> TideService<S> {
    service
        .with_timezone(TimeNormalizer::new(timezone))
        .with_window(window)
        .with_engine(CorrelationEngine::new(cli.min_overlap))
        .with_shift_range(range)
}

async fn run<S: DocumentSource>(service: TideService<S>, cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let first = cli.station1.as_deref().unwrap_or("Chelsea");
    let second = cli.station2.as_deref().unwrap_or("Dover");

    let comparison = service.compare(first, second).await?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&comparison)?);
    } else {
        println!(
            "{}",
            alignment_report(
                &comparison.first.name,
                &comparison.second.name,
                comparison.zero_shift_correlation,
                &comparison.alignment,
            )
        );
    }
    Ok(())
}
