#![allow(dead_code)]

use std::path::PathBuf;

use thames_tide_service::fetcher::FileSource;
use thames_tide_service::services::TideService;
use thames_tide_service::stations::StationRegistry;

/// Saved pages for Dover (1158) and Chelsea (7392), newest first, ending
/// 2020-01-16T12:00Z. Chelsea repeats Dover's curve 90 minutes later and
/// carries one row with a non-numeric level.
pub fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

pub fn fixture_markup(identifier: u32) -> String {
    std::fs::read_to_string(fixtures_dir().join(format!("{identifier}.html")))
        .expect("Failed to read fixture page")
}

/// Service over the fixture pages with default settings. Stations without a
/// fixture page have no data.
pub fn fixture_service() -> TideService<FileSource> {
    TideService::new(FileSource::new(fixtures_dir()), StationRegistry::thames())
}

pub const CHELSEA_LATEST_LEVEL: f64 = 0.585;
pub const CHELSEA_PREVIOUS_LEVEL: f64 = 0.695;
pub const DOVER_LATEST_LEVEL: f64 = 0.739;
