use std::env;
use std::time::Duration;

use chrono_tz::Tz;

use crate::correlation::{ShiftRange, DEFAULT_MIN_OVERLAP};
use crate::fetcher::DEFAULT_URL_TEMPLATE;
use crate::series::Window;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value '{value}' for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    pub station_url_template: String,
    pub target_timezone: Tz,
    pub window_hours: i64,
    pub fetch_timeout_seconds: u64,
    pub fetch_retries: usize,
    pub report_station: String,
    pub report_interval_minutes: u64,
    pub min_overlap: usize,
    pub shift_range_minutes: i64,
    pub shift_step_minutes: i64,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Config {
            server_host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            server_port: parse_var("SERVER_PORT", 8080)?,
            station_url_template: env::var("STATION_URL_TEMPLATE")
                .unwrap_or_else(|_| DEFAULT_URL_TEMPLATE.to_string()),
            target_timezone: parse_var("TARGET_TIMEZONE", chrono_tz::Europe::London)?,
            window_hours: parse_var("WINDOW_HOURS", 48)?,
            fetch_timeout_seconds: parse_var("FETCH_TIMEOUT_SECONDS", 30)?,
            fetch_retries: parse_var("FETCH_RETRIES", 3)?,
            report_station: env::var("REPORT_STATION").unwrap_or_else(|_| "Chelsea".to_string()),
            report_interval_minutes: parse_var("REPORT_INTERVAL_MINUTES", 10)?,
            min_overlap: parse_var("MIN_OVERLAP", DEFAULT_MIN_OVERLAP)?,
            shift_range_minutes: parse_var("SHIFT_RANGE_MINUTES", 360)?,
            shift_step_minutes: parse_var("SHIFT_STEP_MINUTES", 15)?,
        };

        // Surface a bad range at startup rather than on the first request.
        ShiftRange::symmetric(config.shift_range_minutes, config.shift_step_minutes).map_err(|e| {
            ConfigError::Invalid {
                key: "SHIFT_RANGE_MINUTES/SHIFT_STEP_MINUTES",
                value: format!("{}/{}", config.shift_range_minutes, config.shift_step_minutes),
                reason: e.to_string(),
            }
        })?;

        Window::from_hours(config.window_hours).map_err(|e| ConfigError::Invalid {
            key: "WINDOW_HOURS",
            value: config.window_hours.to_string(),
            reason: e.to_string(),
        })?;

        Ok(config)
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }

    pub fn window(&self) -> Window {
        Window::from_hours(self.window_hours).unwrap_or_default()
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_seconds)
    }

    pub fn shift_range(&self) -> ShiftRange {
        ShiftRange::symmetric(self.shift_range_minutes, self.shift_step_minutes)
            .unwrap_or_default()
    }
}

fn parse_var<T>(key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            value,
            reason: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const KEYS: [&str; 6] = [
        "SERVER_PORT",
        "TARGET_TIMEZONE",
        "WINDOW_HOURS",
        "SHIFT_RANGE_MINUTES",
        "SHIFT_STEP_MINUTES",
        "MIN_OVERLAP",
    ];

    fn clear() {
        for key in KEYS {
            env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn test_defaults() {
        clear();
        let config = Config::from_env().unwrap();

        assert_eq!(config.server_port, 8080);
        assert_eq!(config.target_timezone, chrono_tz::Europe::London);
        assert_eq!(config.window(), Window::two_days());
        assert_eq!(config.shift_range(), ShiftRange::default());
        assert_eq!(config.min_overlap, DEFAULT_MIN_OVERLAP);
    }

    #[test]
    #[serial]
    fn test_overrides() {
        clear();
        env::set_var("SERVER_PORT", "9090");
        env::set_var("TARGET_TIMEZONE", "UTC");
        env::set_var("WINDOW_HOURS", "0");
        let config = Config::from_env().unwrap();
        clear();

        assert_eq!(config.server_addr(), format!("{}:9090", config.server_host));
        assert_eq!(config.target_timezone, chrono_tz::UTC);
        assert_eq!(config.window(), Window::All);
    }

    #[test]
    #[serial]
    fn test_invalid_timezone_is_an_error() {
        clear();
        env::set_var("TARGET_TIMEZONE", "Mars/Olympus");
        let result = Config::from_env();
        clear();

        assert!(matches!(result, Err(ConfigError::Invalid { key: "TARGET_TIMEZONE", .. })));
    }

    #[test]
    #[serial]
    fn test_oversized_window_is_an_error() {
        clear();
        env::set_var("WINDOW_HOURS", "9223372036854775");
        let result = Config::from_env();
        clear();

        assert!(matches!(result, Err(ConfigError::Invalid { key: "WINDOW_HOURS", .. })));
    }

    #[test]
    #[serial]
    fn test_oversized_shift_range_is_an_error() {
        clear();
        env::set_var("SHIFT_RANGE_MINUTES", "1000000000");
        env::set_var("SHIFT_STEP_MINUTES", "1");
        let result = Config::from_env();
        clear();

        assert!(result.is_err());
    }

    #[test]
    #[serial]
    fn test_invalid_shift_step_is_an_error() {
        clear();
        env::set_var("SHIFT_STEP_MINUTES", "0");
        let result = Config::from_env();
        clear();

        assert!(result.is_err());
    }
}
