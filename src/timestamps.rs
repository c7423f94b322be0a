use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

/// Pattern used by the station pages, e.g. `2020-01-14T17:15Z`.
pub const SOURCE_FORMAT: &str = "%Y-%m-%dT%H:%MZ";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TimestampError {
    #[error("Malformed timestamp '{input}': {reason}")]
    Malformed { input: String, reason: String },
}

/// Converts page timestamps (UTC, minute resolution) into instants in the
/// station's civil time zone.
#[derive(Debug, Clone, Copy)]
pub struct TimeNormalizer {
    target: Tz,
}

impl TimeNormalizer {
    pub fn new(target: Tz) -> Self {
        Self { target }
    }

    pub fn target(&self) -> Tz {
        self.target
    }

    pub fn normalize(&self, text: &str) -> Result<DateTime<Tz>, TimestampError> {
        let trimmed = text.trim();
        let naive = NaiveDateTime::parse_from_str(trimmed, SOURCE_FORMAT).map_err(|e| {
            TimestampError::Malformed {
                input: trimmed.to_string(),
                reason: e.to_string(),
            }
        })?;

        // UTC has no gaps or folds, so this mapping is always unique.
        Ok(Utc.from_utc_datetime(&naive).with_timezone(&self.target))
    }
}

impl Default for TimeNormalizer {
    fn default() -> Self {
        Self::new(chrono_tz::Europe::London)
    }
}
