//! Plain-text renderings of station summaries and alignment results.

use crate::correlation::{format_shift, CorrelationResult};
use crate::metrics::LevelSummary;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M %Z";

pub fn station_report(label: &str, summary: &LevelSummary, skipped_rows: usize) -> String {
    let from = summary.from.format(TIME_FORMAT);
    let to = summary.to.format(TIME_FORMAT);

    let mut lines = vec![
        format!("=== {label} from {from} to {to}"),
        format!("Current datetime {to}"),
        format!("Current level {:.1}m", summary.current_level),
        format!("Current tide speed {:.1}cm/min", summary.current_rate),
        format!("Max level {:.1}m", summary.max_level),
        format!("Min level {:.1}m", summary.min_level),
        format!("Avg level {:.1}m", summary.mean_level),
        format!("Amplitude {:.1}m", summary.amplitude),
        format!("Max tide rise speed {:.1}cm/min", summary.max_rise_rate),
        format!("Max tide decrease speed {:.1}cm/min", summary.max_fall_rate),
    ];
    if skipped_rows > 0 {
        lines.push(format!("({skipped_rows} unparseable rows skipped)"));
    }
    lines.join("\n")
}

pub fn alignment_report(
    first: &str,
    second: &str,
    zero_shift: Option<f64>,
    result: &CorrelationResult,
) -> String {
    let mut lines: Vec<String> = result
        .samples
        .iter()
        .map(|sample| {
            format!(
                "{:>4} mins ---> {:.1}% correlation",
                sample.shift_minutes, sample.correlation
            )
        })
        .collect();

    lines.push(match zero_shift {
        Some(correlation) => format!("Correlation {correlation:.2}%"),
        None => "Correlation n/a".to_string(),
    });
    lines.push(format!(
        "Max correlation {:.1}% for time shift of {}",
        result.best.correlation,
        result.best_shift_label()
    ));
    lines.push(format!(
        "{} between peak tides at {first} and {second}",
        format_shift(result.travel_time_minutes())
    ));
    lines.join("\n")
}
