use std::sync::LazyLock;

use chrono::NaiveDateTime;
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use tracing::{debug, instrument};

use crate::timestamps::SOURCE_FORMAT;

static ROW_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("tr").expect("row selector is valid"));
static TIME_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("time").expect("time selector is valid"));
static LEVEL_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("td.numeric").expect("level selector is valid"));

/// Order in which a page lists its readings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceOrder {
    NewestFirst,
    OldestFirst,
}

/// A table row that carried both a time and a numeric level cell.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    pub timestamp_text: String,
    pub level_text: String,
    pub level: f64,
}

/// Why a row with a timestamp could not be turned into a reading.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RowDefect {
    #[error("row at '{timestamp}' has no numeric level cell")]
    MissingLevel { timestamp: String },
    #[error("row at '{timestamp}' has non-numeric level '{text}'")]
    InvalidLevel { timestamp: String, text: String },
}

/// A parsed station page.
///
/// Rows are projected from the document tree on demand; calling
/// [`TidePage::rows`] again restarts from the first row.
///
/// ```text
/// <tr>
///     <td scope="row"><time datetime="2020-01-14T17:15Z">2020-01-14T17:15Z</time></td>
///     <td class="numeric">3.622</td>
///     <td>false</td>
/// </tr>
/// ```
pub struct TidePage {
    document: Html,
}

impl TidePage {
    #[instrument(skip(markup), fields(markup_size = markup.len()))]
    pub fn parse(markup: &str) -> Self {
        debug!("Parsing station page");
        Self {
            document: Html::parse_document(markup),
        }
    }

    /// Candidate rows in document order.
    ///
    /// Rows without a `<time>` element (headers, unrelated tables) are not
    /// data rows and produce nothing. Rows that have a time but no usable
    /// level produce a [`RowDefect`].
    pub fn rows(&self) -> impl Iterator<Item = Result<RawRow, RowDefect>> + '_ {
        self.document.select(&ROW_SELECTOR).filter_map(project_row)
    }

    /// Infers the listing order from the first and last parseable
    /// timestamps. Pages with fewer than two distinct timestamps are
    /// assumed to be newest first, like the flood-warning pages.
    pub fn source_order(&self) -> SourceOrder {
        let mut stamps = self
            .document
            .select(&ROW_SELECTOR)
            .filter_map(|row| row.select(&TIME_SELECTOR).next())
            .filter_map(|time| NaiveDateTime::parse_from_str(&time_text(time), SOURCE_FORMAT).ok());

        let Some(first) = stamps.next() else {
            return SourceOrder::NewestFirst;
        };
        match stamps.last() {
            Some(last) if first < last => SourceOrder::OldestFirst,
            _ => SourceOrder::NewestFirst,
        }
    }
}

fn project_row(row: ElementRef<'_>) -> Option<Result<RawRow, RowDefect>> {
    let time = row.select(&TIME_SELECTOR).next()?;
    let timestamp_text = time_text(time);

    let Some(level_cell) = row.select(&LEVEL_SELECTOR).next() else {
        return Some(Err(RowDefect::MissingLevel {
            timestamp: timestamp_text,
        }));
    };

    let level_text = level_cell.text().collect::<String>().trim().to_string();
    match level_text.parse::<f64>() {
        Ok(level) if level.is_finite() => Some(Ok(RawRow {
            timestamp_text,
            level_text,
            level,
        })),
        _ => Some(Err(RowDefect::InvalidLevel {
            timestamp: timestamp_text,
            text: level_text,
        })),
    }
}

/// Visible text of a `<time>` element, falling back to its `datetime`
/// attribute when the element is empty.
fn time_text(time: ElementRef<'_>) -> String {
    let text = time.text().collect::<String>().trim().to_string();
    if text.is_empty() {
        time.value()
            .attr("datetime")
            .map(|s| s.trim().to_string())
            .unwrap_or_default()
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><body>
        <table>
            <tr><th scope="col">Time</th><th scope="col">Height (m)</th><th>Estimated</th></tr>
            <tr>
                <td scope="row"><time datetime="2020-01-14T17:15Z">2020-01-14T17:15Z</time></td>
                <td class="numeric">3.622</td>
                <td>false</td>
            </tr>
            <tr>
                <td scope="row"><time datetime="2020-01-14T17:00Z">2020-01-14T17:00Z</time></td>
                <td class="numeric">3.500</td>
                <td>false</td>
            </tr>
        </table>
        </body></html>
    "#;

    #[test]
    fn test_rows_extracts_time_and_level() {
        let page = TidePage::parse(PAGE);
        let rows: Vec<_> = page.rows().collect();

        assert_eq!(rows.len(), 2);
        let first = rows[0].as_ref().unwrap();
        assert_eq!(first.timestamp_text, "2020-01-14T17:15Z");
        assert_eq!(first.level_text, "3.622");
        assert_eq!(first.level, 3.622);
    }

    #[test]
    fn test_rows_is_restartable() {
        let page = TidePage::parse(PAGE);
        let first_pass: Vec<_> = page.rows().collect();
        let second_pass: Vec<_> = page.rows().collect();
        assert_eq!(first_pass, second_pass);
    }

    #[test]
    fn test_newest_first_is_detected() {
        let page = TidePage::parse(PAGE);
        assert_eq!(page.source_order(), SourceOrder::NewestFirst);
    }

    #[test]
    fn test_oldest_first_is_detected() {
        let html = r#"<table>
            <tr><td><time>2020-01-14T17:00Z</time></td><td class="numeric">3.5</td></tr>
            <tr><td><time>2020-01-14T17:15Z</time></td><td class="numeric">3.6</td></tr>
        </table>"#;
        assert_eq!(TidePage::parse(html).source_order(), SourceOrder::OldestFirst);
    }

    #[test]
    fn test_order_defaults_to_newest_first() {
        assert_eq!(TidePage::parse("<p>nothing</p>").source_order(), SourceOrder::NewestFirst);
    }

    #[test]
    fn test_row_without_level_cell_is_a_defect() {
        let html = r#"<table>
            <tr><td><time>2020-01-14T17:00Z</time></td><td>3.5</td></tr>
        </table>"#;
        let rows: Vec<_> = TidePage::parse(html).rows().collect();
        assert_eq!(
            rows,
            vec![Err(RowDefect::MissingLevel {
                timestamp: "2020-01-14T17:00Z".to_string()
            })]
        );
    }

    #[test]
    fn test_non_numeric_level_is_a_defect() {
        let html = r#"<table>
            <tr><td><time>2020-01-14T17:00Z</time></td><td class="numeric">n/a</td></tr>
            <tr><td><time>2020-01-14T16:45Z</time></td><td class="numeric">NaN</td></tr>
            <tr><td><time>2020-01-14T16:30Z</time></td><td class="numeric"> 3.4 </td></tr>
        </table>"#;
        let rows: Vec<_> = TidePage::parse(html).rows().collect();

        assert_eq!(rows.len(), 3);
        assert!(matches!(&rows[0], Err(RowDefect::InvalidLevel { text, .. }) if text == "n/a"));
        assert!(matches!(&rows[1], Err(RowDefect::InvalidLevel { .. })));
        assert_eq!(rows[2].as_ref().unwrap().level, 3.4);
    }

    #[test]
    fn test_empty_time_element_uses_datetime_attribute() {
        let html = r#"<table>
            <tr><td><time datetime="2020-01-14T17:00Z"></time></td><td class="numeric">3.5</td></tr>
        </table>"#;
        let rows: Vec<_> = TidePage::parse(html).rows().collect();
        assert_eq!(rows[0].as_ref().unwrap().timestamp_text, "2020-01-14T17:00Z");
    }

    #[test]
    fn test_whitespace_and_attribute_order_are_tolerated() {
        let html = "<table><tr>\n\n   <td   scope='row'  ><time\n datetime='2020-01-14T17:15Z'>\n 2020-01-14T17:15Z \n</time></td><td data-x='1' class='numeric extra'>\n3.622\n</td></tr></table>";
        let rows: Vec<_> = TidePage::parse(html).rows().collect();
        let row = rows[0].as_ref().unwrap();
        assert_eq!(row.timestamp_text, "2020-01-14T17:15Z");
        assert_eq!(row.level, 3.622);
    }

    #[test]
    fn test_document_without_rows() {
        let page = TidePage::parse("<html><body><p>Service unavailable</p></body></html>");
        assert_eq!(page.rows().count(), 0);
    }
}
