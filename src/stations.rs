use serde::Serialize;

/// A tide gauge on the flood-warning service.
///
/// `identifier` is the numeric id used in the station page URL, `label` is
/// the human-readable name shown in reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Station {
    pub name: String,
    pub identifier: u32,
    pub label: String,
}

impl Station {
    pub fn new(name: impl Into<String>, identifier: u32, label: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            identifier,
            label: label.into(),
        }
    }
}

/// Read-only station table, built once at startup and passed to whoever
/// needs to resolve a station name.
#[derive(Debug, Clone, Default)]
pub struct StationRegistry {
    stations: Vec<Station>,
}

impl StationRegistry {
    pub fn new(stations: Vec<Station>) -> Self {
        Self { stations }
    }

    /// Gauges along the tidal Thames, ordered from the estuary upstream.
    pub fn thames() -> Self {
        Self::new(vec![
            Station::new("Dover", 1158, "Dover"),
            Station::new("Southend", 7386, "Southend"),
            Station::new("Sheerness", 1157, "Sheerness"),
            Station::new("Tilbury", 7394, "Tilbury"),
            Station::new("Silvertown", 7388, "Silvertown"),
            Station::new("Tower Pier", 7391, "Thames at Tower Pier"),
            Station::new("Westminster", 7389, "Thames at Westminster"),
            Station::new("Chelsea", 7392, "Thames at Chelsea"),
            Station::new("Richmond", 7393, "Thames at Richmond"),
        ])
    }

    /// Case-insensitive lookup by station name.
    pub fn find(&self, name: &str) -> Option<&Station> {
        let wanted = name.trim();
        self.stations
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(wanted))
    }

    pub fn stations(&self) -> &[Station] {
        &self.stations
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.stations.iter().map(|s| s.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }
}
