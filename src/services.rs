pub mod tide_service;

pub use tide_service::{Comparison, ServiceError, StationSummary, TideService};
