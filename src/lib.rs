pub mod analysis;
pub mod analysis_error;
pub mod api;
pub mod app;
pub mod config;
pub mod correlation;
pub mod fetch_error;
pub mod fetcher;
pub mod metrics;
pub mod parser;
pub mod report;
pub mod scheduler;
pub mod series;
pub mod services;
pub mod stations;
pub mod timestamps;
