#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Station page {url} returned status {status}")]
    Status { status: u16, url: String },
    #[error("Unknown station: {0}")]
    UnknownStation(String),
    #[error("Failed to read station page: {0}")]
    Io(#[from] std::io::Error),
}

impl FetchError {
    /// Worth another attempt: timeouts, connection failures and 5xx.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Request(e) => e.is_timeout() || e.is_connect(),
            FetchError::Status { status, .. } => *status >= 500,
            FetchError::UnknownStation(_) | FetchError::Io(_) => false,
        }
    }
}
