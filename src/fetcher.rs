use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use tracing::{debug, instrument, warn};

use crate::fetch_error::FetchError;
use crate::stations::Station;

pub const DEFAULT_URL_TEMPLATE: &str =
    "https://flood-warning-information.service.gov.uk/station/{station}";

/// Where station pages come from.
pub trait DocumentSource: Send + Sync {
    fn fetch(&self, station: &Station) -> impl Future<Output = Result<String, FetchError>> + Send;
}

/// Downloads station pages over HTTP, retrying transient failures.
#[derive(Clone)]
pub struct StationPageFetcher {
    client: reqwest::Client,
    url_template: String,
    max_retries: usize,
    retry_delay: Duration,
}

impl StationPageFetcher {
    /// `url_template` must contain `{station}`, replaced by the station id.
    pub fn new(url_template: impl Into<String>, timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url_template: url_template.into(),
            max_retries: 3,
            retry_delay: Duration::from_millis(500),
        })
    }

    pub fn with_retries(mut self, max_retries: usize, retry_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_delay = retry_delay;
        self
    }

    pub fn station_url(&self, station: &Station) -> String {
        self.url_template
            .replace("{station}", &station.identifier.to_string())
    }

    async fn fetch_once(&self, url: &str) -> Result<String, FetchError> {
        debug!("Sending HTTP request to station page");
        let response = self.client.get(url).send().await?;
        let status = response.status();
        debug!("Received HTTP response with status: {}", status);

        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let html = response.text().await?;
        debug!("Retrieved HTML content, size: {} bytes", html.len());
        Ok(html)
    }
}

impl DocumentSource for StationPageFetcher {
    #[instrument(skip(self, station), fields(station = %station.name))]
    async fn fetch(&self, station: &Station) -> Result<String, FetchError> {
        let url = self.station_url(station);
        let backoff = ExponentialBuilder::default()
            .with_min_delay(self.retry_delay)
            .with_max_times(self.max_retries);

        (|| self.fetch_once(&url))
            .retry(backoff)
            .sleep(tokio::time::sleep)
            .when(FetchError::is_transient)
            .notify(|err: &FetchError, delay: Duration| {
                warn!("Fetching {} failed: {}, retrying in {:?}", url, err, delay);
            })
            .await
    }
}

/// Reads saved station pages from `<dir>/<identifier>.html`.
#[derive(Debug, Clone)]
pub struct FileSource {
    dir: PathBuf,
}

impl FileSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, station: &Station) -> PathBuf {
        self.dir.join(format!("{}.html", station.identifier))
    }
}

impl DocumentSource for FileSource {
    #[instrument(skip(self, station), fields(station = %station.name))]
    async fn fetch(&self, station: &Station) -> Result<String, FetchError> {
        let path = self.path_for(station);
        debug!("Reading station page from {}", path.display());
        Ok(tokio::fs::read_to_string(&path).await?)
    }
}
