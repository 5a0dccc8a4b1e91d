//! Where forecast archives come from. The refresh coordinator only sees a
//! [`ForecastSource`]; [`HttpForecastSource`] is the implementation that streams
//! the KMZ from the DWD open data server.

use crate::fetch::error::FetchError;
use async_trait::async_trait;
use futures_util::TryStreamExt;
use log::{info, warn};
use reqwest::{Client, StatusCode};
use std::pin::Pin;
use tokio::io::AsyncRead;
use tokio_util::io::StreamReader;

/// Default location of the MOSMIX_L single station products.
pub const DEFAULT_BASE_URL: &str =
    "https://opendata.dwd.de/weather/local_forecasts/mos/MOSMIX_L/single_stations";

/// Byte stream of one KMZ archive, read as it arrives.
pub type ForecastBody = Pin<Box<dyn AsyncRead + Send>>;

/// Opens the latest forecast archive of a station.
#[async_trait]
pub trait ForecastSource: Send + Sync {
    /// Starts the transfer and returns the body once the response is known to be
    /// successful. A missing product must be reported as [`FetchError::NotPublished`].
    async fn open(&self, station: &str) -> Result<ForecastBody, FetchError>;
}

pub struct HttpForecastSource {
    client: Client,
    base_url: String,
}

impl HttpForecastSource {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// `<base>/<station>/kml/MOSMIX_L_LATEST_<station>.kmz`
    pub fn url_for(&self, station: &str) -> String {
        format!(
            "{}/{station}/kml/MOSMIX_L_LATEST_{station}.kmz",
            self.base_url
        )
    }
}

impl Default for HttpForecastSource {
    fn default() -> Self {
        Self::new(Client::new(), DEFAULT_BASE_URL)
    }
}

#[async_trait]
impl ForecastSource for HttpForecastSource {
    async fn open(&self, station: &str) -> Result<ForecastBody, FetchError> {
        let url = self.url_for(station);
        info!("Downloading forecast from {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| FetchError::NetworkRequest(url.clone(), e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            warn!("No forecast published for station {} at {}", station, url);
            return Err(FetchError::NotPublished { url });
        }
        if !status.is_success() {
            warn!("HTTP error for {}: {}", url, status);
            return Err(FetchError::HttpStatus { url, status });
        }

        let stream = response
            .bytes_stream()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e));
        Ok(Box::pin(StreamReader::new(stream)))
    }
}
