use crate::fetch::error::FetchError;
use std::sync::Arc;
use thiserror::Error;

/// Every failure the crate reports is scoped to one station and one operation;
/// none of them invalidates stored forecasts.
///
/// The enum is `Clone` so one refresh outcome can be shared with every caller
/// waiting on the same in-flight fetch.
#[derive(Debug, Clone, Error)]
pub enum MosmixError {
    #[error("No forecast data available for station '{station}'")]
    NoDataForStation { station: String },

    #[error("No MOSMIX forecast is published for station '{station}', check the station id")]
    StationNotPublished { station: String },

    #[error("Fetching the forecast for station '{station}' failed")]
    FetchFailed {
        station: String,
        #[source]
        source: Arc<FetchError>,
    },

    #[error("Element '{element}' was not decoded for station '{station}'")]
    UnknownAttribute { station: String, element: String },

    #[error("Forecast for station '{station}' has no predictions after the requested time")]
    NoFuturePredictions { station: String },

    #[error("Forecast for station '{station}' has no predictions before the requested time")]
    NoHistoricPredictions { station: String },
}

impl MosmixError {
    /// Classifies a transport or decode failure for `station`.
    pub(crate) fn from_fetch(station: &str, error: FetchError) -> Self {
        match error {
            FetchError::NotPublished { .. } => MosmixError::StationNotPublished {
                station: station.to_string(),
            },
            other => MosmixError::FetchFailed {
                station: station.to_string(),
                source: Arc::new(other),
            },
        }
    }
}
