use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Network request failed for {0}")]
    NetworkRequest(String, #[source] reqwest::Error),

    #[error("HTTP request failed for {url} with status {status}")]
    HttpStatus { url: String, status: StatusCode },

    #[error("No forecast published at {url}")]
    NotPublished { url: String },

    #[error("Forecast download failed")]
    DownloadIo(#[from] std::io::Error),

    #[error("Forecast archive is corrupt or unsupported")]
    Archive(#[from] zip::result::ZipError),

    #[error("Forecast archive contains no .kml member")]
    MissingMember,

    #[error("Forecast document is not well-formed XML")]
    Xml(#[from] quick_xml::Error),

    #[error("Invalid forecast time step '{value}'")]
    InvalidTimestamp {
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("Background decode task failed to complete")]
    TaskJoin(#[from] tokio::task::JoinError),
}
