//! Synthetic MOSMIX documents and KMZ archives for unit tests.

use crate::fetch::error::FetchError;
use crate::fetch::source::{ForecastBody, ForecastSource};
use crate::types::element::BASE_ELEMENTS;
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use reqwest::StatusCode;
use std::collections::BTreeSet;
use std::io::{Cursor, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// First forecast step of every sample document.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 4, 0, 0).unwrap()
}

pub fn base_elements() -> BTreeSet<String> {
    BASE_ELEMENTS.iter().map(|e| e.to_string()).collect()
}

/// A MOSMIX document with `steps` hourly time steps starting at [`t0`] and one
/// `dwd:Forecast` per `(element, values)` pair.
pub fn sample_kml(description: &str, steps: i64, series: &[(&str, &str)]) -> String {
    sample_kml_from(t0(), description, steps, series)
}

/// Like [`sample_kml`], with the first time step at `start`.
pub fn sample_kml_from(
    start: DateTime<Utc>,
    description: &str,
    steps: i64,
    series: &[(&str, &str)],
) -> String {
    let time_steps: String = (0..steps)
        .map(|h| {
            let time = start + Duration::hours(h);
            format!(
                "<dwd:TimeStep>{}</dwd:TimeStep>\n",
                time.format("%Y-%m-%dT%H:%M:%S%.3fZ")
            )
        })
        .collect();
    let forecasts: String = series
        .iter()
        .map(|(element, values)| {
            format!(
                "<dwd:Forecast dwd:elementName=\"{element}\">\n<dwd:value>     {values}</dwd:value>\n</dwd:Forecast>\n"
            )
        })
        .collect();

    format!(
        r#"<?xml version="1.0" encoding="ISO-8859-1" standalone="no"?>
<kml:kml xmlns:dwd="https://opendata.dwd.de/weather/lib/pointforecast_dwd_extension_V1_0.xsd" xmlns:kml="http://www.opengis.net/kml/2.2">
<kml:Document>
<kml:ExtendedData>
<dwd:ProductDefinition>
<dwd:Issuer>Deutscher Wetterdienst</dwd:Issuer>
<dwd:ProductID>MOSMIX</dwd:ProductID>
<dwd:ReferencedModel>
<dwd:Model dwd:name="ICON" dwd:referenceTime="2024-02-29T21:00:00Z"/>
</dwd:ReferencedModel>
<dwd:ForecastTimeSteps>
{time_steps}</dwd:ForecastTimeSteps>
</dwd:ProductDefinition>
</kml:ExtendedData>
<kml:Placemark>
<kml:name>10637</kml:name>
<kml:description>{description}</kml:description>
<kml:ExtendedData>
{forecasts}</kml:ExtendedData>
<kml:Point>
<kml:coordinates>8.6,50.05,111.0</kml:coordinates>
</kml:Point>
</kml:Placemark>
</kml:Document>
</kml:kml>
"#
    )
}

/// A deflate-compressed ZIP archive with the given `(name, contents)` members.
pub fn kmz_with_members(members: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    for (name, contents) in members {
        writer.start_file(*name, options).unwrap();
        writer.write_all(contents.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// A KMZ archive holding `xml` the way DWD names its members.
pub fn kmz(xml: &str) -> Vec<u8> {
    kmz_with_members(&[("MOSMIX_L_2024030103_10637.kml", xml)])
}

/// What a [`MemorySource`] answers with.
#[derive(Debug, Clone)]
pub enum Response {
    Archive(Vec<u8>),
    /// Panics on the first open, then serves the archive.
    PanicFirst(Vec<u8>),
    NotFound,
    Status(StatusCode),
}

/// In-memory [`ForecastSource`] counting how often it was opened.
pub struct MemorySource {
    response: Response,
    calls: AtomicUsize,
}

impl MemorySource {
    pub fn new(response: Response) -> Self {
        Self {
            response,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ForecastSource for MemorySource {
    async fn open(&self, station: &str) -> Result<ForecastBody, FetchError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let url = format!("memory://{station}");
        match &self.response {
            Response::Archive(bytes) => Ok(Box::pin(Cursor::new(bytes.clone()))),
            Response::PanicFirst(_) if call == 0 => panic!("source failed while opening {url}"),
            Response::PanicFirst(bytes) => Ok(Box::pin(Cursor::new(bytes.clone()))),
            Response::NotFound => Err(FetchError::NotPublished { url }),
            Response::Status(status) => Err(FetchError::HttpStatus {
                url,
                status: *status,
            }),
        }
    }
}
