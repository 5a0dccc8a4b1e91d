//! Incremental decoder for the MOSMIX KML document.
//!
//! The decoder pulls XML events one at a time and mirrors the element nesting in a
//! small tag stack. Text is classified by the innermost open tag (and, for forecast
//! values, its parent) and forwarded to a [`ForecastSink`] as soon as it is seen, so
//! the document itself is never held in memory.

use crate::fetch::error::FetchError;
use crate::store::registry::ForecastSink;
use chrono::{DateTime, Duration, Utc};
use log::{trace, warn};
use quick_xml::events::{BytesStart, Event};
use quick_xml::encoding::Decoder;
use quick_xml::Reader;
use std::collections::BTreeSet;
use std::io::BufRead;

const DESCRIPTION_TAG: &[u8] = b"kml:description";
const TIME_STEP_TAG: &[u8] = b"dwd:TimeStep";
const FORECAST_TAG: &[u8] = b"dwd:Forecast";
const VALUE_TAG: &[u8] = b"dwd:value";
const ELEMENT_NAME_ATTR: &str = "dwd:elementName";

/// What a decode cycle produced, for logging.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodeSummary {
    pub description: String,
    pub time_steps: usize,
    pub series: usize,
}

struct OpenTag {
    name: Vec<u8>,
    /// `dwd:elementName`, only kept for `dwd:Forecast` tags.
    element_name: Option<String>,
}

enum TextTarget {
    Description,
    TimeStep,
    Values(String),
    Ignored,
}

/// Decodes one MOSMIX document into the table of `station`.
pub struct KmlDecoder<'a, S: ForecastSink + ?Sized> {
    sink: &'a S,
    station: &'a str,
    elements: &'a BTreeSet<String>,
    fresh_for: Duration,
    stack: Vec<OpenTag>,
    initialized: bool,
    summary: DecodeSummary,
}

impl<'a, S: ForecastSink + ?Sized> KmlDecoder<'a, S> {
    /// `elements` are the codes to extract; `fresh_for` is how long the station counts
    /// as fresh once the document starts producing data.
    pub fn new(
        sink: &'a S,
        station: &'a str,
        elements: &'a BTreeSet<String>,
        fresh_for: Duration,
    ) -> Self {
        Self {
            sink,
            station,
            elements,
            fresh_for,
            stack: Vec::new(),
            initialized: false,
            summary: DecodeSummary::default(),
        }
    }

    /// Runs the decoder to the end of `source`.
    ///
    /// The station's table is reset at the first opening tag, so an empty or
    /// non-XML body leaves the previous cycle untouched.
    ///
    /// # Errors
    ///
    /// [`FetchError::Xml`] for malformed documents (including I/O errors of the
    /// underlying stream) and [`FetchError::InvalidTimestamp`] for unparsable time steps.
    pub fn decode<R: BufRead>(mut self, source: R) -> Result<DecodeSummary, FetchError> {
        let mut reader = Reader::from_reader(source);
        reader.config_mut().trim_text(true);
        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(tag) => {
                    self.on_open();
                    self.stack.push(Self::open_tag(&tag, reader.decoder())?);
                }
                // Self-closing tags cannot contain text and are not pushed.
                Event::Empty(_) => self.on_open(),
                Event::End(_) => {
                    self.stack.pop();
                }
                Event::Text(text) => {
                    let text = text.unescape()?;
                    self.on_text(&text)?;
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        Ok(self.summary)
    }

    fn open_tag(tag: &BytesStart<'_>, decoder: Decoder) -> Result<OpenTag, FetchError> {
        let name = tag.name().as_ref().to_vec();
        let element_name = if name == FORECAST_TAG {
            tag.try_get_attribute(ELEMENT_NAME_ATTR)?
                .map(|attr| {
                    attr.decode_and_unescape_value(decoder)
                        .map(|value| value.into_owned())
                })
                .transpose()?
        } else {
            None
        };
        Ok(OpenTag { name, element_name })
    }

    fn on_open(&mut self) {
        if !self.initialized {
            self.sink.reset(self.station);
            self.sink
                .set_next_refresh(self.station, Utc::now() + self.fresh_for);
            self.initialized = true;
        }
    }

    fn classify(&self) -> TextTarget {
        let Some(current) = self.stack.last() else {
            return TextTarget::Ignored;
        };
        match current.name.as_slice() {
            DESCRIPTION_TAG => TextTarget::Description,
            TIME_STEP_TAG => TextTarget::TimeStep,
            VALUE_TAG => {
                let parent = self.stack.len().checked_sub(2).map(|i| &self.stack[i]);
                match parent {
                    Some(OpenTag {
                        name,
                        element_name: Some(element),
                    }) if name == FORECAST_TAG && self.elements.contains(element) => {
                        TextTarget::Values(element.clone())
                    }
                    _ => TextTarget::Ignored,
                }
            }
            _ => TextTarget::Ignored,
        }
    }

    fn on_text(&mut self, text: &str) -> Result<(), FetchError> {
        match self.classify() {
            TextTarget::Description => {
                self.sink.record_description(self.station, text);
                self.summary.description = text.to_string();
            }
            TextTarget::TimeStep => {
                self.sink
                    .record_timestamp(self.station, parse_time_step(text)?);
                self.summary.time_steps += 1;
            }
            TextTarget::Values(element) => {
                let values = parse_values(text);
                if values.len() != self.summary.time_steps {
                    warn!(
                        "Element {} of station {} has {} values for {} time steps",
                        element,
                        self.station,
                        values.len(),
                        self.summary.time_steps
                    );
                }
                trace!(
                    "Decoded {} values of {} for station {}",
                    values.len(),
                    element,
                    self.station
                );
                self.sink.record_series(self.station, &element, values);
                self.summary.series += 1;
            }
            TextTarget::Ignored => {}
        }
        Ok(())
    }
}

/// Parses a `dwd:TimeStep`, e.g. `2024-03-01T04:00:00.000Z`.
pub fn parse_time_step(text: &str) -> Result<DateTime<Utc>, FetchError> {
    DateTime::parse_from_rfc3339(text.trim())
        .map(|time| time.with_timezone(&Utc))
        .map_err(|source| FetchError::InvalidTimestamp {
            value: text.to_string(),
            source,
        })
}

/// Splits a `dwd:value` on whitespace. Tokens that are not numbers (DWD uses `-`)
/// become the `NaN` missing sentinel.
pub fn parse_values(text: &str) -> Vec<f64> {
    text.split_whitespace()
        .map(|token| token.parse::<f64>().unwrap_or(f64::NAN))
        .collect()
}
