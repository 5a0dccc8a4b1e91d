mod config;
mod decoder;
mod error;
mod fetch;
mod mosmix;
mod query;
mod refresh;
mod store;
mod types;
mod units;

#[cfg(test)]
mod test_support;

pub use config::{hours_to_duration, StationQueryConfig};
pub use error::MosmixError;
pub use mosmix::*;

pub use fetch::error::FetchError;
pub use fetch::source::{ForecastBody, ForecastSource, HttpForecastSource, DEFAULT_BASE_URL};

pub use decoder::archive::with_kml_member;
pub use decoder::kml::{parse_time_step, parse_values, DecodeSummary, KmlDecoder};

pub use store::forecast_table::{Direction, ForecastTable};
pub use store::registry::{ForecastSink, RefreshCycle, StationRegistry};

pub use refresh::{RefreshCoordinator, RefreshOutcome, RefreshPolicy};

pub use query::engine::QueryEngine;
pub use query::snapshot::{
    resolve_extra_field, ForecastSnapshot, EXTRA_PRECISION, PRECIPITATION_WINDOW_HOURS,
    STANDARD_PRECISION,
};

pub use types::element;
pub use types::extra_field::{ExtraField, InterpolationPolicy, MissingElementName};

pub use units::{
    kelvin_to_celsius, relative_humidity, round_to, saturation_vapor_pressure, KELVIN_OFFSET,
};
