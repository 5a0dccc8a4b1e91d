//! Read-only queries against the forecast tables held by a [`StationRegistry`].

use crate::error::MosmixError;
use crate::query::snapshot::ForecastSnapshot;
use crate::store::forecast_table::{Direction, ForecastTable};
use crate::store::registry::StationRegistry;
use crate::types::extra_field::ExtraField;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Answers point, shifted and windowed queries for any station in the registry.
///
/// Every query reads one consistent table under a single read lock; a station whose
/// table was never populated (or was released) yields [`MosmixError::NoDataForStation`].
#[derive(Debug, Clone)]
pub struct QueryEngine {
    registry: Arc<StationRegistry>,
}

impl QueryEngine {
    pub fn new(registry: Arc<StationRegistry>) -> Self {
        Self { registry }
    }

    fn with_table<T>(
        &self,
        station: &str,
        query: impl FnOnce(&ForecastTable) -> Result<T, MosmixError>,
    ) -> Result<T, MosmixError> {
        self.registry
            .with_table(station, query)
            .unwrap_or_else(|| {
                Err(MosmixError::NoDataForStation {
                    station: station.to_string(),
                })
            })
    }

    /// Station label from the forecast document.
    pub fn description(&self, station: &str) -> Result<String, MosmixError> {
        self.with_table(station, |table| Ok(table.description.clone()))
    }

    /// See [`ForecastTable::time_index`].
    pub fn time_index(&self, station: &str, at: DateTime<Utc>) -> Result<usize, MosmixError> {
        self.with_table(station, |table| table.time_index(at))
    }

    /// See [`ForecastTable::interpolate`].
    pub fn interpolate(
        &self,
        station: &str,
        element: &str,
        at: DateTime<Utc>,
    ) -> Result<f64, MosmixError> {
        self.with_table(station, |table| table.interpolate(element, at))
    }

    /// See [`ForecastTable::nearest_valid`].
    pub fn nearest_valid(
        &self,
        station: &str,
        element: &str,
        at: DateTime<Utc>,
        direction: Direction,
    ) -> Result<f64, MosmixError> {
        self.with_table(station, |table| table.nearest_valid(element, at, direction))
    }

    /// See [`ForecastTable::windowed_sum`].
    pub fn windowed_sum(
        &self,
        station: &str,
        element: &str,
        hours: usize,
        at: DateTime<Utc>,
    ) -> Result<f64, MosmixError> {
        self.with_table(station, |table| table.windowed_sum(element, hours, at))
    }

    /// Assembles the standard snapshot plus `fields` for `station` at `at`.
    pub fn snapshot(
        &self,
        station: &str,
        at: DateTime<Utc>,
        fields: &[ExtraField],
    ) -> Result<ForecastSnapshot, MosmixError> {
        self.with_table(station, |table| ForecastSnapshot::assemble(table, at, fields))
    }
}
