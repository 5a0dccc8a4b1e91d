//! The per-station forecast table and the lookups that turn its sparse,
//! index-aligned series into values at arbitrary instants.

use crate::error::MosmixError;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Direction in which [`ForecastTable::nearest_valid`] walks over missing samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Forward,
    Backward,
}

/// One decode cycle's worth of forecast data for a single station.
///
/// `times` is ordered and every series stored for the cycle has the same length,
/// index `i` of a series belonging to `times[i]`. Unreported samples are `NaN`
/// rather than absent, so lookups stay index-aligned.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ForecastTable {
    /// The station id this table belongs to.
    pub station: String,
    /// Station label from `kml:description`, empty until parsed.
    pub description: String,
    pub times: Vec<DateTime<Utc>>,
    pub series: HashMap<String, Vec<f64>>,
}

impl ForecastTable {
    pub fn new(station: impl Into<String>) -> Self {
        Self {
            station: station.into(),
            ..Default::default()
        }
    }

    /// The series stored for `element`, if it was decoded in this cycle.
    pub fn series(&self, element: &str) -> Option<&[f64]> {
        self.series.get(element).map(Vec::as_slice)
    }

    /// Index of the first forecast step strictly after `at`.
    ///
    /// # Errors
    ///
    /// [`MosmixError::NoDataForStation`] if no time steps were decoded,
    /// [`MosmixError::NoFuturePredictions`] if every step is at or before `at`.
    pub fn time_index(&self, at: DateTime<Utc>) -> Result<usize, MosmixError> {
        if self.times.is_empty() {
            return Err(MosmixError::NoDataForStation {
                station: self.station.clone(),
            });
        }
        // `times` is non-decreasing, so the first step after `at` is a partition point.
        let idx = self.times.partition_point(|time| *time <= at);
        if idx == self.times.len() {
            return Err(MosmixError::NoFuturePredictions {
                station: self.station.clone(),
            });
        }
        Ok(idx)
    }

    fn require_series(&self, element: &str) -> Result<&[f64], MosmixError> {
        self.series(element)
            .ok_or_else(|| MosmixError::UnknownAttribute {
                station: self.station.clone(),
                element: element.to_string(),
            })
    }

    /// Value of `element` at `at`, linearly interpolated between the bracketing steps.
    ///
    /// Before the first step the first sample is returned (no extrapolation). When the
    /// preceding sample is missing the element is not continuous there and the following
    /// sample is returned unmodified.
    pub fn interpolate(&self, element: &str, at: DateTime<Utc>) -> Result<f64, MosmixError> {
        let idx = self.time_index(at)?;
        let series = self.require_series(element)?;
        let sample = |i: usize| series.get(i).copied().unwrap_or(f64::NAN);

        if idx == 0 {
            return Ok(sample(0));
        }

        let (before, after) = (sample(idx - 1), sample(idx));
        if before.is_nan() {
            return Ok(after);
        }

        let start = self.times[idx - 1];
        let span = (self.times[idx] - start).num_milliseconds() as f64;
        if span <= 0.0 {
            return Ok(after);
        }
        let share = (at - start).num_milliseconds() as f64 / span;
        if share <= 0.0 {
            return Ok(before);
        }
        Ok(before + share * (after - before))
    }

    /// First non-missing sample of `element`, starting at the first step after `at`
    /// and walking in `direction`.
    ///
    /// # Errors
    ///
    /// [`MosmixError::NoFuturePredictions`] or [`MosmixError::NoHistoricPredictions`]
    /// when the walk runs off the end of the series without finding a value.
    pub fn nearest_valid(
        &self,
        element: &str,
        at: DateTime<Utc>,
        direction: Direction,
    ) -> Result<f64, MosmixError> {
        let start = self.time_index(at)?;
        let series = self.require_series(element)?;

        let found = match direction {
            Direction::Forward => series.iter().skip(start).find(|v| !v.is_nan()),
            Direction::Backward => series
                .iter()
                .take(start.saturating_add(1))
                .rev()
                .find(|v| !v.is_nan()),
        };

        found.copied().ok_or_else(|| match direction {
            Direction::Forward => MosmixError::NoFuturePredictions {
                station: self.station.clone(),
            },
            Direction::Backward => MosmixError::NoHistoricPredictions {
                station: self.station.clone(),
            },
        })
    }

    /// Sum of up to `hours` consecutive samples of `element`, starting at the first
    /// step after `at`. Missing samples contribute nothing; a window running past the
    /// end of the series sums what is available.
    pub fn windowed_sum(
        &self,
        element: &str,
        hours: usize,
        at: DateTime<Utc>,
    ) -> Result<f64, MosmixError> {
        let idx = self.time_index(at)?;
        let series = self.require_series(element)?;
        Ok(series
            .iter()
            .skip(idx)
            .take(hours)
            .filter(|v| !v.is_nan())
            .sum())
    }
}
