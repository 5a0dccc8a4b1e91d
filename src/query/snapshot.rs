//! Defines [`ForecastSnapshot`], the standard set of derived values a caller receives
//! for one station at one instant.

use crate::error::MosmixError;
use crate::store::forecast_table::{Direction, ForecastTable};
use crate::types::element::{
    DEW_POINT, PRECIPITATION_AMOUNT, PRECIPITATION_PROBABILITY, TEMPERATURE, WIND_DIRECTION,
    WIND_SPEED,
};
use crate::types::extra_field::{ExtraField, InterpolationPolicy};
use crate::units::{kelvin_to_celsius, relative_humidity, round_to};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Decimal places of the standard fields.
pub const STANDARD_PRECISION: i32 = 1;
/// Decimal places of caller-specified extra fields.
pub const EXTRA_PRECISION: i32 = 2;
/// Length of the upcoming precipitation window, in forecast steps (hours).
pub const PRECIPITATION_WINDOW_HOURS: usize = 24;

/// Interpolated forecast for one station at [`ForecastSnapshot::forecast_time`].
///
/// Serializes to the payload shape hosts expect (`tempc`, `windspeed`, ...), with
/// every extra field as an additional top-level key. Values the forecast does not
/// cover are `NaN` and serialize as `null`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastSnapshot {
    /// Station description from the forecast document.
    pub station: String,
    /// Air temperature, °C.
    #[serde(rename = "tempc")]
    pub temperature_c: f64,
    /// Relative humidity derived from temperature and dew point, percent.
    pub humidity: f64,
    /// Wind speed, m/s.
    #[serde(rename = "windspeed")]
    pub wind_speed: f64,
    /// Wind direction, degrees.
    #[serde(rename = "winddirection")]
    pub wind_direction: f64,
    /// Probability of precipitation, percent.
    #[serde(rename = "precipitation_perc")]
    pub precipitation_probability: f64,
    /// Precipitation expected over the next 24 hours, kg/m².
    #[serde(rename = "precipitationNext24h")]
    pub precipitation_next_24h: f64,
    #[serde(rename = "forecast_dt", with = "chrono::serde::ts_milliseconds")]
    pub forecast_time: DateTime<Utc>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, f64>,
}

impl ForecastSnapshot {
    /// Computes every standard field and each of `fields` from `table` at `at`.
    ///
    /// # Errors
    ///
    /// The first field that cannot be resolved aborts the whole snapshot.
    pub fn assemble(
        table: &ForecastTable,
        at: DateTime<Utc>,
        fields: &[ExtraField],
    ) -> Result<Self, MosmixError> {
        let temperature_c = kelvin_to_celsius(table.interpolate(TEMPERATURE, at)?);
        let dew_point_c = kelvin_to_celsius(table.interpolate(DEW_POINT, at)?);
        let wind_speed = table.interpolate(WIND_SPEED, at)?;
        let wind_direction = table.interpolate(WIND_DIRECTION, at)?;
        let precipitation_probability = table.interpolate(PRECIPITATION_PROBABILITY, at)?;
        let precipitation_next_24h =
            table.windowed_sum(PRECIPITATION_AMOUNT, PRECIPITATION_WINDOW_HOURS, at)?;

        let extra = fields
            .iter()
            .map(|field| {
                let value = resolve_extra_field(table, field, at)?;
                Ok((field.name.clone(), round_to(value, EXTRA_PRECISION)))
            })
            .collect::<Result<BTreeMap<_, _>, MosmixError>>()?;

        Ok(Self {
            station: table.description.clone(),
            temperature_c: round_to(temperature_c, STANDARD_PRECISION),
            humidity: round_to(
                relative_humidity(temperature_c, dew_point_c),
                STANDARD_PRECISION,
            ),
            wind_speed: round_to(wind_speed, STANDARD_PRECISION),
            wind_direction: round_to(wind_direction, STANDARD_PRECISION),
            precipitation_probability: round_to(precipitation_probability, STANDARD_PRECISION),
            precipitation_next_24h: round_to(precipitation_next_24h, STANDARD_PRECISION),
            forecast_time: at,
            extra,
        })
    }

    /// The host payload, including the legacy `precipitation%` key.
    pub fn to_payload(&self) -> serde_json::Result<serde_json::Value> {
        let mut payload = serde_json::to_value(self)?;
        if let Some(object) = payload.as_object_mut() {
            let probability = object
                .get("precipitation_perc")
                .cloned()
                .unwrap_or(serde_json::Value::Null);
            object.insert("precipitation%".to_string(), probability);
        }
        Ok(payload)
    }
}

/// Resolves one extra field according to its policy, before rounding.
pub fn resolve_extra_field(
    table: &ForecastTable,
    field: &ExtraField,
    at: DateTime<Utc>,
) -> Result<f64, MosmixError> {
    let value = match field.policy {
        InterpolationPolicy::Direct => table.interpolate(&field.name, at)?,
        InterpolationPolicy::ShiftForward => {
            table.nearest_valid(&field.name, at, Direction::Forward)?
        }
        InterpolationPolicy::ShiftBackward => {
            table.nearest_valid(&field.name, at, Direction::Backward)?
        }
    };
    Ok(if field.convert_to_celsius {
        kelvin_to_celsius(value)
    } else {
        value
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::t0;
    use chrono::Duration;

    fn standard_table() -> ForecastTable {
        let nan = f64::NAN;
        let mut table = ForecastTable::new("10637");
        table.description = "FRANKFURT/M".to_string();
        table.times = (0..4).map(|h| t0() + Duration::hours(h)).collect();
        let series: [(&str, Vec<f64>); 8] = [
            ("TTT", vec![280.0, 282.0, 284.0, 286.0]),
            ("Td", vec![275.0, 276.0, 277.0, 278.0]),
            ("FF", vec![2.0, 4.0, 6.0, 8.0]),
            ("DD", vec![180.0, 200.0, 220.0, 240.0]),
            ("wwP", vec![10.0, 20.0, nan, 40.0]),
            ("RR1c", vec![0.1, 0.2, nan, 0.4]),
            ("TX", vec![nan, nan, 290.15, nan]),
            ("SunD1", vec![0.0, 1800.0, 3600.0, 3600.0]),
        ];
        for (name, values) in series {
            table.series.insert(name.to_string(), values);
        }
        table
    }

    #[test]
    fn test_assemble_standard_fields() {
        let table = standard_table();
        let at = t0() + Duration::minutes(30);
        let snapshot = ForecastSnapshot::assemble(&table, at, &[]).unwrap();

        assert_eq!(snapshot.station, "FRANKFURT/M");
        // 281.0 K = 7.85 °C
        assert_eq!(snapshot.temperature_c, 7.9);
        assert_eq!(snapshot.wind_speed, 3.0);
        assert_eq!(snapshot.wind_direction, 190.0);
        assert_eq!(snapshot.precipitation_probability, 15.0);
        // Window starts at index 1: 0.2 + missing + 0.4
        assert_eq!(snapshot.precipitation_next_24h, 0.6);
        assert!(snapshot.humidity > 0.0 && snapshot.humidity < 100.0);
        let expected_humidity = round_to(
            relative_humidity(kelvin_to_celsius(281.0), kelvin_to_celsius(275.5)),
            1,
        );
        assert_eq!(snapshot.humidity, expected_humidity);
        assert_eq!(snapshot.forecast_time, at);
        assert!(snapshot.extra.is_empty());
    }

    #[test]
    fn test_assemble_extra_fields_by_policy() {
        let table = standard_table();
        let at = t0() + Duration::minutes(30);
        let fields = ExtraField::parse_list(">°TX, SunD1, <RR1c");
        let snapshot = ForecastSnapshot::assemble(&table, at, &fields).unwrap();

        assert_eq!(snapshot.extra["TX"], 17.0);
        assert_eq!(snapshot.extra["SunD1"], 900.0);
        assert_eq!(snapshot.extra["RR1c"], 0.2);
    }

    #[test]
    fn test_unknown_extra_field_aborts_snapshot() {
        let table = standard_table();
        let fields = ExtraField::parse_list("Neff");
        assert!(matches!(
            ForecastSnapshot::assemble(&table, t0(), &fields),
            Err(MosmixError::UnknownAttribute { element, .. }) if element == "Neff"
        ));
    }

    #[test]
    fn test_missing_standard_element_aborts_snapshot() {
        let mut table = standard_table();
        table.series.remove("DD");
        assert!(matches!(
            ForecastSnapshot::assemble(&table, t0(), &[]),
            Err(MosmixError::UnknownAttribute { element, .. }) if element == "DD"
        ));
    }

    #[test]
    fn test_shift_backward_without_history_fails() {
        let table = standard_table();
        let fields = ExtraField::parse_list("<TX");
        assert!(matches!(
            ForecastSnapshot::assemble(&table, t0() - Duration::hours(1), &fields),
            Err(MosmixError::NoHistoricPredictions { .. })
        ));
    }

    #[test]
    fn test_payload_keys() {
        let table = standard_table();
        let at = t0() + Duration::minutes(30);
        let fields = ExtraField::parse_list("SunD1");
        let payload = ForecastSnapshot::assemble(&table, at, &fields)
            .unwrap()
            .to_payload()
            .unwrap();

        assert_eq!(payload["station"], "FRANKFURT/M");
        assert_eq!(payload["tempc"], 7.9);
        assert_eq!(payload["precipitation_perc"], 15.0);
        assert_eq!(payload["precipitation%"], 15.0);
        assert_eq!(payload["precipitationNext24h"], 0.6);
        assert_eq!(payload["SunD1"], 900.0);
        assert_eq!(payload["forecast_dt"], at.timestamp_millis());
    }

    #[test]
    fn test_missing_values_serialize_as_null() {
        let mut table = standard_table();
        table
            .series
            .insert("wwP".to_string(), vec![f64::NAN, f64::NAN, 1.0, 2.0]);
        let at = t0() + Duration::minutes(30);
        let payload = ForecastSnapshot::assemble(&table, at, &[])
            .unwrap()
            .to_payload()
            .unwrap();
        assert!(payload["precipitation_perc"].is_null());
    }
}
