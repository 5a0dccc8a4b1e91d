//! Host-facing configuration of a single station query, as it arrives from a flow
//! editor form: numbers may be given as JSON numbers or as strings.

use crate::types::extra_field::ExtraField;
use serde::{Deserialize, Deserializer};

/// Configuration of one [`StationQuery`](crate::StationQuery).
///
/// # Examples
///
/// ```
/// use mosmix::StationQueryConfig;
///
/// let config: StationQueryConfig = serde_json::from_str(
///     r#"{"mosmixStation": "10637", "repeat": "300", "lookAheadHours": 2, "additionalFields": ">°TX, SunD1"}"#,
/// ).unwrap();
/// assert_eq!(config.station, "10637");
/// assert_eq!(config.repeat, 300);
/// assert_eq!(config.extra_fields().len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StationQueryConfig {
    /// MOSMIX station identifier, e.g. `"10637"`.
    #[serde(alias = "mosmixStation")]
    pub station: String,
    /// Seconds between periodic queries; `0` disables the periodic trigger.
    #[serde(default, deserialize_with = "lenient_seconds")]
    pub repeat: u64,
    /// Offset of the query instant from now, in hours.
    #[serde(default, deserialize_with = "lenient_number")]
    pub look_ahead_hours: f64,
    /// Comma-separated extra fields in the compact `"<Td, >RR6c, °TX"` syntax.
    #[serde(default)]
    pub additional_fields: String,
}

impl StationQueryConfig {
    pub fn new(station: impl Into<String>) -> Self {
        Self {
            station: station.into(),
            ..Default::default()
        }
    }

    /// Parsed [`additional_fields`](Self::additional_fields).
    pub fn extra_fields(&self) -> Vec<ExtraField> {
        ExtraField::parse_list(&self.additional_fields)
    }

    /// The periodic trigger interval, if any.
    pub fn repeat_interval(&self) -> Option<std::time::Duration> {
        (self.repeat > 0).then(|| std::time::Duration::from_secs(self.repeat))
    }

    pub fn look_ahead(&self) -> chrono::Duration {
        hours_to_duration(self.look_ahead_hours)
    }
}

/// Converts fractional hours to a millisecond-precision duration. Non-finite input is
/// zero; values beyond what a duration can hold saturate at its bounds.
pub fn hours_to_duration(hours: f64) -> chrono::Duration {
    if !hours.is_finite() {
        return chrono::Duration::zero();
    }
    let millis = (hours * 3_600_000.0).round();
    chrono::Duration::try_milliseconds(millis as i64).unwrap_or(if millis < 0.0 {
        chrono::Duration::MIN
    } else {
        chrono::Duration::MAX
    })
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrText {
    Number(f64),
    Text(String),
}

impl NumberOrText {
    // Unparseable or missing values count as zero, like an empty form field.
    fn value(self) -> f64 {
        let value = match self {
            NumberOrText::Number(n) => n,
            NumberOrText::Text(text) => text.trim().parse().unwrap_or(0.0),
        };
        if value.is_finite() {
            value
        } else {
            0.0
        }
    }
}

fn lenient_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    Ok(Option::<NumberOrText>::deserialize(deserializer)?.map_or(0.0, NumberOrText::value))
}

fn lenient_seconds<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    let seconds = lenient_number(deserializer)?;
    Ok(if seconds > 0.0 { seconds as u64 } else { 0 })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::extra_field::InterpolationPolicy;

    #[test]
    fn test_deserialize_host_form() {
        let config: StationQueryConfig = serde_json::from_str(
            r#"{
                "mosmixStation": "10637",
                "repeat": "600",
                "lookAheadHours": "1.5",
                "additionalFields": "<Td, >RR6c, °TX"
            }"#,
        )
        .unwrap();

        assert_eq!(config.station, "10637");
        assert_eq!(config.repeat, 600);
        assert_eq!(config.look_ahead_hours, 1.5);
        assert_eq!(config.look_ahead(), chrono::Duration::minutes(90));
        assert_eq!(
            config.repeat_interval(),
            Some(std::time::Duration::from_secs(600))
        );

        let fields = config.extra_fields();
        assert_eq!(fields.len(), 3);
        assert_eq!(fields[0].policy, InterpolationPolicy::ShiftBackward);
        assert_eq!(fields[1].name, "RR6c");
        assert!(fields[2].convert_to_celsius);
    }

    #[test]
    fn test_defaults_and_lenient_numbers() {
        let config: StationQueryConfig =
            serde_json::from_str(r#"{"station": "P0001", "repeat": "", "lookAheadHours": null}"#)
                .unwrap();
        assert_eq!(config.repeat, 0);
        assert_eq!(config.repeat_interval(), None);
        assert_eq!(config.look_ahead(), chrono::Duration::zero());
        assert!(config.extra_fields().is_empty());

        let config: StationQueryConfig =
            serde_json::from_str(r#"{"station": "P0001", "repeat": -5}"#).unwrap();
        assert_eq!(config.repeat, 0);
    }

    #[test]
    fn test_hours_to_duration() {
        assert_eq!(hours_to_duration(2.0), chrono::Duration::hours(2));
        assert_eq!(hours_to_duration(-0.5), chrono::Duration::minutes(-30));
        assert_eq!(hours_to_duration(f64::NAN), chrono::Duration::zero());
    }

    #[test]
    fn test_hours_to_duration_saturates() {
        assert_eq!(hours_to_duration(-1e300), chrono::Duration::MIN);
        assert_eq!(hours_to_duration(1e300), chrono::Duration::MAX);

        let config: StationQueryConfig =
            serde_json::from_str(r#"{"station": "10637", "lookAheadHours": "-1e300"}"#).unwrap();
        assert_eq!(config.look_ahead(), chrono::Duration::MIN);
    }
}
