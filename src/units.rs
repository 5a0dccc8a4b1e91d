//! Small numeric helpers shared by the query engine: unit conversion, the Magnus
//! approximation of saturation vapour pressure and the derived relative humidity.

/// Offset between the Kelvin and Celsius scales.
pub const KELVIN_OFFSET: f64 = 273.15;

/// Converts a temperature in Kelvin (the unit MOSMIX reports temperatures in) to Celsius.
///
/// The missing sentinel passes through unchanged: `kelvin_to_celsius(f64::NAN)` is `NaN`.
pub fn kelvin_to_celsius(kelvin: f64) -> f64 {
    kelvin - KELVIN_OFFSET
}

/// Saturation vapour pressure over water in hPa for a temperature in Celsius.
///
/// Uses the Magnus form `6.1078 * 10^(a*t / (b + t))` with `a = 7.5, b = 237.3`
/// at or above freezing and `a = 7.6, b = 240.7` below.
pub fn saturation_vapor_pressure(temp_c: f64) -> f64 {
    let (a, b) = if temp_c >= 0.0 {
        (7.5, 237.3)
    } else {
        (7.6, 240.7)
    };
    6.1078 * 10f64.powf((a * temp_c) / (b + temp_c))
}

/// Relative humidity in percent, derived from air temperature and dew point (both Celsius).
///
/// Each term picks its own coefficient pair, so a dew point below freezing combined
/// with an air temperature above freezing is handled correctly. The result is not rounded.
pub fn relative_humidity(temp_c: f64, dew_point_c: f64) -> f64 {
    100.0 * saturation_vapor_pressure(dew_point_c) / saturation_vapor_pressure(temp_c)
}

/// Rounds `value` to `decimals` decimal places, ties towards positive infinity
/// (`-0.25` becomes `-0.2`, `0.25` becomes `0.3`).
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor + 0.5).floor() / factor
}
