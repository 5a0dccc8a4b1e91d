//! MOSMIX element codes used by the standard forecast snapshot.
//!
//! MOSMIX identifies every meteorological variable by a short code carried in the
//! `dwd:elementName` attribute of a `dwd:Forecast` element. See the
//! [DWD element list](https://opendata.dwd.de/weather/lib/MetElementDefinition.xml)
//! for the complete vocabulary; any of those codes can be requested as an extra field.

/// Air temperature 2 m above surface, Kelvin.
pub const TEMPERATURE: &str = "TTT";
/// Dew point 2 m above surface, Kelvin.
pub const DEW_POINT: &str = "Td";
/// Mean wind speed, m/s.
pub const WIND_SPEED: &str = "FF";
/// Mean wind direction, degrees.
pub const WIND_DIRECTION: &str = "DD";
/// Probability of any precipitation within the last hour, percent.
pub const PRECIPITATION_PROBABILITY: &str = "wwP";
/// Total precipitation during the last hour, consistent with significant weather, kg/m².
pub const PRECIPITATION_AMOUNT: &str = "RR1c";

/// Elements every station always decodes, regardless of the extra fields its callers request.
pub const BASE_ELEMENTS: [&str; 6] = [
    TEMPERATURE,
    DEW_POINT,
    WIND_SPEED,
    WIND_DIRECTION,
    PRECIPITATION_PROBABILITY,
    PRECIPITATION_AMOUNT,
];
