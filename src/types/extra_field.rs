//! Defines [`ExtraField`], a caller-requested element that is added to the forecast
//! snapshot next to the standard fields, and the compact list syntax hosts use to
//! configure them.

use std::fmt;
use std::str::FromStr;

/// How an extra field is resolved at the query instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum InterpolationPolicy {
    /// Linear interpolation between the bracketing forecast steps.
    #[default]
    Direct,
    /// Take the first reported value from the first step strictly after the query
    /// instant onwards, skipping missing samples.
    ShiftForward,
    /// Take the nearest reported value walking backwards from the first step after
    /// the query instant, skipping missing samples.
    ShiftBackward,
}

/// A single extra element requested by a caller.
///
/// In the compact form an element code may be prefixed by any combination of
/// `<` (shift backward on gaps), `>` (shift forward on gaps) and `°` (convert
/// Kelvin to Celsius). `"°TX"` is the maximum temperature in Celsius,
/// `">RR6c"` the next reported six-hour precipitation amount.
///
/// # Examples
///
/// ```
/// use mosmix::{ExtraField, InterpolationPolicy};
///
/// let field: ExtraField = ">°TN".parse().unwrap();
/// assert_eq!(field.name, "TN");
/// assert_eq!(field.policy, InterpolationPolicy::ShiftForward);
/// assert!(field.convert_to_celsius);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExtraField {
    /// The MOSMIX element code, e.g. `"SunD1"`.
    pub name: String,
    pub policy: InterpolationPolicy,
    /// Apply Kelvin to Celsius conversion after resolving the value.
    pub convert_to_celsius: bool,
}

impl ExtraField {
    /// An extra field interpolated directly, without unit conversion.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            policy: InterpolationPolicy::Direct,
            convert_to_celsius: false,
        }
    }

    pub fn with_policy(mut self, policy: InterpolationPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn celsius(mut self) -> Self {
        self.convert_to_celsius = true;
        self
    }

    /// Parses a comma separated list such as `"<Td, >RR6c, °TX"`.
    ///
    /// Entries are trimmed; entries without an element code (e.g. `""` or `">"`) are dropped.
    pub fn parse_list(list: &str) -> Vec<ExtraField> {
        list.split(',')
            .filter_map(|entry| entry.parse::<ExtraField>().ok())
            .collect()
    }
}

/// Error returned when an extra field entry contains only prefixes or whitespace.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Extra field '{0}' does not name an element")]
pub struct MissingElementName(pub String);

impl FromStr for ExtraField {
    type Err = MissingElementName;

    fn from_str(entry: &str) -> Result<Self, Self::Err> {
        let trimmed = entry.trim();
        let mut field = ExtraField::new("");

        for (idx, ch) in trimmed.char_indices() {
            match ch {
                '<' => field.policy = InterpolationPolicy::ShiftBackward,
                '>' => field.policy = InterpolationPolicy::ShiftForward,
                '°' => field.convert_to_celsius = true,
                _ => {
                    field.name = trimmed[idx..].to_string();
                    return Ok(field);
                }
            }
        }

        Err(MissingElementName(entry.to_string()))
    }
}

impl fmt::Display for ExtraField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.policy {
            InterpolationPolicy::Direct => {}
            InterpolationPolicy::ShiftForward => f.write_str(">")?,
            InterpolationPolicy::ShiftBackward => f.write_str("<")?,
        }
        if self.convert_to_celsius {
            f.write_str("°")?;
        }
        f.write_str(&self.name)
    }
}
