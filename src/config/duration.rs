//! Duration parsing utilities.
//!
//! Human-readable duration strings like "5s", "30s", "1m", "500ms" are used
//! throughout `conductor.yaml`. This module parses them, formats them back, and
//! provides a serde adapter so config structs can hold real [`Duration`]s.

use std::time::Duration;

/// Parse a duration string like "10s", "30s", "1m", "500ms".
///
/// Supported formats:
/// - `"Nms"` - N milliseconds (e.g., "500ms")
/// - `"Ns"` - N seconds (e.g., "30s")
/// - `"Nm"` - N minutes (e.g., "5m")
/// - `"N"` - N seconds (no suffix, assumes seconds)
///
/// Returns `None` if the string cannot be parsed.
///
/// # Examples
///
/// ```
/// use service_conductor::config::parse_duration_string;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration_string("5s"), Some(Duration::from_secs(5)));
/// assert_eq!(parse_duration_string("500ms"), Some(Duration::from_millis(500)));
/// assert_eq!(parse_duration_string("1m"), Some(Duration::from_secs(60)));
/// assert_eq!(parse_duration_string("30"), Some(Duration::from_secs(30)));
/// ```
pub fn parse_duration_string(s: &str) -> Option<Duration> {
    let s = s.trim();

    if s.is_empty() {
        return None;
    }

    if let Some(ms) = s.strip_suffix("ms") {
        ms.parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
    } else {
        // Default to seconds if no suffix
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}

/// Format a duration in the shortest unit that represents it exactly.
pub fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis % 1000 != 0 {
        format!("{}ms", millis)
    } else if millis != 0 && millis % 60_000 == 0 {
        format!("{}m", millis / 60_000)
    } else {
        format!("{}s", millis / 1000)
    }
}

/// Serde adapter for `Duration` fields written as duration strings.
///
/// Bare integers are accepted on input and read as seconds.
pub mod serde_duration {
    use super::{format_duration, parse_duration_string};
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Seconds(u64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_duration(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        match Raw::deserialize(deserializer)? {
            Raw::Seconds(secs) => Ok(Duration::from_secs(secs)),
            Raw::Text(text) => parse_duration_string(&text)
                .ok_or_else(|| D::Error::custom(format!("invalid duration '{}'", text))),
        }
    }
}
