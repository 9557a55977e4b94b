//! Flexible timestamp parsing, ported from `clams/utils/datetime.py`.
//!
//! Every timestamp stored by the core is offset-aware UTC. Deserializers
//! additionally accept POSIX seconds for backward compatibility with the
//! source this substrate is modeled on; both forms round-trip to the same
//! UTC instant.

use chrono::{DateTime, Utc};

use crate::error::Error;

/// Parses an ISO-8601 string or POSIX-seconds numeral into an offset-aware
/// UTC instant. A naive (offset-less) ISO-8601 value is interpreted as UTC.
pub fn parse_flexible_timestamp(value: &str) -> Result<DateTime<Utc>, Error> {
    let trimmed = value.trim();

    if let Ok(posix) = trimmed.parse::<f64>() {
        let secs = posix.trunc() as i64;
        let nanos = ((posix.fract()) * 1_000_000_000.0).round() as u32;
        return DateTime::from_timestamp(secs, nanos)
            .ok_or_else(|| Error::Validation(format!("timestamp out of range: {value}")));
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.with_timezone(&Utc));
    }

    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(DateTime::from_naive_utc_and_offset(naive, Utc));
    }

    Err(Error::Validation(format!(
        "unrecognized timestamp format: {value}"
    )))
}

/// Formats a UTC instant as the ISO-8601 representation the core serializes
/// everywhere (`created_at`, `resolved_at`, ...).
pub fn to_iso8601(instant: &DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

pub fn now() -> DateTime<Utc> {
    Utc::now()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Offset;

    #[test]
    fn round_trips_iso8601_through_serialize_and_parse() {
        let now = Utc::now();
        let serialized = to_iso8601(&now);
        let parsed = parse_flexible_timestamp(&serialized).unwrap();
        assert_eq!(parsed.timestamp_micros(), now.timestamp_micros());
        assert_eq!(parsed.offset().fix().local_minus_utc(), 0);
    }

    #[test]
    fn posix_seconds_deserialize_to_same_utc_instant_as_iso8601() {
        let iso = parse_flexible_timestamp("2024-01-15T10:30:00Z").unwrap();
        let posix = parse_flexible_timestamp(&iso.timestamp().to_string()).unwrap();
        assert_eq!(iso.timestamp(), posix.timestamp());
    }

    #[test]
    fn naive_iso8601_without_offset_is_interpreted_as_utc() {
        let dt = parse_flexible_timestamp("2024-01-15T10:30:00").unwrap();
        assert_eq!(dt.offset().fix().local_minus_utc(), 0);
    }

    #[test]
    fn rejects_garbage_input() {
        assert!(parse_flexible_timestamp("not-a-timestamp").is_err());
    }
}
