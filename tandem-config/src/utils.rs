//! Serde helpers for durations expressed in (fractional) seconds

use serde::{Deserialize, Deserializer, Serializer};
use std::time::Duration;

fn seconds_to_duration<E: serde::de::Error>(seconds: f64) -> Result<Duration, E> {
    Duration::try_from_secs_f64(seconds)
        .map_err(|e| E::custom(format!("invalid duration of {} seconds: {}", seconds, e)))
}

/// `Duration` as a number of seconds
pub mod serde_seconds {
    use super::*;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(duration.as_secs_f64())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        seconds_to_duration(f64::deserialize(deserializer)?)
    }
}

/// Optional `Duration` as seconds; `null` and `0` both mean "disabled"
pub mod serde_seconds_option {
    use super::*;
    use serde::de::Error as _;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&d.as_secs_f64()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<f64>::deserialize(deserializer)? {
            None => Ok(None),
            Some(seconds) if seconds == 0.0 => Ok(None),
            Some(seconds) if seconds < 0.0 => Err(D::Error::custom(format!(
                "expected a non-negative number of seconds, got {}",
                seconds
            ))),
            Some(seconds) => seconds_to_duration(seconds).map(Some),
        }
    }
}

/// Parse seconds coming from an environment variable, "" and "null" disable
pub fn parse_optional_seconds(raw: &str) -> Result<Option<Duration>, String> {
    let raw = raw.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("null") {
        return Ok(None);
    }

    let seconds: f64 = raw.parse().map_err(|e| format!("{}", e))?;
    if seconds == 0.0 {
        return Ok(None);
    }
    Duration::try_from_secs_f64(seconds)
        .map(Some)
        .map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Debug, Serialize, Deserialize)]
    struct Timeouts {
        #[serde(with = "serde_seconds")]
        stop: Duration,
        #[serde(with = "serde_seconds_option")]
        idle: Option<Duration>,
    }

    #[test]
    fn test_fractional_seconds() {
        let timeouts: Timeouts = serde_json::from_str(r#"{"stop": 0.5, "idle": 1.25}"#).unwrap();
        assert_eq!(timeouts.stop, Duration::from_millis(500));
        assert_eq!(timeouts.idle, Some(Duration::from_millis(1250)));
    }

    #[test]
    fn test_zero_and_null_disable() {
        let zero: Timeouts = serde_json::from_str(r#"{"stop": 3, "idle": 0}"#).unwrap();
        let null: Timeouts = serde_json::from_str(r#"{"stop": 3, "idle": null}"#).unwrap();
        assert_eq!(zero.idle, None);
        assert_eq!(null.idle, None);
    }

    #[test]
    fn test_negative_seconds_are_rejected() {
        assert!(serde_json::from_str::<Timeouts>(r#"{"stop": -1, "idle": 1}"#).is_err());
        assert!(serde_json::from_str::<Timeouts>(r#"{"stop": 1, "idle": -1}"#).is_err());
    }

    #[test]
    fn test_parse_optional_seconds() {
        assert_eq!(parse_optional_seconds("2.5").unwrap(), Some(Duration::from_millis(2500)));
        assert_eq!(parse_optional_seconds("null").unwrap(), None);
        assert_eq!(parse_optional_seconds("0").unwrap(), None);
        assert!(parse_optional_seconds("soon").is_err());
    }
}
