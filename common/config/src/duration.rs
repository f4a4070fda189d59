use std::time::Duration;

use serde::{de, Deserialize, Deserializer};
use serde_json::Value;

use crate::error::ConfigError;

/// Accepts either a bare integer (seconds) or a duration string with an
/// `ms`/`s`/`m`/`h`/`d` suffix, e.g. `"10m"` (§4.I). `0` and `"0s"` both mean
/// "disabled" for timeouts, per §5's "configurable to zero" requirement.
pub fn parse_duration(raw: &str) -> Result<Duration, ConfigError> {
    let raw = raw.trim();
    if let Ok(secs) = raw.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    let split_at = raw
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| ConfigError::InvalidDuration(raw.to_owned()))?;
    let (digits, suffix) = raw.split_at(split_at);
    let amount: u64 = digits
        .parse()
        .map_err(|_| ConfigError::InvalidDuration(raw.to_owned()))?;

    let duration = match suffix {
        "ms" => Duration::from_millis(amount),
        "s" => Duration::from_secs(amount),
        "m" => Duration::from_secs(amount * 60),
        "h" => Duration::from_secs(amount * 3600),
        "d" => Duration::from_secs(amount * 86_400),
        _ => return Err(ConfigError::InvalidDuration(raw.to_owned())),
    };
    Ok(duration)
}

/// `serde(deserialize_with = "deserialize_duration")` — accepts a JSON
/// number of seconds or a duration string, matching the value grammar in
/// §4.I.
pub fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::Number(n) => {
            let secs = n.as_u64().ok_or_else(|| de::Error::custom("duration must be a non-negative integer"))?;
            Ok(Duration::from_secs(secs))
        }
        Value::String(s) => parse_duration(&s).map_err(de::Error::custom),
        other => Err(de::Error::custom(format!("invalid duration value: {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_seconds() {
        assert_eq!(parse_duration("30").unwrap(), Duration::from_secs(30));
    }

    #[test]
    fn parses_suffixed_units() {
        assert_eq!(parse_duration("10m").unwrap(), Duration::from_secs(600));
        assert_eq!(parse_duration("2h").unwrap(), Duration::from_secs(7200));
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
    }

    #[test]
    fn zero_means_disabled() {
        assert_eq!(parse_duration("0").unwrap(), Duration::from_secs(0));
        assert_eq!(parse_duration("0s").unwrap(), Duration::from_secs(0));
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_duration("ten minutes").is_err());
    }
}
