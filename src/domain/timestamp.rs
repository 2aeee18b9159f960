//! Lenient timestamp parsing for ledgers written by older tooling.
//!
//! Legacy files carry RFC 3339 strings, millisecond epoch numbers, or
//! occasionally garbage. A bad timestamp must not make a whole ledger
//! unreadable, so anything unparseable becomes `None`.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(parse_value))
}

pub fn parse_value(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_str(s),
        Value::Number(n) => n
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        _ => None,
    }
}

pub fn parse_str(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                .map(|naive| naive.and_utc())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_rfc3339() {
        let dt = parse_value(&json!("2025-07-24T10:00:00.000Z")).unwrap();
        assert_eq!(dt.to_rfc3339(), "2025-07-24T10:00:00+00:00");
    }

    #[test]
    fn test_parse_epoch_millis() {
        let dt = parse_value(&json!(1_721_815_200_000_i64)).unwrap();
        assert_eq!(dt.timestamp(), 1_721_815_200);
    }

    #[test]
    fn test_parse_plain_datetime() {
        assert!(parse_str("2025-07-24 10:00:00").is_some());
        assert!(parse_str("2025-07-24T10:00:00.123456").is_some());
    }

    #[test]
    fn test_garbage_is_none() {
        assert!(parse_value(&json!("yesterday-ish")).is_none());
        assert!(parse_value(&json!(true)).is_none());
    }
}
