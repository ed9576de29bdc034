use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

/// Parses the timestamp shapes integrations send: epoch seconds as a number
/// or string (Slack `ts` is `"1700000000.000200"`), RFC 3339, RFC 2822.
pub fn parse_payload_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => n.as_f64().and_then(from_epoch_seconds),
        Value::String(s) => parse_timestamp_str(s),
        _ => None,
    }
}

pub fn parse_timestamp_str(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(secs) = s.parse::<f64>() {
        return from_epoch_seconds(secs);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    DateTime::parse_from_rfc2822(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Gmail's `internalDate` is epoch milliseconds as a string.
pub fn parse_epoch_millis(s: &str) -> Option<DateTime<Utc>> {
    let millis = s.trim().parse::<i64>().ok()?;
    Utc.timestamp_millis_opt(millis).single()
}

fn from_epoch_seconds(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() || secs < 0.0 {
        return None;
    }
    let whole = secs.trunc() as i64;
    let nanos = ((secs - secs.trunc()) * 1e9).round() as u32;
    Utc.timestamp_opt(whole, nanos.min(999_999_999)).single()
}

/// The payload's own time when present, never later than ingestion.
pub fn occurred_at(payload_time: Option<DateTime<Utc>>, ingested_at: DateTime<Utc>) -> DateTime<Utc> {
    match payload_time {
        Some(at) if at <= ingested_at => at,
        Some(at) => {
            tracing::debug!(%at, %ingested_at, "payload timestamp is in the future, clamping");
            ingested_at
        }
        None => ingested_at,
    }
}
