//! Event Normalizer: source payload in, canonical [`Event`] out.
//!
//! Dispatch is an explicit `match` on the source tag; each integration has
//! its own function in [`sources`].

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::NormalizeError;
use crate::model::{Event, EventSource};

pub mod email;
pub mod sources;
pub mod timestamp;

/// Returns `Ok(None)` when the payload has no user-facing content.
pub fn normalize(
    source: EventSource,
    payload: &Value,
    ingested_at: DateTime<Utc>,
) -> Result<Option<Event>, NormalizeError> {
    let normalized = match source {
        EventSource::Slack => sources::slack(payload, ingested_at),
        EventSource::Github => sources::github(payload, ingested_at),
        EventSource::Gmail => sources::gmail(payload, ingested_at),
        EventSource::Trello => sources::trello(payload, ingested_at),
        EventSource::Notion => sources::notion(payload, ingested_at),
        EventSource::Drive => sources::drive(payload, ingested_at),
        EventSource::Manual => sources::manual(payload, ingested_at),
    };

    match &normalized {
        Ok(Some(event)) => log::debug!("Normalized {} event {}", source, event.id),
        Ok(None) => log::debug!("No content in {} payload", source),
        Err(e) => log::warn!("Dropping {} payload: {}", source, e),
    }
    normalized
}

/// Handshake payloads the webhook layer answers itself, returning the
/// string to echo back.
pub fn handshake_challenge(source: EventSource, payload: &Value) -> Option<String> {
    match source {
        EventSource::Slack if payload.get("type").and_then(Value::as_str) == Some("url_verification") => {
            payload
                .get("challenge")
                .and_then(Value::as_str)
                .map(str::to_string)
        }
        EventSource::Github if payload.get("zen").is_some() => Some("pong".to_string()),
        _ => None,
    }
}
