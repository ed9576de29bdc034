use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::NormalizeError;

/// Integration an event was received from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    Slack,
    Github,
    Gmail,
    Trello,
    Notion,
    Drive,
    Manual,
}

impl EventSource {
    pub const ALL: [EventSource; 7] = [
        EventSource::Slack,
        EventSource::Github,
        EventSource::Gmail,
        EventSource::Trello,
        EventSource::Notion,
        EventSource::Drive,
        EventSource::Manual,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventSource::Slack => "slack",
            EventSource::Github => "github",
            EventSource::Gmail => "gmail",
            EventSource::Trello => "trello",
            EventSource::Notion => "notion",
            EventSource::Drive => "drive",
            EventSource::Manual => "manual",
        }
    }
}

impl fmt::Display for EventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventSource {
    type Err = NormalizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // "slack:#general" style tags carry a channel suffix
        let tag = s.split(':').next().unwrap_or(s).trim().to_ascii_lowercase();
        EventSource::ALL
            .iter()
            .copied()
            .find(|source| source.as_str() == tag)
            .ok_or_else(|| NormalizeError::UnsupportedSource(s.to_string()))
    }
}

/// Canonical shape of an inbound event, produced by the normalizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub source: EventSource,
    pub raw_text: String,
    pub occurred_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl Event {
    pub fn new(source: EventSource, raw_text: impl Into<String>, occurred_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            source,
            raw_text: raw_text.into(),
            occurred_at,
            actor: None,
            metadata: BTreeMap::new(),
        }
    }

    /// Derives the event id from the integration's own identifier so that a
    /// redelivered payload maps onto the same event.
    pub fn with_external_id(mut self, external_id: &str) -> Self {
        let key = format!("{}:{}", self.source, external_id);
        self.id = Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes()).to_string();
        self.metadata
            .insert("external_id".to_string(), external_id.to_string());
        self
    }

    pub fn with_actor(mut self, actor: Option<String>) -> Self {
        self.actor = actor.filter(|a| !a.trim().is_empty());
        self
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<String>) -> Self {
        let value = value.into();
        if !value.is_empty() {
            self.metadata.insert(key.to_string(), value);
        }
        self
    }

    pub fn external_id(&self) -> Option<&str> {
        self.metadata.get("external_id").map(String::as_str)
    }

    /// Labels attached by the source (GitHub labels, Trello labels), lowercased.
    pub fn labels(&self) -> Vec<String> {
        self.metadata
            .get("labels")
            .map(|labels| {
                labels
                    .split(',')
                    .map(|l| l.trim().to_lowercase())
                    .filter(|l| !l.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }
}
