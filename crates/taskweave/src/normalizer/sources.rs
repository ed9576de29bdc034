//! One normalizer per integration. Each returns `Ok(None)` for payloads
//! that carry no user-facing text.

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use super::email;
use super::timestamp::{occurred_at, parse_payload_timestamp};
use crate::error::NormalizeError;
use crate::model::{Event, EventSource};

type Normalized = Result<Option<Event>, NormalizeError>;

fn str_at<'a>(value: &'a Value, path: &[&str]) -> Option<&'a str> {
    let mut current = value;
    for key in path {
        current = current.get(key)?;
    }
    current.as_str().filter(|s| !s.trim().is_empty())
}

fn join_text(title: &str, body: Option<&str>) -> String {
    match body.map(str::trim).filter(|b| !b.is_empty()) {
        Some(body) => format!("{}\n{}", title.trim(), body),
        None => title.trim().to_string(),
    }
}

fn label_names(labels: Option<&Value>) -> String {
    labels
        .and_then(Value::as_array)
        .map(|labels| {
            labels
                .iter()
                .filter_map(|l| l.get("name").and_then(Value::as_str).or_else(|| l.as_str()))
                .filter(|l| !l.is_empty())
                .collect::<Vec<_>>()
                .join(",")
        })
        .unwrap_or_default()
}

fn build(
    source: EventSource,
    text: String,
    payload_time: Option<DateTime<Utc>>,
    ingested_at: DateTime<Utc>,
    external_id: Option<&str>,
) -> Event {
    let event = Event::new(source, text, occurred_at(payload_time, ingested_at));
    match external_id {
        Some(id) => event.with_external_id(id),
        None => event,
    }
}

fn text_fingerprint(text: &str) -> String {
    let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");
    format!(
        "text-{}",
        Uuid::new_v5(&Uuid::NAMESPACE_OID, normalized.as_bytes()).simple()
    )
}

/// Event API envelope (`{"event": {...}}`) or a bare message.
pub fn slack(payload: &Value, ingested_at: DateTime<Utc>) -> Normalized {
    if str_at(payload, &["type"]) == Some("url_verification") {
        return Ok(None);
    }
    let message = payload.get("event").unwrap_or(payload);

    if message.get("bot_id").is_some() || str_at(message, &["subtype"]) == Some("bot_message") {
        tracing::debug!("ignoring slack bot message");
        return Ok(None);
    }

    let text = str_at(message, &["text"])
        .ok_or_else(|| NormalizeError::malformed(EventSource::Slack, "missing message text"))?;
    let ts = str_at(message, &["ts"]);
    let channel = str_at(message, &["channel"]).unwrap_or_default();

    let external_id = str_at(message, &["client_msg_id"])
        .map(str::to_string)
        .or_else(|| ts.map(|ts| format!("{}:{}", channel, ts)));

    let event = build(
        EventSource::Slack,
        text.to_string(),
        message.get("ts").and_then(parse_payload_timestamp),
        ingested_at,
        external_id.as_deref(),
    )
    .with_actor(str_at(message, &["user"]).map(str::to_string))
    .with_metadata("channel", channel)
    .with_metadata("thread_ts", str_at(message, &["thread_ts"]).unwrap_or_default());

    Ok(Some(event))
}

/// Issues, pull requests and issue comments.
pub fn github(payload: &Value, ingested_at: DateTime<Utc>) -> Normalized {
    if payload.get("zen").is_some() || (payload.get("hook_id").is_some() && payload.get("action").is_none()) {
        return Ok(None);
    }
    let repo = str_at(payload, &["repository", "full_name"]).unwrap_or_default();
    let action = str_at(payload, &["action"]).unwrap_or_default();

    let item = payload
        .get("pull_request")
        .map(|pr| ("pull_request", pr))
        .or_else(|| payload.get("issue").map(|issue| ("issue", issue)))
        .ok_or_else(|| {
            NormalizeError::malformed(EventSource::Github, "no issue or pull_request object")
        })?;
    let (kind, item) = item;

    let title = str_at(item, &["title"])
        .ok_or_else(|| NormalizeError::malformed(EventSource::Github, "missing title"))?;
    let number = item.get("number").and_then(Value::as_u64);

    let (text, external_id, timestamp) = match payload.get("comment") {
        Some(comment) => {
            let body = str_at(comment, &["body"]).ok_or_else(|| {
                NormalizeError::malformed(EventSource::Github, "comment without body")
            })?;
            let id = comment
                .get("id")
                .and_then(Value::as_u64)
                .map(|id| format!("{}/comment/{}", repo, id));
            (
                join_text(title, Some(body)),
                id,
                comment.get("created_at").and_then(parse_payload_timestamp),
            )
        }
        None => {
            let id = number.map(|n| format!("{}/{}/{}/{}", repo, kind, n, action));
            (
                join_text(title, str_at(item, &["body"])),
                id,
                item.get("updated_at")
                    .or_else(|| item.get("created_at"))
                    .and_then(parse_payload_timestamp),
            )
        }
    };

    let event = build(
        EventSource::Github,
        text,
        timestamp,
        ingested_at,
        external_id.as_deref(),
    )
    .with_actor(str_at(payload, &["sender", "login"]).map(str::to_string))
    .with_metadata("repository", repo)
    .with_metadata("action", action)
    .with_metadata("kind", kind)
    .with_metadata("number", number.map(|n| n.to_string()).unwrap_or_default())
    .with_metadata("url", str_at(item, &["html_url"]).unwrap_or_default())
    .with_metadata("labels", label_names(item.get("labels")));

    Ok(Some(event))
}

pub fn gmail(payload: &Value, ingested_at: DateTime<Utc>) -> Normalized {
    let parsed = email::parse_api_message(payload)?;
    let text = parsed.text();
    if text.is_empty() {
        return Err(NormalizeError::malformed(EventSource::Gmail, "empty subject and body"));
    }
    let event = build(
        EventSource::Gmail,
        text,
        parsed.date,
        ingested_at,
        parsed.message_id.as_deref(),
    )
    .with_actor(parsed.from.clone())
    .with_metadata("subject", parsed.subject.clone().unwrap_or_default());
    Ok(Some(event))
}

/// Card from an action payload (`action.data.card`) or a bare card.
pub fn trello(payload: &Value, ingested_at: DateTime<Utc>) -> Normalized {
    let action = payload.get("action");
    let card = action
        .and_then(|a| a.get("data"))
        .and_then(|d| d.get("card"))
        .unwrap_or(payload);

    let name = str_at(card, &["name"])
        .ok_or_else(|| NormalizeError::malformed(EventSource::Trello, "card without name"))?;
    let card_id = str_at(card, &["id"]);
    let action_id = action.and_then(|a| str_at(a, &["id"]));

    let event = build(
        EventSource::Trello,
        join_text(name, str_at(card, &["desc"])),
        action
            .and_then(|a| a.get("date"))
            .or_else(|| card.get("dateLastActivity"))
            .and_then(parse_payload_timestamp),
        ingested_at,
        action_id.or(card_id),
    )
    .with_actor(action.and_then(|a| str_at(a, &["memberCreator", "username"])).map(str::to_string))
    .with_metadata("card_id", card_id.unwrap_or_default())
    .with_metadata("due", str_at(card, &["due"]).unwrap_or_default())
    .with_metadata("labels", label_names(card.get("labels")));

    Ok(Some(event))
}

pub fn notion(payload: &Value, ingested_at: DateTime<Utc>) -> Normalized {
    let title = str_at(payload, &["title"])
        .ok_or_else(|| NormalizeError::malformed(EventSource::Notion, "page without title"))?;
    let page_id = str_at(payload, &["id"]);
    let edited = str_at(payload, &["last_edited_time"]);
    let external_id = page_id.map(|id| format!("{}@{}", id, edited.unwrap_or_default()));

    let event = build(
        EventSource::Notion,
        join_text(title, str_at(payload, &["content"])),
        payload.get("last_edited_time").and_then(parse_payload_timestamp),
        ingested_at,
        external_id.as_deref(),
    )
    .with_actor(
        str_at(payload, &["last_edited_by"])
            .or_else(|| str_at(payload, &["created_by"]))
            .map(str::to_string),
    )
    .with_metadata("page_id", page_id.unwrap_or_default());

    Ok(Some(event))
}

/// Drive comment. `author` is either a name or `{displayName}`.
pub fn drive(payload: &Value, ingested_at: DateTime<Utc>) -> Normalized {
    let content = str_at(payload, &["content"])
        .ok_or_else(|| NormalizeError::malformed(EventSource::Drive, "comment without content"))?;
    let author = str_at(payload, &["author"]).or_else(|| str_at(payload, &["author", "displayName"]));

    let event = build(
        EventSource::Drive,
        content.to_string(),
        payload
            .get("createdTime")
            .or_else(|| payload.get("modifiedTime"))
            .and_then(parse_payload_timestamp),
        ingested_at,
        str_at(payload, &["id"]),
    )
    .with_actor(author.map(str::to_string))
    .with_metadata("file_id", str_at(payload, &["file_id"]).unwrap_or_default());

    Ok(Some(event))
}

pub fn manual(payload: &Value, ingested_at: DateTime<Utc>) -> Normalized {
    let text = payload
        .as_str()
        .filter(|s| !s.trim().is_empty())
        .or_else(|| str_at(payload, &["text"]))
        .ok_or_else(|| NormalizeError::malformed(EventSource::Manual, "missing text"))?;

    // Without a caller id, resubmitting the same text is a redelivery.
    let external_id = match str_at(payload, &["id"]) {
        Some(id) => id.to_string(),
        None => text_fingerprint(text),
    };

    let event = build(
        EventSource::Manual,
        text.to_string(),
        payload.get("occurred_at").and_then(parse_payload_timestamp),
        ingested_at,
        Some(&external_id),
    )
    .with_actor(str_at(payload, &["actor"]).map(str::to_string));

    Ok(Some(event))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_slack_envelope_and_redelivery() {
        let now = Utc::now();
        let payload = json!({
            "type": "event_callback",
            "event": {
                "type": "message",
                "text": "Please review the deck",
                "user": "U123",
                "ts": "1700000000.000200",
                "channel": "C42"
            }
        });
        let first = slack(&payload, now).unwrap().unwrap();
        let second = slack(&payload, now).unwrap().unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.actor.as_deref(), Some("U123"));
        assert_eq!(first.metadata["channel"], "C42");
        assert_eq!(first.occurred_at.timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_slack_handshake_and_bots_are_skipped() {
        let now = Utc::now();
        assert!(slack(&json!({"type": "url_verification", "challenge": "x"}), now)
            .unwrap()
            .is_none());
        assert!(slack(&json!({"text": "deploy done", "bot_id": "B1"}), now)
            .unwrap()
            .is_none());
        assert!(slack(&json!({"user": "U1"}), now).is_err());
    }

    #[test]
    fn test_github_issue() {
        let payload = json!({
            "action": "opened",
            "issue": {
                "number": 7,
                "title": "Login fails on Safari",
                "body": "Fix the session cookie handling.",
                "labels": [{"name": "bug"}],
                "created_at": "2026-03-02T09:00:00Z"
            },
            "repository": {"full_name": "acme/web"},
            "sender": {"login": "octo"}
        });
        let event = github(&payload, Utc::now()).unwrap().unwrap();
        assert_eq!(event.raw_text, "Login fails on Safari\nFix the session cookie handling.");
        assert_eq!(event.labels(), vec!["bug".to_string()]);
        assert_eq!(event.actor.as_deref(), Some("octo"));
        assert_eq!(event.external_id(), Some("acme/web/issue/7/opened"));
    }

    #[test]
    fn test_github_comment_and_ping() {
        let now = Utc::now();
        let payload = json!({
            "action": "created",
            "issue": {"number": 7, "title": "Login fails"},
            "comment": {"id": 99, "body": "@ana please update the docs"},
            "repository": {"full_name": "acme/web"}
        });
        let event = github(&payload, now).unwrap().unwrap();
        assert!(event.raw_text.ends_with("@ana please update the docs"));
        assert_eq!(event.external_id(), Some("acme/web/comment/99"));

        assert!(github(&json!({"zen": "Keep it simple.", "hook_id": 1}), now)
            .unwrap()
            .is_none());
        assert!(github(&json!({"action": "created"}), now).is_err());
    }

    #[test]
    fn test_trello_notion_drive_manual() {
        let now = Utc::now();
        let card = trello(
            &json!({"id": "c1", "name": "Update pricing page", "desc": "by Friday", "labels": [{"name": "web"}]}),
            now,
        )
        .unwrap()
        .unwrap();
        assert_eq!(card.raw_text, "Update pricing page\nby Friday");
        assert_eq!(card.metadata["labels"], "web");

        let page = notion(&json!({"id": "p1", "title": "Roadmap", "content": "Create Q3 plan"}), now)
            .unwrap()
            .unwrap();
        assert_eq!(page.raw_text, "Roadmap\nCreate Q3 plan");

        let comment = drive(
            &json!({"id": "d1", "content": "Fix the chart", "author": {"displayName": "Ana"}}),
            now,
        )
        .unwrap()
        .unwrap();
        assert_eq!(comment.actor.as_deref(), Some("Ana"));

        let note = manual(&json!("Send the report"), now).unwrap().unwrap();
        assert_eq!(note.raw_text, "Send the report");
        assert!(manual(&json!({"actor": "me"}), now).is_err());
    }

    #[test]
    fn test_manual_without_id_is_keyed_by_text() {
        let first = manual(&json!({"text": "Send the report"}), Utc::now())
            .unwrap()
            .unwrap();
        let again = manual(&json!("  Send the   report "), Utc::now())
            .unwrap()
            .unwrap();
        let other = manual(&json!("Send the invoice"), Utc::now())
            .unwrap()
            .unwrap();

        assert_eq!(first.id, again.id);
        assert_ne!(first.id, other.id);
        assert!(first.metadata["external_id"].starts_with("text-"));

        let explicit = manual(&json!({"id": "m-7", "text": "Send the report"}), Utc::now())
            .unwrap()
            .unwrap();
        assert_ne!(explicit.id, first.id);
        assert_eq!(explicit.metadata["external_id"], "m-7");
    }
}
