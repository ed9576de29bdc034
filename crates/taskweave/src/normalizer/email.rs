//! Gmail payloads: the API message resource or a raw RFC 822 message.

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};
use mail_parser::{Address, MessageParser};
use serde_json::Value;

use super::timestamp::{parse_epoch_millis, parse_timestamp_str};
use crate::error::NormalizeError;
use crate::model::EventSource;

/// What the normalizer needs out of an email.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ParsedEmail {
    pub message_id: Option<String>,
    pub subject: Option<String>,
    pub from: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub body: String,
}

impl ParsedEmail {
    /// Subject and body, the text tasks are extracted from.
    pub fn text(&self) -> String {
        match self.subject.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(subject) => format!("{}\n{}", subject, self.body.trim()),
            None => self.body.trim().to_string(),
        }
    }
}

/// Gmail encodes with the URL-safe alphabet; some clients pad, some don't.
pub fn decode_base64url(data: &str) -> Option<Vec<u8>> {
    let trimmed = data.trim().trim_end_matches('=');
    URL_SAFE_NO_PAD
        .decode(trimmed)
        .or_else(|_| STANDARD.decode(data.trim()))
        .ok()
}

/// Parses a raw RFC 822 message.
pub fn parse_raw(raw: &[u8]) -> Result<ParsedEmail, NormalizeError> {
    let message = MessageParser::default()
        .parse(raw)
        .ok_or_else(|| NormalizeError::malformed(EventSource::Gmail, "unparseable RFC 822 message"))?;

    let body = message
        .body_text(0)
        .map(|text| text.into_owned())
        .unwrap_or_default();

    Ok(ParsedEmail {
        message_id: message.message_id().map(str::to_string),
        subject: message.subject().map(str::to_string),
        from: message.from().and_then(format_address),
        date: message
            .date()
            .and_then(|d| Utc.timestamp_opt(d.to_timestamp(), 0).single()),
        body,
    })
}

fn format_address(address: &Address) -> Option<String> {
    let addr = address.first()?;
    match (addr.name(), addr.address()) {
        (_, Some(email)) => Some(email.to_string()),
        (Some(name), None) => Some(name.to_string()),
        (None, None) => None,
    }
}

/// Parses a Gmail API message resource (`format=full` or `format=raw`).
pub fn parse_api_message(payload: &Value) -> Result<ParsedEmail, NormalizeError> {
    if let Some(raw) = payload.get("raw").and_then(Value::as_str) {
        let bytes = decode_base64url(raw).unwrap_or_else(|| raw.as_bytes().to_vec());
        let mut parsed = parse_raw(&bytes)?;
        if parsed.message_id.is_none() {
            parsed.message_id = string_field(payload, "id");
        }
        return Ok(parsed);
    }

    let part = payload.get("payload");
    let header = |name: &str| part.and_then(|p| find_header(p, name));

    let body = part
        .and_then(plain_text_body)
        .or_else(|| string_field(payload, "snippet"))
        .unwrap_or_default();

    let date = payload
        .get("internalDate")
        .and_then(Value::as_str)
        .and_then(parse_epoch_millis)
        .or_else(|| header("Date").as_deref().and_then(parse_timestamp_str));

    Ok(ParsedEmail {
        message_id: string_field(payload, "id").or_else(|| header("Message-ID")),
        subject: header("Subject"),
        from: header("From"),
        date,
        body,
    })
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .filter(|s| !s.is_empty())
}

fn find_header(part: &Value, name: &str) -> Option<String> {
    part.get("headers")?
        .as_array()?
        .iter()
        .find(|h| {
            h.get("name")
                .and_then(Value::as_str)
                .is_some_and(|n| n.eq_ignore_ascii_case(name))
        })
        .and_then(|h| string_field(h, "value"))
}

/// Depth-first search for the first `text/plain` body.
fn plain_text_body(part: &Value) -> Option<String> {
    let mime = part.get("mimeType").and_then(Value::as_str).unwrap_or("text/plain");
    if mime.eq_ignore_ascii_case("text/plain") {
        if let Some(data) = part
            .get("body")
            .and_then(|b| b.get("data"))
            .and_then(Value::as_str)
        {
            let bytes = decode_base64url(data)?;
            return Some(String::from_utf8_lossy(&bytes).into_owned());
        }
    }
    part.get("parts")?
        .as_array()?
        .iter()
        .find_map(plain_text_body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const RAW: &str = "From: Jane Doe <jane@example.com>\r\n\
To: team@example.com\r\n\
Subject: Release checklist\r\n\
Message-ID: <abc123@example.com>\r\n\
Date: Mon, 02 Mar 2026 09:30:00 +0000\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
\r\n\
Please update the changelog before Friday.\r\n";

    #[test]
    fn test_parse_raw_message() {
        let parsed = parse_raw(RAW.as_bytes()).unwrap();
        assert_eq!(parsed.subject.as_deref(), Some("Release checklist"));
        assert_eq!(parsed.from.as_deref(), Some("jane@example.com"));
        assert_eq!(parsed.message_id.as_deref(), Some("abc123@example.com"));
        assert!(parsed.body.contains("update the changelog"));
        assert_eq!(
            parsed.date.unwrap(),
            Utc.with_ymd_and_hms(2026, 3, 2, 9, 30, 0).unwrap()
        );
        assert!(parsed.text().starts_with("Release checklist\n"));
    }

    #[test]
    fn test_parse_api_message_with_parts() {
        let body = URL_SAFE_NO_PAD.encode("Send the invoice today.");
        let payload = json!({
            "id": "18c1",
            "internalDate": "1700000000000",
            "snippet": "Send the invoice",
            "payload": {
                "mimeType": "multipart/alternative",
                "headers": [
                    {"name": "Subject", "value": "Invoice"},
                    {"name": "From", "value": "ops@example.com"}
                ],
                "parts": [
                    {"mimeType": "text/html", "body": {"data": "PGI-"}},
                    {"mimeType": "text/plain", "body": {"data": body}}
                ]
            }
        });
        let parsed = parse_api_message(&payload).unwrap();
        assert_eq!(parsed.message_id.as_deref(), Some("18c1"));
        assert_eq!(parsed.subject.as_deref(), Some("Invoice"));
        assert_eq!(parsed.body, "Send the invoice today.");
        assert_eq!(parsed.date.unwrap().timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_parse_api_raw_format() {
        let payload = json!({"id": "18c2", "raw": URL_SAFE_NO_PAD.encode(RAW)});
        let parsed = parse_api_message(&payload).unwrap();
        assert_eq!(parsed.subject.as_deref(), Some("Release checklist"));
    }

    #[test]
    fn test_snippet_fallback() {
        let payload = json!({"id": "18c3", "snippet": "Review the budget"});
        assert_eq!(parse_api_message(&payload).unwrap().body, "Review the budget");
    }
}
