use std::borrow::Cow;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::task::Priority;

/// Assignee used when no `@mention` is found near a clause.
pub const UNASSIGNED: &str = "unassigned";

/// Which extraction strategy produced a draft.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    RuleBased,
    AiBased,
}

impl ExtractionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionMethod::RuleBased => "rule_based",
            ExtractionMethod::AiBased => "ai_based",
        }
    }
}

/// A due date as it appeared in the text, plus the calendar day it resolves
/// to when that is knowable ("Friday" relative to when the event happened).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DueDate {
    pub token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
}

impl DueDate {
    pub fn unresolved(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            date: None,
        }
    }

    pub fn resolved(token: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            token: token.into(),
            date: Some(date),
        }
    }
}

/// Transient extraction result; consumed by the deduplicator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDraft {
    pub title: String,
    pub description: String,
    /// Sentence the draft came from; empty when the strategy has none.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub source_sentence: String,
    pub suggested_priority: Priority,
    pub assignee: String,
    pub due_date: Option<DueDate>,
    pub source_event_id: String,
    pub extraction_method: ExtractionMethod,
    pub confidence: f32,
}

impl TaskDraft {
    pub fn is_assigned(&self) -> bool {
        self.assignee != UNASSIGNED
    }

    /// Text the priority of this draft is scored on. Sibling drafts of one
    /// message share the description, so it only stands in when there is no
    /// originating sentence.
    pub fn scoring_text(&self) -> Cow<'_, str> {
        if self.source_sentence.is_empty() {
            Cow::Owned(format!("{} {}", self.title, self.description))
        } else {
            Cow::Borrowed(&self.source_sentence)
        }
    }
}
