//! Rule-based extraction: imperative clauses and explicit task markers.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use async_trait::async_trait;
use chrono::NaiveDate;
use regex::Regex;

use super::dates::{find_dates, DateMatch};
use super::ExtractionStrategy;
use crate::config::{ExtractionConfig, PriorityConfig};
use crate::error::ExtractionError;
use crate::model::{Event, EventSource, ExtractionMethod, TaskDraft, UNASSIGNED};
use crate::priority::{PriorityScorer, ScoreContext};
use crate::sanitize::truncate_chars;

const BARE_IMPERATIVE_CONFIDENCE: f32 = 0.6;

/// Verbs that open an action clause when they appear in imperative position.
const LEAD_VERBS: &[&str] = &[
    "add", "approve", "book", "build", "call", "check", "clean", "complete", "confirm", "create",
    "debug", "deploy", "design", "document", "draft", "email", "finalize", "finish", "fix",
    "follow", "implement", "investigate", "merge", "migrate", "organize", "plan", "prepare",
    "publish", "refactor", "release", "remove", "reply", "resolve", "review", "schedule",
    "send", "set", "setup", "share", "ship", "submit", "test", "update", "upgrade", "verify",
    "write",
];

/// Words after which a lead verb is in imperative position.
const IMPERATIVE_CUES: &[&str] = &[
    "to", "please", "pls", "should", "must", "and", "then", "also", "todo", "will", "gotta",
];

/// Phrases that introduce an action regardless of the verb that follows.
const MARKERS: &[&[&str]] = &[
    &["todo"],
    &["need", "to"],
    &["needs", "to"],
    &["have", "to"],
    &["has", "to"],
    &["action", "item"],
];

/// A title ends at the first of these.
const CUT_WORDS: &[&str] = &[
    "by", "before", "until", "due", "asap", "urgently", "because", "since", "so", "once", "when",
    "if", "which", "while",
];

/// Trailing words that never end a useful title.
const TRAILING_FILLER: &[&str] = &[
    "and", "then", "also", "or", "to", "we", "i", "you", "they", "need", "needs", "have", "has",
    "should", "must", "please", "will", "can", "could", "todo", "the", "a", "an",
];

/// Words that do not count as the verb's object.
const NON_OBJECTS: &[&str] = &["the", "a", "an", "it", "this", "that", "them", "up", "out", "on"];

static RE_MENTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|[^\w@])@([A-Za-z0-9](?:[A-Za-z0-9._-]*[A-Za-z0-9])?)").unwrap());

static RE_SENTENCE_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.!?]+(?:\s+|$)|\n+").unwrap());

#[derive(Debug, Clone)]
struct Word<'a> {
    raw: &'a str,
    lower: String,
    start: usize,
    end: usize,
}

fn split_words(sentence: &str, offset: usize) -> Vec<Word<'_>> {
    let mut words = Vec::new();
    let mut start = None;
    for (idx, c) in sentence.char_indices().chain(std::iter::once((sentence.len(), ' '))) {
        match (c.is_whitespace(), start) {
            (false, None) => start = Some(idx),
            (true, Some(s)) => {
                let raw = &sentence[s..idx];
                let lower = raw
                    .trim_matches(|c: char| !c.is_alphanumeric() && c != '@')
                    .to_lowercase();
                words.push(Word {
                    raw,
                    lower,
                    start: offset + s,
                    end: offset + idx,
                });
                start = None;
            }
            _ => {}
        }
    }
    words
}

/// Sentences with their byte offset in the whole text.
fn sentences(text: &str) -> Vec<(usize, &str)> {
    let mut out = Vec::new();
    let mut last = 0;
    for boundary in RE_SENTENCE_END.find_iter(text) {
        push_sentence(&mut out, text, last, boundary.end());
        last = boundary.end();
    }
    push_sentence(&mut out, text, last, text.len());
    out
}

fn push_sentence<'a>(out: &mut Vec<(usize, &'a str)>, text: &'a str, start: usize, end: usize) {
    let slice = &text[start..end];
    let leading = slice.len() - slice.trim_start().len();
    let trimmed = slice.trim();
    if !trimmed.is_empty() {
        out.push((start + leading, trimmed));
    }
}

fn is_lead_verb(word: &str) -> bool {
    LEAD_VERBS.contains(&word)
}

fn ends_with_separator(raw: &str) -> bool {
    raw.ends_with(',') || raw.ends_with(';') || raw.ends_with(':')
}

fn is_mention(word: &Word<'_>) -> bool {
    word.lower.starts_with('@')
}

fn is_bullet(word: &Word<'_>) -> bool {
    word.lower.is_empty() || word.lower.chars().all(|c| c.is_ascii_digit())
}

/// Word indices where an action clause starts.
fn clause_starts(words: &[Word<'_>]) -> BTreeSet<usize> {
    let mut starts = BTreeSet::new();

    // Marker phrases, skipping any markers chained after them ("TODO: need to fix")
    // and the mentions that address the action ("TODO @john fix").
    let mut i = 0;
    while i < words.len() {
        if let Some(len) = marker_at(words, i) {
            let mut next = i + len;
            loop {
                if let Some(more) = marker_at(words, next) {
                    next += more;
                } else if words.get(next).is_some_and(is_mention) {
                    next += 1;
                } else {
                    break;
                }
            }
            if next < words.len() {
                starts.insert(next);
            }
            i = next;
        } else {
            i += 1;
        }
    }

    for (idx, word) in words.iter().enumerate() {
        if !is_lead_verb(&word.lower) {
            continue;
        }
        let leading = words[..idx].iter().all(is_bullet);
        let cued = idx > 0 && {
            let prev = &words[idx - 1];
            IMPERATIVE_CUES.contains(&prev.lower.as_str())
                || ends_with_separator(prev.raw)
                || is_mention(prev)
                || (prev.lower == "you"
                    && idx > 1
                    && ["can", "could", "would", "will"].contains(&words[idx - 2].lower.as_str()))
        };
        if leading || cued {
            starts.insert(idx);
        }
    }
    starts
}

fn marker_at(words: &[Word<'_>], idx: usize) -> Option<usize> {
    MARKERS.iter().find_map(|marker| {
        let matches = marker.len() <= words.len().saturating_sub(idx)
            && marker
                .iter()
                .zip(&words[idx..])
                .all(|(m, w)| *m == w.lower);
        matches.then_some(marker.len())
    })
}

/// One action clause inside a sentence.
#[derive(Debug, Clone, PartialEq)]
struct Clause {
    title: String,
    start: usize,
    end: usize,
    has_object: bool,
}

fn build_clause(sentence: &str, offset: usize, words: &[Word<'_>], dates: &[DateMatch]) -> Option<Clause> {
    let in_date = |w: &Word<'_>| dates.iter().any(|d| w.start < d.end && d.start < w.end);

    let mut taken: Vec<&Word<'_>> = Vec::new();
    for (idx, word) in words.iter().enumerate() {
        if idx > 0
            && (CUT_WORDS.contains(&word.lower.as_str()) || word.lower.starts_with('@') || in_date(word))
        {
            break;
        }
        taken.push(word);
        // Punctuation closes the phrase.
        if ends_with_separator(word.raw) {
            break;
        }
    }
    while taken
        .last()
        .is_some_and(|w| TRAILING_FILLER.contains(&w.lower.as_str()) || w.lower.is_empty())
    {
        taken.pop();
    }

    let first = taken.first()?;
    let last = taken.last()?;
    let title = sentence[first.start - offset..last.end - offset]
        .trim_end_matches(|c: char| !c.is_alphanumeric() && c != ')' && c != '"')
        .to_string();
    if title.is_empty() {
        return None;
    }
    let has_object = taken
        .iter()
        .skip(1)
        .any(|w| !w.lower.is_empty() && !NON_OBJECTS.contains(&w.lower.as_str()));

    Some(Clause {
        title,
        start: first.start,
        end: last.end,
        has_object,
    })
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn distance(span: (usize, usize), other: (usize, usize)) -> usize {
    if other.1 <= span.0 {
        span.0 - other.1
    } else {
        other.0.saturating_sub(span.1)
    }
}

pub struct RuleBasedExtractor {
    config: ExtractionConfig,
    scorer: PriorityScorer,
}

impl RuleBasedExtractor {
    pub fn new(config: ExtractionConfig, priority: PriorityConfig) -> Self {
        Self {
            config,
            scorer: PriorityScorer::new(priority),
        }
    }

    /// Synchronous core of the strategy; dates resolve against `reference`.
    pub fn extract_text(
        &self,
        text: &str,
        event_id: &str,
        source: EventSource,
        labels: &[String],
        reference: chrono::DateTime<chrono::Utc>,
    ) -> Vec<TaskDraft> {
        let whole_message_fits = text.chars().count() < self.config.short_message_len;
        let mentions: Vec<(usize, usize, &str)> = RE_MENTION
            .captures_iter(text)
            .filter_map(|caps| {
                let name = caps.get(1)?;
                Some((name.start() - 1, name.end(), name.as_str()))
            })
            .collect();
        let reference_day: NaiveDate = reference.date_naive();

        let mut seen_titles = BTreeSet::new();
        let mut drafts = Vec::new();

        for (offset, sentence) in sentences(text) {
            let words = split_words(sentence, offset);
            let dates: Vec<DateMatch> = find_dates(sentence, reference_day)
                .into_iter()
                .map(|d| DateMatch {
                    start: d.start + offset,
                    end: d.end + offset,
                    due: d.due,
                })
                .collect();
            let sentence_span = (offset, offset + sentence.len());
            let starts: Vec<usize> = clause_starts(&words).into_iter().collect();

            for (n, &start) in starts.iter().enumerate() {
                let end = starts.get(n + 1).copied().unwrap_or(words.len());
                let Some(clause) = build_clause(sentence, offset, &words[start..end], &dates) else {
                    continue;
                };
                let key = clause.title.to_lowercase();
                if !seen_titles.insert(key) {
                    continue;
                }

                let span = (clause.start, clause.end);
                let assignee = mentions
                    .iter()
                    .filter(|(s, e, _)| *s >= sentence_span.0 && *e <= sentence_span.1)
                    .min_by_key(|(s, e, _)| distance(span, (*s, *e)))
                    .map(|(_, _, name)| name.to_string())
                    .unwrap_or_else(|| UNASSIGNED.to_string());
                let due_date = dates
                    .iter()
                    .min_by_key(|d| distance(span, (d.start, d.end)))
                    .map(|d| d.due.clone());

                let description = if whole_message_fits {
                    text.trim().to_string()
                } else {
                    sentence.to_string()
                };
                let suggested_priority = self.scorer.score(
                    sentence,
                    &ScoreContext {
                        due: due_date.as_ref(),
                        source,
                        labels,
                        now: reference,
                    },
                );

                drafts.push(TaskDraft {
                    title: capitalize(truncate_chars(&clause.title, self.config.title_max_len)),
                    description,
                    source_sentence: sentence.to_string(),
                    suggested_priority,
                    assignee,
                    due_date,
                    source_event_id: event_id.to_string(),
                    extraction_method: ExtractionMethod::RuleBased,
                    confidence: if clause.has_object {
                        1.0
                    } else {
                        BARE_IMPERATIVE_CONFIDENCE
                    },
                });
            }
        }

        drafts.truncate(self.config.max_drafts_per_event);
        drafts
    }
}

#[async_trait]
impl ExtractionStrategy for RuleBasedExtractor {
    fn name(&self) -> &'static str {
        "rules"
    }

    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::RuleBased
    }

    async fn extract(&self, event: &Event) -> Result<Vec<TaskDraft>, ExtractionError> {
        Ok(self.extract_text(
            &event.raw_text,
            &event.id,
            event.source,
            &event.labels(),
            event.occurred_at,
        ))
    }
}
