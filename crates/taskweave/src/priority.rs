//! Deterministic priority scoring.
//!
//! Signals add up into an ordinal accumulator which is then bucketed.
//! An explicit priority token in the text ("high priority", "p0") replaces
//! the computed bucket.

use std::sync::LazyLock;

use chrono::{DateTime, Duration, NaiveTime, Utc};
use regex::Regex;
use serde::Serialize;

use crate::config::PriorityConfig;
use crate::dedup::words;
use crate::model::{DueDate, EventSource, Priority};

const URGENCY_POINTS: u32 = 2;
const DUE_WITHIN_DAY_POINTS: u32 = 2;
const DUE_WITHIN_WEEK_POINTS: u32 = 1;
const INCIDENT_POINTS: u32 = 1;

static RE_EXPLICIT_PRIORITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:(critical|high|medium|low)[\s-]+priority|priority\s*[:=]?\s*(critical|high|medium|low)|(p[0-3]))\b",
    )
    .unwrap()
});

/// Inputs besides the text. `now` is passed in so scoring stays pure.
#[derive(Debug, Clone)]
pub struct ScoreContext<'a> {
    pub due: Option<&'a DueDate>,
    pub source: EventSource,
    pub labels: &'a [String],
    pub now: DateTime<Utc>,
}

/// Why a priority came out the way it did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScoreBreakdown {
    pub urgency: u32,
    pub deadline: u32,
    pub source: u32,
    pub total: u32,
    pub explicit: Option<Priority>,
    pub priority: Priority,
}

pub struct PriorityScorer {
    config: PriorityConfig,
}

impl PriorityScorer {
    pub fn new(config: PriorityConfig) -> Self {
        Self { config }
    }

    pub fn score(&self, text: &str, context: &ScoreContext<'_>) -> Priority {
        self.score_breakdown(text, context).priority
    }

    pub fn score_breakdown(&self, text: &str, context: &ScoreContext<'_>) -> ScoreBreakdown {
        let urgency = if self.has_urgency_keyword(text) {
            URGENCY_POINTS
        } else {
            0
        };
        let deadline = context
            .due
            .map(|due| deadline_points(due, context.now))
            .unwrap_or(0);
        let source = if self.is_incident(context) {
            INCIDENT_POINTS
        } else {
            0
        };
        let total = urgency + deadline + source;
        let explicit = self.explicit_priority(text);
        let priority = explicit.unwrap_or_else(|| self.bucket(total));

        ScoreBreakdown {
            urgency,
            deadline,
            source,
            total,
            explicit,
            priority,
        }
    }

    fn bucket(&self, total: u32) -> Priority {
        if total >= self.config.critical_at {
            Priority::Critical
        } else if total >= self.config.high_at {
            Priority::High
        } else if total >= self.config.medium_at {
            Priority::Medium
        } else {
            Priority::Low
        }
    }

    fn has_urgency_keyword(&self, text: &str) -> bool {
        words(text).any(|word| {
            self.config
                .urgency_keywords
                .iter()
                .any(|keyword| keyword.eq_ignore_ascii_case(&word))
        })
    }

    fn is_incident(&self, context: &ScoreContext<'_>) -> bool {
        self.config.incident_sources.contains(&context.source)
            || context.labels.iter().any(|label| {
                self.config
                    .incident_labels
                    .iter()
                    .any(|incident| incident.eq_ignore_ascii_case(label))
            })
    }

    /// First explicit token in the text wins.
    pub fn explicit_priority(&self, text: &str) -> Option<Priority> {
        let caps = RE_EXPLICIT_PRIORITY.captures(text)?;
        if let Some(level) = caps.get(1).or_else(|| caps.get(2)) {
            return level.as_str().parse().ok();
        }
        let code = caps.get(3)?.as_str().to_ascii_lowercase();
        match code.as_str() {
            "p0" => Some(Priority::Critical),
            "p1" => Some(Priority::High),
            "p2" => Some(Priority::Medium),
            "p3" => Some(Priority::Low),
            _ => None,
        }
    }
}

/// Distance is measured to the start of the due day (UTC); overdue counts
/// as due within a day. Unresolved due dates score nothing.
fn deadline_points(due: &DueDate, now: DateTime<Utc>) -> u32 {
    let Some(date) = due.date else {
        return 0;
    };
    let due_at = date.and_time(NaiveTime::MIN).and_utc();
    let remaining = due_at - now;
    if remaining <= Duration::hours(24) {
        DUE_WITHIN_DAY_POINTS
    } else if remaining <= Duration::days(7) {
        DUE_WITHIN_WEEK_POINTS
    } else {
        0
    }
}
