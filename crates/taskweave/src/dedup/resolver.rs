use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use super::similarity::{similarity_for, Similarity, Tokenizer};
use crate::config::DedupConfig;
use crate::model::{EventSource, Priority, ProjectScope, Task, TaskDraft};

const MIN_TITLE_TOKENS: usize = 2;

/// What to do with a draft.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// The draft describes an existing task; the returned task already has
    /// the draft folded in and must be written back.
    Merge(Task),
    /// No candidate was close enough.
    Insert(Task),
    /// The draft's event is already recorded on this task; nothing to write.
    AlreadyRecorded(Task),
}

impl Resolution {
    pub fn task(&self) -> &Task {
        match self {
            Resolution::Merge(task) | Resolution::Insert(task) | Resolution::AlreadyRecorded(task) => {
                task
            }
        }
    }
}

pub struct Deduplicator {
    tokenizer: Tokenizer,
    similarity: Box<dyn Similarity>,
    threshold: f64,
}

impl Deduplicator {
    pub fn new(config: &DedupConfig) -> Self {
        Self::with_similarity(
            similarity_for(config.similarity),
            config.merge_threshold,
            Tokenizer::new(&config.extra_stop_words),
        )
    }

    pub fn with_similarity(
        similarity: Box<dyn Similarity>,
        threshold: f64,
        tokenizer: Tokenizer,
    ) -> Self {
        Self {
            tokenizer,
            similarity,
            threshold,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Tokens of a draft, handed to the store's candidate lookup.
    pub fn keywords(&self, draft: &TaskDraft) -> BTreeSet<String> {
        self.tokenizer
            .tokens(&format!("{} {}", draft.title, draft.description))
    }

    /// Title against title. Titles under two tokens are too thin to judge,
    /// so those compare title plus description instead. Short messages share
    /// one description across all their drafts, which is why descriptions
    /// are not compared by default.
    pub fn score(&self, draft: &TaskDraft, task: &Task) -> f64 {
        let draft_title = self.tokenizer.tokens(&draft.title);
        let task_title = self.tokenizer.tokens(&task.title);
        if draft_title.len() >= MIN_TITLE_TOKENS && task_title.len() >= MIN_TITLE_TOKENS {
            return self.similarity.score(&draft_title, &task_title);
        }
        self.similarity.score(
            &self.keywords(draft),
            &self
                .tokenizer
                .tokens(&format!("{} {}", task.title, task.description)),
        )
    }

    /// Highest-scoring active candidate at or above the threshold. Equal
    /// scores go to the most recently updated task.
    pub fn best_match<'a>(
        &self,
        draft: &TaskDraft,
        candidates: &'a [Task],
    ) -> Option<(&'a Task, f64)> {
        candidates
            .iter()
            .filter(|task| task.status.is_active())
            .map(|task| (task, self.score(draft, task)))
            .filter(|(_, score)| *score >= self.threshold)
            .max_by(|(a, a_score), (b, b_score)| {
                a_score
                    .total_cmp(b_score)
                    .then_with(|| a.updated_at.cmp(&b.updated_at))
            })
    }

    pub fn resolve(
        &self,
        draft: &TaskDraft,
        priority: Priority,
        candidates: &[Task],
        scope: &ProjectScope,
        source: EventSource,
        now: DateTime<Utc>,
    ) -> Resolution {
        let in_scope: Vec<Task> = candidates
            .iter()
            .filter(|task| task.org_id == scope.org_id && task.project_id == scope.project_id)
            .cloned()
            .collect();

        // Re-processing: a task already carrying this event and matching this
        // particular draft. Other drafts of the same event fall through.
        let recorded = in_scope
            .iter()
            .filter(|task| task.origin_event_ids.contains(&draft.source_event_id))
            .map(|task| (task, self.score(draft, task)))
            .filter(|(_, score)| *score >= self.threshold)
            .max_by(|(_, a), (_, b)| a.total_cmp(b));
        if let Some((existing, _)) = recorded {
            let rescored = priority.max(existing.priority);
            if rescored == existing.priority || !existing.status.is_active() {
                return Resolution::AlreadyRecorded(existing.clone());
            }
            let mut task = existing.clone();
            task.absorb(draft, priority, now);
            return Resolution::Merge(task);
        }

        match self.best_match(draft, &in_scope) {
            Some((candidate, score)) => {
                tracing::debug!(
                    task_id = %candidate.id,
                    score,
                    similarity = self.similarity.name(),
                    "merging draft into existing task"
                );
                let mut task = candidate.clone();
                task.absorb(draft, priority, now);
                Resolution::Merge(task)
            }
            None => Resolution::Insert(Task::from_draft(draft, scope, source, priority, now)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dedup::similarity::{Jaccard, Overlap};
    use crate::model::{ExtractionMethod, TaskStatus, UNASSIGNED};
    use chrono::Duration;

    fn scope() -> ProjectScope {
        ProjectScope::new("org", "proj")
    }

    fn draft(title: &str, event_id: &str) -> TaskDraft {
        TaskDraft {
            title: title.to_string(),
            description: title.to_string(),
            source_sentence: String::new(),
            suggested_priority: Priority::Medium,
            assignee: UNASSIGNED.to_string(),
            due_date: None,
            source_event_id: event_id.to_string(),
            extraction_method: ExtractionMethod::RuleBased,
            confidence: 1.0,
        }
    }

    fn task(title: &str, event_id: &str, priority: Priority) -> Task {
        Task::from_draft(&draft(title, event_id), &scope(), EventSource::Slack, priority, Utc::now())
    }

    fn dedup(threshold: f64) -> Deduplicator {
        Deduplicator::with_similarity(Box::new(Jaccard), threshold, Tokenizer::default())
    }

    #[test]
    fn test_score_at_threshold_merges() {
        // 3 shared of 5 distinct tokens = 0.6
        let existing = task("review api documentation today", "e1", Priority::Low);
        let resolution = dedup(0.6).resolve(
            &draft("review api documentation friday", "e2"),
            Priority::Low,
            &[existing.clone()],
            &scope(),
            EventSource::Slack,
            Utc::now(),
        );
        match resolution {
            Resolution::Merge(task) => {
                assert_eq!(task.id, existing.id);
                assert!(task.origin_event_ids.contains("e1"));
                assert!(task.origin_event_ids.contains("e2"));
            }
            other => panic!("expected merge, got {:?}", other),
        }
    }

    #[test]
    fn test_score_below_threshold_inserts() {
        let existing = task("review api documentation today", "e1", Priority::Low);
        let resolution = dedup(0.61).resolve(
            &draft("review api documentation friday", "e2"),
            Priority::Low,
            &[existing.clone()],
            &scope(),
            EventSource::Slack,
            Utc::now(),
        );
        match resolution {
            Resolution::Insert(task) => {
                assert_ne!(task.id, existing.id);
                assert_eq!(task.status, TaskStatus::Open);
            }
            other => panic!("expected insert, got {:?}", other),
        }
    }

    #[test]
    fn test_closed_candidates_are_ignored() {
        let mut existing = task("fix login bug", "e1", Priority::Low);
        existing.status = TaskStatus::Done;
        let resolution = dedup(0.6).resolve(
            &draft("fix login bug", "e2"),
            Priority::Low,
            &[existing],
            &scope(),
            EventSource::Slack,
            Utc::now(),
        );
        assert!(matches!(resolution, Resolution::Insert(_)));
    }

    #[test]
    fn test_tie_prefers_most_recently_updated() {
        let older = task("fix login bug", "e1", Priority::Low);
        let mut newer = task("fix login bug", "e2", Priority::Low);
        newer.updated_at = older.updated_at + Duration::seconds(5);

        let resolution = dedup(0.6).resolve(
            &draft("fix login bug", "e3"),
            Priority::Low,
            &[older, newer.clone()],
            &scope(),
            EventSource::Slack,
            Utc::now(),
        );
        assert_eq!(resolution.task().id, newer.id);
    }

    #[test]
    fn test_merge_keeps_higher_priority_and_status() {
        let mut existing = task("fix login bug", "e1", Priority::High);
        existing.status = TaskStatus::InProgress;
        let before = existing.updated_at;

        let resolution = dedup(0.6).resolve(
            &draft("fix login bug", "e2"),
            Priority::Low,
            &[existing],
            &scope(),
            EventSource::Slack,
            Utc::now(),
        );
        let merged = match resolution {
            Resolution::Merge(task) => task,
            other => panic!("expected merge, got {:?}", other),
        };
        assert_eq!(merged.priority, Priority::High);
        assert_eq!(merged.status, TaskStatus::InProgress);
        assert!(merged.updated_at > before);
    }

    #[test]
    fn test_same_event_is_already_recorded() {
        let mut existing = task("fix login bug", "e1", Priority::Medium);
        existing.status = TaskStatus::Done;
        let resolution = dedup(0.6).resolve(
            &draft("fix the login bug", "e1"),
            Priority::Medium,
            &[existing.clone()],
            &scope(),
            EventSource::Slack,
            Utc::now(),
        );
        assert_eq!(resolution, Resolution::AlreadyRecorded(existing));
    }

    #[test]
    fn test_same_event_rescored_higher_merges() {
        let existing = task("fix login bug", "e1", Priority::Low);
        let resolution = dedup(0.6).resolve(
            &draft("fix login bug", "e1"),
            Priority::High,
            &[existing.clone()],
            &scope(),
            EventSource::Slack,
            Utc::now(),
        );
        match resolution {
            Resolution::Merge(task) => {
                assert_eq!(task.priority, Priority::High);
                assert_eq!(task.origin_event_ids.len(), 1);
            }
            other => panic!("expected merge, got {:?}", other),
        }
    }

    #[test]
    fn test_second_draft_of_same_event_inserts() {
        let first = task("review api documentation", "e1", Priority::Low);
        let resolution = dedup(0.6).resolve(
            &draft("create a dashboard", "e1"),
            Priority::Low,
            &[first.clone()],
            &scope(),
            EventSource::Slack,
            Utc::now(),
        );
        match resolution {
            Resolution::Insert(task) => assert_ne!(task.id, first.id),
            other => panic!("expected insert, got {:?}", other),
        }
    }

    #[test]
    fn test_other_scope_never_matches() {
        let mut existing = task("fix login bug", "e1", Priority::Low);
        existing.project_id = "elsewhere".to_string();
        let resolution = dedup(0.6).resolve(
            &draft("fix login bug", "e2"),
            Priority::Low,
            &[existing],
            &scope(),
            EventSource::Slack,
            Utc::now(),
        );
        assert!(matches!(resolution, Resolution::Insert(_)));
    }

    #[test]
    fn test_overlap_matches_short_restatement() {
        let existing = task("fix the login bug on production checkout", "e1", Priority::Low);
        let dedup = Deduplicator::with_similarity(Box::new(Overlap), 0.6, Tokenizer::default());
        let resolution = dedup.resolve(
            &draft("fix login bug", "e2"),
            Priority::Low,
            &[existing],
            &scope(),
            EventSource::Github,
            Utc::now(),
        );
        assert!(matches!(resolution, Resolution::Merge(_)));
    }

    #[test]
    fn test_sibling_drafts_sharing_description_stay_apart() {
        let shared = "Fix the login bug and update the docs.";
        let mut first = draft("Fix the login bug", "e1");
        first.description = shared.to_string();
        let mut second = draft("Update the docs", "e1");
        second.description = shared.to_string();
        let existing = Task::from_draft(&first, &scope(), EventSource::Slack, Priority::Low, Utc::now());

        assert_eq!(dedup(0.6).score(&second, &existing), 0.0);
    }

    #[test]
    fn test_one_word_title_compares_descriptions() {
        let mut short = draft("Investigate", "e2");
        short.description = "investigate checkout latency spikes".to_string();
        let mut existing = task("checkout latency spikes", "e1", Priority::Low);
        existing.description = "checkout latency spikes".to_string();
        assert!(dedup(0.6).score(&short, &existing) >= 0.6);
    }
}
