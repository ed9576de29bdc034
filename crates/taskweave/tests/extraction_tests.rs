//! Table-driven tests for rule-based extraction through the public engine.

mod common;

use common::ConfigBuilder;
use taskweave::{EventSource, ExtractionEngine};

/// One extraction case.
struct ExtractionTestCase {
    name: &'static str,
    text: &'static str,
    /// Expected titles, in message order.
    titles: &'static [&'static str],
    /// Expected assignee per draft, in the same order.
    assignees: &'static [&'static str],
}

const EXTRACTION_TESTS: &[ExtractionTestCase] = &[
    ExtractionTestCase {
        name: "multi_clause_with_mention",
        text: "We need to review the API documentation and fix the authentication bug by Friday. @john should create a dashboard.",
        titles: &[
            "Review the API documentation",
            "Fix the authentication bug",
            "Create a dashboard",
        ],
        assignees: &["unassigned", "unassigned", "john"],
    },
    ExtractionTestCase {
        name: "no_cue_no_marker",
        text: "The API documentation looks great. Thanks for the update!",
        titles: &[],
        assignees: &[],
    },
    ExtractionTestCase {
        name: "small_talk",
        text: "lunch was great",
        titles: &[],
        assignees: &[],
    },
    ExtractionTestCase {
        name: "duplicate_markers_collapse",
        text: "TODO: need to fix the flaky test. TODO fix the flaky test",
        titles: &["Fix the flaky test"],
        assignees: &["unassigned"],
    },
    ExtractionTestCase {
        name: "marker_with_unlisted_verb",
        text: "We have to talk to legal about the contract",
        titles: &["Talk to legal about the contract"],
        assignees: &["unassigned"],
    },
    ExtractionTestCase {
        name: "marker_then_mention",
        text: "TODO @john fix the login bug",
        titles: &["Fix the login bug"],
        assignees: &["john"],
    },
    ExtractionTestCase {
        name: "marker_colon_then_mention",
        text: "TODO: @ana update the docs",
        titles: &["Update the docs"],
        assignees: &["ana"],
    },
    ExtractionTestCase {
        name: "action_item_then_mention",
        text: "Action item: @bob send the invoice",
        titles: &["Send the invoice"],
        assignees: &["bob"],
    },
    ExtractionTestCase {
        name: "bulleted_list",
        text: "- update the changelog\n- send release notes to @ana tomorrow",
        titles: &["Update the changelog", "Send release notes"],
        assignees: &["unassigned", "ana"],
    },
];

fn engine() -> ExtractionEngine {
    let config = ConfigBuilder::new().build();
    ExtractionEngine::new(&config.extraction, &config.priority)
}

#[test]
fn test_extraction_cases() {
    let engine = engine();

    for case in EXTRACTION_TESTS {
        let result = engine.analyze_text(case.text, EventSource::Slack);
        let titles: Vec<&str> = result.tasks.iter().map(|d| d.title.as_str()).collect();
        assert_eq!(
            titles, case.titles,
            "Test '{}': unexpected titles",
            case.name
        );
        assert_eq!(
            result.tasks_extracted,
            case.titles.len(),
            "Test '{}': tasks_extracted disagrees with tasks",
            case.name
        );

        let assignees: Vec<&str> = result.tasks.iter().map(|d| d.assignee.as_str()).collect();
        assert_eq!(
            assignees, case.assignees,
            "Test '{}': unexpected assignees",
            case.name
        );
    }
}

/// Due-date tokens that must be picked up as written.
const DUE_DATE_TESTS: &[(&str, &str, &str)] = &[
    ("weekday", "Fix the login bug by Friday", "Friday"),
    ("tomorrow", "Send the invoice tomorrow", "tomorrow"),
    ("iso_date", "Update the roadmap before 2030-01-15", "2030-01-15"),
    ("end_of_week", "Review the budget by end of week", "end of week"),
];

#[test]
fn test_due_date_tokens() {
    let engine = engine();

    for (name, text, token) in DUE_DATE_TESTS {
        let result = engine.analyze_text(text, EventSource::Manual);
        assert_eq!(result.tasks.len(), 1, "Test '{}': expected one draft", name);
        let due = result.tasks[0]
            .due_date
            .as_ref()
            .unwrap_or_else(|| panic!("Test '{}': expected a due date", name));
        assert_eq!(due.token, *token, "Test '{}': wrong token", name);
        assert!(due.date.is_some(), "Test '{}': token should resolve", name);
    }
}

#[test]
fn test_drafts_share_one_event_and_stay_deterministic() {
    let engine = engine();
    let text = "Fix the login page. Update the documentation. Send the invoice.";

    let first = engine.analyze_text(text, EventSource::Slack);
    let second = engine.analyze_text(text, EventSource::Slack);
    assert_eq!(first.tasks.len(), 3);

    let event_id = &first.tasks[0].source_event_id;
    assert!(first.tasks.iter().all(|d| &d.source_event_id == event_id));

    let priorities = |r: &taskweave::AnalysisResult| {
        r.tasks
            .iter()
            .map(|d| d.suggested_priority)
            .collect::<Vec<_>>()
    };
    assert_eq!(priorities(&first), priorities(&second));
}

#[test]
fn test_bare_imperative_passes_default_threshold() {
    let result = engine().analyze_text("Please follow up.", EventSource::Slack);
    assert_eq!(result.tasks_extracted, 1);
    assert!(result.tasks[0].confidence < 1.0);
}
