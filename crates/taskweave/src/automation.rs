//! Automation rules applied after an event is ingested.
//!
//! A rule fires when its trigger matches the event's source (and, optionally,
//! the `kind` the normalizer recorded) and every condition matches. Conditions
//! compare event metadata values exactly; the key `actor` compares the actor.
//! Rule failures are logged and never fail the ingestion.

use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::StoreError;
use crate::model::{
    Event, EventSource, ExtractionMethod, Priority, ProjectScope, Task, TaskDraft, UNASSIGNED,
};
use crate::store::TaskStore;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationRule {
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub trigger: AutomationTrigger,
    #[serde(default)]
    pub conditions: BTreeMap<String, String>,
    pub action: AutomationAction,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationTrigger {
    pub source: EventSource,
    /// GitHub `issue` or `pull_request`; any kind when absent.
    #[serde(default)]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AutomationAction {
    /// One extra task per matching event.
    CreateTask {
        title: String,
        #[serde(default)]
        description: String,
        #[serde(default = "default_priority")]
        priority: Priority,
    },
    /// Raises the tasks this event created or merged into.
    RaisePriority { priority: Priority },
    /// Assigns the tasks this event created or merged into, if unassigned.
    Assign { assignee: String },
}

fn default_priority() -> Priority {
    Priority::Medium
}

impl AutomationRule {
    pub fn matches(&self, event: &Event) -> bool {
        if !self.enabled || self.trigger.source != event.source {
            return false;
        }
        if let Some(kind) = &self.trigger.kind {
            if event.metadata.get("kind") != Some(kind) {
                return false;
            }
        }
        self.conditions.iter().all(|(key, expected)| {
            let actual = match key.as_str() {
                "actor" => event.actor.as_deref(),
                _ => event.metadata.get(key).map(String::as_str),
            };
            actual == Some(expected.as_str())
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct AutomationEngine {
    rules: Vec<AutomationRule>,
}

impl AutomationEngine {
    pub fn new(rules: Vec<AutomationRule>) -> Self {
        Self { rules }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Runs every matching rule. `touched` are the tasks the event created
    /// or merged into. Returns the names of the rules that ran.
    pub async fn apply(
        &self,
        store: &dyn TaskStore,
        scope: &ProjectScope,
        event: &Event,
        touched: &[String],
    ) -> Vec<String> {
        let mut fired = Vec::new();
        for rule in self.rules.iter().filter(|r| r.matches(event)) {
            match run_action(rule, store, scope, event, touched).await {
                Ok(()) => {
                    info!(rule = %rule.name, event_id = %event.id, "automation ran");
                    fired.push(rule.name.clone());
                }
                Err(e) => warn!(rule = %rule.name, event_id = %event.id, error = %e, "automation failed"),
            }
        }
        fired
    }
}

/// Stable per rule and event, so a redelivered event finds the task it
/// already produced.
fn automated_task_id(rule: &str, event_id: &str) -> String {
    let key = format!("automation:{}:{}", rule, event_id);
    Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes()).to_string()
}

async fn run_action(
    rule: &AutomationRule,
    store: &dyn TaskStore,
    scope: &ProjectScope,
    event: &Event,
    touched: &[String],
) -> Result<(), StoreError> {
    match &rule.action {
        AutomationAction::CreateTask {
            title,
            description,
            priority,
        } => {
            let id = automated_task_id(&rule.name, &event.id);
            if store.get(&id).await?.is_some() {
                debug!(task_id = %id, "automated task already exists");
                return Ok(());
            }
            let draft = TaskDraft {
                title: title.clone(),
                description: description.clone(),
                source_sentence: String::new(),
                suggested_priority: *priority,
                assignee: UNASSIGNED.to_string(),
                due_date: None,
                source_event_id: event.id.clone(),
                extraction_method: ExtractionMethod::RuleBased,
                confidence: 1.0,
            };
            let mut task = Task::from_draft(&draft, scope, event.source, *priority, Utc::now());
            task.id = id;
            store.insert(task).await?;
            Ok(())
        }
        AutomationAction::RaisePriority { priority } => {
            update_touched(store, touched, |task| {
                if task.priority >= *priority {
                    return false;
                }
                task.priority = *priority;
                true
            })
            .await
        }
        AutomationAction::Assign { assignee } => {
            update_touched(store, touched, |task| {
                if task.assignee != UNASSIGNED {
                    return false;
                }
                task.assignee = assignee.clone();
                true
            })
            .await
        }
    }
}

async fn update_touched(
    store: &dyn TaskStore,
    touched: &[String],
    change: impl Fn(&mut Task) -> bool,
) -> Result<(), StoreError> {
    for id in touched {
        let Some(mut task) = store.get(id).await? else {
            continue;
        };
        let expected = task.updated_at;
        if change(&mut task) {
            task.touch(Utc::now());
            store.compare_and_update(&task, expected).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::store::{InMemoryTaskStore, TaskFilter};

    fn rule(name: &str, source: EventSource, action: AutomationAction) -> AutomationRule {
        AutomationRule {
            name: name.to_string(),
            enabled: true,
            trigger: AutomationTrigger { source, kind: None },
            conditions: BTreeMap::new(),
            action,
        }
    }

    fn github_issue() -> Event {
        Event::new(EventSource::Github, "Login fails on Safari", Utc::now())
            .with_external_id("acme/web/issue/7/opened")
            .with_metadata("kind", "issue")
            .with_metadata("repository", "acme/web")
            .with_actor(Some("octocat".to_string()))
    }

    #[test]
    fn test_trigger_and_conditions() {
        let event = github_issue();
        let mut r = rule(
            "triage",
            EventSource::Github,
            AutomationAction::Assign {
                assignee: "ana".to_string(),
            },
        );
        assert!(r.matches(&event));

        r.trigger.kind = Some("pull_request".to_string());
        assert!(!r.matches(&event));

        r.trigger.kind = Some("issue".to_string());
        r.conditions.insert("repository".to_string(), "acme/web".to_string());
        r.conditions.insert("actor".to_string(), "octocat".to_string());
        assert!(r.matches(&event));

        r.conditions.insert("repository".to_string(), "acme/api".to_string());
        assert!(!r.matches(&event));

        let slack = Event::new(EventSource::Slack, "Fix it", Utc::now());
        assert!(!rule("x", EventSource::Github, r.action.clone()).matches(&slack));

        let mut disabled = rule("off", EventSource::Github, r.action.clone());
        disabled.enabled = false;
        assert!(!disabled.matches(&event));
    }

    #[tokio::test]
    async fn test_create_task_runs_once_per_event() {
        let store = Arc::new(InMemoryTaskStore::new());
        let engine = AutomationEngine::new(vec![rule(
            "qa-review",
            EventSource::Github,
            AutomationAction::CreateTask {
                title: "Review new issue".to_string(),
                description: String::new(),
                priority: Priority::High,
            },
        )]);
        let scope = ProjectScope::new("org", "web");
        let event = github_issue();

        let fired = engine.apply(store.as_ref(), &scope, &event, &[]).await;
        assert_eq!(fired, vec!["qa-review".to_string()]);
        engine.apply(store.as_ref(), &scope, &event, &[]).await;

        let tasks = store.list(&TaskFilter::default()).await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].title, "Review new issue");
        assert_eq!(tasks[0].priority, Priority::High);
        assert!(tasks[0].origin_event_ids.contains(&event.id));
    }

    #[tokio::test]
    async fn test_updates_only_touch_listed_tasks() {
        let store = Arc::new(InMemoryTaskStore::new());
        let scope = ProjectScope::new("org", "web");
        let event = github_issue();
        let draft = TaskDraft {
            title: "Fix login".to_string(),
            description: String::new(),
            source_sentence: String::new(),
            suggested_priority: Priority::Low,
            assignee: UNASSIGNED.to_string(),
            due_date: None,
            source_event_id: event.id.clone(),
            extraction_method: ExtractionMethod::RuleBased,
            confidence: 1.0,
        };
        let touched = store
            .insert(Task::from_draft(&draft, &scope, EventSource::Github, Priority::Low, Utc::now()))
            .await
            .unwrap();
        let other = store
            .insert(Task::from_draft(&draft, &scope, EventSource::Github, Priority::Low, Utc::now()))
            .await
            .unwrap();

        let engine = AutomationEngine::new(vec![
            rule(
                "escalate",
                EventSource::Github,
                AutomationAction::RaisePriority {
                    priority: Priority::High,
                },
            ),
            rule(
                "route",
                EventSource::Github,
                AutomationAction::Assign {
                    assignee: "ana".to_string(),
                },
            ),
        ]);
        let fired = engine
            .apply(store.as_ref(), &scope, &event, &[touched.id.clone()])
            .await;
        assert_eq!(fired.len(), 2);

        let updated = store.get(&touched.id).await.unwrap().unwrap();
        assert_eq!(updated.priority, Priority::High);
        assert_eq!(updated.assignee, "ana");
        assert!(updated.updated_at > touched.updated_at);

        let untouched = store.get(&other.id).await.unwrap().unwrap();
        assert_eq!(untouched, other);
    }

    #[test]
    fn test_rules_deserialize_from_config_json() {
        let rules: Vec<AutomationRule> = serde_json::from_value(serde_json::json!([
            {
                "name": "urgent-issues",
                "trigger": { "source": "github", "kind": "issue" },
                "conditions": { "repository": "acme/web" },
                "action": { "type": "raise_priority", "priority": "critical" }
            },
            {
                "name": "followup",
                "enabled": false,
                "trigger": { "source": "gmail" },
                "action": { "type": "create_task", "title": "Reply to customer" }
            }
        ]))
        .unwrap();

        assert!(rules[0].enabled);
        assert_eq!(
            rules[0].action,
            AutomationAction::RaisePriority {
                priority: Priority::Critical
            }
        );
        assert!(!rules[1].enabled);
        assert!(matches!(
            &rules[1].action,
            AutomationAction::CreateTask { priority: Priority::Medium, .. }
        ));
    }
}
