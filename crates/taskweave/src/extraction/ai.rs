//! Completion-backed extraction, consulted only when the rule pass finds nothing.
//!
//! No model client ships with the crate; callers plug one in through
//! [`CompletionBackend`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::ExtractionStrategy;
use crate::config::ExtractionConfig;
use crate::error::ExtractionError;
use crate::model::{DueDate, Event, ExtractionMethod, Priority, TaskDraft, UNASSIGNED};
use crate::sanitize::truncate_chars;

/// Text-completion collaborator: prompt in, raw model output out.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, ExtractionError>;
}

/// Neutralizes chat-template control sequences in user text.
fn sanitize_for_prompt(text: &str) -> String {
    text.replace("<|", "< |")
        .replace("|>", "| >")
        .replace("<s>", "< s >")
        .replace("</s>", "< / s >")
        .replace("[INST]", "[ INST ]")
        .replace("[/INST]", "[ / INST ]")
        .replace("<<SYS>>", "< < SYS > >")
        .replace("<</SYS>>", "< < / SYS > >")
}

#[derive(Debug, Deserialize)]
struct AiTask {
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    priority: Option<String>,
    #[serde(default)]
    assignee: Option<String>,
    #[serde(default)]
    due_date: Option<String>,
    #[serde(default = "default_actionable")]
    actionable: bool,
    #[serde(default)]
    confidence: f32,
}

fn default_actionable() -> bool {
    true
}

pub struct AiExtractor {
    backend: Arc<dyn CompletionBackend>,
    timeout: Duration,
    min_confidence: f32,
    max_drafts: usize,
    title_max_len: usize,
}

impl AiExtractor {
    pub fn new(backend: Arc<dyn CompletionBackend>, config: &ExtractionConfig) -> Self {
        Self {
            backend,
            timeout: Duration::from_secs(config.ai.timeout_secs),
            min_confidence: config.ai.min_confidence,
            max_drafts: config.max_drafts_per_event,
            title_max_len: config.title_max_len,
        }
    }

    fn build_prompt(&self, event: &Event) -> String {
        format!(
            "Extract actionable tasks from the following {source} message.\n\
             Respond with a JSON array only. Each element has the fields \
             \"title\", \"description\", \"priority\" (low|medium|high|critical), \
             \"assignee\" (username or null), \"due_date\" (as written, or null), \
             \"actionable\" (bool) and \"confidence\" (0.0-1.0).\n\
             Respond with [] when there is nothing to do.\n\n\
             Message:\n{text}\n",
            source = event.source,
            text = sanitize_for_prompt(&event.raw_text),
        )
    }

    fn parse_response(&self, response: &str, event: &Event) -> Result<Vec<TaskDraft>, ExtractionError> {
        let json = extract_json_array(response);
        let parsed: Vec<AiTask> = serde_json::from_str(json)
            .map_err(|e| ExtractionError::ResponseParse(format!("{}: {}", e, json)))?;

        Ok(parsed
            .into_iter()
            .filter(|t| t.actionable && t.confidence >= self.min_confidence && !t.title.trim().is_empty())
            .take(self.max_drafts)
            .map(|t| TaskDraft {
                title: truncate_chars(t.title.trim(), self.title_max_len).to_string(),
                description: t.description.unwrap_or_else(|| event.raw_text.clone()),
                source_sentence: String::new(),
                suggested_priority: t
                    .priority
                    .and_then(|p| p.parse().ok())
                    .unwrap_or(Priority::Medium),
                assignee: t
                    .assignee
                    .map(|a| a.trim_start_matches('@').to_string())
                    .filter(|a| !a.is_empty())
                    .unwrap_or_else(|| UNASSIGNED.to_string()),
                due_date: t.due_date.filter(|d| !d.is_empty()).map(DueDate::unresolved),
                source_event_id: event.id.clone(),
                extraction_method: ExtractionMethod::AiBased,
                confidence: t.confidence.clamp(0.0, 1.0),
            })
            .collect())
    }
}

/// The outermost `[...]` in a response that may carry prose around it.
fn extract_json_array(response: &str) -> &str {
    match (response.find('['), response.rfind(']')) {
        (Some(start), Some(end)) if end > start => &response[start..=end],
        _ => response.trim(),
    }
}

#[async_trait]
impl ExtractionStrategy for AiExtractor {
    fn name(&self) -> &'static str {
        "ai"
    }

    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::AiBased
    }

    async fn extract(&self, event: &Event) -> Result<Vec<TaskDraft>, ExtractionError> {
        let prompt = self.build_prompt(event);
        let response = tokio::time::timeout(self.timeout, self.backend.complete(&prompt))
            .await
            .map_err(|_| ExtractionError::Timeout(self.timeout))??;
        self.parse_response(&response, event)
    }
}
