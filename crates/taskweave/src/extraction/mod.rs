//! Extraction Engine: an ordered chain of strategies turning event text
//! into [`TaskDraft`]s.
//!
//! The engine never fails. A strategy that errors, panics or runs past
//! `strategy_timeout_secs` is logged and counts as "no drafts".

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures_util::FutureExt;
use serde::Serialize;

use crate::config::{ExtractionConfig, PriorityConfig};
use crate::error::ExtractionError;
use crate::model::{Event, EventSource, ExtractionMethod, TaskDraft};
use crate::sanitize::preview;

pub mod ai;
pub mod dates;
pub mod rules;

pub use ai::{AiExtractor, CompletionBackend};
pub use rules::RuleBasedExtractor;

#[async_trait]
pub trait ExtractionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn method(&self) -> ExtractionMethod;

    async fn extract(&self, event: &Event) -> Result<Vec<TaskDraft>, ExtractionError>;
}

/// Result of the on-demand "analyze text" call. Nothing is persisted.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisResult {
    pub tasks_extracted: usize,
    pub tasks: Vec<TaskDraft>,
}

pub struct ExtractionEngine {
    strategies: Vec<Arc<dyn ExtractionStrategy>>,
    rules: Arc<RuleBasedExtractor>,
    confidence_threshold: f32,
    strategy_timeout: Duration,
}

impl ExtractionEngine {
    /// Rule-based extraction only.
    pub fn new(config: &ExtractionConfig, priority: &PriorityConfig) -> Self {
        let rules = Arc::new(RuleBasedExtractor::new(config.clone(), priority.clone()));
        Self {
            strategies: vec![rules.clone()],
            rules,
            confidence_threshold: config.confidence_threshold,
            strategy_timeout: Duration::from_secs(config.strategy_timeout_secs),
        }
    }

    /// Appends the completion-backed fallback when `ai.enabled` is set.
    pub fn with_completion_backend(
        mut self,
        backend: Arc<dyn CompletionBackend>,
        config: &ExtractionConfig,
    ) -> Self {
        if config.ai.enabled {
            self.strategies.push(Arc::new(AiExtractor::new(backend, config)));
        } else {
            tracing::debug!("completion backend supplied but ai extraction is disabled");
        }
        self
    }

    pub fn with_strategy(mut self, strategy: Arc<dyn ExtractionStrategy>) -> Self {
        self.strategies.push(strategy);
        self
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Tries each strategy in order and stops at the first one producing a
    /// draft at or above the confidence threshold. AI-based strategies only
    /// run when nothing earlier produced any draft.
    pub async fn extract(&self, event: &Event) -> Vec<TaskDraft> {
        let mut produced_any = false;

        for strategy in &self.strategies {
            if strategy.method() == ExtractionMethod::AiBased && produced_any {
                continue;
            }
            let drafts = match self.run_strategy(strategy.as_ref(), event).await {
                Ok(drafts) => drafts,
                Err(e) => {
                    tracing::warn!(
                        strategy = strategy.name(),
                        event_id = %event.id,
                        error = %e,
                        "extraction strategy failed"
                    );
                    continue;
                }
            };
            produced_any |= !drafts.is_empty();

            let accepted: Vec<TaskDraft> = drafts
                .into_iter()
                .filter(|d| d.confidence >= self.confidence_threshold)
                .collect();
            if !accepted.is_empty() {
                tracing::debug!(
                    strategy = strategy.name(),
                    event_id = %event.id,
                    drafts = accepted.len(),
                    "extracted drafts"
                );
                return accepted;
            }
        }

        tracing::debug!(
            event_id = %event.id,
            text = %preview(&event.raw_text, 40),
            "no actionable items"
        );
        Vec::new()
    }

    async fn run_strategy(
        &self,
        strategy: &dyn ExtractionStrategy,
        event: &Event,
    ) -> Result<Vec<TaskDraft>, ExtractionError> {
        let call = AssertUnwindSafe(strategy.extract(event)).catch_unwind();
        match tokio::time::timeout(self.strategy_timeout, call).await {
            Err(_) => Err(ExtractionError::Timeout(self.strategy_timeout)),
            Ok(Err(_)) => Err(ExtractionError::Strategy(format!(
                "{} panicked",
                strategy.name()
            ))),
            Ok(Ok(result)) => result,
        }
    }

    /// Synchronous rule-based analysis for ad-hoc text.
    pub fn analyze_text(&self, text: &str, source: EventSource) -> AnalysisResult {
        let event = Event::new(source, text, Utc::now());
        let tasks: Vec<TaskDraft> = self
            .rules
            .extract_text(text, &event.id, source, &[], event.occurred_at)
            .into_iter()
            .filter(|d| d.confidence >= self.confidence_threshold)
            .collect();
        AnalysisResult {
            tasks_extracted: tasks.len(),
            tasks,
        }
    }
}
