//! Webhook intake: answers handshakes inline and acknowledges content
//! payloads before the ingestion loop processes them.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::runner::Pipeline;
use crate::error::TaskweaveError;
use crate::model::{Event, EventSource, ProjectScope};
use crate::normalizer::{handshake_challenge, normalize};

/// Reply for the webhook caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "challenge", rename_all = "snake_case")]
pub enum WebhookAck {
    /// Echo this back to complete the integration's verification handshake.
    Challenge(String),
    /// Queued for processing.
    Accepted,
    /// Well-formed but without content (bot message, ping).
    Ignored,
}

pub type IntakeItem = (ProjectScope, Event);

#[derive(Clone)]
pub struct WebhookIntake {
    tx: mpsc::Sender<IntakeItem>,
    scope: ProjectScope,
}

impl WebhookIntake {
    /// Returns the intake and the receiving end for [`spawn_ingest_loop`].
    pub fn channel(scope: ProjectScope, capacity: usize) -> (Self, mpsc::Receiver<IntakeItem>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx, scope }, rx)
    }

    pub async fn receive(&self, source: EventSource, payload: &Value) -> Result<WebhookAck, TaskweaveError> {
        self.receive_for(self.scope.clone(), source, payload).await
    }

    pub async fn receive_for(
        &self,
        scope: ProjectScope,
        source: EventSource,
        payload: &Value,
    ) -> Result<WebhookAck, TaskweaveError> {
        if let Some(challenge) = handshake_challenge(source, payload) {
            tracing::debug!(%source, "answering webhook handshake");
            return Ok(WebhookAck::Challenge(challenge));
        }
        let Some(event) = normalize(source, payload, Utc::now())? else {
            return Ok(WebhookAck::Ignored);
        };
        self.tx
            .send((scope, event))
            .await
            .map_err(|_| TaskweaveError::IntakeClosed)?;
        Ok(WebhookAck::Accepted)
    }
}

/// Feeds received events through the pipeline until cancelled or every
/// sender is dropped. Queued events are still processed after cancellation.
pub fn spawn_ingest_loop(
    pipeline: Arc<Pipeline>,
    mut rx: mpsc::Receiver<IntakeItem>,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let item = tokio::select! {
                item = rx.recv() => item,
                _ = shutdown.cancelled() => {
                    rx.close();
                    rx.recv().await
                }
            };
            let Some((scope, event)) = item else {
                break;
            };
            if let Err(e) = pipeline.ingest(&scope, &event).await {
                tracing::error!(event_id = %event.id, error = %e, "failed to ingest event");
            }
        }
        tracing::info!("ingest loop stopped");
    })
}
