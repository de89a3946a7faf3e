// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Workflow runners: the pluggable part of a workflow run

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::{RunUpdate, WorkflowRun};
use crate::config::{RunnerKind, WorkflowConfig};
use crate::store::{RecordId, RecordStore};
use crate::{AzError, Result};

/// Lets a runner publish intermediate progress for its run
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    runs: RecordStore<WorkflowRun>,
    run_id: RecordId,
}

impl ProgressReporter {
    pub(crate) fn new(runs: RecordStore<WorkflowRun>, run_id: RecordId) -> Self {
        Self { runs, run_id }
    }

    pub fn run_id(&self) -> &RecordId {
        &self.run_id
    }

    /// Publish progress (capped below 100 until the run completes)
    pub fn report(&self, progress: u8, message: impl Into<String>) -> Result<()> {
        let update = RunUpdate {
            progress: Some(progress.min(99)),
            message: Some(message.into()),
            ..Default::default()
        };
        self.runs.update(&self.run_id, update).map(|_| ())
    }
}

/// Executes the body of a workflow run
#[async_trait]
pub trait WorkflowRunner: Send + Sync {
    /// Name of this runner
    fn name(&self) -> &'static str;

    /// Run to completion, returning an optional completion message.
    /// An error marks the run failed; it is never retried.
    async fn run(&self, run: &WorkflowRun, progress: &ProgressReporter) -> Result<Option<String>>;
}

/// Stands in for a real workflow engine by stepping through timed stages
pub struct SimulatedRunner {
    steps: u32,
    step_delay: Duration,
}

impl SimulatedRunner {
    pub fn new(steps: u32, step_delay: Duration) -> Self {
        Self {
            steps: steps.max(1),
            step_delay,
        }
    }
}

#[async_trait]
impl WorkflowRunner for SimulatedRunner {
    fn name(&self) -> &'static str {
        "simulated"
    }

    async fn run(&self, run: &WorkflowRun, progress: &ProgressReporter) -> Result<Option<String>> {
        for step in 1..=self.steps {
            tokio::time::sleep(self.step_delay).await;
            let pct = (step * 100 / self.steps) as u8;
            progress.report(pct, format!("Step {}/{}", step, self.steps))?;
            debug!("Run {} at {}%", run.id, pct);
        }
        Ok(Some(format!("Workflow '{}' finished", run.workflow_id)))
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WebhookRequest<'a> {
    run_id: &'a RecordId,
    workflow_id: &'a str,
    payload: &'a serde_json::Value,
}

/// Hands the run to an external workflow engine through its webhook
pub struct WebhookRunner {
    client: Client,
    url: String,
}

impl WebhookRunner {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl WorkflowRunner for WebhookRunner {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn run(&self, run: &WorkflowRun, progress: &ProgressReporter) -> Result<Option<String>> {
        let url = format!("{}/{}", self.url, run.workflow_id);
        let request = WebhookRequest {
            run_id: &run.id,
            workflow_id: &run.workflow_id,
            payload: &run.payload,
        };

        debug!("Posting run {} to {}", run.id, url);
        progress.report(10, "Sent to workflow engine")?;

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| AzError::Workflow(format!("webhook {} unreachable: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AzError::Workflow(format!("webhook returned status {}", status)));
        }

        info!("Workflow engine accepted run {}", run.id);
        Ok(Some(format!("Accepted by workflow engine ({})", status)))
    }
}

/// Build the runner selected in the configuration
pub fn runner_from_config(config: &WorkflowConfig) -> Result<Arc<dyn WorkflowRunner>> {
    match config.runner {
        RunnerKind::Simulated => Ok(Arc::new(SimulatedRunner::new(
            config.simulated_steps,
            Duration::from_millis(config.step_delay_ms),
        ))),
        RunnerKind::Webhook => {
            let url = config.webhook_url.as_deref().ok_or_else(|| {
                AzError::Config("workflows.webhook_url is required for the webhook runner".to_string())
            })?;
            Ok(Arc::new(WebhookRunner::new(url, Duration::from_secs(config.timeout_secs))?))
        }
    }
}
