// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Workflow triggers with observable runs
//!
//! Triggering a workflow creates a `pending` run record and returns a
//! [`TaskHandle`]. The run executes on the tokio runtime through a
//! [`WorkflowRunner`]; every state change, including the terminal one, is
//! published on the `workflow-runs` topic like any other record mutation.

pub mod runner;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::hub::Subscription;
use crate::store::{Record, RecordId, RecordStore, Snapshot};
use crate::{AzError, Result};

pub use runner::{runner_from_config, ProgressReporter, SimulatedRunner, WebhookRunner, WorkflowRunner};

/// Topic the workflow service publishes on
pub const TOPIC: &str = "workflow-runs";

/// Catalog entry for a triggerable workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    pub id: String,
    pub name: String,
    pub description: String,
    pub trigger: String,
    pub active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// One execution of a workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowRun {
    pub id: RecordId,
    pub workflow_id: String,
    pub payload: serde_json::Value,
    pub status: RunStatus,
    pub progress: u8,
    pub message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewWorkflowRun {
    pub workflow_id: Option<String>,
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// State change for a run. Finished runs reject every update.
#[derive(Debug, Clone, Default)]
pub struct RunUpdate {
    pub status: Option<RunStatus>,
    pub progress: Option<u8>,
    pub message: Option<String>,
}

pub type RunSnapshot = Snapshot<WorkflowRun, ()>;

impl Record for WorkflowRun {
    type Input = NewWorkflowRun;
    type Patch = RunUpdate;
    const KIND: &'static str = "workflow run";

    fn id(&self) -> &RecordId {
        &self.id
    }

    fn create(id: RecordId, input: NewWorkflowRun) -> Result<Self> {
        let workflow_id = input
            .workflow_id
            .map(|w| w.trim().to_string())
            .filter(|w| !w.is_empty())
            .ok_or_else(|| AzError::validation("workflowId is required"))?;

        Ok(Self {
            id,
            workflow_id,
            payload: input.payload,
            status: RunStatus::Pending,
            progress: 0,
            message: None,
            started_at: Utc::now(),
            finished_at: None,
        })
    }

    fn apply(&mut self, update: RunUpdate) -> Result<()> {
        if self.status.is_terminal() {
            return Err(AzError::validation(format!(
                "run {} already finished as {:?}",
                self.id, self.status
            )));
        }
        if update.status == Some(RunStatus::Pending) && self.status != RunStatus::Pending {
            return Err(AzError::validation(format!("run {} cannot return to pending", self.id)));
        }

        if let Some(progress) = update.progress {
            self.progress = progress.min(100);
        }
        if let Some(message) = update.message {
            self.message = Some(message);
        }
        if let Some(status) = update.status {
            self.status = status;
            if status == RunStatus::Completed {
                self.progress = 100;
            }
            if status.is_terminal() {
                self.finished_at = Some(Utc::now());
            }
        }
        Ok(())
    }
}

/// Handle to an in-flight workflow run
#[derive(Debug)]
pub struct TaskHandle {
    run_id: RecordId,
    runs: RecordStore<WorkflowRun>,
    join: JoinHandle<()>,
}

impl TaskHandle {
    pub fn id(&self) -> &RecordId {
        &self.run_id
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Cancel the run and mark it failed. A run that already finished is left as is.
    pub fn abort(&self) -> Result<()> {
        self.join.abort();
        let update = RunUpdate {
            status: Some(RunStatus::Failed),
            message: Some("aborted".to_string()),
            ..Default::default()
        };
        match self.runs.update(&self.run_id, update) {
            Ok(_) => {
                info!("Aborted run {}", self.run_id);
                Ok(())
            }
            Err(AzError::Validation(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Wait for the run to reach a terminal state and return its final record
    pub async fn wait(self) -> Result<WorkflowRun> {
        match self.join.await {
            Ok(()) => {}
            Err(e) if e.is_cancelled() => {}
            Err(e) => {
                return Err(AzError::Workflow(format!("run {} panicked: {}", self.run_id, e)));
            }
        }
        self.runs.get(&self.run_id)
    }
}

/// Data service for workflow runs
#[derive(Clone)]
pub struct WorkflowService {
    runs: RecordStore<WorkflowRun>,
    runner: Arc<dyn WorkflowRunner>,
    catalog: Arc<Vec<Workflow>>,
}

impl fmt::Debug for WorkflowService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowService")
            .field("runner", &self.runner.name())
            .field("workflows", &self.catalog.len())
            .field("runs", &self.runs)
            .finish()
    }
}

impl WorkflowService {
    pub fn new(runner: Arc<dyn WorkflowRunner>, catalog: Vec<Workflow>) -> Self {
        Self {
            runs: RecordStore::new(TOPIC),
            runner,
            catalog: Arc::new(catalog),
        }
    }

    pub fn store(&self) -> &RecordStore<WorkflowRun> {
        &self.runs
    }

    pub fn runner_name(&self) -> &'static str {
        self.runner.name()
    }

    pub fn list_workflows(&self) -> &[Workflow] {
        &self.catalog
    }

    pub fn workflow(&self, id: &str) -> Result<&Workflow> {
        self.catalog
            .iter()
            .find(|w| w.id == id)
            .ok_or_else(|| AzError::not_found("workflow", id))
    }

    pub fn list_runs(&self) -> RunSnapshot {
        self.runs.list()
    }

    pub fn get_run(&self, id: &RecordId) -> Result<WorkflowRun> {
        self.runs.get(id)
    }

    /// Start a run of `workflow_id`.
    ///
    /// Must be called from within a tokio runtime. The pending run is
    /// published before this returns.
    pub fn trigger(&self, workflow_id: &str, payload: serde_json::Value) -> Result<TaskHandle> {
        let workflow = self.workflow(workflow_id)?;
        if !workflow.active {
            return Err(AzError::validation(format!("workflow '{}' is inactive", workflow_id)));
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| AzError::Workflow("workflow runs need a tokio runtime".to_string()))?;

        let run = self.runs.add(NewWorkflowRun {
            workflow_id: Some(workflow_id.to_string()),
            payload,
        })?;
        info!("Triggered workflow '{}' as run {} ({})", workflow_id, run.id, self.runner.name());

        let run_id = run.id.clone();
        let join = runtime.spawn(execute(self.runs.clone(), Arc::clone(&self.runner), run));

        Ok(TaskHandle {
            run_id,
            runs: self.runs.clone(),
            join,
        })
    }

    /// Drop finished runs in a single notification
    pub fn prune_finished(&self) -> usize {
        self.runs.remove_where(|r| r.status.is_terminal())
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&RunSnapshot) + Send + Sync + 'static,
    {
        self.runs.subscribe(callback)
    }
}

async fn execute(runs: RecordStore<WorkflowRun>, runner: Arc<dyn WorkflowRunner>, run: WorkflowRun) {
    let id = run.id.clone();
    let running = RunUpdate {
        status: Some(RunStatus::Running),
        ..Default::default()
    };
    if let Err(e) = runs.update(&id, running) {
        debug!("Run {} closed before it started: {}", id, e);
        return;
    }

    let reporter = ProgressReporter::new(runs.clone(), id.clone());
    let update = match runner.run(&run, &reporter).await {
        Ok(message) => RunUpdate {
            status: Some(RunStatus::Completed),
            message,
            ..Default::default()
        },
        Err(e) => {
            warn!("Run {} of '{}' failed: {}", id, run.workflow_id, e);
            RunUpdate {
                status: Some(RunStatus::Failed),
                message: Some(e.to_string()),
                ..Default::default()
            }
        }
    };

    if let Err(e) = runs.update(&id, update) {
        debug!("Run {} finished after it was closed: {}", id, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    fn catalog() -> Vec<Workflow> {
        vec![
            Workflow {
                id: "ingest".into(),
                name: "Ingest".into(),
                description: "Pull new sources".into(),
                trigger: "manual".into(),
                active: true,
            },
            Workflow {
                id: "retired".into(),
                name: "Retired".into(),
                description: "No longer used".into(),
                trigger: "manual".into(),
                active: false,
            },
        ]
    }

    fn simulated(steps: u32, delay_ms: u64) -> WorkflowService {
        WorkflowService::new(
            Arc::new(SimulatedRunner::new(steps, Duration::from_millis(delay_ms))),
            catalog(),
        )
    }

    struct FailingRunner;

    #[async_trait]
    impl WorkflowRunner for FailingRunner {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn run(&self, _run: &WorkflowRun, progress: &ProgressReporter) -> Result<Option<String>> {
            progress.report(50, "halfway")?;
            Err(AzError::Workflow("engine exploded".into()))
        }
    }

    #[tokio::test]
    async fn test_run_completes_through_notifications() {
        let service = simulated(3, 1);
        let statuses = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&statuses);
        let _sub = service.subscribe(move |snap| {
            if let Some(run) = snap.records().first() {
                sink.lock().unwrap().push((run.status, run.progress));
            }
        });

        let handle = service.trigger("ingest", serde_json::json!({"source": "rss"})).unwrap();
        let run = handle.wait().await.unwrap();

        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.progress, 100);
        assert!(run.finished_at.is_some());
        assert_eq!(run.payload["source"], "rss");

        let statuses = statuses.lock().unwrap();
        assert_eq!(statuses.first(), Some(&(RunStatus::Pending, 0)));
        assert_eq!(statuses.get(1), Some(&(RunStatus::Running, 0)));
        assert_eq!(statuses.last(), Some(&(RunStatus::Completed, 100)));
        // pending, running, three progress reports, completed
        assert_eq!(statuses.len(), 6);
        assert_eq!(
            statuses.iter().filter(|(s, _)| s.is_terminal()).count(),
            1
        );
    }

    #[tokio::test]
    async fn test_runner_error_fails_run() {
        let service = WorkflowService::new(Arc::new(FailingRunner), catalog());
        let run = service
            .trigger("ingest", serde_json::Value::Null)
            .unwrap()
            .wait()
            .await
            .unwrap();

        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.progress, 50);
        assert!(run.message.unwrap().contains("engine exploded"));
    }

    #[tokio::test]
    async fn test_abort_marks_run_failed() {
        let service = simulated(2, 60_000);
        let handle = service.trigger("ingest", serde_json::Value::Null).unwrap();
        handle.abort().unwrap();

        let run = handle.wait().await.unwrap();
        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.message.as_deref(), Some("aborted"));
    }

    #[tokio::test]
    async fn test_unknown_and_inactive_workflows_are_rejected() {
        let service = simulated(1, 1);
        assert!(matches!(
            service.trigger("nope", serde_json::Value::Null),
            Err(AzError::NotFound { kind: "workflow", .. })
        ));
        assert!(matches!(
            service.trigger("retired", serde_json::Value::Null),
            Err(AzError::Validation(_))
        ));
        assert!(service.list_runs().is_empty());
    }

    #[test]
    fn test_trigger_outside_runtime_fails_cleanly() {
        let service = simulated(1, 1);
        let err = service.trigger("ingest", serde_json::Value::Null).unwrap_err();
        assert!(matches!(err, AzError::Workflow(_)));
        assert!(service.list_runs().is_empty());
    }

    #[tokio::test]
    async fn test_prune_finished_keeps_active_runs() {
        let service = simulated(1, 1);
        service.trigger("ingest", serde_json::Value::Null).unwrap().wait().await.unwrap();

        // Same run store, but a runner that will not finish during the test
        let service_slow = WorkflowService {
            runs: service.runs.clone(),
            runner: Arc::new(SimulatedRunner::new(1, Duration::from_secs(60))),
            catalog: Arc::clone(&service.catalog),
        };
        let pending = service_slow.trigger("ingest", serde_json::Value::Null).unwrap();

        assert_eq!(service.prune_finished(), 1);
        assert_eq!(service.list_runs().len(), 1);
        pending.abort().unwrap();
    }

    #[test]
    fn test_finished_run_rejects_updates() {
        let mut run = WorkflowRun::create(
            RecordId::from("r1"),
            NewWorkflowRun {
                workflow_id: Some("ingest".into()),
                payload: serde_json::Value::Null,
            },
        )
        .unwrap();
        run.apply(RunUpdate {
            status: Some(RunStatus::Completed),
            ..Default::default()
        })
        .unwrap();

        let err = run
            .apply(RunUpdate {
                status: Some(RunStatus::Failed),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, AzError::Validation(_)));
        assert_eq!(run.status, RunStatus::Completed);
    }
}
