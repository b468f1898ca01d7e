//! The Scheduler — one tokio loop per schedule, issuing `time_based`
//! triggers into the workflow engine.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use leadflow_core::{LeadflowError, Result, SchedulerConfig};
use leadflow_engine::WorkflowEngine;

use crate::cron::next_run_from_cron;

/// A registered schedule. `enabled` is toggled by pause/resume; the
/// underlying loop keeps running and skips fires while paused.
#[derive(Debug, Clone, Serialize)]
pub struct ScheduledTask {
    pub id: String,
    pub workflow_id: String,
    pub cron: String,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub last_fired_at: Option<DateTime<Utc>>,
    pub next_run: Option<DateTime<Utc>>,
}

struct TaskEntry {
    info: Arc<Mutex<ScheduledTask>>,
    handle: JoinHandle<()>,
}

/// Cron scheduler. Owns its schedules; each is paused/resumed/unscheduled
/// independently.
pub struct Scheduler {
    engine: Arc<WorkflowEngine>,
    tasks: Mutex<HashMap<String, TaskEntry>>,
    /// Sleep cap: long waits wake up this often to recompute the next
    /// fire, so a schedule registered for days ahead still tracks clock
    /// adjustments.
    check_interval: std::time::Duration,
}

impl Scheduler {
    pub fn new(engine: Arc<WorkflowEngine>) -> Self {
        Self::with_config(engine, &SchedulerConfig::default())
    }

    pub fn with_config(engine: Arc<WorkflowEngine>, config: &SchedulerConfig) -> Self {
        Self {
            engine,
            tasks: Mutex::new(HashMap::new()),
            check_interval: std::time::Duration::from_secs(config.check_interval_secs.max(1)),
        }
    }

    /// Create a recurring schedule. On each tick the workflow engine gets
    /// `trigger("time_based", {workflowId, scheduledAt, ...data})`.
    /// Returns the opaque task id.
    pub async fn schedule(
        &self,
        workflow_id: &str,
        cron_expression: &str,
        data: Option<Value>,
    ) -> Result<String> {
        // Reject expressions that can never fire up front
        if next_run_from_cron(cron_expression, Utc::now()).is_none() {
            return Err(LeadflowError::Workflow(format!(
                "invalid cron expression '{cron_expression}'"
            )));
        }

        let task_id = uuid::Uuid::new_v4().to_string();
        let info = Arc::new(Mutex::new(ScheduledTask {
            id: task_id.clone(),
            workflow_id: workflow_id.to_string(),
            cron: cron_expression.to_string(),
            enabled: true,
            created_at: Utc::now(),
            last_fired_at: None,
            next_run: None,
        }));

        let handle = tokio::spawn(run_schedule(
            Arc::clone(&self.engine),
            Arc::clone(&info),
            workflow_id.to_string(),
            cron_expression.to_string(),
            data.unwrap_or_else(|| json!({})),
            self.check_interval,
        ));

        tracing::info!(
            "⏰ Scheduled workflow '{}' on '{}' (task {})",
            workflow_id,
            cron_expression,
            task_id
        );
        self.tasks
            .lock()
            .await
            .insert(task_id.clone(), TaskEntry { info, handle });
        Ok(task_id)
    }

    /// Stop and remove a schedule. Returns false if unknown.
    pub async fn unschedule(&self, task_id: &str) -> bool {
        match self.tasks.lock().await.remove(task_id) {
            Some(entry) => {
                entry.handle.abort();
                tracing::info!("⏰ Unscheduled task {}", task_id);
                true
            }
            None => false,
        }
    }

    /// Pause a schedule without removing it. Returns false if unknown.
    pub async fn pause(&self, task_id: &str) -> bool {
        self.set_enabled(task_id, false).await
    }

    /// Resume a paused schedule. Returns false if unknown.
    pub async fn resume(&self, task_id: &str) -> bool {
        self.set_enabled(task_id, true).await
    }

    async fn set_enabled(&self, task_id: &str, enabled: bool) -> bool {
        let tasks = self.tasks.lock().await;
        match tasks.get(task_id) {
            Some(entry) => {
                entry.info.lock().await.enabled = enabled;
                true
            }
            None => false,
        }
    }

    /// Snapshot of all schedules.
    pub async fn tasks(&self) -> Vec<ScheduledTask> {
        let tasks = self.tasks.lock().await;
        let mut result = Vec::with_capacity(tasks.len());
        for entry in tasks.values() {
            result.push(entry.info.lock().await.clone());
        }
        result
    }

    /// Snapshot of one schedule.
    pub async fn task(&self, task_id: &str) -> Option<ScheduledTask> {
        let tasks = self.tasks.lock().await;
        match tasks.get(task_id) {
            Some(entry) => Some(entry.info.lock().await.clone()),
            None => None,
        }
    }

    /// Stop and clear every schedule. Used at process shutdown.
    pub async fn stop_all(&self) {
        let mut tasks = self.tasks.lock().await;
        for (_, entry) in tasks.drain() {
            entry.handle.abort();
        }
        tracing::info!("⏰ Scheduler stopped, all tasks cleared");
    }
}

/// The per-schedule loop: sleep until the next cron fire, trigger, repeat.
/// A tick that fails is logged and never stops the loop.
async fn run_schedule(
    engine: Arc<WorkflowEngine>,
    info: Arc<Mutex<ScheduledTask>>,
    workflow_id: String,
    cron_expression: String,
    extra: Value,
    check_interval: std::time::Duration,
) {
    loop {
        let now = Utc::now();
        let Some(next) = next_run_from_cron(&cron_expression, now) else {
            tracing::warn!(
                "⏰ Cron '{}' produced no next run for workflow '{}', stopping schedule",
                cron_expression,
                workflow_id
            );
            return;
        };
        info.lock().await.next_run = Some(next);

        let wait = (next - now).to_std().unwrap_or_default();
        tokio::time::sleep(wait.min(check_interval)).await;
        if Utc::now() < next {
            // Woke early to re-check, not yet due
            continue;
        }

        if !info.lock().await.enabled {
            tracing::debug!("⏰ Schedule for '{}' paused, skipping tick", workflow_id);
            continue;
        }

        let fired = fire_tick(&engine, &info, &workflow_id, &extra).await;
        tracing::debug!(
            "⏰ Tick for workflow '{}': {} execution(s) started",
            workflow_id,
            fired.len()
        );
    }
}

/// One due tick: build the trigger payload (`workflowId` + `scheduledAt`
/// plus any schedule data), fire it, and stamp `last_fired_at`. A tick
/// that matches nothing is a normal outcome, never an error.
async fn fire_tick(
    engine: &Arc<WorkflowEngine>,
    info: &Arc<Mutex<ScheduledTask>>,
    workflow_id: &str,
    extra: &Value,
) -> Vec<String> {
    let mut payload = json!({
        "workflowId": workflow_id,
        "scheduledAt": Utc::now().to_rfc3339(),
    });
    if let (Some(map), Some(extra_map)) = (payload.as_object_mut(), extra.as_object()) {
        for (k, v) in extra_map {
            map.insert(k.clone(), v.clone());
        }
    }

    let fired = engine.trigger("time_based", payload).await;
    info.lock().await.last_fired_at = Some(Utc::now());
    fired
}
