//! The Workflow Engine — owns workflow definitions, matches triggers,
//! runs executions.
//!
//! Constructed once at process start and passed by `Arc` to HTTP handlers,
//! the scheduler, and workers; there is no global instance.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde_json::{Value, json};
use tokio::sync::RwLock;

use crate::actions::{ActionHandler, default_handlers};
use crate::condition::conditions_match;
use crate::model::{ActionKind, ExecutionStatus, Workflow, WorkflowExecution, WorkflowStatus};

/// Default cap on retained execution records.
const EXECUTION_RETENTION: usize = 1000;

/// Trigger-matching workflow engine.
pub struct WorkflowEngine {
    workflows: RwLock<HashMap<String, Workflow>>,
    handlers: RwLock<HashMap<ActionKind, Arc<dyn ActionHandler>>>,
    executions: RwLock<HashMap<String, WorkflowExecution>>,
    /// Oldest finished executions are dropped past this count; running
    /// executions are never dropped.
    max_executions: usize,
}

impl WorkflowEngine {
    /// Create an engine with the default action handlers installed.
    pub fn new() -> Arc<Self> {
        Self::with_execution_limit(EXECUTION_RETENTION)
    }

    /// Like [`WorkflowEngine::new`] with an explicit execution retention cap.
    pub fn with_execution_limit(limit: usize) -> Arc<Self> {
        Arc::new(Self {
            workflows: RwLock::new(HashMap::new()),
            handlers: RwLock::new(default_handlers()),
            executions: RwLock::new(HashMap::new()),
            max_executions: limit.max(1),
        })
    }

    /// Register (or replace) a workflow. Upsert by id; action kinds are not
    /// validated here — a kind with no handler warns at execution time.
    pub async fn register_workflow(&self, mut workflow: Workflow) {
        workflow.updated_at = Utc::now();
        tracing::info!("⚙️ Workflow registered: '{}' ({})", workflow.name, workflow.id);
        self.workflows
            .write()
            .await
            .insert(workflow.id.clone(), workflow);
    }

    /// Install or overwrite the handler for one action kind.
    pub async fn register_handler(&self, kind: ActionKind, handler: Arc<dyn ActionHandler>) {
        self.handlers.write().await.insert(kind, handler);
    }

    /// Fire a trigger. Every active workflow whose trigger type equals
    /// `trigger_type` and whose conditions match `data` gets one
    /// independent execution, spawned concurrently. Returns the new
    /// execution ids; match order across workflows is unspecified.
    pub async fn trigger(self: &Arc<Self>, trigger_type: &str, data: Value) -> Vec<String> {
        let matched: Vec<Workflow> = {
            let workflows = self.workflows.read().await;
            workflows
                .values()
                .filter(|w| w.status == WorkflowStatus::Active)
                .filter(|w| w.trigger.trigger_type == trigger_type)
                .filter(|w| match &w.trigger.conditions {
                    Some(conditions) => conditions_match(conditions, &data),
                    None => true,
                })
                .cloned()
                .collect()
        };

        let mut execution_ids = Vec::with_capacity(matched.len());
        for workflow in matched {
            tracing::info!(
                "⚡ Workflow '{}' matched trigger '{}'",
                workflow.name,
                trigger_type
            );
            let execution = WorkflowExecution::start(&workflow.id, normalize(data.clone()));
            let id = execution.id.clone();
            self.executions
                .write()
                .await
                .insert(id.clone(), execution);

            let engine = Arc::clone(self);
            let exec_id = id.clone();
            tokio::spawn(async move {
                engine.execute_workflow(workflow, exec_id).await;
            });
            execution_ids.push(id);
        }
        execution_ids
    }

    /// Run one execution: actions in strict list order, handler output
    /// merged into the execution data, fail-fast on handler error with no
    /// rollback of earlier side effects.
    async fn execute_workflow(self: Arc<Self>, workflow: Workflow, execution_id: String) {
        let mut merged = {
            let executions = self.executions.read().await;
            executions
                .get(&execution_id)
                .map(|e| e.data.clone())
                .unwrap_or_else(|| json!({}))
        };

        for action in &workflow.actions {
            self.update_execution(&execution_id, |e| {
                e.current_action_id = Some(action.id.clone());
            })
            .await;

            if let Some(delay_ms) = action.delay_ms
                && delay_ms > 0
            {
                tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
            }

            let handler = self.handlers.read().await.get(&action.kind).cloned();
            let Some(handler) = handler else {
                tracing::warn!(
                    "⚠️ No handler for action kind '{}' (workflow '{}'), skipping",
                    action.kind,
                    workflow.id
                );
                continue;
            };

            match handler.execute(action.config.clone(), merged.clone()).await {
                Ok(output) => {
                    merge_into(&mut merged, output);
                    let snapshot = merged.clone();
                    self.update_execution(&execution_id, move |e| {
                        e.data = snapshot;
                    })
                    .await;
                }
                Err(e) => {
                    let error = e.to_string();
                    tracing::warn!(
                        "❌ Workflow '{}' failed at action '{}': {error}",
                        workflow.id,
                        action.id
                    );
                    self.update_execution(&execution_id, move |e| {
                        e.status = ExecutionStatus::Failed;
                        e.error = Some(error);
                        e.completed_at = Some(Utc::now());
                    })
                    .await;
                    self.sweep_executions().await;
                    return;
                }
            }
        }

        self.update_execution(&execution_id, |e| {
            e.status = ExecutionStatus::Completed;
            e.current_action_id = None;
            e.completed_at = Some(Utc::now());
        })
        .await;
        self.sweep_executions().await;
        tracing::info!("✅ Workflow '{}' execution completed", workflow.id);
    }

    async fn update_execution<F>(&self, id: &str, f: F)
    where
        F: FnOnce(&mut WorkflowExecution),
    {
        if let Some(execution) = self.executions.write().await.get_mut(id) {
            f(execution);
        }
    }

    /// Drop the oldest finished executions once the map exceeds the cap.
    async fn sweep_executions(&self) {
        let mut executions = self.executions.write().await;
        if executions.len() <= self.max_executions {
            return;
        }
        let mut finished: Vec<(String, chrono::DateTime<Utc>)> = executions
            .values()
            .filter(|e| e.status != ExecutionStatus::Running)
            .map(|e| (e.id.clone(), e.completed_at.unwrap_or(e.triggered_at)))
            .collect();
        finished.sort_by_key(|(_, at)| *at);
        let excess = executions.len() - self.max_executions;
        for (id, _) in finished.into_iter().take(excess) {
            executions.remove(&id);
        }
    }

    /// Look up one execution.
    pub async fn execution(&self, id: &str) -> Option<WorkflowExecution> {
        self.executions.read().await.get(id).cloned()
    }

    /// All executions, unordered.
    pub async fn executions(&self) -> Vec<WorkflowExecution> {
        self.executions.read().await.values().cloned().collect()
    }

    /// All registered workflows.
    pub async fn workflows(&self) -> Vec<Workflow> {
        self.workflows.read().await.values().cloned().collect()
    }

    /// Only workflows that can currently fire.
    pub async fn active_workflows(&self) -> Vec<Workflow> {
        self.workflows
            .read()
            .await
            .values()
            .filter(|w| w.status == WorkflowStatus::Active)
            .cloned()
            .collect()
    }
}

/// Trigger payloads must be objects so handler outputs can merge in.
fn normalize(data: Value) -> Value {
    if data.is_object() {
        data
    } else {
        json!({"payload": data})
    }
}

fn merge_into(target: &mut Value, output: Value) {
    if let (Some(target_map), Some(output_map)) = (target.as_object_mut(), output.as_object()) {
        for (key, value) in output_map {
            target_map.insert(key.clone(), value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::handler_fn;
    use crate::model::{Action, Trigger};
    use leadflow_core::LeadflowError;

    async fn wait_terminal(engine: &Arc<WorkflowEngine>, id: &str) -> WorkflowExecution {
        for _ in 0..200 {
            if let Some(execution) = engine.execution(id).await
                && execution.status != ExecutionStatus::Running
            {
                return execution;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("execution {id} did not finish");
    }

    fn new_lead_workflow() -> Workflow {
        Workflow::new(
            "wf_new_lead",
            "New Lead Welcome",
            Trigger::on("lead_created"),
            vec![
                Action::new(
                    "a1",
                    ActionKind::SendEmail,
                    json!({"template": "welcome"}),
                ),
                Action::new(
                    "a2",
                    ActionKind::SendNotification,
                    json!({"message": "New lead in the pipeline"}),
                ),
                Action::new(
                    "a3",
                    ActionKind::UpdateLead,
                    json!({"score": 50, "status": "new"}),
                ),
            ],
        )
    }

    #[tokio::test]
    async fn test_new_lead_scenario() {
        let engine = WorkflowEngine::new();
        engine.register_workflow(new_lead_workflow()).await;

        let ids = engine
            .trigger("lead_created", json!({"leadId": "l1", "email": "a@b.com"}))
            .await;
        assert_eq!(ids.len(), 1);

        let execution = wait_terminal(&engine, &ids[0]).await;
        assert_eq!(execution.status, ExecutionStatus::Completed);
        assert_eq!(execution.data["emailSent"], true);
        assert_eq!(execution.data["notificationSent"], true);
        assert_eq!(execution.data["leadUpdated"], true);
        assert!(execution.completed_at.is_some());
        assert!(execution.error.is_none());
    }

    #[tokio::test]
    async fn test_trigger_type_and_conditions_filter() {
        let engine = WorkflowEngine::new();
        let mut workflow = new_lead_workflow();
        workflow.trigger = Trigger::on("lead_created")
            .with_conditions(json!({"source": "webinar"}));
        engine.register_workflow(workflow).await;

        // Wrong type
        assert!(engine.trigger("form_submitted", json!({})).await.is_empty());
        // Right type, non-matching condition
        assert!(
            engine
                .trigger("lead_created", json!({"source": "ad"}))
                .await
                .is_empty()
        );
        // Matching
        assert_eq!(
            engine
                .trigger("lead_created", json!({"source": "webinar"}))
                .await
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_inactive_workflow_never_fires() {
        let engine = WorkflowEngine::new();
        let mut workflow = new_lead_workflow();
        workflow.status = WorkflowStatus::Inactive;
        engine.register_workflow(workflow).await;

        assert!(engine.trigger("lead_created", json!({})).await.is_empty());
        assert_eq!(engine.active_workflows().await.len(), 0);
        assert_eq!(engine.workflows().await.len(), 1);
    }

    #[tokio::test]
    async fn test_handler_error_stops_execution() {
        let engine = WorkflowEngine::new();
        engine
            .register_handler(
                ActionKind::SendNotification,
                handler_fn(|_c, _d| async {
                    Err(LeadflowError::Provider("notify channel down".into()))
                }),
            )
            .await;
        engine.register_workflow(new_lead_workflow()).await;

        let ids = engine.trigger("lead_created", json!({"leadId": "l1"})).await;
        let execution = wait_terminal(&engine, &ids[0]).await;

        assert_eq!(execution.status, ExecutionStatus::Failed);
        assert!(execution.error.as_deref().unwrap().contains("notify channel down"));
        // First action's output survives (no rollback)...
        assert_eq!(execution.data["emailSent"], true);
        // ...but the action after the failure never ran.
        assert!(execution.data.get("leadUpdated").is_none());
    }

    #[tokio::test]
    async fn test_later_actions_see_earlier_outputs() {
        let engine = WorkflowEngine::new();
        engine
            .register_handler(
                ActionKind::CreateTask,
                handler_fn(|_c, data| async move {
                    // Reads the send_email handler's output
                    Ok(json!({"sawEmailSent": data["emailSent"] == true}))
                }),
            )
            .await;
        let workflow = Workflow::new(
            "wf_chain",
            "Chained",
            Trigger::on("lead_created"),
            vec![
                Action::new("a1", ActionKind::SendEmail, json!({})),
                Action::new("a2", ActionKind::CreateTask, json!({})),
            ],
        );
        engine.register_workflow(workflow).await;

        let ids = engine.trigger("lead_created", json!({})).await;
        let execution = wait_terminal(&engine, &ids[0]).await;
        assert_eq!(execution.data["sawEmailSent"], true);
    }

    #[tokio::test]
    async fn test_finished_executions_bounded() {
        let engine = WorkflowEngine::with_execution_limit(3);
        let workflow = Workflow::new(
            "wf_noop",
            "No-op",
            Trigger::on("lead_created"),
            vec![],
        );
        engine.register_workflow(workflow).await;

        let mut last_id = String::new();
        for i in 0..6 {
            let ids = engine.trigger("lead_created", json!({"n": i})).await;
            last_id = ids[0].clone();
            wait_terminal(&engine, &last_id).await;
        }

        // Oldest finished runs got swept; the newest is still queryable.
        assert_eq!(engine.executions().await.len(), 3);
        assert!(engine.execution(&last_id).await.is_some());
    }

    #[tokio::test]
    async fn test_register_is_upsert() {
        let engine = WorkflowEngine::new();
        engine.register_workflow(new_lead_workflow()).await;
        let mut replacement = new_lead_workflow();
        replacement.name = "Replaced".into();
        engine.register_workflow(replacement).await;

        let workflows = engine.workflows().await;
        assert_eq!(workflows.len(), 1);
        assert_eq!(workflows[0].name, "Replaced");
    }
}
