//! Workflow definitions — the core data model for automations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The closed set of action kinds the engine can dispatch.
///
/// Handlers are registered per kind and remain runtime-replaceable, but the
/// kind set itself is fixed so dispatch stays exhaustive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    SendEmail,
    CreateTask,
    UpdateLead,
    PostToSocial,
    SendNotification,
    CallWebhook,
    Wait,
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ActionKind::SendEmail => "send_email",
            ActionKind::CreateTask => "create_task",
            ActionKind::UpdateLead => "update_lead",
            ActionKind::PostToSocial => "post_to_social",
            ActionKind::SendNotification => "send_notification",
            ActionKind::CallWebhook => "call_webhook",
            ActionKind::Wait => "wait",
        };
        write!(f, "{s}")
    }
}

/// One step of a workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    pub id: String,
    pub kind: ActionKind,
    /// Handler configuration (template id, message, URL, ...).
    #[serde(default)]
    pub config: Value,
    /// Pause before running this action, in milliseconds.
    #[serde(default)]
    pub delay_ms: Option<u64>,
    /// Follow-up action ids (informational; execution order is list order).
    #[serde(default)]
    pub next: Option<Vec<String>>,
}

impl Action {
    pub fn new(id: &str, kind: ActionKind, config: Value) -> Self {
        Self {
            id: id.to_string(),
            kind,
            config,
            delay_ms: None,
            next: None,
        }
    }

    pub fn with_delay(mut self, delay_ms: u64) -> Self {
        self.delay_ms = Some(delay_ms);
        self
    }
}

/// What fires a workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trigger {
    /// Event type: "lead_created", "form_submitted", "time_based", ...
    pub trigger_type: String,
    /// Condition map over the trigger payload (see [`crate::condition`]).
    #[serde(default)]
    pub conditions: Option<Map<String, Value>>,
    /// Cron expression, for workflows driven by the scheduler.
    #[serde(default)]
    pub schedule: Option<String>,
}

impl Trigger {
    pub fn on(trigger_type: &str) -> Self {
        Self {
            trigger_type: trigger_type.to_string(),
            conditions: None,
            schedule: None,
        }
    }

    pub fn with_conditions(mut self, conditions: Value) -> Self {
        self.conditions = conditions.as_object().cloned();
        self
    }
}

/// Workflow status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Active,
    Inactive,
    Paused,
}

/// A registered workflow. Immutable during an execution; changed only by
/// re-registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub trigger: Trigger,
    pub actions: Vec<Action>,
    pub status: WorkflowStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Workflow {
    pub fn new(id: &str, name: &str, trigger: Trigger, actions: Vec<Action>) -> Self {
        let now = Utc::now();
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: String::new(),
            trigger,
            actions,
            status: WorkflowStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Execution status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Running,
    Completed,
    Failed,
    Paused,
}

/// One run of one workflow. Terminal once Completed or Failed; there is no
/// checkpoint restart and no cancellation once started.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowExecution {
    pub id: String,
    pub workflow_id: String,
    pub triggered_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: ExecutionStatus,
    pub current_action_id: Option<String>,
    /// Accumulated data: trigger payload plus each handler's output.
    pub data: Value,
    pub error: Option<String>,
}

impl WorkflowExecution {
    pub fn start(workflow_id: &str, data: Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            workflow_id: workflow_id.to_string(),
            triggered_at: Utc::now(),
            completed_at: None,
            status: ExecutionStatus::Running,
            current_action_id: None,
            data,
            error: None,
        }
    }
}
