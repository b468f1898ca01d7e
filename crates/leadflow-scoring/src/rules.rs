//! Scoring rules — serializable predicates over (lead, event context).

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use leadflow_core::records::{Lead, LeadStatus};

/// The closed set of predicates a scoring rule can use.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum RuleCondition {
    /// The event context's "event" field equals the given value.
    EventIs { event: String },
    /// An arbitrary event-context field equals the given string.
    ContextFieldIs { field: String, value: String },
    /// The lead's job title contains any of the given fragments
    /// (case-insensitive).
    JobTitleContains { any: Vec<String> },
    /// The lead's company-size bucket equals the given value.
    CompanySizeIs { size: String },
    /// The lead's pipeline status equals the given value.
    StatusIs { status: LeadStatus },
    /// The lead has not engaged for at least this many days (leads that
    /// never engaged count from creation).
    InactiveDays { at_least: i64 },
    /// All sub-conditions hold.
    AllOf { conditions: Vec<RuleCondition> },
}

impl RuleCondition {
    /// Evaluate the predicate. `context` is the event-specific payload
    /// passed with the scoring pass ("email_opened", "form_submitted", ...).
    pub fn matches(&self, lead: &Lead, context: &Value) -> bool {
        match self {
            RuleCondition::EventIs { event } => {
                context.get("event").and_then(Value::as_str) == Some(event.as_str())
            }
            RuleCondition::ContextFieldIs { field, value } => {
                context.get(field).and_then(Value::as_str) == Some(value.as_str())
            }
            RuleCondition::JobTitleContains { any } => {
                let title = lead.job_title.to_lowercase();
                !title.is_empty() && any.iter().any(|frag| title.contains(&frag.to_lowercase()))
            }
            RuleCondition::CompanySizeIs { size } => lead.company_size == *size,
            RuleCondition::StatusIs { status } => lead.status == *status,
            RuleCondition::InactiveDays { at_least } => {
                let reference = lead.last_engaged_at.unwrap_or(lead.created_at);
                (Utc::now() - reference).num_days() >= *at_least
            }
            RuleCondition::AllOf { conditions } => {
                conditions.iter().all(|c| c.matches(lead, context))
            }
        }
    }
}

/// One scoring rule: predicate + signed point delta. Stateless; disabled
/// rules never fire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringRule {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub condition: RuleCondition,
    pub points: i32,
    pub enabled: bool,
}

impl ScoringRule {
    pub fn new(id: &str, name: &str, condition: RuleCondition, points: i32) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: String::new(),
            condition,
            points,
            enabled: true,
        }
    }
}
