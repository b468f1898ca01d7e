//! Predefined workflows registered at startup.

use serde_json::json;

use crate::model::{Action, ActionKind, Trigger, Workflow};

/// The stock automations: new-lead welcome, form follow-up, hot-lead alert.
pub fn default_workflows() -> Vec<Workflow> {
    vec![new_lead_welcome(), form_submitted_followup(), hot_lead_alert()]
}

/// Welcome sequence when a lead enters the pipeline.
pub fn new_lead_welcome() -> Workflow {
    let mut workflow = Workflow::new(
        "wf_new_lead",
        "New Lead Welcome",
        Trigger::on("lead_created"),
        vec![
            Action::new("send_welcome", ActionKind::SendEmail, json!({"template": "welcome"})),
            Action::new(
                "notify_sales",
                ActionKind::SendNotification,
                json!({"message": "New lead entered the pipeline", "channel": "sales"}),
            ),
            Action::new(
                "init_lead",
                ActionKind::UpdateLead,
                json!({"score": 50, "status": "new"}),
            ),
        ],
    );
    workflow.description = "Send a welcome email, alert sales, initialize the lead record".into();
    workflow
}

/// Follow-up an hour after a form submission.
pub fn form_submitted_followup() -> Workflow {
    let mut workflow = Workflow::new(
        "wf_form_followup",
        "Form Submission Follow-up",
        Trigger::on("form_submitted"),
        vec![
            Action::new(
                "mark_engaged",
                ActionKind::UpdateLead,
                json!({"status": "contacted"}),
            ),
            Action::new(
                "send_followup",
                ActionKind::SendEmail,
                json!({"template": "form_followup"}),
            )
            .with_delay(3_600_000),
        ],
    );
    workflow.description = "Mark the lead contacted, follow up by email after an hour".into();
    workflow
}

/// Alert sales and open a task when a lead goes hot (score ≥ 80).
pub fn hot_lead_alert() -> Workflow {
    let mut workflow = Workflow::new(
        "wf_hot_lead",
        "Hot Lead Alert",
        Trigger::on("lead_score_changed").with_conditions(json!({"score": {"$gte": 80}})),
        vec![
            Action::new(
                "alert_sales",
                ActionKind::SendNotification,
                json!({"message": "Lead is hot, reach out today", "channel": "sales"}),
            ),
            Action::new(
                "open_task",
                ActionKind::CreateTask,
                json!({"title": "Call hot lead", "due_in_hours": 4}),
            ),
        ],
    );
    workflow.description = "Notify sales and open a call task for A-grade leads".into();
    workflow
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::conditions_match;

    #[test]
    fn test_presets_are_well_formed() {
        let workflows = default_workflows();
        assert_eq!(workflows.len(), 3);
        for workflow in &workflows {
            assert!(!workflow.actions.is_empty());
            assert!(!workflow.trigger.trigger_type.is_empty());
        }
    }

    #[test]
    fn test_hot_lead_condition() {
        let workflow = hot_lead_alert();
        let conditions = workflow.trigger.conditions.unwrap();
        assert!(conditions_match(&conditions, &json!({"score": 85})));
        assert!(!conditions_match(&conditions, &json!({"score": 60})));
    }
}
