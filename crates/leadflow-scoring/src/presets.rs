//! The stock scoring rule set, registered at startup.

use crate::rules::{RuleCondition, ScoringRule};

/// Default demographic, engagement, and negative rules.
pub fn default_rules() -> Vec<ScoringRule> {
    let mut rules = vec![
        ScoringRule::new(
            "decision_maker",
            "Decision maker title",
            RuleCondition::JobTitleContains {
                any: vec![
                    "ceo".into(),
                    "cto".into(),
                    "cmo".into(),
                    "founder".into(),
                    "vp".into(),
                    "chief".into(),
                    "head of".into(),
                    "director".into(),
                ],
            },
            20,
        ),
        ScoringRule::new(
            "company_size_enterprise",
            "Enterprise company",
            RuleCondition::CompanySizeIs {
                size: "enterprise".into(),
            },
            15,
        ),
        ScoringRule::new(
            "company_size_mid",
            "Mid-market company",
            RuleCondition::CompanySizeIs { size: "mid".into() },
            8,
        ),
        ScoringRule::new(
            "email_opened",
            "Opened a campaign email",
            RuleCondition::EventIs {
                event: "email_opened".into(),
            },
            5,
        ),
        ScoringRule::new(
            "email_clicked",
            "Clicked a campaign link",
            RuleCondition::EventIs {
                event: "email_clicked".into(),
            },
            10,
        ),
        ScoringRule::new(
            "form_submitted",
            "Submitted a form",
            RuleCondition::EventIs {
                event: "form_submitted".into(),
            },
            15,
        ),
        ScoringRule::new(
            "pricing_page_visit",
            "Visited the pricing page",
            RuleCondition::AllOf {
                conditions: vec![
                    RuleCondition::EventIs {
                        event: "page_visited".into(),
                    },
                    RuleCondition::ContextFieldIs {
                        field: "page".into(),
                        value: "pricing".into(),
                    },
                ],
            },
            12,
        ),
        ScoringRule::new(
            "meeting_scheduled",
            "Scheduled a meeting",
            RuleCondition::EventIs {
                event: "meeting_scheduled".into(),
            },
            25,
        ),
        ScoringRule::new(
            "unsubscribed",
            "Unsubscribed from emails",
            RuleCondition::EventIs {
                event: "unsubscribed".into(),
            },
            -30,
        ),
        ScoringRule::new(
            "spam_complaint",
            "Marked email as spam",
            RuleCondition::EventIs {
                event: "spam_complaint".into(),
            },
            -50,
        ),
        ScoringRule::new(
            "inactive_30d",
            "No engagement for 30 days",
            RuleCondition::AllOf {
                conditions: vec![
                    RuleCondition::EventIs {
                        event: "inactivity_check".into(),
                    },
                    RuleCondition::InactiveDays { at_least: 30 },
                ],
            },
            -15,
        ),
    ];

    for rule in &mut rules {
        rule.description = rule.name.clone();
    }
    rules
}

#[cfg(test)]
mod tests {
    use super::*;
    use leadflow_core::records::Lead;
    use serde_json::json;

    #[test]
    fn test_rule_ids_unique() {
        let rules = default_rules();
        let mut ids: Vec<&str> = rules.iter().map(|r| r.id.as_str()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), rules.len());
    }

    #[test]
    fn test_inactivity_needs_explicit_check_event() {
        let rules = default_rules();
        let rule = rules.iter().find(|r| r.id == "inactive_30d").unwrap();
        let mut lead = Lead::new("l1", "a@b.com");
        lead.last_engaged_at = Some(chrono::Utc::now() - chrono::Duration::days(60));

        // A stale lead does not decay on an unrelated event pass
        assert!(!rule.condition.matches(&lead, &json!({"event": "email_opened"})));
        assert!(rule.condition.matches(&lead, &json!({"event": "inactivity_check"})));
    }
}
