//! The Lead Scoring Engine — evaluates registered rules against a lead,
//! mutating its score, grade, and history.

use std::sync::RwLock;

use chrono::Utc;
use serde_json::Value;

use leadflow_core::records::{Grade, Lead, ScoringEvent};
use leadflow_core::{LeadflowError, Result};

use crate::rules::ScoringRule;

/// Rule-based scoring engine. Constructed once at process start; rules are
/// upserted by id and evaluated in registration order.
#[derive(Default)]
pub struct LeadScoringEngine {
    rules: RwLock<Vec<ScoringRule>>,
}

impl LeadScoringEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a rule. Replacement keeps its original
    /// position so history ordering stays stable.
    pub fn register_rule(&self, rule: ScoringRule) {
        let mut rules = self.rules.write().unwrap();
        if let Some(existing) = rules.iter_mut().find(|r| r.id == rule.id) {
            *existing = rule;
        } else {
            tracing::debug!("🎯 Scoring rule registered: '{}' ({:+})", rule.id, rule.points);
            rules.push(rule);
        }
    }

    /// All registered rules, in evaluation order.
    pub fn rules(&self) -> Vec<ScoringRule> {
        self.rules.read().unwrap().clone()
    }

    /// Run a full scoring pass: every enabled rule whose predicate holds
    /// applies its delta to a raw running total, with one clamp to [0,100]
    /// after the last rule. Clamping per rule would make the outcome depend
    /// on registration order once deltas mix signs, so the raw total may
    /// leave the range mid-pass; history events record the raw values.
    pub fn calculate_score(&self, lead: &mut Lead, context: &Value) {
        let rules = self.rules.read().unwrap().clone();
        let mut running = lead.score;
        for rule in &rules {
            if !rule.enabled || !rule.condition.matches(lead, context) {
                continue;
            }
            let previous = running;
            running += rule.points;
            lead.scoring_history.push(ScoringEvent {
                timestamp: Utc::now(),
                rule_id: rule.id.clone(),
                points: rule.points,
                previous_score: previous,
                new_score: running,
                reason: rule.name.clone(),
            });
            tracing::debug!(
                "🎯 Rule '{}' fired on lead '{}': {previous} → {running}",
                rule.id,
                lead.id
            );
        }
        lead.score = running.clamp(0, 100);
        lead.grade = Grade::from_score(lead.score);
        lead.updated_at = Utc::now();
    }

    /// Evaluate and apply exactly one rule by id. Returns whether it fired.
    /// Unknown rule ids are an error, not a silent no-op.
    pub fn apply_rule(&self, lead: &mut Lead, rule_id: &str, context: &Value) -> Result<bool> {
        let rule = {
            let rules = self.rules.read().unwrap();
            rules
                .iter()
                .find(|r| r.id == rule_id)
                .cloned()
                .ok_or_else(|| LeadflowError::NotFound(format!("scoring rule {rule_id}")))?
        };

        if !rule.enabled || !rule.condition.matches(lead, context) {
            return Ok(false);
        }
        apply_points(lead, &rule);
        lead.updated_at = Utc::now();
        Ok(true)
    }

    /// Leads graded A.
    pub fn hot_leads<'a>(&self, leads: &'a [Lead]) -> Vec<&'a Lead> {
        leads.iter().filter(|l| l.grade == Grade::A).collect()
    }

    /// Leads graded B or C.
    pub fn warm_leads<'a>(&self, leads: &'a [Lead]) -> Vec<&'a Lead> {
        leads
            .iter()
            .filter(|l| matches!(l.grade, Grade::B | Grade::C))
            .collect()
    }

    /// Leads graded D or F.
    pub fn cold_leads<'a>(&self, leads: &'a [Lead]) -> Vec<&'a Lead> {
        leads
            .iter()
            .filter(|l| matches!(l.grade, Grade::D | Grade::F))
            .collect()
    }
}

/// Single-rule application used by [`LeadScoringEngine::apply_rule`]; a
/// one-rule pass clamps immediately since there is nothing to accumulate.
fn apply_points(lead: &mut Lead, rule: &ScoringRule) {
    let previous = lead.score;
    let new_score = (previous + rule.points).clamp(0, 100);
    lead.score = new_score;
    lead.grade = Grade::from_score(new_score);
    lead.scoring_history.push(ScoringEvent {
        timestamp: Utc::now(),
        rule_id: rule.id.clone(),
        points: rule.points,
        previous_score: previous,
        new_score,
        reason: rule.name.clone(),
    });
    tracing::debug!(
        "🎯 Rule '{}' fired on lead '{}': {previous} → {new_score}",
        rule.id,
        lead.id
    );
}
