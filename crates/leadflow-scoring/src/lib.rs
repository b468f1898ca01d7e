//! # Leadflow Scoring
//!
//! Rule-based lead scoring: independent rules evaluated against a lead and
//! an event context, mutating a bounded score (0–100) and its derived
//! grade, with a full scoring history on the lead.
//!
//! Rules are pure predicates with no inter-rule ordering dependency;
//! registration order only determines history ordering when several rules
//! fire in one pass.

pub mod engine;
pub mod presets;
pub mod rules;

pub use engine::LeadScoringEngine;
pub use presets::default_rules;
pub use rules::{RuleCondition, ScoringRule};
