//! # Leadflow Workflow Engine
//!
//! Trigger-based automation: events come in, matching workflows run their
//! ordered action lists, each run recorded as a `WorkflowExecution`.
//!
//! ## Architecture
//! ```text
//! Event (lead_created, form_submitted, time_based, ...)
//!   → WorkflowEngine.trigger(type, data)
//!     → For each active workflow with a matching trigger + conditions:
//!       → One independent execution, actions in strict order
//!       → Handler output merged into the execution data
//!       → Handler error → execution Failed, remaining actions skipped
//! ```
//!
//! Heavy actions (send_email, post_to_social) are expected to be overridden
//! at wiring time with handlers that enqueue a job on the queue subsystem
//! instead of blocking the execution on network I/O.

pub mod actions;
pub mod condition;
pub mod engine;
pub mod model;
pub mod presets;

pub use actions::{ActionHandler, default_handlers, handler_fn};
pub use condition::conditions_match;
pub use engine::WorkflowEngine;
pub use presets::default_workflows;
pub use model::{
    Action, ActionKind, ExecutionStatus, Trigger, Workflow, WorkflowExecution, WorkflowStatus,
};
