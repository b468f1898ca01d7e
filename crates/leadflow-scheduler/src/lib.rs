//! # Leadflow Scheduler
//!
//! Cron-style schedules that fire `time_based` triggers into the
//! [`leadflow_engine::WorkflowEngine`]. Each schedule runs as its own
//! tokio loop, so pause/resume/unschedule are independent per task, and a
//! failing tick never kills the timer.

pub mod cron;
pub mod scheduler;

pub use cron::next_run_from_cron;
pub use scheduler::{ScheduledTask, Scheduler};
