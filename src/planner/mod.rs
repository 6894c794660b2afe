//! Planning module.
//!
//! Compares desired configs with the last applied ones, turns server
//! changes into ordered action plans and executes them.

mod diff;
mod executor;
mod plan;

pub use diff::{DiffDetail, DiffEngine, DiffType, ResourceDiff};
pub use executor::{ActionResult, ExecutionResult, PlanExecutor};
pub use plan::{ActionPlan, ChangePlan, PlannedChange};
