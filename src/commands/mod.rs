pub mod edit_command;
pub mod plan;

pub use edit_command::*;
pub use plan::{apply_plan, apply_plan_file, EditPlan, PlanStep, PlanSummary, StepOutcome};
