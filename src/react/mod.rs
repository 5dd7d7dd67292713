//! 认知层：Planner 与工具增强的任务循环

pub mod events;
pub mod loop_;
pub mod planner;

pub use events::ReactEvent;
pub use loop_::{run_task, TaskSession};
pub use planner::{parse_llm_output, Planner, PlannerOutput, ToolCall};
