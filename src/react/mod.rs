//! 决策层：Planner（解析模型输出）、过程事件、工具调用主循环

pub mod events;
pub mod loop_;
pub mod planner;

pub use events::TurnEvent;
pub use loop_::{run_turn, LoopOptions, StopReason, TurnResult, DEFAULT_MAX_STEPS};
pub use planner::{parse_llm_output, Planner, PlannerOutput, ToolCall};
