//! Jarvis - 多智能体委派与工具调用引擎
//!
//! 模块划分：
//! - **agent**: 无头运行时（供外部请求层调用）
//! - **agents**: CapabilityAgent 与日历 / 邮件 / 记账 / 天气专家
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误与恢复、编排者组装、会话管理
//! - **free_busy**: 由忙碌区间计算空闲时间
//! - **llm**: LLM 客户端抽象与实现（OpenAI / Azure OpenAI / Mock / Scripted）
//! - **memory**: 对话线程
//! - **providers**: 能力提供方契约与内存实现
//! - **react**: Planner、过程事件、工具调用主循环
//! - **tools**: 工具契约、参数校验、委派适配器与执行器

pub mod agent;
pub mod agents;
pub mod config;
pub mod core;
pub mod free_busy;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod providers;
pub mod react;
pub mod tools;
