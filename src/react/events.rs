//! 轮次过程事件：供前端展示步数、工具调用、观察、委派与回复

use serde::Serialize;

/// 单步过程事件（可序列化为 JSON 供前端展示）；agent 为产生事件的智能体名
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEvent {
    /// 当前第几步（从 1 开始）
    StepUpdate {
        agent: String,
        step: usize,
        max_steps: usize,
    },
    ToolCall {
        agent: String,
        tool: String,
        args: serde_json::Value,
    },
    /// 工具返回（预览，避免过长）
    Observation {
        agent: String,
        tool: String,
        preview: String,
    },
    /// 参数校验失败，已作为 tool_result 交还模型
    InvalidArguments {
        agent: String,
        tool: String,
        reason: String,
    },
    /// 编排者把请求交给专家
    Delegation {
        from: String,
        to: String,
        request: String,
    },
    /// 本轮最终回复
    Response { agent: String, text: String },
    StepBoundExceeded { agent: String, limit: usize },
}
