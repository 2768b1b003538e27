//! Planner：向模型请求下一步决策，并把输出解析为直接回复或工具调用
//!
//! 模型要么回复纯文本，要么输出 `{"tool": "...", "args": {...}}`（可放在 ```json 代码块中，也可以是数组）。

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::AgentError;
use crate::llm::{ChatMessage, LlmClient};

/// LLM 返回的 Tool Call（{"tool": "list_events", "args": {"start_date": "..."}}）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool: String,
    #[serde(default, alias = "arguments")]
    pub args: serde_json::Value,
}

/// Planner 输出
#[derive(Debug, Clone, PartialEq)]
pub enum PlannerOutput {
    /// 直接回复用户
    Response(String),
    /// 需要执行工具（非空；循环只执行第一个）
    ToolCalls(Vec<ToolCall>),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CallPayload {
    One(ToolCall),
    Many(Vec<ToolCall>),
}

/// 提取 ```json（或无语言标记的 ```）代码块的内容
fn fenced_block(text: &str) -> Option<&str> {
    let start = text.find("```")?;
    let rest = &text[start + 3..];
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let body = match rest.find("```") {
        Some(end) => &rest[..end],
        None => rest,
    };
    let body = body.trim();
    (body.starts_with('{') || body.starts_with('[')).then_some(body)
}

/// 解析 LLM 输出
///
/// - 以 `{` / `[` 开头或位于代码块中的 JSON 必须是合法调用，否则为 JsonParseError
/// - 正文中夹带的 JSON 若能解析为调用则视为调用，否则整段作为回复
/// - 没有任何非空 tool 名：严格模式下为 JsonParseError，正文夹带时整段作为回复
pub fn parse_llm_output(output: &str) -> Result<PlannerOutput, AgentError> {
    let trimmed = output.trim();

    let (candidate, strict) = if let Some(block) = fenced_block(trimmed) {
        (block, true)
    } else if trimmed.starts_with('{') || trimmed.starts_with('[') {
        (trimmed, true)
    } else if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            (&trimmed[start..=end], false)
        } else {
            return Ok(PlannerOutput::Response(trimmed.to_string()));
        }
    } else {
        return Ok(PlannerOutput::Response(trimmed.to_string()));
    };

    let calls = match serde_json::from_str::<CallPayload>(candidate) {
        Ok(CallPayload::One(call)) => vec![call],
        Ok(CallPayload::Many(calls)) => calls,
        Err(e) if strict => {
            return Err(AgentError::JsonParseError(format!("{}: {}", e, candidate)))
        }
        Err(_) => return Ok(PlannerOutput::Response(trimmed.to_string())),
    };

    let calls: Vec<ToolCall> = calls
        .into_iter()
        .filter(|c| !c.tool.trim().is_empty())
        .collect();
    if calls.is_empty() {
        if strict {
            return Err(AgentError::JsonParseError(format!(
                "tool call without a tool name: {}",
                candidate
            )));
        }
        return Ok(PlannerOutput::Response(trimmed.to_string()));
    }
    Ok(PlannerOutput::ToolCalls(calls))
}

/// Planner：持有 LLM，负责拼 system + messages 后调用
pub struct Planner {
    llm: Arc<dyn LlmClient>,
}

impl Planner {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// 获取 LLM 累计 token 使用统计
    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.llm.token_usage()
    }

    pub async fn plan_with_system(
        &self,
        messages: &[ChatMessage],
        system: &str,
    ) -> Result<String, AgentError> {
        let mut full_messages = Vec::with_capacity(messages.len() + 1);
        full_messages.push(ChatMessage::system(system));
        full_messages.extend_from_slice(messages);
        Ok(self.llm.complete(&full_messages).await?)
    }
}
