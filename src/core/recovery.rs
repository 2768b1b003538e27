//! 错误恢复引擎
//!
//! 根据 AgentError 类型返回 RecoveryAction，供工具调用循环决定是让模型自我修正还是以兜底句子结束本轮。

use crate::core::error::FALLBACK_RESPONSE;
use crate::core::{AgentError, RecoveryAction};

/// 语义化错误恢复：将错误映射为可执行动作
#[derive(Debug, Default)]
pub struct RecoveryEngine;

impl RecoveryEngine {
    pub fn new() -> Self {
        Self
    }

    /// available_tools 用于在幻觉工具时提示模型可用的工具名
    pub fn handle(&self, err: &AgentError, available_tools: &[String]) -> RecoveryAction {
        match err {
            AgentError::JsonParseError(raw) => RecoveryAction::RetryWithPrompt(format!(
                "Your previous tool call was not valid JSON ({raw}). \
                 To call a tool, output exactly one JSON object and nothing else, \
                 in the form {{\"tool\": \"tool_name\", \"args\": {{...}}}}. \
                 To answer the user, reply with plain text."
            )),
            AgentError::InvalidArguments { tool, reason } => RecoveryAction::RetryWithPrompt(
                format!("Invalid arguments for {tool}: {reason}. Fix the arguments and call the tool again, or ask the user for the missing information."),
            ),
            AgentError::HallucinatedTool(name) => RecoveryAction::RetryWithPrompt(format!(
                "Unknown tool '{name}'. Available tools: {}.",
                if available_tools.is_empty() {
                    "none".to_string()
                } else {
                    available_tools.join(", ")
                }
            )),
            AgentError::StepBoundExceeded { .. } => {
                RecoveryAction::Respond(FALLBACK_RESPONSE.to_string())
            }
            other => RecoveryAction::Respond(other.user_message()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmError;

    #[test]
    fn test_recovery_json_parse_error() {
        let engine = RecoveryEngine::new();
        let err = AgentError::JsonParseError("invalid json".to_string());
        match engine.handle(&err, &[]) {
            RecoveryAction::RetryWithPrompt(msg) => assert!(msg.contains("JSON")),
            _ => panic!("Expected RetryWithPrompt"),
        }
    }

    #[test]
    fn test_recovery_invalid_arguments() {
        let engine = RecoveryEngine::new();
        let err = AgentError::InvalidArguments {
            tool: "add_expense".to_string(),
            reason: "missing required parameter 'amount'".to_string(),
        };
        match engine.handle(&err, &[]) {
            RecoveryAction::RetryWithPrompt(msg) => {
                assert!(msg.contains("add_expense"));
                assert!(msg.contains("amount"));
            }
            _ => panic!("Expected RetryWithPrompt"),
        }
    }

    #[test]
    fn test_recovery_hallucinated_tool() {
        let engine = RecoveryEngine::new();
        let err = AgentError::HallucinatedTool("fake_tool".to_string());
        let tools = vec!["calendar".to_string(), "weather".to_string()];
        match engine.handle(&err, &tools) {
            RecoveryAction::RetryWithPrompt(msg) => {
                assert!(msg.contains("fake_tool"));
                assert!(msg.contains("calendar, weather"));
            }
            _ => panic!("Expected RetryWithPrompt"),
        }
    }

    #[test]
    fn test_recovery_llm_error() {
        let engine = RecoveryEngine::new();
        let err = AgentError::LlmError(LlmError::RateLimited { retry_after_ms: 1000 });
        match engine.handle(&err, &[]) {
            RecoveryAction::Respond(msg) => assert!(!msg.is_empty()),
            _ => panic!("Expected Respond"),
        }
    }

    #[test]
    fn test_recovery_step_bound() {
        let engine = RecoveryEngine::new();
        let err = AgentError::StepBoundExceeded {
            agent: "jarvis".to_string(),
            limit: 6,
        };
        assert_eq!(
            engine.handle(&err, &[]),
            RecoveryAction::Respond(FALLBACK_RESPONSE.to_string())
        );
    }
}
