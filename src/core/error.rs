//! Agent 错误类型与恢复动作
//!
//! 与 RecoveryEngine 配合：根据 AgentError 决定 RetryWithPrompt（让模型自我修正）或 Respond（以一句话结束本轮）。

use thiserror::Error;

use crate::llm::LlmError;
use crate::providers::ProviderError;

/// 步数耗尽 / 委派过深时返回给用户的兜底句子
pub const FALLBACK_RESPONSE: &str =
    "I'm sorry, I couldn't finish that request. Could you try rephrasing it or breaking it into smaller steps?";

/// 引擎运行过程中可能出现的错误
#[derive(Error, Debug)]
pub enum AgentError {
    /// 必需的凭据或提供方缺失；对应能力不可用
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("External provider error: {0}")]
    ExternalProviderError(#[from] ProviderError),

    #[error("Invalid arguments for tool '{tool}': {reason}")]
    InvalidArguments { tool: String, reason: String },

    #[error("Hallucinated tool: {0}")]
    HallucinatedTool(String),

    #[error("Step bound exceeded for agent '{agent}' (limit {limit})")]
    StepBoundExceeded { agent: String, limit: usize },

    #[error("Another turn is already running on this session")]
    ThreadConcurrencyViolation,

    #[error("JSON parse error: {0}")]
    JsonParseError(String),

    #[error("LLM error: {0}")]
    LlmError(#[from] LlmError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl AgentError {
    /// 面向终端用户的一句话描述（不暴露内部细节）
    pub fn user_message(&self) -> String {
        match self {
            AgentError::ConfigurationError(_) => {
                "I can't do that right now because part of my setup is missing.".to_string()
            }
            AgentError::ThreadConcurrencyViolation => {
                "I'm still working on your previous message. Please wait a moment and try again."
                    .to_string()
            }
            AgentError::LlmError(_) => {
                "I'm having trouble reaching my language service right now. Please try again in a moment."
                    .to_string()
            }
            AgentError::StepBoundExceeded { .. } => FALLBACK_RESPONSE.to_string(),
            AgentError::ExternalProviderError(e) => {
                format!("One of my services reported a problem: {}.", e)
            }
            _ => "Something went wrong while handling your request. Please try again.".to_string(),
        }
    }
}

/// 恢复引擎根据错误类型给出的建议动作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryAction {
    /// 将修正提示交给模型，继续下一步决策
    RetryWithPrompt(String),
    /// 以该句子结束本轮
    Respond(String),
}
