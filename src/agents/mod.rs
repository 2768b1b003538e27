//! 能力智能体：策略文本 + 有上限、名称唯一的工具集
//!
//! 智能体在轮次之间无状态，只通过传入的 Thread 延续对话。编排者本身也是 CapabilityAgent，
//! 其工具集全部是委派工具。各领域专家的构建函数在子模块中。

pub mod calendar;
pub mod email;
pub mod expenses;
pub mod weather;

use std::sync::Arc;

use chrono::{FixedOffset, Utc};

use crate::core::AgentError;
use crate::llm::LlmClient;
use crate::react::Planner;
use crate::tools::{tool_call_schema_json, DelegationTool, Tool, Toolset};

pub use calendar::create_calendar_agent;
pub use email::create_email_agent;
pub use expenses::create_expenses_agent;
pub use weather::create_weather_agent;

/// 所有智能体共享的输出约束（回复会被朗读）
pub const VOICE_STYLE: &str = "Keep responses short and conversational since they will be spoken aloud. \
Never use emoji, markdown formatting, bullet points, or numbered lists. \
Always respond in the same language the user speaks to you.";

pub struct CapabilityAgent {
    name: String,
    description: String,
    policy: String,
    planner: Planner,
    toolset: Toolset,
    /// 设置后在 system prompt 中注入当前日期与时间
    date_offset: Option<FixedOffset>,
}

impl CapabilityAgent {
    pub fn builder(name: impl Into<String>, llm: Arc<dyn LlmClient>) -> CapabilityAgentBuilder {
        CapabilityAgentBuilder {
            name: name.into(),
            description: String::new(),
            policy: String::new(),
            llm,
            toolset: Toolset::new(),
            date_offset: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn policy(&self) -> &str {
        &self.policy
    }

    pub fn planner(&self) -> &Planner {
        &self.planner
    }

    pub fn toolset(&self) -> &Toolset {
        &self.toolset
    }

    /// 策略 + 日期上下文 + 工具目录 + 调用格式；每次决策前重新生成
    pub fn system_prompt(&self) -> String {
        let mut prompt = self.policy.clone();

        if let Some(offset) = self.date_offset {
            let now = Utc::now().with_timezone(&offset);
            prompt.push_str(&format!(
                "\n\nToday's date is {} and the current time is {} (UTC{}). \
                 Use this to resolve relative dates like 'today', 'tomorrow', 'next week', etc.",
                now.format("%A, %Y-%m-%d"),
                now.format("%H:%M"),
                offset
            ));
        }

        if self.toolset.is_empty() {
            prompt.push_str("\n\nYou have no tools. Answer the user directly in plain text.");
            return prompt;
        }

        prompt.push_str(&format!(
            "\n\n## Available tools\n{}\n\n## How to call a tool\n\
             To call a tool, reply with exactly one JSON object and nothing else, matching this schema:\n{}\n\
             Call at most one tool per reply; you will see its result before deciding the next step. \
             When you have the answer, or need to ask the user something, reply with plain text instead.",
            self.toolset.to_schema_json(),
            tool_call_schema_json()
        ));
        prompt
    }
}

pub struct CapabilityAgentBuilder {
    name: String,
    description: String,
    policy: String,
    llm: Arc<dyn LlmClient>,
    toolset: Toolset,
    date_offset: Option<FixedOffset>,
}

impl CapabilityAgentBuilder {
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn policy(mut self, policy: impl Into<String>) -> Self {
        self.policy = policy.into();
        self
    }

    pub fn date_aware(mut self, offset: FixedOffset) -> Self {
        self.date_offset = Some(offset);
        self
    }

    /// 名称重复或工具集已满时返回 ConfigurationError
    pub fn tool(mut self, tool: impl Tool + 'static) -> Result<Self, AgentError> {
        self.toolset.register_leaf(tool)?;
        Ok(self)
    }

    pub fn delegate(mut self, delegate: DelegationTool) -> Result<Self, AgentError> {
        self.toolset.register_delegation(delegate)?;
        Ok(self)
    }

    pub fn build(self) -> CapabilityAgent {
        CapabilityAgent {
            name: self.name,
            description: self.description,
            policy: self.policy,
            planner: Planner::new(self.llm),
            toolset: self.toolset,
            date_offset: self.date_offset,
        }
    }
}

/// 解析 YYYY-MM-DD
pub(crate) fn parse_date(raw: &str) -> Result<chrono::NaiveDate, crate::providers::ProviderError> {
    chrono::NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| {
        crate::providers::ProviderError::InvalidRequest(format!(
            "'{}' is not a date in YYYY-MM-DD format",
            raw
        ))
    })
}
