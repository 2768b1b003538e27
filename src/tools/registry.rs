//! 工具注册表
//!
//! 叶子工具实现 Tool trait（name / description / parameters / execute）；委派工具把整个专家智能体包装成一个工具。
//! 两者以 ToolKind 统一存放在 Toolset 中，由 ToolExecutor 统一分发。

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::AgentError;
use crate::providers::ProviderError;
use crate::tools::delegation::DelegationTool;
use crate::tools::schema::{ParamSpec, ToolArgs, ToolSpec};

/// 一个 agent 最多挂载的工具数
pub const MAX_TOOLS: usize = 16;

/// 叶子工具：名称、描述（供 LLM 理解）、参数表、异步执行（参数已校验）
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称（用于 JSON 中的 "tool" 字段）
    fn name(&self) -> &str;

    /// 工具描述（供 LLM 理解功能）
    fn description(&self) -> &str;

    fn parameters(&self) -> Vec<ParamSpec> {
        Vec::new()
    }

    /// 执行工具；提供方失败以 ProviderError 返回，由执行器转为描述性文本
    async fn execute(&self, args: ToolArgs) -> Result<String, ProviderError>;
}

/// 工具种类：叶子工具或委派工具
pub enum ToolKind {
    Leaf(Arc<dyn Tool>),
    Delegation(DelegationTool),
}

pub struct ToolEntry {
    pub spec: ToolSpec,
    pub kind: ToolKind,
}

/// 工具执行结果
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ToolOutput {
    /// 作为 tool_result 交还模型
    Text(String),
    /// 专家的澄清问题：原样作为本轮回复，不再请求模型决策
    Relay(String),
}

/// 一个 agent 的工具集：名称唯一、数量有上限，按注册顺序列出
#[derive(Default)]
pub struct Toolset {
    entries: Vec<ToolEntry>,
}

impl Toolset {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&mut self, entry: ToolEntry) -> Result<(), AgentError> {
        if self.get(&entry.spec.name).is_some() {
            return Err(AgentError::ConfigurationError(format!(
                "duplicate tool name '{}'",
                entry.spec.name
            )));
        }
        if self.entries.len() >= MAX_TOOLS {
            return Err(AgentError::ConfigurationError(format!(
                "toolset is full ({} tools), cannot add '{}'",
                MAX_TOOLS, entry.spec.name
            )));
        }
        self.entries.push(entry);
        Ok(())
    }

    pub fn register_leaf(&mut self, tool: impl Tool + 'static) -> Result<(), AgentError> {
        let spec = ToolSpec::new(tool.name(), tool.description(), tool.parameters());
        self.insert(ToolEntry {
            spec,
            kind: ToolKind::Leaf(Arc::new(tool)),
        })
    }

    pub fn register_delegation(&mut self, tool: DelegationTool) -> Result<(), AgentError> {
        self.insert(ToolEntry {
            spec: tool.spec(),
            kind: ToolKind::Delegation(tool),
        })
    }

    pub fn get(&self, name: &str) -> Option<&ToolEntry> {
        self.entries.iter().find(|e| e.spec.name == name)
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.spec.name.clone()).collect()
    }

    pub fn specs(&self) -> impl Iterator<Item = &ToolSpec> {
        self.entries.iter().map(|e| &e.spec)
    }

    pub fn delegations(&self) -> impl Iterator<Item = &DelegationTool> {
        self.entries.iter().filter_map(|e| match &e.kind {
            ToolKind::Delegation(d) => Some(d),
            ToolKind::Leaf(_) => None,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 工具目录 JSON（名称、描述、参数 schema），拼入 system prompt
    pub fn to_schema_json(&self) -> String {
        let tools: Vec<serde_json::Value> = self
            .entries
            .iter()
            .map(|e| {
                serde_json::json!({
                    "name": e.spec.name,
                    "description": e.spec.description,
                    "parameters": e.spec.parameters_schema()
                })
            })
            .collect();
        serde_json::to_string_pretty(&tools).unwrap_or_else(|_| "[]".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::schema::ParamType;

    struct Named(&'static str);

    #[async_trait]
    impl Tool for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn description(&self) -> &str {
            "test tool"
        }

        fn parameters(&self) -> Vec<ParamSpec> {
            vec![ParamSpec::required("text", ParamType::String, "Text")]
        }

        async fn execute(&self, args: ToolArgs) -> Result<String, ProviderError> {
            Ok(args.require_str("text")?.to_string())
        }
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut set = Toolset::new();
        set.register_leaf(Named("a")).unwrap();
        assert!(matches!(
            set.register_leaf(Named("a")),
            Err(AgentError::ConfigurationError(_))
        ));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_toolset_is_bounded() {
        const NAMES: [&str; MAX_TOOLS + 1] = [
            "t0", "t1", "t2", "t3", "t4", "t5", "t6", "t7", "t8", "t9", "t10", "t11", "t12",
            "t13", "t14", "t15", "t16",
        ];
        let mut set = Toolset::new();
        for name in &NAMES[..MAX_TOOLS] {
            set.register_leaf(Named(name)).unwrap();
        }
        assert!(set.register_leaf(Named(NAMES[MAX_TOOLS])).is_err());
    }

    #[test]
    fn test_schema_json_keeps_registration_order() {
        let mut set = Toolset::new();
        set.register_leaf(Named("second")).unwrap();
        set.register_leaf(Named("first")).unwrap();
        assert_eq!(set.tool_names(), vec!["second", "first"]);
        let json = set.to_schema_json();
        assert!(json.find("second").unwrap() < json.find("first").unwrap());
        assert!(json.contains("\"required\""));
    }
}
