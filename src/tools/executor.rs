//! 工具执行器
//!
//! 按名查找工具（找不到为 HallucinatedTool）→ 按 ToolSpec 校验参数（失败为 InvalidArguments）→ 分发：
//! 叶子工具的 ProviderError 在此转为 "Error: ..." 文本，委派工具先检查委派深度再进入嵌套循环。
//! 每次调用输出结构化审计日志（JSON）。

use std::time::Instant;

use crate::core::AgentError;
use crate::memory::Thread;
use crate::react::{LoopOptions, ToolCall, TurnEvent};
use crate::tools::delegation::REQUEST_PARAM;
use crate::tools::registry::{ToolKind, ToolOutput, Toolset};

/// 单个 agent 的工具执行器
pub struct ToolExecutor<'a> {
    toolset: &'a Toolset,
    agent: &'a str,
}

impl<'a> ToolExecutor<'a> {
    pub fn new(toolset: &'a Toolset, agent: &'a str) -> Self {
        Self { toolset, agent }
    }

    /// 执行一次调用；depth 为当前 agent 所在的委派深度
    pub async fn execute(
        &self,
        call: &ToolCall,
        thread: &mut Thread,
        options: &LoopOptions,
        depth: usize,
    ) -> Result<ToolOutput, AgentError> {
        let entry = self
            .toolset
            .get(&call.tool)
            .ok_or_else(|| AgentError::HallucinatedTool(call.tool.clone()))?;
        let args = entry.spec.validate(&call.args)?;

        let start = Instant::now();
        let (output, outcome) = match &entry.kind {
            ToolKind::Leaf(tool) => match tool.execute(args).await {
                Ok(text) => (ToolOutput::Text(text), "ok"),
                Err(e) => {
                    tracing::warn!(agent = %self.agent, tool = %call.tool, error = %e, "provider call failed");
                    (ToolOutput::Text(format!("Error: {}", e)), "error")
                }
            },
            ToolKind::Delegation(delegate) => {
                if depth >= options.max_delegation_depth {
                    return Err(AgentError::StepBoundExceeded {
                        agent: delegate.target().name().to_string(),
                        limit: options.max_delegation_depth,
                    });
                }
                options.emit(TurnEvent::Delegation {
                    from: self.agent.to_string(),
                    to: delegate.target().name().to_string(),
                    request: args.get_str(REQUEST_PARAM).unwrap_or_default().to_string(),
                });
                let out = delegate.delegate(&args, thread, options, depth).await;
                let outcome = match out {
                    ToolOutput::Relay(_) => "relay",
                    ToolOutput::Text(_) => "ok",
                };
                (out, outcome)
            }
        };

        let audit = serde_json::json!({
            "event": "tool_audit",
            "agent": self.agent,
            "tool": call.tool,
            "ok": outcome != "error",
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview(&call.args),
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        Ok(output)
    }
}

fn args_preview(args: &serde_json::Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}
