//! 委派工具：把整个专家智能体包装成编排者的一个工具
//!
//! 唯一参数 request 是转发给专家的自然语言请求；执行时在同一 Thread 上启动嵌套的工具调用循环，
//! 专家的最终文本作为本工具的结果。专家以问题结尾时视为澄清问题，原样转交用户。

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::agents::CapabilityAgent;
use crate::memory::Thread;
use crate::react::{run_turn, LoopOptions, StopReason};
use crate::tools::registry::ToolOutput;
use crate::tools::schema::{ParamSpec, ParamType, ToolArgs, ToolSpec};

pub const REQUEST_PARAM: &str = "request";

#[derive(Clone)]
pub struct DelegationTool {
    name: String,
    description: String,
    request_description: String,
    target: Arc<CapabilityAgent>,
    invocations: Arc<AtomicUsize>,
}

impl DelegationTool {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        target: Arc<CapabilityAgent>,
    ) -> Self {
        let name = name.into();
        Self {
            request_description: format!(
                "The user's {}-related request in natural language, passed as-is",
                name
            ),
            name,
            description: description.into(),
            target,
            invocations: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn target(&self) -> &CapabilityAgent {
        &self.target
    }

    /// 被调用的次数（含 clone 出的副本）
    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }

    pub fn spec(&self) -> ToolSpec {
        ToolSpec::new(
            self.name.clone(),
            self.description.clone(),
            vec![ParamSpec::required(
                REQUEST_PARAM,
                ParamType::String,
                &self.request_description,
            )],
        )
    }

    /// 在同一线程上运行专家的一轮；depth 为编排者所在深度
    pub async fn delegate(
        &self,
        args: &ToolArgs,
        thread: &mut Thread,
        options: &LoopOptions,
        depth: usize,
    ) -> ToolOutput {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        let request = args.get_str(REQUEST_PARAM).unwrap_or_default();
        tracing::info!(
            delegate = %self.name,
            agent = %self.target.name(),
            depth = depth + 1,
            "delegating request"
        );

        let result = run_turn(&self.target, thread, request, options, depth + 1).await;

        if result.stop == StopReason::Answered && is_clarification(&result.response) {
            tracing::debug!(delegate = %self.name, "relaying clarification question");
            return ToolOutput::Relay(result.response);
        }
        ToolOutput::Text(result.response)
    }
}

/// 以问号结尾（含全角）的回复视为向用户提出的澄清问题
pub fn is_clarification(text: &str) -> bool {
    let t = text.trim_end();
    t.ends_with('?') || t.ends_with('？')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_clarification() {
        assert!(is_clarification("What time should it start?"));
        assert!(is_clarification("几点开始？ "));
        assert!(!is_clarification("Done. The event is booked."));
        assert!(!is_clarification(""));
    }
}
