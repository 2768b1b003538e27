//! 工具调用主循环：一轮对话内交替「请求模型决策」与「执行该决策」
//!
//! 追加 user 消息 -> 请求决策 -> 纯文本则追加 assistant 并结束；工具调用则追加 tool_call，
//! 执行（校验失败 / 未知工具 / 提供方失败都转为 tool_result 文本）后追加 tool_result，进入下一步。
//! 严格串行：上一个工具完全返回后才请求下一次决策。步数达到上限时以兜底句子结束。

use async_recursion::async_recursion;
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use crate::agents::CapabilityAgent;
use crate::config::AppSection;
use crate::core::error::FALLBACK_RESPONSE;
use crate::core::{AgentError, RecoveryAction, RecoveryEngine};
use crate::memory::{Message, Thread};
use crate::react::{parse_llm_output, PlannerOutput, TurnEvent};
use crate::tools::{ToolExecutor, ToolOutput};

/// 单轮内默认最大决策步数
pub const DEFAULT_MAX_STEPS: usize = 10;
pub const DEFAULT_MAX_DELEGATION_DEPTH: usize = 2;
pub const DEFAULT_MAX_CONTEXT_MESSAGES: usize = 60;
/// Observation 预览最大字符数
const OBSERVATION_PREVIEW_CHARS: usize = 200;

/// 循环参数（编排者与嵌套的专家共用）
#[derive(Clone, Debug)]
pub struct LoopOptions {
    pub max_steps: usize,
    pub max_delegation_depth: usize,
    /// 渲染给模型的最大消息数，0 表示不限
    pub max_context_messages: usize,
    pub event_tx: Option<UnboundedSender<TurnEvent>>,
}

impl Default for LoopOptions {
    fn default() -> Self {
        Self {
            max_steps: DEFAULT_MAX_STEPS,
            max_delegation_depth: DEFAULT_MAX_DELEGATION_DEPTH,
            max_context_messages: DEFAULT_MAX_CONTEXT_MESSAGES,
            event_tx: None,
        }
    }
}

impl LoopOptions {
    pub fn from_config(app: &AppSection) -> Self {
        Self {
            max_steps: app.max_steps.max(1),
            max_delegation_depth: app.max_delegation_depth,
            max_context_messages: app.max_context_messages,
            event_tx: None,
        }
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_event_tx(mut self, tx: UnboundedSender<TurnEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn emit(&self, ev: TurnEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(ev);
        }
    }
}

/// 本轮如何结束
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    /// 模型给出了最终文本
    Answered,
    /// 专家的澄清问题被原样转交
    Relayed,
    StepBoundExceeded,
    /// 模型请求失败，以兜底句子结束
    LlmFailure,
}

#[derive(Clone, Debug)]
pub struct TurnResult {
    pub response: String,
    /// 消耗的决策步数
    pub steps: usize,
    pub stop: StopReason,
}

fn preview(text: &str) -> String {
    if text.chars().count() > OBSERVATION_PREVIEW_CHARS {
        let head: String = text.chars().take(OBSERVATION_PREVIEW_CHARS).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}

fn finish(
    agent: &CapabilityAgent,
    thread: &mut Thread,
    options: &LoopOptions,
    response: String,
    steps: usize,
    stop: StopReason,
) -> TurnResult {
    thread.push(Message::assistant(response.clone()).with_agent(agent.name()));
    options.emit(TurnEvent::Response {
        agent: agent.name().to_string(),
        text: response.clone(),
    });
    TurnResult {
        response,
        steps,
        stop,
    }
}

/// 对 agent 执行一轮：总是返回一句话，错误都在循环内恢复
///
/// depth 为委派深度（编排者为 0）；嵌套循环与外层共用同一个 thread。
#[async_recursion]
pub async fn run_turn(
    agent: &CapabilityAgent,
    thread: &mut Thread,
    user_input: &str,
    options: &LoopOptions,
    depth: usize,
) -> TurnResult {
    let name = agent.name();
    thread.push(Message::user(user_input).with_agent(name));

    let recovery = RecoveryEngine::new();
    let executor = ToolExecutor::new(agent.toolset(), name);
    let tool_names = agent.toolset().tool_names();
    // 解析失败的修正提示只进入下一次决策的 system prompt，不写入线程
    let mut hint: Option<String> = None;
    let mut step = 0;

    while step < options.max_steps {
        step += 1;
        options.emit(TurnEvent::StepUpdate {
            agent: name.to_string(),
            step,
            max_steps: options.max_steps,
        });

        let mut system = agent.system_prompt();
        if let Some(h) = hint.take() {
            system.push_str("\n\n");
            system.push_str(&h);
        }
        let messages = thread.to_llm_messages(name, options.max_context_messages);

        let output = match agent.planner().plan_with_system(&messages, &system).await {
            Ok(o) => o,
            Err(e) => {
                tracing::warn!(agent = %name, step, error = %e, "model request failed");
                let text = match recovery.handle(&e, &tool_names) {
                    RecoveryAction::Respond(text) | RecoveryAction::RetryWithPrompt(text) => text,
                };
                return finish(agent, thread, options, text, step, StopReason::LlmFailure);
            }
        };

        let calls = match parse_llm_output(&output) {
            Ok(PlannerOutput::Response(text)) => {
                tracing::debug!(agent = %name, step, "final response");
                return finish(agent, thread, options, text, step, StopReason::Answered);
            }
            Ok(PlannerOutput::ToolCalls(calls)) => calls,
            Err(e) => {
                tracing::debug!(agent = %name, step, error = %e, "unparsable tool call");
                hint = match recovery.handle(&e, &tool_names) {
                    RecoveryAction::RetryWithPrompt(p) | RecoveryAction::Respond(p) => Some(p),
                };
                continue;
            }
        };

        let mut calls = calls.into_iter();
        let Some(call) = calls.next() else {
            continue;
        };
        let skipped: Vec<String> = calls.map(|c| c.tool).collect();

        let call_id = format!("call_{}", Uuid::new_v4().simple());
        thread.push(Message::tool_call(&call_id, &call.tool, &call.args).with_agent(name));
        options.emit(TurnEvent::ToolCall {
            agent: name.to_string(),
            tool: call.tool.clone(),
            args: call.args.clone(),
        });

        let mut observation = match executor.execute(&call, thread, options, depth).await {
            Ok(ToolOutput::Text(text)) => text,
            Ok(ToolOutput::Relay(question)) => {
                thread.push(
                    Message::tool_result(&call_id, &call.tool, question.clone()).with_agent(name),
                );
                return finish(agent, thread, options, question, step, StopReason::Relayed);
            }
            Err(e) => {
                if let AgentError::InvalidArguments { tool, reason } = &e {
                    options.emit(TurnEvent::InvalidArguments {
                        agent: name.to_string(),
                        tool: tool.clone(),
                        reason: reason.clone(),
                    });
                }
                tracing::debug!(agent = %name, tool = %call.tool, error = %e, "tool call rejected");
                match recovery.handle(&e, &tool_names) {
                    RecoveryAction::RetryWithPrompt(p) => p,
                    RecoveryAction::Respond(_) => format!("Error: {}", e),
                }
            }
        };
        if !skipped.is_empty() {
            observation.push_str(&format!(
                "\n(Only the first tool call was executed. Not executed: {}. Call tools one at a time.)",
                skipped.join(", ")
            ));
        }

        options.emit(TurnEvent::Observation {
            agent: name.to_string(),
            tool: call.tool.clone(),
            preview: preview(&observation),
        });
        thread.push(Message::tool_result(&call_id, &call.tool, observation).with_agent(name));
    }

    let err = AgentError::StepBoundExceeded {
        agent: name.to_string(),
        limit: options.max_steps,
    };
    tracing::warn!(agent = %name, error = %err, "turn stopped");
    options.emit(TurnEvent::StepBoundExceeded {
        agent: name.to_string(),
        limit: options.max_steps,
    });
    finish(
        agent,
        thread,
        options,
        FALLBACK_RESPONSE.to_string(),
        step,
        StopReason::StepBoundExceeded,
    )
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::*;
    use crate::llm::ScriptedLlmClient;
    use crate::memory::Role;
    use crate::providers::ProviderError;
    use crate::tools::{DelegationTool, ParamSpec, ParamType, Tool, ToolArgs};

    /// 记录调用次数的测试工具，返回 "<name>:<text>"
    struct Probe {
        name: &'static str,
        calls: Arc<AtomicUsize>,
    }

    impl Probe {
        fn new(name: &'static str) -> (Self, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            (
                Self {
                    name,
                    calls: calls.clone(),
                },
                calls,
            )
        }
    }

    #[async_trait]
    impl Tool for Probe {
        fn name(&self) -> &str {
            self.name
        }

        fn description(&self) -> &str {
            "Probe tool"
        }

        fn parameters(&self) -> Vec<ParamSpec> {
            vec![ParamSpec::required("text", ParamType::String, "Text")]
        }

        async fn execute(&self, args: ToolArgs) -> Result<String, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("{}:{}", self.name, args.require_str("text")?))
        }
    }

    fn roles(thread: &Thread) -> Vec<Role> {
        thread.messages().iter().map(|m| m.role).collect()
    }

    #[tokio::test]
    async fn test_two_tools_then_text_keeps_causal_order() {
        let llm = Arc::new(ScriptedLlmClient::new([
            r#"{"tool": "a", "args": {"text": "1"}}"#,
            r#"{"tool": "b", "args": {"text": "2"}}"#,
            "All done.",
        ]));
        let (a, _) = Probe::new("a");
        let (b, _) = Probe::new("b");
        let agent = CapabilityAgent::builder("tester", llm.clone())
            .tool(a)
            .unwrap()
            .tool(b)
            .unwrap()
            .build();

        let mut thread = Thread::new();
        let result = run_turn(&agent, &mut thread, "go", &LoopOptions::default(), 0).await;

        assert_eq!(result.response, "All done.");
        assert_eq!(result.stop, StopReason::Answered);
        assert_eq!(result.steps, 3);
        assert_eq!(
            roles(&thread),
            vec![
                Role::User,
                Role::ToolCall,
                Role::ToolResult,
                Role::ToolCall,
                Role::ToolResult,
                Role::Assistant
            ]
        );
        let msgs = thread.messages();
        assert_eq!(msgs[1].tool.as_deref(), Some("a"));
        assert_eq!(msgs[2].content, "a:1");
        assert_eq!(msgs[3].tool.as_deref(), Some("b"));
        assert_eq!(msgs[4].content, "b:2");
        assert_eq!(msgs[1].call_id, msgs[2].call_id);
        assert!(thread.unmatched_tool_calls().is_empty());
        // 第二次决策已经看到第一个工具的结果
        let second = &llm.requests()[1];
        assert!(second.iter().any(|m| m.content.contains("Observation from a: a:1")));
    }

    #[tokio::test]
    async fn test_missing_argument_never_reaches_binding() {
        let llm = Arc::new(ScriptedLlmClient::new([
            r#"{"tool": "a", "args": {}}"#,
            "Which text should I use?",
        ]));
        let (a, calls) = Probe::new("a");
        let agent = CapabilityAgent::builder("tester", llm)
            .tool(a)
            .unwrap()
            .build();

        let mut thread = Thread::new();
        let result = run_turn(&agent, &mut thread, "go", &LoopOptions::default(), 0).await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(result.response, "Which text should I use?");
        let tool_result = &thread.messages()[2];
        assert_eq!(tool_result.role, Role::ToolResult);
        assert!(tool_result.content.contains("text"));
    }

    #[tokio::test]
    async fn test_step_bound_terminates_with_fallback() {
        let llm = Arc::new(ScriptedLlmClient::repeating(
            r#"{"tool": "a", "args": {"text": "again"}}"#,
        ));
        let (a, calls) = Probe::new("a");
        let agent = CapabilityAgent::builder("tester", llm.clone())
            .tool(a)
            .unwrap()
            .build();

        let mut thread = Thread::new();
        let options = LoopOptions::default().with_max_steps(6);
        let result = run_turn(&agent, &mut thread, "loop forever", &options, 0).await;

        assert_eq!(result.stop, StopReason::StepBoundExceeded);
        assert_eq!(result.steps, 6);
        assert_eq!(llm.calls(), 6);
        assert_eq!(calls.load(Ordering::SeqCst), 6);
        assert!(!result.response.is_empty());
        assert_eq!(thread.messages().last().map(|m| m.role), Some(Role::Assistant));
        assert!(thread.unmatched_tool_calls().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_tool_and_bad_json_are_recovered() {
        let llm = Arc::new(ScriptedLlmClient::new([
            r#"{"tool": "nope", "args": {}}"#,
            r#"{"tool": "a", "args": "#,
            "Recovered.",
        ]));
        let (a, _) = Probe::new("a");
        let agent = CapabilityAgent::builder("tester", llm.clone())
            .tool(a)
            .unwrap()
            .build();

        let mut thread = Thread::new();
        let result = run_turn(&agent, &mut thread, "go", &LoopOptions::default(), 0).await;

        assert_eq!(result.response, "Recovered.");
        assert_eq!(
            roles(&thread),
            vec![Role::User, Role::ToolCall, Role::ToolResult, Role::Assistant]
        );
        assert!(thread.messages()[2].content.contains("Available tools: a"));
        // 解析失败的提示只出现在第三次请求的 system 里
        let third_system = &llm.requests()[2][0].content;
        assert!(third_system.contains("not valid JSON"));
    }

    #[tokio::test]
    async fn test_llm_failure_ends_turn_with_sentence() {
        let llm = Arc::new(ScriptedLlmClient::new(Vec::<String>::new()));
        let agent = CapabilityAgent::builder("tester", llm).build();
        let mut thread = Thread::new();
        let result = run_turn(&agent, &mut thread, "hi", &LoopOptions::default(), 0).await;
        assert_eq!(result.stop, StopReason::LlmFailure);
        assert!(!result.response.is_empty());
        assert_eq!(thread.len(), 2);
    }

    #[tokio::test]
    async fn test_only_first_of_several_calls_runs() {
        let llm = Arc::new(ScriptedLlmClient::new([
            r#"[{"tool": "a", "args": {"text": "x"}}, {"tool": "b", "args": {"text": "y"}}]"#,
            "ok",
        ]));
        let (a, a_calls) = Probe::new("a");
        let (b, b_calls) = Probe::new("b");
        let agent = CapabilityAgent::builder("tester", llm)
            .tool(a)
            .unwrap()
            .tool(b)
            .unwrap()
            .build();

        let mut thread = Thread::new();
        run_turn(&agent, &mut thread, "go", &LoopOptions::default(), 0).await;
        assert_eq!(a_calls.load(Ordering::SeqCst), 1);
        assert_eq!(b_calls.load(Ordering::SeqCst), 0);
        assert!(thread.messages()[2].content.contains("Not executed: b"));
    }

    fn specialist(replies: Vec<&str>) -> (Arc<CapabilityAgent>, Arc<ScriptedLlmClient>) {
        let llm = Arc::new(ScriptedLlmClient::new(replies));
        let (a, _) = Probe::new("a");
        let agent = CapabilityAgent::builder("calendar-agent", llm.clone())
            .tool(a)
            .unwrap()
            .build();
        (Arc::new(agent), llm)
    }

    #[tokio::test]
    async fn test_delegation_shares_thread_and_folds_result() {
        let (target, _) = specialist(vec![
            r#"{"tool": "a", "args": {"text": "lookup"}}"#,
            "You have one meeting at 10.",
        ]);
        let delegate = DelegationTool::new("calendar", "Calendar requests", target);
        let llm = Arc::new(ScriptedLlmClient::new([
            r#"{"tool": "calendar", "args": {"request": "what is on today"}}"#,
            "You have one meeting at 10.",
        ]));
        let orchestrator = CapabilityAgent::builder("jarvis", llm)
            .delegate(delegate.clone())
            .unwrap()
            .build();

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let options = LoopOptions::default().with_event_tx(tx);
        let mut thread = Thread::new();
        let result = run_turn(&orchestrator, &mut thread, "what's on today", &options, 0).await;

        assert_eq!(result.response, "You have one meeting at 10.");
        assert_eq!(delegate.invocations(), 1);
        let agents: Vec<&str> = thread.messages().iter().map(|m| m.agent.as_str()).collect();
        assert_eq!(
            agents,
            vec![
                "jarvis",
                "jarvis",
                "calendar-agent",
                "calendar-agent",
                "calendar-agent",
                "calendar-agent",
                "jarvis",
                "jarvis"
            ]
        );
        assert!(thread.unmatched_tool_calls().is_empty());

        let mut saw_delegation = false;
        while let Ok(ev) = rx.try_recv() {
            if let TurnEvent::Delegation { to, .. } = ev {
                assert_eq!(to, "calendar-agent");
                saw_delegation = true;
            }
        }
        assert!(saw_delegation);
    }

    #[tokio::test]
    async fn test_clarification_is_relayed_verbatim() {
        let (target, _) = specialist(vec!["What time should the dentist appointment start?"]);
        let llm = Arc::new(ScriptedLlmClient::new([
            r#"{"tool": "calendar", "args": {"request": "book the dentist tomorrow"}}"#,
        ]));
        let orchestrator = CapabilityAgent::builder("jarvis", llm.clone())
            .delegate(DelegationTool::new("calendar", "Calendar requests", target))
            .unwrap()
            .build();

        let mut thread = Thread::new();
        let result = run_turn(
            &orchestrator,
            &mut thread,
            "book the dentist tomorrow",
            &LoopOptions::default(),
            0,
        )
        .await;

        assert_eq!(result.stop, StopReason::Relayed);
        assert_eq!(result.response, "What time should the dentist appointment start?");
        assert_eq!(llm.calls(), 1);
        assert!(thread.unmatched_tool_calls().is_empty());
    }

    #[tokio::test]
    async fn test_delegation_beyond_depth_is_refused() {
        let (target, specialist_llm) = specialist(vec!["never used"]);
        let llm = Arc::new(ScriptedLlmClient::new([
            r#"{"tool": "calendar", "args": {"request": "x"}}"#,
            "I could not reach the calendar.",
        ]));
        let orchestrator = CapabilityAgent::builder("jarvis", llm)
            .delegate(DelegationTool::new("calendar", "Calendar requests", target))
            .unwrap()
            .build();

        let mut options = LoopOptions::default();
        options.max_delegation_depth = 0;
        let mut thread = Thread::new();
        let result = run_turn(&orchestrator, &mut thread, "x", &options, 0).await;

        assert_eq!(specialist_llm.calls(), 0);
        assert_eq!(result.response, "I could not reach the calendar.");
        assert!(thread.messages()[2].content.contains("Step bound exceeded"));
    }
}
