//! 对话线程：一次会话的有序消息历史
//!
//! Thread 只追加不修改（reset 时整体丢弃）；to_llm_messages 负责渲染为 LLM 可读的 ChatMessage，
//! 渲染窗口只影响发给模型的内容，不会剪枝线程本身。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::llm::ChatMessage;

/// 消息角色
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    ToolCall,
    ToolResult,
}

/// 单条消息（追加后不可变）
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// 追加该消息的智能体（编排者或专家）
    #[serde(default)]
    pub agent: String,
    /// tool_call / tool_result 对应的工具名
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    /// tool_call 与 tool_result 的配对 ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
}

impl Message {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
            agent: String::new(),
            tool: None,
            call_id: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// content 为 `{"tool": ..., "args": ...}` 形式的 JSON，与模型输出格式一致
    pub fn tool_call(call_id: &str, tool: &str, args: &serde_json::Value) -> Self {
        let content = serde_json::json!({ "tool": tool, "args": args }).to_string();
        let mut msg = Self::new(Role::ToolCall, content);
        msg.tool = Some(tool.to_string());
        msg.call_id = Some(call_id.to_string());
        msg
    }

    pub fn tool_result(call_id: &str, tool: &str, content: impl Into<String>) -> Self {
        let mut msg = Self::new(Role::ToolResult, content);
        msg.tool = Some(tool.to_string());
        msg.call_id = Some(call_id.to_string());
        msg
    }

    pub fn with_agent(mut self, agent: impl Into<String>) -> Self {
        self.agent = agent.into();
        self
    }
}

/// 对话线程：由唯一的 Session 独占
#[derive(Clone, Debug)]
pub struct Thread {
    id: Uuid,
    created_at: DateTime<Utc>,
    messages: Vec<Message>,
}

impl Default for Thread {
    fn default() -> Self {
        Self::new()
    }
}

impl Thread {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            messages: Vec::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn push(&mut self, msg: Message) {
        self.messages.push(msg);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// 尚无对应 tool_result 的 tool_call 的 call_id（轮次结束时应为空）
    pub fn unmatched_tool_calls(&self) -> Vec<&str> {
        self.messages
            .iter()
            .filter(|m| m.role == Role::ToolCall)
            .filter_map(|m| m.call_id.as_deref())
            .filter(|id| {
                !self.messages.iter().any(|r| {
                    r.role == Role::ToolResult && r.call_id.as_deref() == Some(*id)
                })
            })
            .collect()
    }

    /// 可作为窗口起点的下标：user 消息，且此前的 tool_call 都已有 tool_result
    ///
    /// 嵌套专家轮次写入的 user 消息位于外层委派的 tool_call 之后，因此不会成为起点。
    fn turn_boundaries(&self) -> Vec<usize> {
        let mut open: Vec<&str> = Vec::new();
        let mut boundaries = Vec::new();
        for (i, m) in self.messages.iter().enumerate() {
            match m.role {
                Role::User if open.is_empty() => boundaries.push(i),
                Role::ToolCall => open.extend(m.call_id.as_deref()),
                Role::ToolResult => {
                    if let Some(id) = m.call_id.as_deref() {
                        open.retain(|c| *c != id);
                    }
                }
                _ => {}
            }
        }
        boundaries
    }

    /// 取最近约 max 条消息，起点对齐到顶层 user 消息，不截断 tool_call / tool_result 配对
    ///
    /// 最近 max 条内没有可用起点时向前退到最近的一个，此时窗口会超过 max 条。
    pub fn window(&self, max: usize) -> &[Message] {
        if max == 0 || self.messages.len() <= max {
            return &self.messages;
        }
        let floor = self.messages.len() - max;
        let boundaries = self.turn_boundaries();
        let start = boundaries
            .iter()
            .copied()
            .find(|&i| i >= floor)
            .or_else(|| boundaries.iter().copied().rev().find(|&i| i < floor))
            .unwrap_or(0);
        &self.messages[start..]
    }

    /// 渲染为 LLM 消息：tool_call 作为 assistant 的 JSON，tool_result 作为 user 的 Observation；
    /// 其他智能体追加的 user / assistant 消息加上 `[agent]` 前缀
    pub fn to_llm_messages(&self, viewer: &str, max: usize) -> Vec<ChatMessage> {
        self.window(max)
            .iter()
            .map(|m| {
                let tag = if m.agent.is_empty() || m.agent == viewer {
                    String::new()
                } else {
                    format!("[{}] ", m.agent)
                };
                match m.role {
                    Role::User => ChatMessage::user(format!("{}{}", tag, m.content)),
                    Role::Assistant => ChatMessage::assistant(format!("{}{}", tag, m.content)),
                    Role::ToolCall => ChatMessage::assistant(format!("{}{}", tag, m.content)),
                    Role::ToolResult => ChatMessage::user(format!(
                        "{}Observation from {}: {}",
                        tag,
                        m.tool.as_deref().unwrap_or("tool"),
                        m.content
                    )),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ChatRole;

    #[test]
    fn test_unmatched_tool_calls() {
        let mut thread = Thread::new();
        thread.push(Message::user("hi"));
        thread.push(Message::tool_call("c1", "echo", &serde_json::json!({})));
        assert_eq!(thread.unmatched_tool_calls(), vec!["c1"]);
        thread.push(Message::tool_result("c1", "echo", "ok"));
        assert!(thread.unmatched_tool_calls().is_empty());
    }

    #[test]
    fn test_window_aligns_to_user_message() {
        let mut thread = Thread::new();
        thread.push(Message::user("first"));
        thread.push(Message::assistant("a1"));
        thread.push(Message::user("second"));
        thread.push(Message::tool_call("c1", "t", &serde_json::json!({})));
        thread.push(Message::tool_result("c1", "t", "r"));
        thread.push(Message::assistant("a2"));

        let w = thread.window(5);
        assert_eq!(w.len(), 4);
        assert_eq!(w[0].content, "second");
        assert_eq!(thread.window(0).len(), 6);
    }

    #[test]
    fn test_window_keeps_delegation_pair_intact() {
        let mut thread = Thread::new();
        for i in 0..4 {
            thread.push(Message::user(format!("old {}", i)).with_agent("jarvis"));
            thread.push(Message::assistant(format!("reply {}", i)).with_agent("jarvis"));
        }
        thread.push(Message::user("am I free at noon").with_agent("jarvis"));
        thread.push(Message::tool_call("c1", "calendar", &serde_json::json!({})).with_agent("jarvis"));
        thread.push(Message::user("am I free at noon").with_agent("calendar-agent"));
        thread.push(Message::tool_call("c2", "find_free_time", &serde_json::json!({})).with_agent("calendar-agent"));
        thread.push(Message::tool_result("c2", "find_free_time", "free").with_agent("calendar-agent"));
        thread.push(Message::tool_call("c3", "list_events", &serde_json::json!({})).with_agent("calendar-agent"));
        thread.push(Message::tool_result("c3", "list_events", "none").with_agent("calendar-agent"));
        thread.push(Message::tool_result("c1", "calendar", "You are free.").with_agent("jarvis"));

        let w = thread.window(6);
        assert_eq!(w[0].content, "am I free at noon");
        assert_eq!(w[0].agent, "jarvis");
        assert!(w.iter().any(|m| m.role == Role::ToolCall && m.call_id.as_deref() == Some("c1")));
        for result in w.iter().filter(|m| m.role == Role::ToolResult) {
            assert!(w
                .iter()
                .any(|m| m.role == Role::ToolCall && m.call_id == result.call_id));
        }
    }

    #[test]
    fn test_render_tags_other_agents() {
        let mut thread = Thread::new();
        thread.push(Message::user("book lunch").with_agent("jarvis"));
        thread.push(Message::user("book lunch").with_agent("calendar-agent"));
        thread.push(Message::tool_result("c1", "list_events", "none").with_agent("calendar-agent"));

        let rendered = thread.to_llm_messages("jarvis", 0);
        assert_eq!(rendered[0].content, "book lunch");
        assert_eq!(rendered[1].content, "[calendar-agent] book lunch");
        assert_eq!(rendered[2].role, ChatRole::User);
        assert!(rendered[2].content.contains("Observation from list_events: none"));
    }
}
