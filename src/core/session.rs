//! 会话：持有编排者与对话线程，串行化同一会话上的轮次
//!
//! 编排者通过工厂惰性构建（构建失败时下次调用重试）；Thread 由 Mutex 保护，
//! 并发策略决定第二个轮次是排队等待还是立即以 ThreadConcurrencyViolation 拒绝。

use std::sync::Arc;

use tokio::sync::{Mutex, OnceCell};

use crate::agents::CapabilityAgent;
use crate::config::ConcurrencyPolicy;
use crate::core::AgentError;
use crate::memory::{Message, Thread};
use crate::react::{run_turn, LoopOptions, TurnResult};

/// 构建编排者的工厂
pub type AgentFactory = Box<dyn Fn() -> Result<CapabilityAgent, AgentError> + Send + Sync>;

/// 单个会话：编排者 + 独占的 Thread
pub struct Session {
    agent: CapabilityAgent,
    thread: Mutex<Thread>,
}

impl Session {
    pub fn new(agent: CapabilityAgent) -> Self {
        Self {
            agent,
            thread: Mutex::new(Thread::new()),
        }
    }

    pub fn agent(&self) -> &CapabilityAgent {
        &self.agent
    }
}

pub struct SessionManager {
    factory: AgentFactory,
    options: LoopOptions,
    policy: ConcurrencyPolicy,
    session: OnceCell<Arc<Session>>,
}

impl SessionManager {
    pub fn new(factory: AgentFactory, options: LoopOptions) -> Self {
        Self {
            factory,
            options,
            policy: ConcurrencyPolicy::default(),
            session: OnceCell::new(),
        }
    }

    pub fn with_concurrency(mut self, policy: ConcurrencyPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// 返回已有会话，或构建编排者与空线程
    pub async fn get_or_create(&self) -> Result<Arc<Session>, AgentError> {
        self.session
            .get_or_try_init(|| async {
                let agent = (self.factory)()?;
                tracing::info!(agent = agent.name(), "session created");
                Ok::<_, AgentError>(Arc::new(Session::new(agent)))
            })
            .await
            .cloned()
    }

    /// 丢弃当前线程；排队策略下会等待进行中的轮次结束
    pub async fn reset(&self) {
        if let Some(session) = self.session.get() {
            let mut thread = session.thread.lock().await;
            let dropped = thread.len();
            *thread = Thread::new();
            tracing::info!(dropped, "conversation reset");
        }
    }

    /// 执行一轮并返回完整结果
    pub async fn try_send_message(&self, text: &str) -> Result<TurnResult, AgentError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(AgentError::InvalidInput("message is empty".to_string()));
        }
        let session = self.get_or_create().await?;
        let mut thread = match self.policy {
            ConcurrencyPolicy::Queue => session.thread.lock().await,
            ConcurrencyPolicy::Reject => session
                .thread
                .try_lock()
                .map_err(|_| AgentError::ThreadConcurrencyViolation)?,
        };
        let result = run_turn(&session.agent, &mut thread, text, &self.options, 0).await;

        let (prompt_tokens, completion_tokens, total_tokens) = session.agent.planner().token_usage();
        tracing::debug!(
            steps = result.steps,
            stop = ?result.stop,
            prompt_tokens,
            completion_tokens,
            total_tokens,
            "turn finished"
        );
        Ok(result)
    }

    /// 对外唯一入口：总是返回一句话
    pub async fn send_message(&self, text: &str) -> String {
        match self.try_send_message(text).await {
            Ok(result) => result.response,
            Err(e) => {
                tracing::warn!("send_message failed: {}", e);
                e.user_message()
            }
        }
    }

    /// 当前线程的快照
    pub async fn history(&self) -> Vec<Message> {
        match self.session.get() {
            Some(session) => session.thread.lock().await.messages().to_vec(),
            None => Vec::new(),
        }
    }
}
