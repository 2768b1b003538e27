//! Headless 运行时
//!
//! 供外部请求层（HTTP、语音前端等）调用：create_session_manager 由配置与提供方句柄构建 SessionManager，
//! process_message 对单条输入跑一轮并返回回复。

use std::sync::Arc;

use crate::config::AppConfig;
use crate::core::{create_llm_from_config, create_orchestrator, AgentError, SessionManager};
use crate::llm::LlmClient;
use crate::providers::Providers;
use crate::react::LoopOptions;

/// 按配置选择 LLM 后端并构建会话管理器；编排者在第一条消息时才构建
pub fn create_session_manager(
    cfg: &AppConfig,
    providers: Providers,
) -> Result<SessionManager, AgentError> {
    let llm = create_llm_from_config(cfg)?;
    Ok(create_session_manager_with_llm(cfg, providers, llm))
}

/// 使用指定 LLM 客户端（测试或自定义后端）
pub fn create_session_manager_with_llm(
    cfg: &AppConfig,
    providers: Providers,
    llm: Arc<dyn LlmClient>,
) -> SessionManager {
    let factory_cfg = cfg.clone();
    SessionManager::new(
        Box::new(move || create_orchestrator(&factory_cfg, &providers, llm.clone())),
        LoopOptions::from_config(&cfg.app),
    )
    .with_concurrency(cfg.app.concurrency)
}

/// 处理单条用户消息，返回最终回复
pub async fn process_message(manager: &SessionManager, user_input: &str) -> String {
    manager.send_message(user_input).await
}
