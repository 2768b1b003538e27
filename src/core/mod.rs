//! 核心编排层：错误与恢复、编排者组装、会话生命周期

pub mod error;
pub mod orchestrator;
pub mod recovery;
pub mod session;

pub use error::{AgentError, RecoveryAction, FALLBACK_RESPONSE};
pub use orchestrator::{
    build_orchestrator, create_llm_from_config, create_orchestrator, ORCHESTRATOR_NAME,
};
pub use recovery::RecoveryEngine;
pub use session::{AgentFactory, Session, SessionManager};
