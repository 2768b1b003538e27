//! LLM 层：客户端抽象与实现（OpenAI / Azure OpenAI / Mock / Scripted）

pub mod mock;
pub mod openai;
pub mod traits;

pub use mock::{MockLlmClient, ScriptedLlmClient};
pub use openai::{OpenAiClient, TokenUsage, AZURE_DEFAULT_API_VERSION};
pub use traits::{ChatMessage, ChatRole, LlmClient, LlmError};
