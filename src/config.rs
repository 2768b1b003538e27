//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `JARVIS__*` 覆盖（双下划线表示嵌套，如 `JARVIS__LLM__PROVIDER=mock`）。

use std::path::PathBuf;

use chrono::{FixedOffset, Offset, Utc};
use serde::Deserialize;

use crate::core::AgentError;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub providers: ProvidersSection,
}

/// 同一会话上并发轮次的处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConcurrencyPolicy {
    /// 排队等待正在进行的轮次
    #[default]
    Queue,
    /// 立即以 ThreadConcurrencyViolation 拒绝
    Reject,
}

/// [app] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: Option<String>,
    /// 用户所在时区的 UTC 偏移，如 "+01:00"
    pub utc_offset: String,
    /// 单轮内模型决策次数上限
    pub max_steps: usize,
    pub max_delegation_depth: usize,
    /// 渲染给模型的最大消息数（0 = 不限）
    pub max_context_messages: usize,
    pub concurrency: ConcurrencyPolicy,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            utc_offset: "+00:00".to_string(),
            max_steps: 10,
            max_delegation_depth: 2,
            max_context_messages: 60,
            concurrency: ConcurrencyPolicy::Queue,
        }
    }
}

impl AppSection {
    /// 解析 utc_offset（"Z"、"+01:00"、"-0530"）
    pub fn offset(&self) -> Result<FixedOffset, AgentError> {
        parse_utc_offset(&self.utc_offset)
    }
}

/// "Z" / "UTC" 视为 +00:00，其余交给 chrono 解析（"+01:00"、"-0530"）
pub fn parse_utc_offset(raw: &str) -> Result<FixedOffset, AgentError> {
    let s = raw.trim();
    if s.eq_ignore_ascii_case("z") || s.eq_ignore_ascii_case("utc") {
        return Ok(Utc.fix());
    }
    s.parse::<FixedOffset>()
        .map_err(|e| AgentError::ConfigurationError(format!("invalid utc_offset '{}': {}", raw, e)))
}

/// [llm] 段：后端选择
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// azure / openai / mock
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub azure: LlmAzureSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "azure".to_string(),
            model: "gpt-4o".to_string(),
            base_url: None,
            api_key: None,
            azure: LlmAzureSection::default(),
        }
    }
}

/// [llm.azure] 段；未设置的键回落到 AZURE_OPENAI_* 环境变量
#[derive(Debug, Clone, Deserialize, Default)]
pub struct LlmAzureSection {
    pub endpoint: Option<String>,
    pub deployment: Option<String>,
    pub api_version: Option<String>,
    pub api_key: Option<String>,
}

/// 单个领域的提供方后端
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderBackend {
    #[default]
    Memory,
    Disabled,
}

/// [providers] 段
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ProvidersSection {
    pub calendar: ProviderBackend,
    pub email: ProviderBackend,
    pub expenses: ProviderBackend,
    pub weather: ProviderBackend,
}

/// 从 config 目录加载配置，环境变量 JARVIS__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 JARVIS__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("JARVIS")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.app.max_steps, 10);
        assert_eq!(cfg.app.max_delegation_depth, 2);
        assert_eq!(cfg.app.concurrency, ConcurrencyPolicy::Queue);
        assert_eq!(cfg.providers.weather, ProviderBackend::Memory);
    }

    #[test]
    fn test_load_explicit_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[app]
utc_offset = "+02:00"
max_steps = 6
concurrency = "reject"

[llm]
provider = "mock"

[providers]
email = "disabled"
"#
        )
        .unwrap();

        let cfg = load_config(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(cfg.app.max_steps, 6);
        assert_eq!(cfg.app.concurrency, ConcurrencyPolicy::Reject);
        assert_eq!(cfg.llm.provider, "mock");
        assert_eq!(cfg.providers.email, ProviderBackend::Disabled);
        assert_eq!(cfg.providers.calendar, ProviderBackend::Memory);
        assert_eq!(cfg.app.offset().unwrap().local_minus_utc(), 7200);
    }

    #[test]
    fn test_parse_utc_offset() {
        assert_eq!(parse_utc_offset("Z").unwrap().local_minus_utc(), 0);
        assert_eq!(parse_utc_offset("-05:30").unwrap().local_minus_utc(), -19800);
        assert_eq!(parse_utc_offset("+0100").unwrap().local_minus_utc(), 3600);
        assert_eq!(parse_utc_offset(" utc ").unwrap().local_minus_utc(), 0);
        assert!(parse_utc_offset("01:00").is_err());
        assert!(parse_utc_offset("+25:00").is_err());
    }
}
