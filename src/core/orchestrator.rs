//! 编排者：以委派工具包装各领域专家，组装顶层 CapabilityAgent
//!
//! 某个专家的依赖缺失（ConfigurationError）时跳过该能力并记录 warn，其余能力照常可用。

use std::sync::Arc;

use crate::agents::{
    create_calendar_agent, create_email_agent, create_expenses_agent, create_weather_agent,
    CapabilityAgent, VOICE_STYLE,
};
use crate::config::AppConfig;
use crate::core::AgentError;
use crate::llm::{LlmClient, MockLlmClient, OpenAiClient, AZURE_DEFAULT_API_VERSION};
use crate::providers::Providers;
use crate::tools::DelegationTool;

pub const ORCHESTRATOR_NAME: &str = "jarvis";

const PERSONA: &str = "You are Jarvis, a personal AI voice assistant. You are helpful, concise, and friendly.";

fn non_empty(v: Option<&String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// 配置优先，其次环境变量
fn setting(cfg_value: Option<&String>, env_key: &str) -> Option<String> {
    non_empty(cfg_value).or_else(|| non_empty(std::env::var(env_key).ok().as_ref()))
}

/// 根据 [llm].provider 选择后端（azure / openai / mock）；缺少凭据时返回 ConfigurationError
pub fn create_llm_from_config(cfg: &AppConfig) -> Result<Arc<dyn LlmClient>, AgentError> {
    let llm = &cfg.llm;
    match llm.provider.to_lowercase().as_str() {
        "azure" => {
            let endpoint = setting(llm.azure.endpoint.as_ref(), "AZURE_OPENAI_ENDPOINT");
            let api_key = setting(llm.azure.api_key.as_ref(), "AZURE_OPENAI_KEY");
            let deployment = setting(llm.azure.deployment.as_ref(), "AZURE_OPENAI_DEPLOYMENT");
            let (Some(endpoint), Some(api_key), Some(deployment)) = (endpoint, api_key, deployment)
            else {
                return Err(AgentError::ConfigurationError(
                    "Azure OpenAI not configured: set AZURE_OPENAI_ENDPOINT, AZURE_OPENAI_KEY and AZURE_OPENAI_DEPLOYMENT"
                        .to_string(),
                ));
            };
            let api_version = setting(llm.azure.api_version.as_ref(), "AZURE_OPENAI_API_VERSION")
                .unwrap_or_else(|| AZURE_DEFAULT_API_VERSION.to_string());
            tracing::info!("Using Azure OpenAI deployment {} ({})", deployment, api_version);
            Ok(Arc::new(OpenAiClient::azure(
                &endpoint,
                &deployment,
                &api_version,
                &api_key,
            )))
        }
        "openai" => {
            let api_key = setting(llm.api_key.as_ref(), "OPENAI_API_KEY").ok_or_else(|| {
                AgentError::ConfigurationError("OpenAI not configured: set OPENAI_API_KEY".to_string())
            })?;
            tracing::info!("Using OpenAI LLM ({})", llm.model);
            Ok(Arc::new(OpenAiClient::new(
                llm.base_url.as_deref(),
                &llm.model,
                &api_key,
            )))
        }
        "mock" => {
            tracing::warn!("Using Mock LLM, responses are echoes");
            Ok(Arc::new(MockLlmClient))
        }
        other => Err(AgentError::ConfigurationError(format!(
            "unknown llm provider '{}' (expected azure, openai or mock)",
            other
        ))),
    }
}

/// 编排者策略：只列出实际可用的委派目标
fn orchestrator_policy(delegates: &[DelegationTool]) -> String {
    let mut policy = format!("{}\n{}", PERSONA, VOICE_STYLE);
    if delegates.is_empty() {
        policy.push_str("\n\nNo specialist agents are available right now. Answer directly and never invent personal data.");
        return policy;
    }

    policy.push_str("\n\nYou have access to specialist agents, each exposed as a tool:");
    for d in delegates {
        policy.push_str(&format!("\n{}: {}", d.name(), d.target().description()));
    }
    policy.push_str(
        "\n\nWhen a request belongs to one of these areas, delegate to that tool and pass the user's full request as-is. \
         If the specialist asks a clarification question, relay it naturally to the user. \
         For all other topics, respond directly without calling any tool, and never invent calendar, email, expense or weather data.",
    );
    policy
}

/// 用给定的委派工具组装编排者
pub fn build_orchestrator(
    llm: Arc<dyn LlmClient>,
    delegates: Vec<DelegationTool>,
) -> Result<CapabilityAgent, AgentError> {
    let mut builder = CapabilityAgent::builder(ORCHESTRATOR_NAME, llm)
        .description("Personal voice assistant that routes requests to specialist agents.")
        .policy(orchestrator_policy(&delegates));
    for d in delegates {
        builder = builder.delegate(d)?;
    }
    Ok(builder.build())
}

fn wrap(
    built: Result<CapabilityAgent, AgentError>,
    tool_name: &str,
    description: &str,
    delegates: &mut Vec<DelegationTool>,
) -> Result<(), AgentError> {
    match built {
        Ok(agent) => {
            delegates.push(DelegationTool::new(tool_name, description, Arc::new(agent)));
            Ok(())
        }
        Err(AgentError::ConfigurationError(reason)) => {
            tracing::warn!(capability = tool_name, "capability unavailable: {}", reason);
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// 构建全部专家（跳过不可用者）并组装编排者
pub fn create_orchestrator(
    cfg: &AppConfig,
    providers: &Providers,
    llm: Arc<dyn LlmClient>,
) -> Result<CapabilityAgent, AgentError> {
    let offset = cfg.app.offset()?;
    let mut delegates = Vec::new();

    wrap(
        create_calendar_agent(llm.clone(), providers.calendar.clone(), offset),
        "calendar",
        "Manage the user's calendar: list, create, update, delete events and find free time. \
         Use this for any request about meetings, appointments, schedule or availability.",
        &mut delegates,
    )?;
    wrap(
        create_email_agent(llm.clone(), providers.mail.clone(), offset),
        "email",
        "Manage the user's email: search, read, send and reply to emails, list recent messages. \
         Use this for any request about email or messages.",
        &mut delegates,
    )?;
    wrap(
        create_expenses_agent(llm.clone(), providers.expenses.clone(), offset),
        "expenses",
        "Manage user expenses: add, query, update, delete expenses, spending summaries and folders. \
         Use this for any request related to expenses, spending, costs or payments.",
        &mut delegates,
    )?;
    wrap(
        create_weather_agent(llm.clone(), providers.weather.clone(), offset),
        "weather",
        "Get current weather conditions and multi-day forecasts for any location.",
        &mut delegates,
    )?;

    tracing::info!(
        delegates = delegates.len(),
        "orchestrator ready with {}",
        delegates.iter().map(|d| d.name()).collect::<Vec<_>>().join(", ")
    );
    build_orchestrator(llm, delegates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderBackend;

    #[test]
    fn test_all_capabilities_registered() {
        let cfg = AppConfig::default();
        let agent =
            create_orchestrator(&cfg, &Providers::in_memory(), Arc::new(MockLlmClient)).unwrap();
        assert_eq!(
            agent.toolset().tool_names(),
            vec!["calendar", "email", "expenses", "weather"]
        );
    }

    #[test]
    fn test_disabled_capability_is_skipped() {
        let mut cfg = AppConfig::default();
        cfg.providers.email = ProviderBackend::Disabled;
        let providers = Providers::from_config(&cfg);
        let agent = create_orchestrator(&cfg, &providers, Arc::new(MockLlmClient)).unwrap();
        let names = agent.toolset().tool_names();
        assert!(!names.contains(&"email".to_string()));
        assert!(!agent.policy().contains("\nemail:"));
    }

    #[test]
    fn test_no_delegates_still_builds() {
        let agent = build_orchestrator(Arc::new(MockLlmClient), Vec::new()).unwrap();
        assert!(agent.toolset().is_empty());
        assert!(agent.policy().contains("No specialist agents"));
    }

    #[test]
    fn test_llm_provider_selection() {
        let mut cfg = AppConfig::default();
        cfg.llm.provider = "mock".to_string();
        assert!(create_llm_from_config(&cfg).is_ok());

        cfg.llm.provider = "openai".to_string();
        cfg.llm.api_key = Some("sk-test".to_string());
        assert!(create_llm_from_config(&cfg).is_ok());

        cfg.llm.provider = "carrier-pigeon".to_string();
        assert!(matches!(
            create_llm_from_config(&cfg),
            Err(AgentError::ConfigurationError(_))
        ));
    }
}
