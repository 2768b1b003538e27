//! 天气专家：当前天气与多日预报

use std::sync::Arc;

use async_trait::async_trait;
use chrono::FixedOffset;
use serde_json::json;

use crate::agents::{CapabilityAgent, VOICE_STYLE};
use crate::core::AgentError;
use crate::llm::LlmClient;
use crate::providers::{Location, ProviderError, WeatherProvider};
use crate::tools::{ParamSpec, ParamType, Tool, ToolArgs};

pub const WEATHER_AGENT_NAME: &str = "weather-agent";

pub const DEFAULT_LOCATION: &str = "Rome";

const MAX_FORECAST_DAYS: i64 = 5;

const WEATHER_POLICY: &str = "You are the Weather Agent, a specialist within the Jarvis assistant. \
Your role is to provide weather information using the tools available to you. \
You can get current conditions and multi-day forecasts for any location.

Rules:
1. If the user does not specify a location, use 'Rome'.
2. For current conditions use get_current_weather, for upcoming days use get_weather_forecast.
3. Present the weather naturally and use Celsius for temperature.";

fn location_param() -> ParamSpec {
    ParamSpec::with_default(
        "location",
        ParamType::String,
        json!(DEFAULT_LOCATION),
        "City name (e.g. 'Rome') or coordinates as 'lat,lon' (e.g. '41.9,12.5')",
    )
}

fn location(args: &ToolArgs) -> Location {
    Location::parse(args.get_str("location").unwrap_or(DEFAULT_LOCATION))
}

struct CurrentWeatherTool {
    provider: Arc<dyn WeatherProvider>,
}

#[async_trait]
impl Tool for CurrentWeatherTool {
    fn name(&self) -> &str {
        "get_current_weather"
    }

    fn description(&self) -> &str {
        "Get current weather conditions for a location. Supports city names or lat,lon coordinates."
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        vec![location_param()]
    }

    async fn execute(&self, args: ToolArgs) -> Result<String, ProviderError> {
        let w = self.provider.current(&location(&args)).await?;
        Ok(format!(
            "Current weather in {}: {}, temperature {} degrees Celsius (feels like {}), humidity {}%, wind {} m/s.",
            w.city, w.description, w.temp, w.feels_like, w.humidity, w.wind_speed
        ))
    }
}

struct ForecastTool {
    provider: Arc<dyn WeatherProvider>,
}

#[async_trait]
impl Tool for ForecastTool {
    fn name(&self) -> &str {
        "get_weather_forecast"
    }

    fn description(&self) -> &str {
        "Get a multi-day weather forecast (1 to 5 days) for a location."
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        vec![
            location_param(),
            ParamSpec::with_default("days", ParamType::Integer, json!(3), "Number of days to forecast (1-5)"),
        ]
    }

    async fn execute(&self, args: ToolArgs) -> Result<String, ProviderError> {
        let days = args.get_i64("days").unwrap_or(3).clamp(1, MAX_FORECAST_DAYS) as usize;
        let forecast = self.provider.forecast(&location(&args), days).await?;
        if forecast.is_empty() {
            return Ok("No forecast data available.".to_string());
        }

        let mut parts = vec![format!("Weather forecast for the next {} days:", forecast.len())];
        for day in &forecast {
            parts.push(format!(
                "{}: {}, {} to {} degrees, humidity {}%, wind {} m/s.",
                day.date, day.description, day.temp_min, day.temp_max, day.humidity, day.wind_speed
            ));
        }
        Ok(parts.join(" "))
    }
}

/// 构建天气专家；provider 缺失时返回 ConfigurationError
pub fn create_weather_agent(
    llm: Arc<dyn LlmClient>,
    provider: Option<Arc<dyn WeatherProvider>>,
    offset: FixedOffset,
) -> Result<CapabilityAgent, AgentError> {
    let provider = provider.ok_or_else(|| {
        AgentError::ConfigurationError("weather provider is not configured".to_string())
    })?;

    Ok(CapabilityAgent::builder(WEATHER_AGENT_NAME, llm)
        .description("Provides weather information: current conditions and multi-day forecasts for any location.")
        .policy(format!("{}\n\n{}", WEATHER_POLICY, VOICE_STYLE))
        .date_aware(offset)
        .tool(CurrentWeatherTool {
            provider: provider.clone(),
        })?
        .tool(ForecastTool { provider })?
        .build())
}
