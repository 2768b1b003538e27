//! 天气提供方契约

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::providers::ProviderError;

/// 地点：城市名或 "lat,lon" 坐标
#[derive(Clone, Debug, PartialEq)]
pub enum Location {
    City(String),
    Coordinates { lat: f64, lon: f64 },
}

impl Location {
    /// "41.9,12.5" 解析为坐标；其余（包括无法解析为数字的 "a,b"）视为城市名
    pub fn parse(input: &str) -> Self {
        let input = input.trim();
        let parts: Vec<&str> = input.split(',').collect();
        if parts.len() == 2 {
            if let (Ok(lat), Ok(lon)) = (
                parts[0].trim().parse::<f64>(),
                parts[1].trim().parse::<f64>(),
            ) {
                return Location::Coordinates { lat, lon };
            }
        }
        Location::City(input.to_string())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CurrentWeather {
    pub city: String,
    pub description: String,
    /// 摄氏度
    pub temp: i32,
    pub feels_like: i32,
    pub humidity: u8,
    /// m/s
    pub wind_speed: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DailyForecast {
    pub date: String,
    pub description: String,
    pub temp_min: i32,
    pub temp_max: i32,
    pub humidity: u8,
    pub wind_speed: f64,
}

#[async_trait]
pub trait WeatherProvider: Send + Sync {
    async fn current(&self, location: &Location) -> Result<CurrentWeather, ProviderError>;

    /// 至多 days 天（调用方负责将 days 限制在 1..=5）
    async fn forecast(
        &self,
        location: &Location,
        days: usize,
    ) -> Result<Vec<DailyForecast>, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_parse() {
        assert_eq!(
            Location::parse("41.9, 12.5"),
            Location::Coordinates { lat: 41.9, lon: 12.5 }
        );
        assert_eq!(Location::parse("Rome"), Location::City("Rome".to_string()));
        assert_eq!(
            Location::parse("Paris, France"),
            Location::City("Paris, France".to_string())
        );
    }
}
