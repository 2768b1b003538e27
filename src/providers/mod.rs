//! 能力提供方契约：日历、邮件、记账、天气
//!
//! 引擎只消费这些 trait；每个操作独立失败并返回 ProviderError，由工具绑定转换为描述性文本。
//! 本 crate 只附带内存实现（memory），真实网络绑定由外部注入。

pub mod calendar;
pub mod email;
pub mod expenses;
pub mod memory;
pub mod weather;

use std::sync::Arc;

use thiserror::Error;

use crate::config::{AppConfig, ProviderBackend};

pub use calendar::{CalendarEvent, CalendarProvider, EventColor, EventPatch, EventQuery, NewEvent};
pub use email::{Email, EmailSummary, MailProvider, OutgoingEmail};
pub use expenses::{Expense, ExpenseFilter, ExpenseStore, Folder};
pub use weather::{CurrentWeather, DailyForecast, Location, WeatherProvider};

/// 提供方操作失败
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    /// 认证、网络等导致服务不可达
    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("{kind} with id {id} not found")]
    NotFound { kind: &'static str, id: String },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("request rejected: {0}")]
    Rejected(String),
}

impl ProviderError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        ProviderError::NotFound {
            kind,
            id: id.into(),
        }
    }
}

/// 进程级提供方句柄（启动时构建一次，之后只读共享）；None 表示该能力不可用
#[derive(Clone, Default)]
pub struct Providers {
    pub calendar: Option<Arc<dyn CalendarProvider>>,
    pub mail: Option<Arc<dyn MailProvider>>,
    pub expenses: Option<Arc<dyn ExpenseStore>>,
    pub weather: Option<Arc<dyn WeatherProvider>>,
}

impl Providers {
    /// 全部使用内存实现
    pub fn in_memory() -> Self {
        Self {
            calendar: Some(Arc::new(memory::InMemoryCalendar::default())),
            mail: Some(Arc::new(memory::InMemoryMailbox::default())),
            expenses: Some(Arc::new(memory::InMemoryExpenseStore::default())),
            weather: Some(Arc::new(memory::InMemoryWeather::default())),
        }
    }

    /// 按 [providers] 段为每个领域选择后端
    pub fn from_config(cfg: &AppConfig) -> Self {
        let p = &cfg.providers;
        Self {
            calendar: match p.calendar {
                ProviderBackend::Memory => Some(Arc::new(memory::InMemoryCalendar::default())),
                ProviderBackend::Disabled => None,
            },
            mail: match p.email {
                ProviderBackend::Memory => Some(Arc::new(memory::InMemoryMailbox::default())),
                ProviderBackend::Disabled => None,
            },
            expenses: match p.expenses {
                ProviderBackend::Memory => {
                    Some(Arc::new(memory::InMemoryExpenseStore::default()))
                }
                ProviderBackend::Disabled => None,
            },
            weather: match p.weather {
                ProviderBackend::Memory => Some(Arc::new(memory::InMemoryWeather::default())),
                ProviderBackend::Disabled => None,
            },
        }
    }
}
