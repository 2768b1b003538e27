//! 日历提供方契约

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

use crate::free_busy::BusyInterval;
use crate::providers::ProviderError;

/// Google Calendar 的命名颜色（colorId 1..11）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventColor {
    Lavender,
    Sage,
    Grape,
    Flamingo,
    Banana,
    Tangerine,
    Peacock,
    Graphite,
    Blueberry,
    Basil,
    Tomato,
}

impl EventColor {
    pub const ALL: [EventColor; 11] = [
        EventColor::Lavender,
        EventColor::Sage,
        EventColor::Grape,
        EventColor::Flamingo,
        EventColor::Banana,
        EventColor::Tangerine,
        EventColor::Peacock,
        EventColor::Graphite,
        EventColor::Blueberry,
        EventColor::Basil,
        EventColor::Tomato,
    ];

    /// 大小写不敏感；未知名称返回 None
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim().to_lowercase();
        Self::ALL.into_iter().find(|c| c.name() == name)
    }

    pub fn name(self) -> &'static str {
        match self {
            EventColor::Lavender => "lavender",
            EventColor::Sage => "sage",
            EventColor::Grape => "grape",
            EventColor::Flamingo => "flamingo",
            EventColor::Banana => "banana",
            EventColor::Tangerine => "tangerine",
            EventColor::Peacock => "peacock",
            EventColor::Graphite => "graphite",
            EventColor::Blueberry => "blueberry",
            EventColor::Basil => "basil",
            EventColor::Tomato => "tomato",
        }
    }

    /// Google colorId
    pub fn color_id(self) -> u8 {
        Self::ALL
            .iter()
            .position(|c| *c == self)
            .map(|p| p as u8 + 1)
            .unwrap_or(1)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: String,
    pub summary: String,
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub color: Option<EventColor>,
    pub status: String,
}

/// 列表查询：[time_min, time_max] 区间内，按开始时间升序
#[derive(Clone, Debug)]
pub struct EventQuery {
    pub time_min: DateTime<Utc>,
    pub time_max: DateTime<Utc>,
    pub search: Option<String>,
    pub max_results: usize,
}

#[derive(Clone, Debug)]
pub struct NewEvent {
    pub summary: String,
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub color: Option<EventColor>,
}

/// 部分更新：None 表示不修改
#[derive(Clone, Debug, Default)]
pub struct EventPatch {
    pub summary: Option<String>,
    pub start: Option<DateTime<FixedOffset>>,
    pub end: Option<DateTime<FixedOffset>>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub color: Option<EventColor>,
}

impl EventPatch {
    pub fn is_empty(&self) -> bool {
        self.summary.is_none()
            && self.start.is_none()
            && self.end.is_none()
            && self.description.is_none()
            && self.location.is_none()
            && self.color.is_none()
    }
}

#[async_trait]
pub trait CalendarProvider: Send + Sync {
    async fn list_events(&self, query: EventQuery) -> Result<Vec<CalendarEvent>, ProviderError>;

    async fn get_event(&self, id: &str) -> Result<CalendarEvent, ProviderError>;

    async fn create_event(&self, event: NewEvent) -> Result<CalendarEvent, ProviderError>;

    async fn update_event(&self, id: &str, patch: EventPatch)
        -> Result<CalendarEvent, ProviderError>;

    async fn delete_event(&self, id: &str) -> Result<(), ProviderError>;

    /// free/busy 查询：返回与 [time_min, time_max] 相交的忙碌区间（不保证有序）
    async fn busy_intervals(
        &self,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> Result<Vec<BusyInterval>, ProviderError>;
}
