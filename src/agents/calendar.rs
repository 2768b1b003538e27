//! 日历专家：列出 / 查看 / 创建 / 更新 / 删除事件，查找空闲时间

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, FixedOffset, NaiveDateTime, NaiveTime, TimeZone, Utc};
use serde_json::json;

use crate::agents::{parse_date, CapabilityAgent, VOICE_STYLE};
use crate::core::AgentError;
use crate::free_busy::{merge_busy, resolve_free_unsorted, TimeInterval};
use crate::llm::LlmClient;
use crate::providers::{
    CalendarEvent, CalendarProvider, EventColor, EventPatch, EventQuery, NewEvent, ProviderError,
};
use crate::tools::{ParamSpec, ParamType, Tool, ToolArgs};

pub const CALENDAR_AGENT_NAME: &str = "calendar-agent";

const CALENDAR_POLICY: &str = "You are the Calendar Agent, a specialist within the Jarvis assistant. \
Your role is to manage the user's calendar using the tools available to you. \
You can list, create, update, and delete events, and find free time slots.

Rules:
1. To create an event you must have at least an event name and a start time. If either is missing, ask the user before calling create_event.
2. If the user doesn't give an end time, the event lasts one hour.
3. Natural time references: morning = 09:00, afternoon = 14:00, evening = 19:00, noon = 12:00, midnight = 00:00.
4. Convert 'tomorrow', 'next Monday' and similar to a YYYY-MM-DD date.
5. For updates or deletions, list events first to find the right one if the user didn't provide an id.
6. Available event colors: lavender, sage, grape, flamingo, banana, tangerine, peacock, graphite, blueberry, basil, tomato.";

fn invalid(msg: String) -> ProviderError {
    ProviderError::InvalidRequest(msg)
}

/// "YYYY-MM-DDTHH:MM[:SS]" 按 offset 解释；带 offset 的 RFC 3339 时间保留自身 offset
fn parse_datetime(raw: &str, offset: FixedOffset) -> Result<DateTime<FixedOffset>, ProviderError> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt);
    }
    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M"))
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M"))
        .map_err(|_| invalid(format!("'{}' is not a time in YYYY-MM-DDTHH:MM:SS format", raw)))?;
    offset
        .from_local_datetime(&naive)
        .single()
        .ok_or_else(|| invalid(format!("'{}' is not a valid local time", raw)))
}

fn parse_clock(raw: &str) -> Result<NaiveTime, ProviderError> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M")
        .map_err(|_| invalid(format!("'{}' is not a time in HH:MM format", raw)))
}

fn parse_color(raw: Option<&str>) -> Result<Option<EventColor>, ProviderError> {
    match raw {
        None => Ok(None),
        Some(name) => EventColor::from_name(name).map(Some).ok_or_else(|| {
            let names: Vec<&str> = EventColor::ALL.iter().map(|c| c.name()).collect();
            invalid(format!(
                "unknown color '{}', available colors: {}",
                name,
                names.join(", ")
            ))
        }),
    }
}

fn fmt_time(dt: &DateTime<FixedOffset>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S%:z").to_string()
}

fn day_bounds(
    date: &str,
    offset: FixedOffset,
    from: NaiveTime,
    to: NaiveTime,
) -> Result<(DateTime<FixedOffset>, DateTime<FixedOffset>), ProviderError> {
    let day = parse_date(date)?;
    let local = |t: NaiveTime| {
        offset
            .from_local_datetime(&day.and_time(t))
            .single()
            .ok_or_else(|| invalid(format!("invalid local time on {}", date)))
    };
    Ok((local(from)?, local(to)?))
}

struct ListEvents {
    provider: Arc<dyn CalendarProvider>,
    offset: FixedOffset,
}

#[async_trait]
impl Tool for ListEvents {
    fn name(&self) -> &str {
        "list_events"
    }

    fn description(&self) -> &str {
        "List calendar events within a date range, optionally filtered by text search."
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::required("start_date", ParamType::String, "Start date in YYYY-MM-DD format"),
            ParamSpec::optional(
                "end_date",
                ParamType::String,
                "End date in YYYY-MM-DD format, defaults to start_date",
            ),
            ParamSpec::optional("search_query", ParamType::String, "Text to search for in event names"),
            ParamSpec::with_default("max_results", ParamType::Integer, json!(20), "Maximum number of events"),
        ]
    }

    async fn execute(&self, args: ToolArgs) -> Result<String, ProviderError> {
        let start_date = args.require_str("start_date")?;
        let end_date = args.get_str("end_date").unwrap_or(start_date);
        let (time_min, _) = day_bounds(start_date, self.offset, NaiveTime::default(), NaiveTime::default())?;
        let end_of_day = NaiveTime::from_hms_opt(23, 59, 59).unwrap_or_default();
        let (_, time_max) = day_bounds(end_date, self.offset, NaiveTime::default(), end_of_day)?;
        if time_max < time_min {
            return Err(invalid("end_date is before start_date".to_string()));
        }

        let events = self
            .provider
            .list_events(EventQuery {
                time_min: time_min.with_timezone(&Utc),
                time_max: time_max.with_timezone(&Utc),
                search: args.get_str("search_query").map(str::to_string),
                max_results: args.get_i64("max_results").unwrap_or(20).clamp(1, 250) as usize,
            })
            .await?;

        if events.is_empty() {
            return Ok("No events found for that period.".to_string());
        }
        let mut lines = vec![format!(
            "Found {} event{}:",
            events.len(),
            if events.len() == 1 { "" } else { "s" }
        )];
        for e in &events {
            let start = e.start.with_timezone(&self.offset);
            let end = e.end.with_timezone(&self.offset);
            let mut line = format!("- {}: {} to {}", e.summary, fmt_time(&start), fmt_time(&end));
            if let Some(loc) = e.location.as_deref().filter(|l| !l.is_empty()) {
                line.push_str(&format!(" at {}", loc));
            }
            line.push_str(&format!(" (id: {})", e.id));
            lines.push(line);
        }
        Ok(lines.join("\n"))
    }
}

struct GetEvent {
    provider: Arc<dyn CalendarProvider>,
}

fn describe_event(e: &CalendarEvent) -> String {
    let mut lines = vec![
        format!("Event: {}", e.summary),
        format!("Start: {}", fmt_time(&e.start)),
        format!("End: {}", fmt_time(&e.end)),
    ];
    if let Some(d) = e.description.as_deref().filter(|d| !d.is_empty()) {
        lines.push(format!("Description: {}", d));
    }
    if let Some(l) = e.location.as_deref().filter(|l| !l.is_empty()) {
        lines.push(format!("Location: {}", l));
    }
    if let Some(c) = e.color {
        lines.push(format!("Color: {}", c.name()));
    }
    lines.push(format!("Status: {}", e.status));
    lines.push(format!("ID: {}", e.id));
    lines.join("\n")
}

#[async_trait]
impl Tool for GetEvent {
    fn name(&self) -> &str {
        "get_event"
    }

    fn description(&self) -> &str {
        "Fetch details for a single calendar event by its ID."
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        vec![ParamSpec::required("event_id", ParamType::String, "The event ID")]
    }

    async fn execute(&self, args: ToolArgs) -> Result<String, ProviderError> {
        let event = self.provider.get_event(args.require_str("event_id")?).await?;
        Ok(describe_event(&event))
    }
}

struct CreateEvent {
    provider: Arc<dyn CalendarProvider>,
    offset: FixedOffset,
}

#[async_trait]
impl Tool for CreateEvent {
    fn name(&self) -> &str {
        "create_event"
    }

    fn description(&self) -> &str {
        "Create a new calendar event."
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::required("name", ParamType::String, "Event name/title"),
            ParamSpec::required(
                "start_time",
                ParamType::String,
                "Start time in ISO format YYYY-MM-DDTHH:MM:SS",
            ),
            ParamSpec::optional(
                "end_time",
                ParamType::String,
                "End time in ISO format YYYY-MM-DDTHH:MM:SS, defaults to 1 hour after start",
            ),
            ParamSpec::optional("description", ParamType::String, "Event description"),
            ParamSpec::optional("location", ParamType::String, "Event location"),
            ParamSpec::optional(
                "color",
                ParamType::String,
                "Color name: lavender, sage, grape, flamingo, banana, tangerine, peacock, graphite, blueberry, basil, tomato",
            ),
        ]
    }

    async fn execute(&self, args: ToolArgs) -> Result<String, ProviderError> {
        let name = args.require_str("name")?;
        let start = parse_datetime(args.require_str("start_time")?, self.offset)?;
        let end = match args.get_str("end_time") {
            Some(raw) => parse_datetime(raw, self.offset)?,
            None => start + Duration::hours(1),
        };
        let event = self
            .provider
            .create_event(NewEvent {
                summary: name.to_string(),
                start,
                end,
                description: args.get_str("description").map(str::to_string),
                location: args.get_str("location").map(str::to_string),
                color: parse_color(args.get_str("color"))?,
            })
            .await?;
        Ok(format!(
            "Event created: {} from {} to {} (id: {})",
            event.summary,
            fmt_time(&event.start),
            fmt_time(&event.end),
            event.id
        ))
    }
}

struct UpdateEvent {
    provider: Arc<dyn CalendarProvider>,
    offset: FixedOffset,
}

#[async_trait]
impl Tool for UpdateEvent {
    fn name(&self) -> &str {
        "update_event"
    }

    fn description(&self) -> &str {
        "Update an existing calendar event. Only provided fields will be changed."
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::required("event_id", ParamType::String, "The event ID to update"),
            ParamSpec::optional("name", ParamType::String, "New event name"),
            ParamSpec::optional("start_time", ParamType::String, "New start time YYYY-MM-DDTHH:MM:SS"),
            ParamSpec::optional("end_time", ParamType::String, "New end time YYYY-MM-DDTHH:MM:SS"),
            ParamSpec::optional("description", ParamType::String, "New description"),
            ParamSpec::optional("location", ParamType::String, "New location"),
            ParamSpec::optional("color", ParamType::String, "New color name"),
        ]
    }

    async fn execute(&self, args: ToolArgs) -> Result<String, ProviderError> {
        let id = args.require_str("event_id")?;
        let patch = EventPatch {
            summary: args.get_str("name").map(str::to_string),
            start: args
                .get_str("start_time")
                .map(|raw| parse_datetime(raw, self.offset))
                .transpose()?,
            end: args
                .get_str("end_time")
                .map(|raw| parse_datetime(raw, self.offset))
                .transpose()?,
            description: args.get_str("description").map(str::to_string),
            location: args.get_str("location").map(str::to_string),
            color: parse_color(args.get_str("color"))?,
        };
        if patch.is_empty() {
            return Ok("No fields to update were provided.".to_string());
        }

        let mut updates = Vec::new();
        if let Some(v) = &patch.summary {
            updates.push(format!("name to {}", v));
        }
        if let Some(v) = &patch.start {
            updates.push(format!("start to {}", fmt_time(v)));
        }
        if let Some(v) = &patch.end {
            updates.push(format!("end to {}", fmt_time(v)));
        }
        if let Some(v) = &patch.description {
            updates.push(format!("description to {}", v));
        }
        if let Some(v) = &patch.location {
            updates.push(format!("location to {}", v));
        }
        if let Some(v) = patch.color {
            updates.push(format!("color to {}", v.name()));
        }

        self.provider.update_event(id, patch).await?;
        Ok(format!("Event {} updated: {}.", id, updates.join(", ")))
    }
}

struct DeleteEvent {
    provider: Arc<dyn CalendarProvider>,
}

#[async_trait]
impl Tool for DeleteEvent {
    fn name(&self) -> &str {
        "delete_event"
    }

    fn description(&self) -> &str {
        "Delete a calendar event."
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        vec![ParamSpec::required("event_id", ParamType::String, "The event ID to delete")]
    }

    async fn execute(&self, args: ToolArgs) -> Result<String, ProviderError> {
        let id = args.require_str("event_id")?;
        self.provider.delete_event(id).await?;
        Ok(format!("Event {} has been deleted.", id))
    }
}

struct FindFreeTime {
    provider: Arc<dyn CalendarProvider>,
    offset: FixedOffset,
}

#[async_trait]
impl Tool for FindFreeTime {
    fn name(&self) -> &str {
        "find_free_time"
    }

    fn description(&self) -> &str {
        "Find free time slots for a given date by checking busy periods."
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::required("date", ParamType::String, "Date to check in YYYY-MM-DD format"),
            ParamSpec::with_default(
                "work_hours_start",
                ParamType::String,
                json!("08:00"),
                "Start of day to consider, HH:MM",
            ),
            ParamSpec::with_default(
                "work_hours_end",
                ParamType::String,
                json!("20:00"),
                "End of day to consider, HH:MM",
            ),
        ]
    }

    async fn execute(&self, args: ToolArgs) -> Result<String, ProviderError> {
        let date = args.require_str("date")?;
        let from_raw = args.get_str("work_hours_start").unwrap_or("08:00");
        let to_raw = args.get_str("work_hours_end").unwrap_or("20:00");
        let (from, to) = day_bounds(date, self.offset, parse_clock(from_raw)?, parse_clock(to_raw)?)?;
        let window = TimeInterval::from_offsets(from, to)
            .map_err(|_| invalid("work_hours_end is before work_hours_start".to_string()))?;
        if window.is_empty() {
            return Err(invalid(format!(
                "work_hours_start and work_hours_end are both {}, the window is empty",
                from_raw
            )));
        }

        let busy = self.provider.busy_intervals(window.start, window.end).await?;
        let mut sorted = busy;
        sorted.sort_by_key(|b| (b.start, b.end));
        let merged = merge_busy(&sorted, &window);
        if merged.is_empty() {
            return Ok(format!(
                "You are completely free on {} between {} and {}.",
                date, from_raw, to_raw
            ));
        }
        let free = resolve_free_unsorted(sorted, &window)
            .map_err(|e| ProviderError::Rejected(e.to_string()))?;

        let clock = |t: DateTime<Utc>| t.with_timezone(&self.offset).format("%H:%M").to_string();
        let mut lines = vec![format!("Busy times on {}:", date)];
        for b in &merged {
            lines.push(format!("- Busy from {} to {}", clock(b.start), clock(b.end)));
        }
        lines.push("Free times:".to_string());
        if free.is_empty() {
            lines.push("- None".to_string());
        }
        for f in &free {
            lines.push(format!("- Free from {} to {}", clock(f.start), clock(f.end)));
        }
        Ok(lines.join("\n"))
    }
}

/// 构建日历专家；provider 缺失时返回 ConfigurationError
pub fn create_calendar_agent(
    llm: Arc<dyn LlmClient>,
    provider: Option<Arc<dyn CalendarProvider>>,
    offset: FixedOffset,
) -> Result<CapabilityAgent, AgentError> {
    let provider = provider.ok_or_else(|| {
        AgentError::ConfigurationError("calendar provider is not configured".to_string())
    })?;

    Ok(CapabilityAgent::builder(CALENDAR_AGENT_NAME, llm)
        .description("Manages the calendar: list, create, update, delete events and find free time slots.")
        .policy(format!("{}\n\n{}", CALENDAR_POLICY, VOICE_STYLE))
        .date_aware(offset)
        .tool(ListEvents {
            provider: provider.clone(),
            offset,
        })?
        .tool(GetEvent {
            provider: provider.clone(),
        })?
        .tool(CreateEvent {
            provider: provider.clone(),
            offset,
        })?
        .tool(UpdateEvent {
            provider: provider.clone(),
            offset,
        })?
        .tool(DeleteEvent {
            provider: provider.clone(),
        })?
        .tool(FindFreeTime { provider, offset })?
        .build())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::test_support::args;
    use crate::llm::MockLlmClient;
    use crate::providers::memory::InMemoryCalendar;

    fn rome() -> FixedOffset {
        FixedOffset::east_opt(3600).unwrap()
    }

    fn provider() -> Arc<InMemoryCalendar> {
        Arc::new(InMemoryCalendar::default())
    }

    #[test]
    fn test_missing_provider_is_configuration_error() {
        let result = create_calendar_agent(Arc::new(MockLlmClient), None, rome());
        assert!(matches!(result, Err(AgentError::ConfigurationError(_))));
    }

    #[test]
    fn test_agent_exposes_six_tools() {
        let agent = create_calendar_agent(Arc::new(MockLlmClient), Some(provider()), rome()).unwrap();
        assert_eq!(
            agent.toolset().tool_names(),
            vec![
                "list_events",
                "get_event",
                "create_event",
                "update_event",
                "delete_event",
                "find_free_time"
            ]
        );
    }

    #[tokio::test]
    async fn test_create_defaults_to_one_hour_and_lists() {
        let cal = provider();
        let create = CreateEvent {
            provider: cal.clone(),
            offset: rome(),
        };
        let out = create
            .execute(args(
                &create,
                json!({"name": "Dentist", "start_time": "2025-03-14T09:00:00", "color": "Tomato"}),
            ))
            .await
            .unwrap();
        assert!(out.contains("2025-03-14T09:00:00+01:00 to 2025-03-14T10:00:00+01:00"));

        let list = ListEvents {
            provider: cal.clone(),
            offset: rome(),
        };
        let out = list
            .execute(args(&list, json!({"start_date": "2025-03-14"})))
            .await
            .unwrap();
        assert!(out.starts_with("Found 1 event:"));
        assert!(out.contains("Dentist"));
        assert_eq!(cal.events().await[0].color, Some(EventColor::Tomato));
    }

    #[tokio::test]
    async fn test_unknown_color_is_reported() {
        let create = CreateEvent {
            provider: provider(),
            offset: rome(),
        };
        let err = create
            .execute(args(
                &create,
                json!({"name": "x", "start_time": "2025-03-14T09:00", "color": "pink"}),
            ))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("tomato"));
    }

    #[tokio::test]
    async fn test_update_without_fields() {
        let update = UpdateEvent {
            provider: provider(),
            offset: rome(),
        };
        let out = update
            .execute(args(&update, json!({"event_id": "missing"})))
            .await
            .unwrap();
        assert_eq!(out, "No fields to update were provided.");
    }

    #[tokio::test]
    async fn test_find_free_time_merges_overlaps_across_offsets() {
        let cal = provider();
        let cest = FixedOffset::east_opt(7200).unwrap();
        for (start, end) in [
            (rome().with_ymd_and_hms(2025, 3, 14, 9, 0, 0), rome().with_ymd_and_hms(2025, 3, 14, 10, 0, 0)),
            // 10:30+02:00 == 09:30+01:00
            (cest.with_ymd_and_hms(2025, 3, 14, 10, 30, 0), cest.with_ymd_and_hms(2025, 3, 14, 12, 0, 0)),
        ] {
            cal.create_event(NewEvent {
                summary: "busy".to_string(),
                start: start.unwrap(),
                end: end.unwrap(),
                description: None,
                location: None,
                color: None,
            })
            .await
            .unwrap();
        }

        let tool = FindFreeTime {
            provider: cal,
            offset: rome(),
        };
        let out = tool
            .execute(args(&tool, json!({"date": "2025-03-14"})))
            .await
            .unwrap();
        assert!(out.contains("- Busy from 09:00 to 11:00"));
        assert!(out.contains("- Free from 08:00 to 09:00"));
        assert!(out.contains("- Free from 11:00 to 20:00"));
    }

    #[tokio::test]
    async fn test_find_free_time_on_empty_day() {
        let tool = FindFreeTime {
            provider: provider(),
            offset: rome(),
        };
        let out = tool
            .execute(args(&tool, json!({"date": "2025-03-14", "work_hours_end": "18:00"})))
            .await
            .unwrap();
        assert_eq!(out, "You are completely free on 2025-03-14 between 08:00 and 18:00.");
    }

    #[tokio::test]
    async fn test_find_free_time_rejects_empty_window() {
        let tool = FindFreeTime {
            provider: provider(),
            offset: rome(),
        };
        let err = tool
            .execute(args(
                &tool,
                json!({"date": "2025-03-14", "work_hours_start": "08:00", "work_hours_end": "08:00"}),
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::InvalidRequest(_)));
    }
}
