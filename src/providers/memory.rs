//! 内存提供方：进程内的日历 / 邮箱 / 记账 / 天气实现
//!
//! 用于离线运行与测试；行为与真实服务的契约一致（按 id 查找失败返回 NotFound，列表有序）。

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::free_busy::{BusyInterval, TimeInterval};
use crate::providers::{
    CalendarEvent, CalendarProvider, CurrentWeather, DailyForecast, Email, EmailSummary,
    EventPatch, EventQuery, Expense, ExpenseFilter, ExpenseStore, Folder, Location, MailProvider,
    NewEvent, OutgoingEmail, ProviderError, WeatherProvider,
};

fn short_id(prefix: &str) -> String {
    let raw = Uuid::new_v4().simple().to_string();
    format!("{}_{}", prefix, &raw[..12])
}

// ---------------------------------------------------------------------------
// Calendar

#[derive(Debug, Default)]
pub struct InMemoryCalendar {
    events: RwLock<Vec<CalendarEvent>>,
}

impl InMemoryCalendar {
    pub fn with_events(events: Vec<CalendarEvent>) -> Self {
        Self {
            events: RwLock::new(events),
        }
    }

    pub async fn events(&self) -> Vec<CalendarEvent> {
        self.events.read().await.clone()
    }
}

fn overlaps(e: &CalendarEvent, min: DateTime<Utc>, max: DateTime<Utc>) -> bool {
    e.start.with_timezone(&Utc) <= max && e.end.with_timezone(&Utc) >= min
}

#[async_trait]
impl CalendarProvider for InMemoryCalendar {
    async fn list_events(&self, query: EventQuery) -> Result<Vec<CalendarEvent>, ProviderError> {
        let needle = query.search.as_deref().map(str::to_lowercase);
        let mut found: Vec<CalendarEvent> = self
            .events
            .read()
            .await
            .iter()
            .filter(|e| e.status != "cancelled")
            .filter(|e| overlaps(e, query.time_min, query.time_max))
            .filter(|e| {
                needle.as_deref().map_or(true, |n| {
                    e.summary.to_lowercase().contains(n)
                        || e.description
                            .as_deref()
                            .is_some_and(|d| d.to_lowercase().contains(n))
                })
            })
            .cloned()
            .collect();
        found.sort_by_key(|e| e.start.with_timezone(&Utc));
        found.truncate(query.max_results);
        Ok(found)
    }

    async fn get_event(&self, id: &str) -> Result<CalendarEvent, ProviderError> {
        self.events
            .read()
            .await
            .iter()
            .find(|e| e.id == id)
            .cloned()
            .ok_or_else(|| ProviderError::not_found("Event", id))
    }

    async fn create_event(&self, event: NewEvent) -> Result<CalendarEvent, ProviderError> {
        if event.end < event.start {
            return Err(ProviderError::InvalidRequest(
                "event end is before its start".to_string(),
            ));
        }
        let created = CalendarEvent {
            id: short_id("evt"),
            summary: event.summary,
            start: event.start,
            end: event.end,
            description: event.description,
            location: event.location,
            color: event.color,
            status: "confirmed".to_string(),
        };
        self.events.write().await.push(created.clone());
        Ok(created)
    }

    async fn update_event(
        &self,
        id: &str,
        patch: EventPatch,
    ) -> Result<CalendarEvent, ProviderError> {
        let mut events = self.events.write().await;
        let event = events
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| ProviderError::not_found("Event", id))?;
        let start = patch.start.unwrap_or(event.start);
        let end = patch.end.unwrap_or(event.end);
        if end < start {
            return Err(ProviderError::InvalidRequest(
                "event end is before its start".to_string(),
            ));
        }
        event.start = start;
        event.end = end;
        if let Some(s) = patch.summary {
            event.summary = s;
        }
        if let Some(d) = patch.description {
            event.description = Some(d);
        }
        if let Some(l) = patch.location {
            event.location = Some(l);
        }
        if let Some(c) = patch.color {
            event.color = Some(c);
        }
        Ok(event.clone())
    }

    async fn delete_event(&self, id: &str) -> Result<(), ProviderError> {
        let mut events = self.events.write().await;
        let before = events.len();
        events.retain(|e| e.id != id);
        if events.len() == before {
            return Err(ProviderError::not_found("Event", id));
        }
        Ok(())
    }

    async fn busy_intervals(
        &self,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> Result<Vec<BusyInterval>, ProviderError> {
        self.events
            .read()
            .await
            .iter()
            .filter(|e| e.status != "cancelled" && overlaps(e, time_min, time_max))
            .map(|e| {
                TimeInterval::from_offsets(e.start, e.end)
                    .map_err(|err| ProviderError::Rejected(err.to_string()))
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Mail

#[derive(Debug, Default)]
struct Mailbox {
    inbox: Vec<(Email, bool)>,
    sent: Vec<OutgoingEmail>,
}

#[derive(Debug, Default)]
pub struct InMemoryMailbox {
    state: RwLock<Mailbox>,
}

impl InMemoryMailbox {
    /// (邮件, 是否未读)，新的在前
    pub fn with_inbox(inbox: Vec<(Email, bool)>) -> Self {
        Self {
            state: RwLock::new(Mailbox {
                inbox,
                sent: Vec::new(),
            }),
        }
    }

    pub async fn sent(&self) -> Vec<OutgoingEmail> {
        self.state.read().await.sent.clone()
    }
}

fn summarize(email: &Email, unread: bool) -> EmailSummary {
    EmailSummary {
        id: email.id.clone(),
        from: email.from.clone(),
        subject: email.subject.clone(),
        date: email.date.clone(),
        unread,
    }
}

/// 支持 from: / to: / subject: / is:unread / in:inbox，其余词做全文匹配
fn matches_query(email: &Email, unread: bool, query: &str) -> bool {
    query.split_whitespace().all(|term| {
        let lower = term.to_lowercase();
        if let Some(v) = lower.strip_prefix("from:") {
            email.from.to_lowercase().contains(v)
        } else if let Some(v) = lower.strip_prefix("to:") {
            email.to.to_lowercase().contains(v)
        } else if let Some(v) = lower.strip_prefix("subject:") {
            email.subject.to_lowercase().contains(v)
        } else if lower == "is:unread" {
            unread
        } else if lower == "in:inbox" {
            true
        } else {
            email.subject.to_lowercase().contains(&lower)
                || email.body.to_lowercase().contains(&lower)
                || email.from.to_lowercase().contains(&lower)
        }
    })
}

#[async_trait]
impl MailProvider for InMemoryMailbox {
    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<EmailSummary>, ProviderError> {
        Ok(self
            .state
            .read()
            .await
            .inbox
            .iter()
            .filter(|(e, unread)| matches_query(e, *unread, query))
            .take(max_results)
            .map(|(e, unread)| summarize(e, *unread))
            .collect())
    }

    async fn list_inbox(&self, max_results: usize) -> Result<Vec<EmailSummary>, ProviderError> {
        Ok(self
            .state
            .read()
            .await
            .inbox
            .iter()
            .take(max_results)
            .map(|(e, unread)| summarize(e, *unread))
            .collect())
    }

    async fn read(&self, id: &str) -> Result<Email, ProviderError> {
        let mut state = self.state.write().await;
        let entry = state
            .inbox
            .iter_mut()
            .find(|(e, _)| e.id == id)
            .ok_or_else(|| ProviderError::not_found("Email", id))?;
        entry.1 = false;
        Ok(entry.0.clone())
    }

    async fn send(&self, email: OutgoingEmail) -> Result<String, ProviderError> {
        if !email.to.contains('@') {
            return Err(ProviderError::InvalidRequest(format!(
                "'{}' is not a valid recipient address",
                email.to
            )));
        }
        self.state.write().await.sent.push(email);
        Ok(short_id("msg"))
    }
}

// ---------------------------------------------------------------------------
// Expenses

#[derive(Debug, Default)]
struct Ledger {
    expenses: HashMap<String, Expense>,
    folders: HashMap<String, Folder>,
}

#[derive(Debug, Default)]
pub struct InMemoryExpenseStore {
    ledger: RwLock<Ledger>,
}

#[async_trait]
impl ExpenseStore for InMemoryExpenseStore {
    async fn query(&self, filter: ExpenseFilter) -> Result<Vec<Expense>, ProviderError> {
        let mut found: Vec<Expense> = self
            .ledger
            .read()
            .await
            .expenses
            .values()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.date.cmp(&a.date).then(b.created_at.cmp(&a.created_at)));
        if let Some(limit) = filter.limit {
            found.truncate(limit);
        }
        Ok(found)
    }

    async fn get(&self, id: &str) -> Result<Expense, ProviderError> {
        self.ledger
            .read()
            .await
            .expenses
            .get(id)
            .cloned()
            .ok_or_else(|| ProviderError::not_found("Expense", id))
    }

    async fn insert(&self, expense: Expense) -> Result<(), ProviderError> {
        let mut ledger = self.ledger.write().await;
        if ledger.expenses.contains_key(&expense.id) {
            return Err(ProviderError::Rejected(format!(
                "expense {} already exists",
                expense.id
            )));
        }
        ledger.expenses.insert(expense.id.clone(), expense);
        Ok(())
    }

    async fn replace(&self, expense: Expense) -> Result<(), ProviderError> {
        let mut ledger = self.ledger.write().await;
        match ledger.expenses.get_mut(&expense.id) {
            Some(slot) => {
                *slot = expense;
                Ok(())
            }
            None => Err(ProviderError::not_found("Expense", expense.id)),
        }
    }

    async fn delete(&self, id: &str) -> Result<(), ProviderError> {
        self.ledger
            .write()
            .await
            .expenses
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| ProviderError::not_found("Expense", id))
    }

    async fn create_folder(&self, folder: Folder) -> Result<(), ProviderError> {
        self.ledger
            .write()
            .await
            .folders
            .insert(folder.id.clone(), folder);
        Ok(())
    }

    async fn list_folders(&self) -> Result<Vec<Folder>, ProviderError> {
        let mut folders: Vec<Folder> = self.ledger.read().await.folders.values().cloned().collect();
        folders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(folders)
    }

    async fn get_folder(&self, id: &str) -> Result<Folder, ProviderError> {
        self.ledger
            .read()
            .await
            .folders
            .get(id)
            .cloned()
            .ok_or_else(|| ProviderError::not_found("Folder", id))
    }
}

// ---------------------------------------------------------------------------
// Weather

#[derive(Clone, Debug)]
struct CityWeather {
    lat: f64,
    lon: f64,
    current: CurrentWeather,
    forecast: Vec<DailyForecast>,
}

/// 预置城市数据；坐标查询匹配 0.5 度以内最近的城市
#[derive(Debug, Default)]
pub struct InMemoryWeather {
    cities: HashMap<String, CityWeather>,
}

impl InMemoryWeather {
    pub fn with_city(
        mut self,
        lat: f64,
        lon: f64,
        current: CurrentWeather,
        forecast: Vec<DailyForecast>,
    ) -> Self {
        self.cities.insert(
            current.city.to_lowercase(),
            CityWeather {
                lat,
                lon,
                current,
                forecast,
            },
        );
        self
    }

    fn lookup(&self, location: &Location) -> Result<&CityWeather, ProviderError> {
        match location {
            Location::City(name) => self
                .cities
                .get(&name.trim().to_lowercase())
                .ok_or_else(|| ProviderError::not_found("City", name.clone())),
            Location::Coordinates { lat, lon } => self
                .cities
                .values()
                .map(|c| (c, (c.lat - lat).abs() + (c.lon - lon).abs()))
                .filter(|(_, d)| *d <= 0.5)
                .min_by(|a, b| a.1.total_cmp(&b.1))
                .map(|(c, _)| c)
                .ok_or_else(|| ProviderError::not_found("Location", format!("{lat},{lon}"))),
        }
    }
}

#[async_trait]
impl WeatherProvider for InMemoryWeather {
    async fn current(&self, location: &Location) -> Result<CurrentWeather, ProviderError> {
        Ok(self.lookup(location)?.current.clone())
    }

    async fn forecast(
        &self,
        location: &Location,
        days: usize,
    ) -> Result<Vec<DailyForecast>, ProviderError> {
        Ok(self
            .lookup(location)?
            .forecast
            .iter()
            .take(days)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, NaiveDate, TimeZone};

    fn rome() -> FixedOffset {
        FixedOffset::east_opt(3600).unwrap()
    }

    #[tokio::test]
    async fn test_calendar_crud_and_busy() {
        let cal = InMemoryCalendar::default();
        let ev = cal
            .create_event(NewEvent {
                summary: "Dentist".to_string(),
                start: rome().with_ymd_and_hms(2025, 3, 14, 9, 0, 0).unwrap(),
                end: rome().with_ymd_and_hms(2025, 3, 14, 10, 0, 0).unwrap(),
                description: None,
                location: None,
                color: None,
            })
            .await
            .unwrap();

        let busy = cal
            .busy_intervals(
                Utc.with_ymd_and_hms(2025, 3, 14, 0, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2025, 3, 14, 23, 0, 0).unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(busy.len(), 1);
        assert_eq!(busy[0].start, Utc.with_ymd_and_hms(2025, 3, 14, 8, 0, 0).unwrap());

        cal.delete_event(&ev.id).await.unwrap();
        assert_eq!(
            cal.delete_event(&ev.id).await,
            Err(ProviderError::not_found("Event", ev.id.clone()))
        );
    }

    #[tokio::test]
    async fn test_expense_query_is_newest_first() {
        let store = InMemoryExpenseStore::default();
        for (id, day) in [("a", 1), ("b", 3), ("c", 2)] {
            store
                .insert(Expense {
                    id: id.to_string(),
                    amount: 10.0,
                    currency: "EUR".to_string(),
                    description: id.to_string(),
                    category: "food".to_string(),
                    date: NaiveDate::from_ymd_opt(2025, 3, day).unwrap(),
                    payment_method: "card".to_string(),
                    folder_id: None,
                    created_at: Utc::now(),
                })
                .await
                .unwrap();
        }
        let found = store
            .query(ExpenseFilter {
                category: Some("FOOD".to_string()),
                limit: Some(2),
                ..Default::default()
            })
            .await
            .unwrap();
        let ids: Vec<&str> = found.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
    }

    #[tokio::test]
    async fn test_mail_search_operators() {
        let email = Email {
            id: "m1".to_string(),
            thread_id: "t1".to_string(),
            from: "anna@example.com".to_string(),
            to: "me@example.com".to_string(),
            subject: "Meeting notes".to_string(),
            date: "2025-03-14".to_string(),
            body: "See attached".to_string(),
            snippet: "See attached".to_string(),
            message_id: None,
            references: None,
        };
        let mailbox = InMemoryMailbox::with_inbox(vec![(email, true)]);
        assert_eq!(mailbox.search("from:anna is:unread", 10).await.unwrap().len(), 1);
        assert!(mailbox.search("subject:invoice", 10).await.unwrap().is_empty());

        mailbox.read("m1").await.unwrap();
        assert!(mailbox.search("is:unread", 10).await.unwrap().is_empty());
    }
}
