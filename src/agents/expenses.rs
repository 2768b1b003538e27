//! 记账专家：支出的增删改查、汇总，以及把支出归入文件夹

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{FixedOffset, NaiveDate, Utc};
use serde_json::json;
use uuid::Uuid;

use crate::agents::{parse_date, CapabilityAgent, VOICE_STYLE};
use crate::core::AgentError;
use crate::llm::LlmClient;
use crate::providers::{Expense, ExpenseFilter, ExpenseStore, Folder, ProviderError};
use crate::tools::{ParamSpec, ParamType, Tool, ToolArgs};

pub const EXPENSES_AGENT_NAME: &str = "expenses-agent";

const EXPENSES_POLICY: &str = "You are the Expenses Agent, a specialist within the Jarvis assistant. \
Your role is to manage the user's personal expenses using the tools available to you. \
You can add, query, update, and delete expenses, provide spending summaries, and group expenses into folders.

Rules:
1. To add an expense you must have at least the amount, a description, and a category. If any is missing, ask the user before calling add_expense.
2. Valid categories include: food, transport, entertainment, bills, shopping, health, travel, education, subscriptions, and other.
3. Defaults when the user doesn't say: date is today, currency is EUR, payment method is card.
4. For spending summaries use get_expense_summary.
5. For updates or deletions, query first to find the expense, then confirm with the user before proceeding.
6. Folders group related expenses (a trip, an event, a project). List folders to find a folder id.";

fn plural(n: usize) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}

fn opt_date(args: &ToolArgs, key: &str) -> Result<Option<NaiveDate>, ProviderError> {
    args.get_str(key).map(parse_date).transpose()
}

fn expense_line(e: &Expense) -> String {
    format!(
        "- {}: {} {} for {} (category: {}, id: {})",
        e.date, e.amount, e.currency, e.description, e.category, e.id
    )
}

/// 所有支出币种相同时返回该币种，否则标注为混合
fn currency_label(items: &[Expense]) -> String {
    match items.first() {
        Some(first) if items.iter().all(|e| e.currency == first.currency) => first.currency.clone(),
        Some(_) => "(mixed currencies)".to_string(),
        None => "EUR".to_string(),
    }
}

fn new_id(prefix: &str) -> String {
    let raw = Uuid::new_v4().simple().to_string();
    format!("{}_{}", prefix, &raw[..12])
}

struct QueryExpenses {
    store: Arc<dyn ExpenseStore>,
}

#[async_trait]
impl Tool for QueryExpenses {
    fn name(&self) -> &str {
        "query_expenses"
    }

    fn description(&self) -> &str {
        "Query and list expenses, newest first, with optional filters for date range, category, and payment method."
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::optional("start_date", ParamType::String, "Start date in YYYY-MM-DD format"),
            ParamSpec::optional("end_date", ParamType::String, "End date in YYYY-MM-DD format"),
            ParamSpec::optional("category", ParamType::String, "Filter by category (e.g. food, transport)"),
            ParamSpec::optional("payment_method", ParamType::String, "Filter by payment method (cash, card, transfer)"),
            ParamSpec::with_default("max_results", ParamType::Integer, json!(20), "Maximum number of results"),
        ]
    }

    async fn execute(&self, args: ToolArgs) -> Result<String, ProviderError> {
        let items = self
            .store
            .query(ExpenseFilter {
                start_date: opt_date(&args, "start_date")?,
                end_date: opt_date(&args, "end_date")?,
                category: args.get_str("category").map(str::to_string),
                payment_method: args.get_str("payment_method").map(str::to_string),
                folder_id: None,
                limit: Some(args.get_i64("max_results").unwrap_or(20).clamp(1, 200) as usize),
            })
            .await?;
        if items.is_empty() {
            return Ok("No expenses found matching the filters.".to_string());
        }
        let mut lines = vec![format!("Found {} expense{}:", items.len(), plural(items.len()))];
        lines.extend(items.iter().map(expense_line));
        Ok(lines.join("\n"))
    }
}

struct ExpenseSummary {
    store: Arc<dyn ExpenseStore>,
}

#[async_trait]
impl Tool for ExpenseSummary {
    fn name(&self) -> &str {
        "get_expense_summary"
    }

    fn description(&self) -> &str {
        "Get a summary of expenses with totals grouped by category or month."
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::optional("start_date", ParamType::String, "Start date in YYYY-MM-DD format"),
            ParamSpec::optional("end_date", ParamType::String, "End date in YYYY-MM-DD format"),
            ParamSpec::with_default(
                "group_by",
                ParamType::String,
                json!("category"),
                "Group results by 'category' or 'month'",
            ),
        ]
    }

    async fn execute(&self, args: ToolArgs) -> Result<String, ProviderError> {
        let group_by = args.get_str("group_by").unwrap_or("category");
        if group_by != "category" && group_by != "month" {
            return Err(ProviderError::InvalidRequest(format!(
                "group_by must be 'category' or 'month', got '{}'",
                group_by
            )));
        }
        let items = self
            .store
            .query(ExpenseFilter {
                start_date: opt_date(&args, "start_date")?,
                end_date: opt_date(&args, "end_date")?,
                ..Default::default()
            })
            .await?;
        if items.is_empty() {
            return Ok("No expenses found for the given period.".to_string());
        }

        let currency = currency_label(&items);
        let total: f64 = items.iter().map(|e| e.amount).sum();
        let mut groups: HashMap<String, f64> = HashMap::new();
        for e in &items {
            let key = if group_by == "month" {
                e.date.format("%Y-%m").to_string()
            } else {
                e.category.clone()
            };
            *groups.entry(key).or_default() += e.amount;
        }
        let mut groups: Vec<(String, f64)> = groups.into_iter().collect();
        groups.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        let mut lines = vec![
            format!(
                "Total: {:.2} {} across {} expense{}.",
                total,
                currency,
                items.len(),
                plural(items.len())
            ),
            format!("Breakdown by {}:", group_by),
        ];
        for (key, amount) in groups {
            lines.push(format!("- {}: {:.2} {}", key, amount, currency));
        }
        Ok(lines.join("\n"))
    }
}

struct AddExpense {
    store: Arc<dyn ExpenseStore>,
    offset: FixedOffset,
}

#[async_trait]
impl Tool for AddExpense {
    fn name(&self) -> &str {
        "add_expense"
    }

    fn description(&self) -> &str {
        "Add a new expense record."
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::required("amount", ParamType::Number, "The expense amount"),
            ParamSpec::required("description", ParamType::String, "Brief description of the expense"),
            ParamSpec::required(
                "category",
                ParamType::String,
                "Expense category (e.g. food, transport, entertainment, bills, shopping, health)",
            ),
            ParamSpec::optional("date", ParamType::String, "Date in YYYY-MM-DD format, defaults to today"),
            ParamSpec::with_default(
                "payment_method",
                ParamType::String,
                json!("card"),
                "Payment method (cash, card, transfer)",
            ),
            ParamSpec::with_default("currency", ParamType::String, json!("EUR"), "Currency code"),
        ]
    }

    async fn execute(&self, args: ToolArgs) -> Result<String, ProviderError> {
        let amount = args
            .get_f64("amount")
            .ok_or_else(|| ProviderError::InvalidRequest("missing 'amount'".to_string()))?;
        if !amount.is_finite() || amount <= 0.0 {
            return Err(ProviderError::InvalidRequest(
                "amount must be a positive number".to_string(),
            ));
        }
        let date = match opt_date(&args, "date")? {
            Some(d) => d,
            None => Utc::now().with_timezone(&self.offset).date_naive(),
        };
        let expense = Expense {
            id: new_id("exp"),
            amount,
            currency: args.get_str("currency").unwrap_or("EUR").to_uppercase(),
            description: args.require_str("description")?.to_string(),
            category: args.require_str("category")?.to_lowercase(),
            date,
            payment_method: args.get_str("payment_method").unwrap_or("card").to_lowercase(),
            folder_id: None,
            created_at: Utc::now(),
        };
        self.store.insert(expense.clone()).await?;
        Ok(format!(
            "Expense added: {} {} for {} on {} (category: {}, id: {}).",
            expense.amount, expense.currency, expense.description, expense.date, expense.category, expense.id
        ))
    }
}

struct UpdateExpense {
    store: Arc<dyn ExpenseStore>,
}

#[async_trait]
impl Tool for UpdateExpense {
    fn name(&self) -> &str {
        "update_expense"
    }

    fn description(&self) -> &str {
        "Update an existing expense. Only provided fields will be changed."
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::required("expense_id", ParamType::String, "The ID of the expense to update"),
            ParamSpec::optional("amount", ParamType::Number, "New amount"),
            ParamSpec::optional("description", ParamType::String, "New description"),
            ParamSpec::optional("category", ParamType::String, "New category"),
            ParamSpec::optional("date", ParamType::String, "New date in YYYY-MM-DD format"),
            ParamSpec::optional("payment_method", ParamType::String, "New payment method"),
            ParamSpec::optional("currency", ParamType::String, "New currency code"),
        ]
    }

    async fn execute(&self, args: ToolArgs) -> Result<String, ProviderError> {
        let id = args.require_str("expense_id")?;
        let mut expense = self.store.get(id).await?;

        let mut updates = Vec::new();
        if let Some(amount) = args.get_f64("amount") {
            expense.amount = amount;
            updates.push(format!("amount to {}", amount));
        }
        if let Some(v) = args.get_str("description") {
            expense.description = v.to_string();
            updates.push(format!("description to {}", v));
        }
        if let Some(v) = args.get_str("category") {
            expense.category = v.to_lowercase();
            updates.push(format!("category to {}", v));
        }
        if let Some(d) = opt_date(&args, "date")? {
            expense.date = d;
            updates.push(format!("date to {}", d));
        }
        if let Some(v) = args.get_str("payment_method") {
            expense.payment_method = v.to_lowercase();
            updates.push(format!("payment method to {}", v));
        }
        if let Some(v) = args.get_str("currency") {
            expense.currency = v.to_uppercase();
            updates.push(format!("currency to {}", v));
        }
        if updates.is_empty() {
            return Ok("No fields to update were provided.".to_string());
        }

        self.store.replace(expense).await?;
        Ok(format!("Expense {} updated: {}.", id, updates.join(", ")))
    }
}

struct DeleteExpense {
    store: Arc<dyn ExpenseStore>,
}

#[async_trait]
impl Tool for DeleteExpense {
    fn name(&self) -> &str {
        "delete_expense"
    }

    fn description(&self) -> &str {
        "Delete an expense record."
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        vec![ParamSpec::required("expense_id", ParamType::String, "The ID of the expense to delete")]
    }

    async fn execute(&self, args: ToolArgs) -> Result<String, ProviderError> {
        let id = args.require_str("expense_id")?;
        self.store.delete(id).await?;
        Ok(format!("Expense {} has been deleted.", id))
    }
}

struct CreateFolder {
    store: Arc<dyn ExpenseStore>,
}

#[async_trait]
impl Tool for CreateFolder {
    fn name(&self) -> &str {
        "create_folder"
    }

    fn description(&self) -> &str {
        "Create a new folder to group related expenses together (e.g. a trip, event, or project)."
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::required("name", ParamType::String, "Name of the folder"),
            ParamSpec::optional("description", ParamType::String, "Optional description for the folder"),
        ]
    }

    async fn execute(&self, args: ToolArgs) -> Result<String, ProviderError> {
        let name = args.require_str("name")?;
        let description = args.get_str("description").filter(|d| !d.is_empty());
        let folder = Folder {
            id: new_id("fld"),
            name: name.to_string(),
            description: description.map(str::to_string),
            created_at: Utc::now(),
        };
        let id = folder.id.clone();
        self.store.create_folder(folder).await?;
        let desc_part = description.map(|d| format!(" ({})", d)).unwrap_or_default();
        Ok(format!("Folder '{}'{} created successfully (id: {}).", name, desc_part, id))
    }
}

struct ListFolders {
    store: Arc<dyn ExpenseStore>,
}

#[async_trait]
impl Tool for ListFolders {
    fn name(&self) -> &str {
        "list_folders"
    }

    fn description(&self) -> &str {
        "List all expense folders with their expense count and total spending."
    }

    async fn execute(&self, _args: ToolArgs) -> Result<String, ProviderError> {
        let folders = self.store.list_folders().await?;
        if folders.is_empty() {
            return Ok("You don't have any folders yet. You can create one to group related expenses together.".to_string());
        }
        let assigned = self.store.query(ExpenseFilter::default()).await?;
        let mut stats: HashMap<&str, (usize, f64)> = HashMap::new();
        for e in &assigned {
            if let Some(fid) = e.folder_id.as_deref() {
                let entry = stats.entry(fid).or_default();
                entry.0 += 1;
                entry.1 += e.amount;
            }
        }

        let mut lines = vec![format!("You have {} folder{}:", folders.len(), plural(folders.len()))];
        for f in &folders {
            let (count, total) = stats.get(f.id.as_str()).copied().unwrap_or_default();
            let desc_part = f
                .description
                .as_deref()
                .map(|d| format!(" - {}", d))
                .unwrap_or_default();
            lines.push(format!(
                "- {}{}: {} expense{}, {:.2} total (id: {})",
                f.name,
                desc_part,
                count,
                plural(count),
                total,
                f.id
            ));
        }
        Ok(lines.join("\n"))
    }
}

struct AddExpenseToFolder {
    store: Arc<dyn ExpenseStore>,
}

#[async_trait]
impl Tool for AddExpenseToFolder {
    fn name(&self) -> &str {
        "add_expense_to_folder"
    }

    fn description(&self) -> &str {
        "Assign an existing expense to a folder."
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::required("expense_id", ParamType::String, "The ID of the expense to assign"),
            ParamSpec::required("folder_id", ParamType::String, "The ID of the folder"),
        ]
    }

    async fn execute(&self, args: ToolArgs) -> Result<String, ProviderError> {
        let folder = self.store.get_folder(args.require_str("folder_id")?).await?;
        let mut expense = self.store.get(args.require_str("expense_id")?).await?;
        expense.folder_id = Some(folder.id.clone());
        let description = expense.description.clone();
        self.store.replace(expense).await?;
        Ok(format!(
            "Expense '{}' has been added to folder '{}'.",
            description, folder.name
        ))
    }
}

struct QueryFolderExpenses {
    store: Arc<dyn ExpenseStore>,
}

#[async_trait]
impl Tool for QueryFolderExpenses {
    fn name(&self) -> &str {
        "query_folder_expenses"
    }

    fn description(&self) -> &str {
        "Query expenses within a folder, with optional filters for category and date range."
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::required("folder_id", ParamType::String, "The ID of the folder"),
            ParamSpec::optional("category", ParamType::String, "Filter by category"),
            ParamSpec::optional("start_date", ParamType::String, "Start date in YYYY-MM-DD format"),
            ParamSpec::optional("end_date", ParamType::String, "End date in YYYY-MM-DD format"),
        ]
    }

    async fn execute(&self, args: ToolArgs) -> Result<String, ProviderError> {
        let folder = self.store.get_folder(args.require_str("folder_id")?).await?;
        let items = self
            .store
            .query(ExpenseFilter {
                start_date: opt_date(&args, "start_date")?,
                end_date: opt_date(&args, "end_date")?,
                category: args.get_str("category").map(str::to_string),
                folder_id: Some(folder.id.clone()),
                ..Default::default()
            })
            .await?;
        if items.is_empty() {
            return Ok(format!(
                "No expenses found in folder '{}' with the given filters.",
                folder.name
            ));
        }
        let total: f64 = items.iter().map(|e| e.amount).sum();
        let mut lines = vec![format!(
            "Folder '{}' has {} expense{} totaling {:.2} {}:",
            folder.name,
            items.len(),
            plural(items.len()),
            total,
            currency_label(&items)
        )];
        lines.extend(items.iter().map(expense_line));
        Ok(lines.join("\n"))
    }
}

/// 构建记账专家；store 缺失时返回 ConfigurationError
pub fn create_expenses_agent(
    llm: Arc<dyn LlmClient>,
    store: Option<Arc<dyn ExpenseStore>>,
    offset: FixedOffset,
) -> Result<CapabilityAgent, AgentError> {
    let store = store.ok_or_else(|| {
        AgentError::ConfigurationError("expense store is not configured".to_string())
    })?;

    Ok(CapabilityAgent::builder(EXPENSES_AGENT_NAME, llm)
        .description("Manages personal expenses: add, query, update, delete expenses, spending summaries and folders.")
        .policy(format!("{}\n\n{}", EXPENSES_POLICY, VOICE_STYLE))
        .tool(QueryExpenses { store: store.clone() })?
        .tool(ExpenseSummary { store: store.clone() })?
        .tool(AddExpense {
            store: store.clone(),
            offset,
        })?
        .tool(UpdateExpense { store: store.clone() })?
        .tool(DeleteExpense { store: store.clone() })?
        .tool(CreateFolder { store: store.clone() })?
        .tool(ListFolders { store: store.clone() })?
        .tool(AddExpenseToFolder { store: store.clone() })?
        .tool(QueryFolderExpenses { store })?
        .build())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::test_support::args;
    use crate::providers::memory::InMemoryExpenseStore;

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    async fn add(store: &Arc<InMemoryExpenseStore>, amount: f64, category: &str, date: &str) -> String {
        let tool = AddExpense {
            store: store.clone(),
            offset: utc(),
        };
        let out = tool
            .execute(args(
                &tool,
                json!({"amount": amount, "description": category, "category": category, "date": date}),
            ))
            .await
            .unwrap();
        let start = out.find("id: ").unwrap() + 4;
        out[start..out.len() - 2].to_string()
    }

    #[tokio::test]
    async fn test_add_normalises_and_defaults() {
        let store = Arc::new(InMemoryExpenseStore::default());
        let id = add(&store, 12.5, "Food", "2025-03-14").await;
        let saved = store.get(&id).await.unwrap();
        assert_eq!(saved.category, "food");
        assert_eq!(saved.payment_method, "card");
        assert_eq!(saved.currency, "EUR");
    }

    #[tokio::test]
    async fn test_summary_sorted_descending() {
        let store = Arc::new(InMemoryExpenseStore::default());
        add(&store, 10.0, "food", "2025-03-01").await;
        add(&store, 40.0, "travel", "2025-03-02").await;
        add(&store, 5.0, "food", "2025-04-01").await;

        let tool = ExpenseSummary { store: store.clone() };
        let out = tool.execute(args(&tool, json!({}))).await.unwrap();
        assert!(out.starts_with("Total: 55.00 EUR across 3 expenses."));
        assert!(out.find("travel").unwrap() < out.find("food").unwrap());

        let out = tool
            .execute(args(&tool, json!({"group_by": "month"})))
            .await
            .unwrap();
        assert!(out.contains("- 2025-03: 50.00 EUR"));
    }

    #[tokio::test]
    async fn test_folders_count_and_total() {
        let store = Arc::new(InMemoryExpenseStore::default());
        let expense = add(&store, 30.0, "travel", "2025-03-02").await;
        add(&store, 8.0, "food", "2025-03-03").await;

        let create = CreateFolder { store: store.clone() };
        let out = create
            .execute(args(&create, json!({"name": "Lisbon trip"})))
            .await
            .unwrap();
        let start = out.find("id: ").unwrap() + 4;
        let folder = out[start..out.len() - 2].to_string();

        let assign = AddExpenseToFolder { store: store.clone() };
        assign
            .execute(args(&assign, json!({"expense_id": expense, "folder_id": folder})))
            .await
            .unwrap();

        let list = ListFolders { store: store.clone() };
        let out = list.execute(args(&list, json!({}))).await.unwrap();
        assert!(out.contains("Lisbon trip: 1 expense, 30.00 total"));

        let query = QueryFolderExpenses { store };
        let out = query
            .execute(args(&query, json!({"folder_id": folder})))
            .await
            .unwrap();
        assert!(out.starts_with("Folder 'Lisbon trip' has 1 expense totaling 30.00 EUR:"));
    }

    #[tokio::test]
    async fn test_delete_missing_expense_reports_not_found() {
        let tool = DeleteExpense {
            store: Arc::new(InMemoryExpenseStore::default()),
        };
        let err = tool
            .execute(args(&tool, json!({"expense_id": "exp_missing"})))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Expense with id exp_missing not found");
    }
}
