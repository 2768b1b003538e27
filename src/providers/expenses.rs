//! 记账存储契约：支出与文件夹

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::providers::ProviderError;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Expense {
    pub id: String,
    pub amount: f64,
    pub currency: String,
    pub description: String,
    pub category: String,
    pub date: NaiveDate,
    pub payment_method: String,
    pub folder_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// 将相关支出归组（一次旅行、一个项目等）
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Folder {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// 查询条件；category / payment_method 大小写不敏感，日期区间两端包含
#[derive(Clone, Debug, Default)]
pub struct ExpenseFilter {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub category: Option<String>,
    pub payment_method: Option<String>,
    pub folder_id: Option<String>,
    pub limit: Option<usize>,
}

impl ExpenseFilter {
    pub fn matches(&self, e: &Expense) -> bool {
        self.start_date.map_or(true, |d| e.date >= d)
            && self.end_date.map_or(true, |d| e.date <= d)
            && self
                .category
                .as_deref()
                .map_or(true, |c| e.category.eq_ignore_ascii_case(c))
            && self
                .payment_method
                .as_deref()
                .map_or(true, |p| e.payment_method.eq_ignore_ascii_case(p))
            && self
                .folder_id
                .as_deref()
                .map_or(true, |f| e.folder_id.as_deref() == Some(f))
    }
}

#[async_trait]
pub trait ExpenseStore: Send + Sync {
    /// 按日期倒序返回匹配的支出
    async fn query(&self, filter: ExpenseFilter) -> Result<Vec<Expense>, ProviderError>;

    async fn get(&self, id: &str) -> Result<Expense, ProviderError>;

    async fn insert(&self, expense: Expense) -> Result<(), ProviderError>;

    async fn replace(&self, expense: Expense) -> Result<(), ProviderError>;

    async fn delete(&self, id: &str) -> Result<(), ProviderError>;

    async fn create_folder(&self, folder: Folder) -> Result<(), ProviderError>;

    /// 按创建时间倒序
    async fn list_folders(&self) -> Result<Vec<Folder>, ProviderError>;

    async fn get_folder(&self, id: &str) -> Result<Folder, ProviderError>;
}
