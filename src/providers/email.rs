//! 邮件提供方契约

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::providers::ProviderError;

/// 列表 / 搜索结果中的邮件摘要
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EmailSummary {
    pub id: String,
    pub from: String,
    pub subject: String,
    pub date: String,
    pub unread: bool,
}

/// 完整邮件
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Email {
    pub id: String,
    pub thread_id: String,
    pub from: String,
    pub to: String,
    pub subject: String,
    pub date: String,
    pub body: String,
    pub snippet: String,
    /// RFC 5322 Message-ID 头
    pub message_id: Option<String>,
    pub references: Option<String>,
}

/// 待发送邮件；回复时带上线程头
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub in_reply_to: Option<String>,
    pub references: Option<String>,
    pub thread_id: Option<String>,
}

#[async_trait]
pub trait MailProvider: Send + Sync {
    /// Gmail 搜索语法（from:、subject:、is:unread 等）
    async fn search(&self, query: &str, max_results: usize)
        -> Result<Vec<EmailSummary>, ProviderError>;

    /// 收件箱最近邮件，新的在前
    async fn list_inbox(&self, max_results: usize) -> Result<Vec<EmailSummary>, ProviderError>;

    async fn read(&self, id: &str) -> Result<Email, ProviderError>;

    /// 返回已发送邮件的 id
    async fn send(&self, email: OutgoingEmail) -> Result<String, ProviderError>;
}
