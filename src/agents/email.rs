//! 邮件专家：搜索、阅读、发送、回复、列出最近邮件

use std::sync::Arc;

use async_trait::async_trait;
use chrono::FixedOffset;
use serde_json::json;

use crate::agents::{CapabilityAgent, VOICE_STYLE};
use crate::core::AgentError;
use crate::llm::LlmClient;
use crate::providers::{EmailSummary, MailProvider, OutgoingEmail, ProviderError};
use crate::tools::{ParamSpec, ParamType, Tool, ToolArgs};

pub const EMAIL_AGENT_NAME: &str = "email-agent";

/// read_email 返回正文的最大字符数
const MAX_BODY_CHARS: usize = 3000;

const EMAIL_POLICY: &str = "You are the Email Agent, a specialist within the Jarvis assistant. \
Your role is to manage the user's mailbox using the tools available to you. \
You can search emails, read full messages, send new emails, reply to emails, and list recent inbox messages.

Rules:
1. To send an email you must have the recipient, the subject and the body. If any of these is missing, ask the user before calling send_email.
2. To reply you need the email id and the reply body. If the user hasn't said which email, search or list emails first.
3. When reading an email, summarize it concisely unless the user asks for the full text.
4. Search queries support operators like 'from:', 'to:', 'subject:', 'is:unread'.";

fn max_results(args: &ToolArgs) -> usize {
    args.get_i64("max_results").unwrap_or(10).clamp(1, 50) as usize
}

fn summary_line(e: &EmailSummary, mark_unread: bool) -> String {
    format!(
        "- From: {}, Subject: {}, Date: {}{} (id: {})",
        e.from,
        e.subject,
        e.date,
        if mark_unread && e.unread { " [unread]" } else { "" },
        e.id
    )
}

fn plural(n: usize) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}

struct SearchEmails {
    provider: Arc<dyn MailProvider>,
}

#[async_trait]
impl Tool for SearchEmails {
    fn name(&self) -> &str {
        "search_emails"
    }

    fn description(&self) -> &str {
        "Search emails using search operators (from:, to:, subject:, is:unread) and free text."
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::required(
                "query",
                ParamType::String,
                "Search query, e.g. 'from:someone@example.com', 'subject:meeting', 'is:unread'",
            ),
            ParamSpec::with_default("max_results", ParamType::Integer, json!(10), "Maximum number of emails"),
        ]
    }

    async fn execute(&self, args: ToolArgs) -> Result<String, ProviderError> {
        let found = self
            .provider
            .search(args.require_str("query")?, max_results(&args))
            .await?;
        if found.is_empty() {
            return Ok("No emails found matching that search.".to_string());
        }
        let mut lines = vec![format!("Found {} email{}:", found.len(), plural(found.len()))];
        lines.extend(found.iter().map(|e| summary_line(e, false)));
        Ok(lines.join("\n"))
    }
}

struct ReadEmail {
    provider: Arc<dyn MailProvider>,
}

#[async_trait]
impl Tool for ReadEmail {
    fn name(&self) -> &str {
        "read_email"
    }

    fn description(&self) -> &str {
        "Read the full content of an email by its ID."
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        vec![ParamSpec::required("email_id", ParamType::String, "The email ID")]
    }

    async fn execute(&self, args: ToolArgs) -> Result<String, ProviderError> {
        let email = self.provider.read(args.require_str("email_id")?).await?;
        let body = if email.body.trim().is_empty() {
            email.snippet.clone()
        } else {
            email.body.chars().take(MAX_BODY_CHARS).collect()
        };
        Ok([
            format!("From: {}", email.from),
            format!("To: {}", email.to),
            format!("Subject: {}", email.subject),
            format!("Date: {}", email.date),
            format!("Body: {}", body),
            format!("ID: {}", email.id),
            format!("Thread ID: {}", email.thread_id),
        ]
        .join("\n"))
    }
}

struct SendEmail {
    provider: Arc<dyn MailProvider>,
}

#[async_trait]
impl Tool for SendEmail {
    fn name(&self) -> &str {
        "send_email"
    }

    fn description(&self) -> &str {
        "Send a new email."
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::required("to", ParamType::String, "Recipient email address"),
            ParamSpec::required("subject", ParamType::String, "Email subject line"),
            ParamSpec::required("body", ParamType::String, "Email body text"),
        ]
    }

    async fn execute(&self, args: ToolArgs) -> Result<String, ProviderError> {
        let to = args.require_str("to")?;
        let subject = args.require_str("subject")?;
        let id = self
            .provider
            .send(OutgoingEmail {
                to: to.to_string(),
                subject: subject.to_string(),
                body: args.require_str("body")?.to_string(),
                ..Default::default()
            })
            .await?;
        Ok(format!("Email sent to {} with subject '{}' (id: {})", to, subject, id))
    }
}

struct ReplyToEmail {
    provider: Arc<dyn MailProvider>,
}

/// 已有 "Re:" 前缀（大小写不敏感）时不重复添加
fn reply_subject(subject: &str) -> String {
    if subject.trim_start().to_lowercase().starts_with("re:") {
        subject.to_string()
    } else {
        format!("Re: {}", subject)
    }
}

/// References 链追加原邮件的 Message-ID
fn reply_references(original_refs: Option<&str>, message_id: Option<&str>) -> Option<String> {
    match (original_refs.map(str::trim).filter(|r| !r.is_empty()), message_id) {
        (Some(refs), Some(id)) => Some(format!("{} {}", refs, id)),
        (None, Some(id)) => Some(id.to_string()),
        (Some(refs), None) => Some(refs.to_string()),
        (None, None) => None,
    }
}

#[async_trait]
impl Tool for ReplyToEmail {
    fn name(&self) -> &str {
        "reply_to_email"
    }

    fn description(&self) -> &str {
        "Reply to an existing email, preserving the thread."
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::required("email_id", ParamType::String, "The email ID to reply to"),
            ParamSpec::required("body", ParamType::String, "Reply body text"),
        ]
    }

    async fn execute(&self, args: ToolArgs) -> Result<String, ProviderError> {
        let original = self.provider.read(args.require_str("email_id")?).await?;
        let message_id = original.message_id.as_deref().filter(|m| !m.is_empty());
        let reply = OutgoingEmail {
            to: original.from.clone(),
            subject: reply_subject(&original.subject),
            body: args.require_str("body")?.to_string(),
            in_reply_to: message_id.map(str::to_string),
            references: reply_references(original.references.as_deref(), message_id),
            thread_id: Some(original.thread_id.clone()),
        };
        let id = self.provider.send(reply).await?;
        Ok(format!(
            "Reply sent to {} in thread '{}' (id: {})",
            original.from, original.subject, id
        ))
    }
}

struct ListRecentEmails {
    provider: Arc<dyn MailProvider>,
}

#[async_trait]
impl Tool for ListRecentEmails {
    fn name(&self) -> &str {
        "list_recent_emails"
    }

    fn description(&self) -> &str {
        "List recent emails from the inbox, marking unread ones."
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        vec![ParamSpec::with_default(
            "max_results",
            ParamType::Integer,
            json!(10),
            "Maximum number of emails",
        )]
    }

    async fn execute(&self, args: ToolArgs) -> Result<String, ProviderError> {
        let recent = self.provider.list_inbox(max_results(&args)).await?;
        if recent.is_empty() {
            return Ok("Your inbox is empty.".to_string());
        }
        let mut lines = vec![format!(
            "You have {} recent email{} in your inbox:",
            recent.len(),
            plural(recent.len())
        )];
        lines.extend(recent.iter().map(|e| summary_line(e, true)));
        Ok(lines.join("\n"))
    }
}

/// 构建邮件专家；provider 缺失时返回 ConfigurationError
pub fn create_email_agent(
    llm: Arc<dyn LlmClient>,
    provider: Option<Arc<dyn MailProvider>>,
    offset: FixedOffset,
) -> Result<CapabilityAgent, AgentError> {
    let provider = provider.ok_or_else(|| {
        AgentError::ConfigurationError("mail provider is not configured".to_string())
    })?;

    Ok(CapabilityAgent::builder(EMAIL_AGENT_NAME, llm)
        .description("Manages email: search, read, send, reply to emails and list recent inbox messages.")
        .policy(format!("{}\n\n{}", EMAIL_POLICY, VOICE_STYLE))
        .date_aware(offset)
        .tool(SearchEmails {
            provider: provider.clone(),
        })?
        .tool(ReadEmail {
            provider: provider.clone(),
        })?
        .tool(SendEmail {
            provider: provider.clone(),
        })?
        .tool(ReplyToEmail {
            provider: provider.clone(),
        })?
        .tool(ListRecentEmails { provider })?
        .build())
}
