use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub id: String,
    pub email: String,
    pub name: String,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Customer {
    pub fn new(email: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            email: email.into(),
            name: name.into(),
            phone: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub id: String,
    pub customer_id: String,
    pub subject: String,
    pub description: String,
    pub status: TicketStatus,
    pub priority: Priority,
    pub source: TicketSource,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_response_at: Option<DateTime<Utc>>,
}

impl Ticket {
    /// A fresh OPEN, MEDIUM priority ticket received by email.
    pub fn new(customer_id: impl Into<String>, subject: impl Into<String>, description: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            customer_id: customer_id.into(),
            subject: subject.into(),
            description: description.into(),
            status: TicketStatus::Open,
            priority: Priority::Medium,
            source: TicketSource::Email,
            created_at: now,
            updated_at: now,
            last_response_at: None,
        }
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    strum_macros::Display,
    strum_macros::EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketStatus {
    Open,
    InProgress,
    Resolved,
    Closed,
}

#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    strum_macros::Display,
    strum_macros::EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
}

#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    strum_macros::Display,
    strum_macros::EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketSource {
    Email,
    Web,
    Phone,
}

/// A message in a ticket's conversation history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TicketMessage {
    pub id: String,
    pub ticket_id: String,
    /// Customer id for customer-authored messages, `None` for the system.
    pub sender_id: Option<String>,
    pub sender_type: SenderType,
    pub content: String,
    pub message_type: MessageType,
    pub status: MessageStatus,
    pub metadata: MessageMetadata,
    pub created_at: DateTime<Utc>,
}

impl TicketMessage {
    pub fn from_customer(ticket_id: &str, customer_id: &str, content: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            ticket_id: ticket_id.to_string(),
            sender_id: Some(customer_id.to_string()),
            sender_type: SenderType::Customer,
            content: content.into(),
            message_type: MessageType::Email,
            status: MessageStatus::Received,
            metadata: MessageMetadata::default(),
            created_at: Utc::now(),
        }
    }

    pub fn system_draft(ticket_id: &str, content: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            ticket_id: ticket_id.to_string(),
            sender_id: None,
            sender_type: SenderType::System,
            content: content.into(),
            message_type: MessageType::Email,
            status: MessageStatus::Draft,
            metadata: MessageMetadata::default(),
            created_at: Utc::now(),
        }
    }

    pub fn is_from_customer(&self) -> bool {
        self.sender_type == SenderType::Customer
    }
}

/// Threading and provenance data attached to a message.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MessageMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_reply_to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub references: Option<String>,
    #[serde(default)]
    pub generated_by_ai: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_results_used: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_message_id: Option<String>,
}

#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    strum_macros::Display,
    strum_macros::EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum SenderType {
    Customer,
    Agent,
    System,
}

#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    strum_macros::Display,
    strum_macros::EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    Email,
    Note,
}

#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    strum_macros::Display,
    strum_macros::EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageStatus {
    Draft,
    Sent,
    Received,
    Processing,
}

/// Raw record of an email crossing the system boundary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EmailLog {
    pub id: String,
    pub message_id: String,
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
    pub status: MessageStatus,
    pub direction: EmailDirection,
    pub ticket_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    strum_macros::Display,
    strum_macros::EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum EmailDirection {
    Inbound,
    Outbound,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeDocument {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub content: String,
    pub category: Option<String>,
    pub filename: Option<String>,
    pub file_type: Option<String>,
    pub file_size: i64,
    pub is_active: bool,
    pub chunk_count: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Optional descriptive fields supplied when a document is indexed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMetadata {
    pub category: Option<String>,
    pub filename: Option<String>,
    pub file_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemLog {
    pub id: i64,
    pub level: LogLevel,
    pub source: String,
    pub message: String,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    strum_macros::Display,
    strum_macros::EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// A support-desk operator account.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn statuses_use_screaming_case_names() {
        assert_eq!(TicketStatus::InProgress.to_string(), "IN_PROGRESS");
        assert_eq!(TicketStatus::from_str("RESOLVED").unwrap(), TicketStatus::Resolved);
        assert_eq!(MessageStatus::Draft.to_string(), "DRAFT");
        assert_eq!(
            serde_json::to_value(SenderType::System).unwrap(),
            serde_json::json!("SYSTEM")
        );
    }

    #[test]
    fn new_ticket_is_open_medium_email() {
        let ticket = Ticket::new("c1", "Cannot log in", "help");
        assert_eq!(ticket.status, TicketStatus::Open);
        assert_eq!(ticket.priority, Priority::Medium);
        assert_eq!(ticket.source, TicketSource::Email);
        assert!(ticket.last_response_at.is_none());
    }
}
