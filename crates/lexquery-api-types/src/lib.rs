//! Wire types shared by the site backend and its clients.
//!
//! Every response type decodes strictly: a payload missing a required field
//! or carrying a field of the wrong type is rejected instead of being passed
//! through as loosely-typed JSON.

use serde::{Deserialize, Serialize};

// ============================================================================
// Calendar events
// ============================================================================

/// A calendar event as stored by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub event_id: i64,
    pub event_title: String,
    #[serde(default)]
    pub event_description: Option<String>,
    /// Start of the event, ISO-8601 as sent by the calendar widget.
    #[serde(default)]
    pub event_start: Option<String>,
    #[serde(default)]
    pub event_end: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
}

/// Payload for creating or replacing an event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEvent {
    pub event_title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_start: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_end: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl NewEvent {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            event_title: title.into(),
            ..Default::default()
        }
    }
}

// ============================================================================
// News
// ============================================================================

/// Publisher attribution attached to an article.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleSource {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
}

/// A news article. The URL is the article's identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    pub source: ArticleSource,
    #[serde(default)]
    pub author: Option<String>,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub url: String,
    #[serde(default)]
    pub url_to_image: Option<String>,
    pub published_at: String,
    #[serde(default)]
    pub content: Option<String>,
}

/// One page of search results from the news proxy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsResponse {
    #[serde(default)]
    pub status: Option<String>,
    pub total_results: u64,
    pub articles: Vec<Article>,
}

// ============================================================================
// Support tickets
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Open,
    InProgress,
    Resolved,
    Closed,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Open => "open",
            TicketStatus::InProgress => "in_progress",
            TicketStatus::Resolved => "resolved",
            TicketStatus::Closed => "closed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub ticket_id: i64,
    pub name: String,
    pub email: String,
    pub subject: String,
    pub description: String,
    pub status: TicketStatus,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Payload submitted by the support form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTicket {
    pub name: String,
    pub email: String,
    pub subject: String,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketStatusUpdate {
    pub status: TicketStatus,
}

// ============================================================================
// AI chat
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub prompt: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatReply {
    pub response: String,
}
