//! Database models for conversations and messages.

use crate::types::{ConversationId, MessageId, ProfessionalId, UserId};
use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// A conversation joined with participant names and the unread count for the viewer
#[derive(Debug, Clone, FromRow)]
pub struct ConversationDBResponse {
    pub id: ConversationId,
    pub customer_id: UserId,
    pub professional_id: ProfessionalId,
    /// Owning user of the professional profile
    pub professional_user_id: UserId,
    pub customer_name: Option<String>,
    pub professional_name: Option<String>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub unread_count: i64,
    pub created_at: DateTime<Utc>,
}

impl ConversationDBResponse {
    pub fn is_participant(&self, user_id: UserId) -> bool {
        self.customer_id == user_id || self.professional_user_id == user_id
    }
}

#[derive(Debug, Clone)]
pub struct MessageCreateDBRequest {
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub body: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct MessageDBResponse {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub body: String,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
