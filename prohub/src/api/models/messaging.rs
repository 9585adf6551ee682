//! API models for customer/professional conversations.

use super::pagination::Pagination;
use crate::db::models::messaging::{ConversationDBResponse, MessageDBResponse};
use crate::types::{ConversationId, MessageId, ProfessionalId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// Maximum message body length in characters
pub const MAX_MESSAGE_LENGTH: usize = 4000;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConversationCreate {
    #[schema(value_type = String, format = "uuid")]
    pub professional_id: ProfessionalId,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConversationResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: ConversationId,
    #[schema(value_type = String, format = "uuid")]
    pub customer_id: UserId,
    #[schema(value_type = String, format = "uuid")]
    pub professional_id: ProfessionalId,
    pub customer_name: Option<String>,
    pub professional_name: Option<String>,
    pub last_message_at: Option<DateTime<Utc>>,
    /// Messages from the other participant not yet read by the caller
    pub unread_count: i64,
    pub created_at: DateTime<Utc>,
}

impl From<ConversationDBResponse> for ConversationResponse {
    fn from(db: ConversationDBResponse) -> Self {
        Self {
            id: db.id,
            customer_id: db.customer_id,
            professional_id: db.professional_id,
            customer_name: db.customer_name,
            professional_name: db.professional_name,
            last_message_at: db.last_message_at,
            unread_count: db.unread_count,
            created_at: db.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MessageCreate {
    pub body: String,
}

impl MessageCreate {
    pub fn validate(&self) -> Result<(), String> {
        let body = self.body.trim();
        if body.is_empty() {
            return Err("Message body cannot be empty".to_string());
        }
        if body.chars().count() > MAX_MESSAGE_LENGTH {
            return Err(format!("Message body cannot exceed {MAX_MESSAGE_LENGTH} characters"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MessageResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: MessageId,
    #[schema(value_type = String, format = "uuid")]
    pub conversation_id: ConversationId,
    #[schema(value_type = String, format = "uuid")]
    pub sender_id: UserId,
    pub body: String,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<MessageDBResponse> for MessageResponse {
    fn from(db: MessageDBResponse) -> Self {
        Self {
            id: db.id,
            conversation_id: db.conversation_id,
            sender_id: db.sender_id,
            body: db.body,
            read_at: db.read_at,
            created_at: db.created_at,
        }
    }
}

#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct ListMessagesQuery {
    #[serde(flatten)]
    #[param(inline)]
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MarkReadResponse {
    pub marked_read: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_body_validation() {
        assert!(MessageCreate { body: "hello".into() }.validate().is_ok());
        assert!(MessageCreate { body: "   ".into() }.validate().is_err());
        assert!(
            MessageCreate {
                body: "x".repeat(MAX_MESSAGE_LENGTH + 1)
            }
            .validate()
            .is_err()
        );
    }
}
