//! Database repository for conversations and messages.

use sqlx::{PgConnection, Postgres, query_builder::QueryBuilder};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    db::{
        errors::{DbError, Result},
        models::messaging::{ConversationDBResponse, MessageCreateDBRequest, MessageDBResponse},
    },
    types::{ConversationId, ProfessionalId, UserId, abbrev_uuid},
};

/// Conversation columns with the unread count as seen by `viewer`
fn conversation_select(viewer: UserId) -> QueryBuilder<'static, Postgres> {
    let mut query = QueryBuilder::new(
        r#"
        SELECT c.id, c.customer_id, c.professional_id, p.user_id AS professional_user_id,
               cu.display_name AS customer_name, pu.display_name AS professional_name,
               c.last_message_at, c.created_at,
               (SELECT COUNT(*) FROM messages m
                WHERE m.conversation_id = c.id AND m.read_at IS NULL AND m.sender_id <> "#,
    );
    query.push_bind(viewer);
    query.push(
        r#") AS unread_count
        FROM conversations c
        JOIN professionals p ON p.id = c.professional_id
        JOIN users pu ON pu.id = p.user_id
        JOIN users cu ON cu.id = c.customer_id
        WHERE 1=1"#,
    );
    query
}

pub struct Conversations<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Conversations<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Return the conversation between a customer and a professional, creating it on first contact
    #[instrument(skip(self), fields(customer_id = %abbrev_uuid(&customer_id), professional_id = %abbrev_uuid(&professional_id)), err)]
    pub async fn get_or_create(
        &mut self,
        customer_id: UserId,
        professional_id: ProfessionalId,
    ) -> Result<ConversationDBResponse> {
        sqlx::query(
            r#"
            INSERT INTO conversations (id, customer_id, professional_id)
            VALUES ($1, $2, $3)
            ON CONFLICT ON CONSTRAINT conversations_participants_unique DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(customer_id)
        .bind(professional_id)
        .execute(&mut *self.db)
        .await?;

        let mut query = conversation_select(customer_id);
        query.push(" AND c.customer_id = ");
        query.push_bind(customer_id);
        query.push(" AND c.professional_id = ");
        query.push_bind(professional_id);

        let conversation = query
            .build_query_as::<ConversationDBResponse>()
            .fetch_optional(&mut *self.db)
            .await?
            .ok_or(DbError::NotFound)?;
        Ok(conversation)
    }

    #[instrument(skip(self), fields(conversation_id = %abbrev_uuid(&id)), err)]
    pub async fn get_by_id(&mut self, id: ConversationId, viewer: UserId) -> Result<Option<ConversationDBResponse>> {
        let mut query = conversation_select(viewer);
        query.push(" AND c.id = ");
        query.push_bind(id);

        let conversation = query
            .build_query_as::<ConversationDBResponse>()
            .fetch_optional(&mut *self.db)
            .await?;
        Ok(conversation)
    }

    /// Conversations the user takes part in, as customer or as professional, most recent first
    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn list_for_user(&mut self, user_id: UserId, skip: i64, limit: i64) -> Result<Vec<ConversationDBResponse>> {
        let mut query = conversation_select(user_id);
        query.push(" AND (c.customer_id = ");
        query.push_bind(user_id);
        query.push(" OR p.user_id = ");
        query.push_bind(user_id);
        query.push(") ORDER BY COALESCE(c.last_message_at, c.created_at) DESC LIMIT ");
        query.push_bind(limit);
        query.push(" OFFSET ");
        query.push_bind(skip);

        let conversations = query.build_query_as::<ConversationDBResponse>().fetch_all(&mut *self.db).await?;
        Ok(conversations)
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn count_for_user(&mut self, user_id: UserId) -> Result<i64> {
        let count: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM conversations c
            JOIN professionals p ON p.id = c.professional_id
            WHERE c.customer_id = $1 OR p.user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(count.0)
    }

    #[instrument(skip(self, request), fields(conversation_id = %abbrev_uuid(&request.conversation_id)), err)]
    pub async fn add_message(&mut self, request: &MessageCreateDBRequest) -> Result<MessageDBResponse> {
        let message = sqlx::query_as::<_, MessageDBResponse>(
            r#"
            INSERT INTO messages (id, conversation_id, sender_id, body)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(request.conversation_id)
        .bind(request.sender_id)
        .bind(request.body.trim())
        .fetch_one(&mut *self.db)
        .await?;

        sqlx::query("UPDATE conversations SET last_message_at = $2 WHERE id = $1")
            .bind(request.conversation_id)
            .bind(message.created_at)
            .execute(&mut *self.db)
            .await?;

        Ok(message)
    }

    /// Messages in chronological order
    #[instrument(skip(self), fields(conversation_id = %abbrev_uuid(&conversation_id)), err)]
    pub async fn list_messages(
        &mut self,
        conversation_id: ConversationId,
        skip: i64,
        limit: i64,
    ) -> Result<Vec<MessageDBResponse>> {
        let messages = sqlx::query_as::<_, MessageDBResponse>(
            "SELECT * FROM messages WHERE conversation_id = $1 ORDER BY created_at ASC LIMIT $2 OFFSET $3",
        )
        .bind(conversation_id)
        .bind(limit)
        .bind(skip)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(messages)
    }

    #[instrument(skip(self), fields(conversation_id = %abbrev_uuid(&conversation_id)), err)]
    pub async fn count_messages(&mut self, conversation_id: ConversationId) -> Result<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM messages WHERE conversation_id = $1")
            .bind(conversation_id)
            .fetch_one(&mut *self.db)
            .await?;

        Ok(count.0)
    }

    /// Mark every message from the other participant as read
    #[instrument(skip(self), fields(conversation_id = %abbrev_uuid(&conversation_id)), err)]
    pub async fn mark_read(&mut self, conversation_id: ConversationId, reader: UserId) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE messages SET read_at = NOW() WHERE conversation_id = $1 AND sender_id <> $2 AND read_at IS NULL",
        )
        .bind(conversation_id)
        .bind(reader)
        .execute(&mut *self.db)
        .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::users::Role;
    use crate::test_utils::{create_test_professional, create_test_user};
    use sqlx::PgPool;

    #[sqlx::test]
    #[test_log::test]
    async fn test_get_or_create_is_idempotent(pool: PgPool) {
        let customer = create_test_user(&pool, Role::Customer).await;
        let professional = create_test_professional(&pool).await;

        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Conversations::new(&mut conn);

        let first = repo.get_or_create(customer.id, professional.id).await.unwrap();
        let second = repo.get_or_create(customer.id, professional.id).await.unwrap();
        assert_eq!(first.id, second.id);
        assert!(first.is_participant(customer.id));
        assert!(first.is_participant(professional.user_id));
        assert_eq!(repo.count_for_user(customer.id).await.unwrap(), 1);
        assert_eq!(repo.count_for_user(professional.user_id).await.unwrap(), 1);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_unread_counts_and_mark_read(pool: PgPool) {
        let customer = create_test_user(&pool, Role::Customer).await;
        let professional = create_test_professional(&pool).await;

        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Conversations::new(&mut conn);

        let conversation = repo.get_or_create(customer.id, professional.id).await.unwrap();
        for body in ["Hello", "Are you free on Monday?"] {
            repo.add_message(&MessageCreateDBRequest {
                conversation_id: conversation.id,
                sender_id: customer.id,
                body: body.to_string(),
            })
            .await
            .unwrap();
        }

        let as_professional = repo.get_by_id(conversation.id, professional.user_id).await.unwrap().unwrap();
        assert_eq!(as_professional.unread_count, 2);
        assert!(as_professional.last_message_at.is_some());

        let as_customer = repo.get_by_id(conversation.id, customer.id).await.unwrap().unwrap();
        assert_eq!(as_customer.unread_count, 0);

        assert_eq!(repo.mark_read(conversation.id, professional.user_id).await.unwrap(), 2);
        let as_professional = repo.get_by_id(conversation.id, professional.user_id).await.unwrap().unwrap();
        assert_eq!(as_professional.unread_count, 0);

        let messages = repo.list_messages(conversation.id, 0, 10).await.unwrap();
        assert_eq!(messages[0].body, "Hello");
        assert_eq!(repo.count_messages(conversation.id).await.unwrap(), 2);
    }
}
