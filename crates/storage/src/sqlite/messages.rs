use helpdesk_core::error::{HelpdeskError, Result};
use helpdesk_core::types::{MessageMetadata, MessageStatus, TicketMessage};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::{parse_column, storage_err, SqliteStorage};

fn row_to_message(row: &SqliteRow) -> Result<TicketMessage> {
    let sender_type: String = row.try_get("sender_type").map_err(storage_err)?;
    let message_type: String = row.try_get("message_type").map_err(storage_err)?;
    let status: String = row.try_get("status").map_err(storage_err)?;
    let metadata: String = row.try_get("metadata").map_err(storage_err)?;

    Ok(TicketMessage {
        id: row.try_get("id").map_err(storage_err)?,
        ticket_id: row.try_get("ticket_id").map_err(storage_err)?,
        sender_id: row.try_get("sender_id").map_err(storage_err)?,
        sender_type: parse_column(&sender_type, "ticket_messages.sender_type")?,
        content: row.try_get("content").map_err(storage_err)?,
        message_type: parse_column(&message_type, "ticket_messages.message_type")?,
        status: parse_column(&status, "ticket_messages.status")?,
        metadata: serde_json::from_str(&metadata)
            .map_err(|e| HelpdeskError::Storage(format!("Invalid message metadata: {}", e)))?,
        created_at: row.try_get("created_at").map_err(storage_err)?,
    })
}

impl SqliteStorage {
    /// Inserts a message; customer messages carrying an inbound message id
    /// are inserted at most once per ticket and the stored row is returned.
    pub async fn save_message(&self, message: &TicketMessage) -> Result<TicketMessage> {
        let metadata = serde_json::to_string(&message.metadata)
            .map_err(|e| HelpdeskError::Internal(e.to_string()))?;
        let inbound_id = if message.is_from_customer() {
            message.metadata.message_id.as_deref()
        } else {
            None
        };

        sqlx::query(
            r#"
            INSERT INTO ticket_messages (id, ticket_id, sender_id, sender_type, content, message_type,
                                         status, metadata, inbound_message_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(ticket_id, inbound_message_id) DO NOTHING
            "#,
        )
        .bind(&message.id)
        .bind(&message.ticket_id)
        .bind(&message.sender_id)
        .bind(message.sender_type.to_string())
        .bind(&message.content)
        .bind(message.message_type.to_string())
        .bind(message.status.to_string())
        .bind(metadata)
        .bind(inbound_id)
        .bind(message.created_at)
        .execute(self.pool())
        .await
        .map_err(storage_err)?;

        match inbound_id {
            Some(inbound_id) => self
                .find_inbound_message(&message.ticket_id, inbound_id)
                .await?
                .ok_or_else(|| HelpdeskError::NotFound {
                    entity: "TicketMessage",
                    id: inbound_id.to_string(),
                }),
            None => Ok(message.clone()),
        }
    }

    pub async fn find_inbound_message(&self, ticket_id: &str, inbound_id: &str) -> Result<Option<TicketMessage>> {
        let row = sqlx::query(
            "SELECT * FROM ticket_messages WHERE ticket_id = ? AND inbound_message_id = ?",
        )
        .bind(ticket_id)
        .bind(inbound_id)
        .fetch_optional(self.pool())
        .await
        .map_err(storage_err)?;

        row.as_ref().map(row_to_message).transpose()
    }

    pub async fn get_message(&self, id: &str) -> Result<TicketMessage> {
        let row = sqlx::query("SELECT * FROM ticket_messages WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(storage_err)?
            .ok_or_else(|| HelpdeskError::NotFound {
                entity: "TicketMessage",
                id: id.to_string(),
            })?;

        row_to_message(&row)
    }

    pub async fn list_ticket_messages(&self, ticket_id: &str) -> Result<Vec<TicketMessage>> {
        let rows = sqlx::query(
            "SELECT * FROM ticket_messages WHERE ticket_id = ? ORDER BY created_at, rowid",
        )
        .bind(ticket_id)
        .fetch_all(self.pool())
        .await
        .map_err(storage_err)?;

        rows.iter().map(row_to_message).collect()
    }

    pub async fn update_message_status(
        &self,
        id: &str,
        status: MessageStatus,
        metadata: Option<&MessageMetadata>,
    ) -> Result<()> {
        let result = match metadata {
            Some(metadata) => {
                let metadata = serde_json::to_string(metadata)
                    .map_err(|e| HelpdeskError::Internal(e.to_string()))?;
                sqlx::query("UPDATE ticket_messages SET status = ?, metadata = ? WHERE id = ?")
                    .bind(status.to_string())
                    .bind(metadata)
                    .bind(id)
                    .execute(self.pool())
                    .await
            }
            None => {
                sqlx::query("UPDATE ticket_messages SET status = ? WHERE id = ?")
                    .bind(status.to_string())
                    .bind(id)
                    .execute(self.pool())
                    .await
            }
        }
        .map_err(storage_err)?;

        if result.rows_affected() == 0 {
            return Err(HelpdeskError::NotFound {
                entity: "TicketMessage",
                id: id.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::test_db;
    use super::*;
    use helpdesk_core::types::{Customer, SenderType, Ticket};

    #[tokio::test]
    async fn inbound_message_id_is_recorded_once() {
        let db = test_db().await;
        let customer = Customer::new("jane@x.com", "Jane");
        db.create_customer(&customer).await.unwrap();
        let ticket = Ticket::new(&customer.id, "Login", "x");
        db.create_ticket(&ticket).await.unwrap();

        let mut first = TicketMessage::from_customer(&ticket.id, &customer.id, "hello");
        first.metadata.message_id = Some("inbound_1".into());
        let stored = db.save_message(&first).await.unwrap();
        assert_eq!(stored.id, first.id);

        let mut again = TicketMessage::from_customer(&ticket.id, &customer.id, "hello");
        again.metadata.message_id = Some("inbound_1".into());
        let stored_again = db.save_message(&again).await.unwrap();
        assert_eq!(stored_again.id, first.id);

        assert_eq!(db.list_ticket_messages(&ticket.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn draft_can_be_marked_sent_with_metadata() {
        let db = test_db().await;
        let customer = Customer::new("jane@x.com", "Jane");
        db.create_customer(&customer).await.unwrap();
        let ticket = Ticket::new(&customer.id, "Login", "x");
        db.create_ticket(&ticket).await.unwrap();

        let draft = TicketMessage::system_draft(&ticket.id, "Try resetting");
        db.save_message(&draft).await.unwrap();

        let metadata = MessageMetadata {
            generated_by_ai: true,
            provider_message_id: Some("sg-1".into()),
            ..Default::default()
        };
        db.update_message_status(&draft.id, MessageStatus::Sent, Some(&metadata))
            .await
            .unwrap();

        let fetched = db.get_message(&draft.id).await.unwrap();
        assert_eq!(fetched.status, MessageStatus::Sent);
        assert_eq!(fetched.sender_type, SenderType::System);
        assert_eq!(fetched.metadata.provider_message_id.as_deref(), Some("sg-1"));
    }
}
