use helpdesk_core::error::{HelpdeskError, Result};
use helpdesk_core::types::{EmailLog, MessageStatus};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::{insert_err, parse_column, storage_err, SqliteStorage};

fn row_to_email_log(row: &SqliteRow) -> Result<EmailLog> {
    let status: String = row.try_get("status").map_err(storage_err)?;
    let direction: String = row.try_get("direction").map_err(storage_err)?;

    Ok(EmailLog {
        id: row.try_get("id").map_err(storage_err)?,
        message_id: row.try_get("message_id").map_err(storage_err)?,
        from: row.try_get("from_address").map_err(storage_err)?,
        to: row.try_get("to_address").map_err(storage_err)?,
        subject: row.try_get("subject").map_err(storage_err)?,
        body: row.try_get("body").map_err(storage_err)?,
        status: parse_column(&status, "email_logs.status")?,
        direction: parse_column(&direction, "email_logs.direction")?,
        ticket_id: row.try_get("ticket_id").map_err(storage_err)?,
        created_at: row.try_get("created_at").map_err(storage_err)?,
    })
}

impl SqliteStorage {
    pub async fn save_email_log(&self, log: &EmailLog) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO email_logs (id, message_id, from_address, to_address, subject, body,
                                    status, direction, ticket_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&log.id)
        .bind(&log.message_id)
        .bind(&log.from)
        .bind(&log.to)
        .bind(&log.subject)
        .bind(&log.body)
        .bind(log.status.to_string())
        .bind(log.direction.to_string())
        .bind(&log.ticket_id)
        .bind(log.created_at)
        .execute(self.pool())
        .await
        .map_err(insert_err("EmailLog", &log.message_id))?;

        Ok(())
    }

    /// Links the log entry to its ticket and advances its status.
    pub async fn link_email_log(&self, id: &str, ticket_id: &str, status: MessageStatus) -> Result<()> {
        let result = sqlx::query("UPDATE email_logs SET ticket_id = ?, status = ? WHERE id = ?")
            .bind(ticket_id)
            .bind(status.to_string())
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(storage_err)?;

        if result.rows_affected() == 0 {
            return Err(HelpdeskError::NotFound {
                entity: "EmailLog",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    pub async fn get_email_log_by_message_id(&self, message_id: &str) -> Result<Option<EmailLog>> {
        let row = sqlx::query("SELECT * FROM email_logs WHERE message_id = ?")
            .bind(message_id)
            .fetch_optional(self.pool())
            .await
            .map_err(storage_err)?;

        row.as_ref().map(row_to_email_log).transpose()
    }
}
