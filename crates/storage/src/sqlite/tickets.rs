use chrono::{DateTime, Utc};
use helpdesk_core::error::{HelpdeskError, Result};
use helpdesk_core::types::{Ticket, TicketStatus};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::{insert_err, parse_column, storage_err, SqliteStorage};

fn row_to_ticket(row: &SqliteRow) -> Result<Ticket> {
    let status: String = row.try_get("status").map_err(storage_err)?;
    let priority: String = row.try_get("priority").map_err(storage_err)?;
    let source: String = row.try_get("source").map_err(storage_err)?;

    Ok(Ticket {
        id: row.try_get("id").map_err(storage_err)?,
        customer_id: row.try_get("customer_id").map_err(storage_err)?,
        subject: row.try_get("subject").map_err(storage_err)?,
        description: row.try_get("description").map_err(storage_err)?,
        status: parse_column(&status, "tickets.status")?,
        priority: parse_column(&priority, "tickets.priority")?,
        source: parse_column(&source, "tickets.source")?,
        created_at: row.try_get("created_at").map_err(storage_err)?,
        updated_at: row.try_get("updated_at").map_err(storage_err)?,
        last_response_at: row.try_get("last_response_at").map_err(storage_err)?,
    })
}

impl SqliteStorage {
    pub async fn create_ticket(&self, ticket: &Ticket) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO tickets (id, customer_id, subject, description, status, priority, source,
                                 created_at, updated_at, last_response_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&ticket.id)
        .bind(&ticket.customer_id)
        .bind(&ticket.subject)
        .bind(&ticket.description)
        .bind(ticket.status.to_string())
        .bind(ticket.priority.to_string())
        .bind(ticket.source.to_string())
        .bind(ticket.created_at)
        .bind(ticket.updated_at)
        .bind(ticket.last_response_at)
        .execute(self.pool())
        .await
        .map_err(insert_err("Ticket", &ticket.id))?;

        Ok(())
    }

    pub async fn get_ticket(&self, id: &str) -> Result<Ticket> {
        let row = sqlx::query("SELECT * FROM tickets WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(storage_err)?
            .ok_or_else(|| HelpdeskError::NotFound {
                entity: "Ticket",
                id: id.to_string(),
            })?;

        row_to_ticket(&row)
    }

    /// The customer's most recently updated tickets that are not CLOSED.
    pub async fn recent_unclosed_tickets(&self, customer_id: &str, limit: i64) -> Result<Vec<Ticket>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM tickets
            WHERE customer_id = ? AND status != ?
            ORDER BY updated_at DESC
            LIMIT ?
            "#,
        )
        .bind(customer_id)
        .bind(TicketStatus::Closed.to_string())
        .bind(limit)
        .fetch_all(self.pool())
        .await
        .map_err(storage_err)?;

        rows.iter().map(row_to_ticket).collect()
    }

    /// Refreshes `updated_at` and moves a RESOLVED ticket back to OPEN.
    pub async fn touch_ticket(&self, id: &str) -> Result<Ticket> {
        let result = sqlx::query(
            r#"
            UPDATE tickets
            SET updated_at = ?,
                status = CASE WHEN status = ? THEN ? ELSE status END
            WHERE id = ?
            "#,
        )
        .bind(Utc::now())
        .bind(TicketStatus::Resolved.to_string())
        .bind(TicketStatus::Open.to_string())
        .bind(id)
        .execute(self.pool())
        .await
        .map_err(storage_err)?;

        if result.rows_affected() == 0 {
            return Err(HelpdeskError::NotFound {
                entity: "Ticket",
                id: id.to_string(),
            });
        }

        self.get_ticket(id).await
    }

    pub async fn update_ticket_status(&self, id: &str, status: TicketStatus) -> Result<()> {
        let result = sqlx::query("UPDATE tickets SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.to_string())
            .bind(Utc::now())
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(storage_err)?;

        if result.rows_affected() == 0 {
            return Err(HelpdeskError::NotFound {
                entity: "Ticket",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    /// Marks the ticket IN_PROGRESS and stamps the time of the reply.
    pub async fn mark_ticket_responded(&self, id: &str, at: DateTime<Utc>) -> Result<()> {
        let result = sqlx::query(
            "UPDATE tickets SET status = ?, last_response_at = ?, updated_at = ? WHERE id = ?",
        )
        .bind(TicketStatus::InProgress.to_string())
        .bind(at)
        .bind(at)
        .bind(id)
        .execute(self.pool())
        .await
        .map_err(storage_err)?;

        if result.rows_affected() == 0 {
            return Err(HelpdeskError::NotFound {
                entity: "Ticket",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    pub async fn count_tickets(&self) -> Result<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM tickets")
            .fetch_one(self.pool())
            .await
            .map_err(storage_err)
    }
}
