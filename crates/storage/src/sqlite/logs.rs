use chrono::Utc;
use helpdesk_core::error::{HelpdeskError, Result};
use helpdesk_core::types::{LogLevel, SystemLog};
use sqlx::Row;

use super::{parse_column, storage_err, SqliteStorage};

impl SqliteStorage {
    /// Appends a diagnostic record to `system_logs`.
    pub async fn save_log(
        &self,
        level: LogLevel,
        source: &str,
        message: &str,
        metadata: Option<&serde_json::Value>,
    ) -> Result<()> {
        let metadata = metadata
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| HelpdeskError::Internal(e.to_string()))?;

        sqlx::query(
            "INSERT INTO system_logs (level, source, message, metadata, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(level.to_string())
        .bind(source)
        .bind(message)
        .bind(metadata)
        .bind(Utc::now())
        .execute(self.pool())
        .await
        .map_err(storage_err)?;

        Ok(())
    }

    pub async fn get_logs(&self, limit: i64) -> Result<Vec<SystemLog>> {
        let rows = sqlx::query("SELECT * FROM system_logs ORDER BY id DESC LIMIT ?")
            .bind(limit)
            .fetch_all(self.pool())
            .await
            .map_err(storage_err)?;

        rows.iter()
            .map(|row| -> Result<SystemLog> {
                let level: String = row.try_get("level").map_err(storage_err)?;
                let metadata: Option<String> = row.try_get("metadata").map_err(storage_err)?;
                Ok(SystemLog {
                    id: row.try_get("id").map_err(storage_err)?,
                    level: parse_column(&level, "system_logs.level")?,
                    source: row.try_get("source").map_err(storage_err)?,
                    message: row.try_get("message").map_err(storage_err)?,
                    metadata: metadata.and_then(|m| serde_json::from_str(&m).ok()),
                    created_at: row.try_get("created_at").map_err(storage_err)?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::test_db;
    use super::*;

    #[tokio::test]
    async fn logs_come_back_newest_first() {
        let db = test_db().await;
        db.save_log(LogLevel::Info, "TEST", "first", None).await.unwrap();
        let meta = serde_json::json!({ "attempt": 2 });
        db.save_log(LogLevel::Error, "EMAIL_PROCESSING", "second", Some(&meta))
            .await
            .unwrap();

        let logs = db.get_logs(10).await.unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].message, "second");
        assert_eq!(logs[0].level, LogLevel::Error);
        assert_eq!(logs[0].metadata, Some(meta));
    }
}
