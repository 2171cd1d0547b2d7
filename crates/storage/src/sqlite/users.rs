use helpdesk_core::error::Result;
use helpdesk_core::types::User;
use sqlx::Row;

use super::{insert_err, storage_err, SqliteStorage};

impl SqliteStorage {
    /// Fails with `AlreadyExists` when the email is taken.
    pub async fn create_user(&self, user: &User) -> Result<()> {
        sqlx::query(
            "INSERT INTO users (id, name, email, password_hash, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&user.id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.created_at)
        .execute(self.pool())
        .await
        .map_err(insert_err("User", &user.email))?;

        Ok(())
    }

    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(self.pool())
            .await
            .map_err(storage_err)?;

        row.map(|row| -> Result<User> {
            Ok(User {
                id: row.try_get("id").map_err(storage_err)?,
                name: row.try_get("name").map_err(storage_err)?,
                email: row.try_get("email").map_err(storage_err)?,
                password_hash: row.try_get("password_hash").map_err(storage_err)?,
                created_at: row.try_get("created_at").map_err(storage_err)?,
            })
        })
        .transpose()
    }
}
