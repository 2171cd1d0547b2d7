use chrono::Utc;
use helpdesk_core::error::{HelpdeskError, Result};
use helpdesk_core::types::Customer;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::{insert_err, storage_err, SqliteStorage};

fn row_to_customer(row: &SqliteRow) -> Result<Customer> {
    Ok(Customer {
        id: row.try_get("id").map_err(storage_err)?,
        email: row.try_get("email").map_err(storage_err)?,
        name: row.try_get("name").map_err(storage_err)?,
        phone: row.try_get("phone").map_err(storage_err)?,
        created_at: row.try_get("created_at").map_err(storage_err)?,
        updated_at: row.try_get("updated_at").map_err(storage_err)?,
    })
}

impl SqliteStorage {
    pub async fn create_customer(&self, customer: &Customer) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO customers (id, email, name, phone, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&customer.id)
        .bind(&customer.email)
        .bind(&customer.name)
        .bind(&customer.phone)
        .bind(customer.created_at)
        .bind(customer.updated_at)
        .execute(self.pool())
        .await
        .map_err(insert_err("Customer", &customer.email))?;

        Ok(())
    }

    pub async fn find_customer_by_email(&self, email: &str) -> Result<Option<Customer>> {
        let row = sqlx::query("SELECT * FROM customers WHERE email = ?")
            .bind(email)
            .fetch_optional(self.pool())
            .await
            .map_err(storage_err)?;

        row.as_ref().map(row_to_customer).transpose()
    }

    pub async fn get_customer(&self, id: &str) -> Result<Customer> {
        let row = sqlx::query("SELECT * FROM customers WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(storage_err)?
            .ok_or_else(|| HelpdeskError::NotFound {
                entity: "Customer",
                id: id.to_string(),
            })?;

        row_to_customer(&row)
    }

    pub async fn update_customer_name(&self, id: &str, name: &str) -> Result<()> {
        let result = sqlx::query("UPDATE customers SET name = ?, updated_at = ? WHERE id = ?")
            .bind(name)
            .bind(Utc::now())
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(storage_err)?;

        if result.rows_affected() == 0 {
            return Err(HelpdeskError::NotFound {
                entity: "Customer",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    pub async fn count_customers(&self) -> Result<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM customers")
            .fetch_one(self.pool())
            .await
            .map_err(storage_err)
    }
}
