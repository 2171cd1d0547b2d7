use chrono::Utc;
use helpdesk_core::error::{HelpdeskError, Result};
use helpdesk_core::types::KnowledgeDocument;
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::{insert_err, storage_err, SqliteStorage};

/// One page of active documents, newest first. `content` is left empty.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentPage {
    pub documents: Vec<KnowledgeDocument>,
    pub total: i64,
    pub page: i64,
    pub total_pages: i64,
}

fn row_to_document(row: &SqliteRow, with_content: bool) -> Result<KnowledgeDocument> {
    let content = if with_content {
        row.try_get("content").map_err(storage_err)?
    } else {
        String::new()
    };

    Ok(KnowledgeDocument {
        id: row.try_get("id").map_err(storage_err)?,
        title: row.try_get("title").map_err(storage_err)?,
        content,
        category: row.try_get("category").map_err(storage_err)?,
        filename: row.try_get("filename").map_err(storage_err)?,
        file_type: row.try_get("file_type").map_err(storage_err)?,
        file_size: row.try_get("file_size").map_err(storage_err)?,
        is_active: row.try_get("is_active").map_err(storage_err)?,
        chunk_count: row.try_get("chunk_count").map_err(storage_err)?,
        created_at: row.try_get("created_at").map_err(storage_err)?,
        updated_at: row.try_get("updated_at").map_err(storage_err)?,
    })
}

fn not_found(id: &str) -> HelpdeskError {
    HelpdeskError::NotFound {
        entity: "KnowledgeDocument",
        id: id.to_string(),
    }
}

impl SqliteStorage {
    pub async fn create_document(&self, doc: &KnowledgeDocument) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO knowledge_documents (id, title, content, category, filename, file_type,
                                             file_size, is_active, chunk_count, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&doc.id)
        .bind(&doc.title)
        .bind(&doc.content)
        .bind(&doc.category)
        .bind(&doc.filename)
        .bind(&doc.file_type)
        .bind(doc.file_size)
        .bind(doc.is_active)
        .bind(doc.chunk_count)
        .bind(doc.created_at)
        .bind(doc.updated_at)
        .execute(self.pool())
        .await
        .map_err(insert_err("KnowledgeDocument", &doc.id))?;

        Ok(())
    }

    pub async fn get_document(&self, id: &str) -> Result<KnowledgeDocument> {
        let row = sqlx::query("SELECT * FROM knowledge_documents WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(storage_err)?
            .ok_or_else(|| not_found(id))?;

        row_to_document(&row, true)
    }

    pub async fn set_document_chunk_count(&self, id: &str, chunks: i64) -> Result<()> {
        let result = sqlx::query(
            "UPDATE knowledge_documents SET chunk_count = ?, updated_at = ? WHERE id = ?",
        )
        .bind(chunks)
        .bind(Utc::now())
        .bind(id)
        .execute(self.pool())
        .await
        .map_err(storage_err)?;

        if result.rows_affected() == 0 {
            return Err(not_found(id));
        }
        Ok(())
    }

    pub async fn set_document_active(&self, id: &str, is_active: bool) -> Result<()> {
        let result = sqlx::query(
            "UPDATE knowledge_documents SET is_active = ?, updated_at = ? WHERE id = ?",
        )
        .bind(is_active)
        .bind(Utc::now())
        .bind(id)
        .execute(self.pool())
        .await
        .map_err(storage_err)?;

        if result.rows_affected() == 0 {
            return Err(not_found(id));
        }
        Ok(())
    }

    pub async fn delete_document(&self, id: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM knowledge_documents WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(storage_err)?;

        if result.rows_affected() == 0 {
            return Err(not_found(id));
        }
        Ok(())
    }

    /// `page` is 1-based; pages below 1 are treated as the first page.
    pub async fn list_documents(&self, page: i64, limit: i64, category: Option<&str>) -> Result<DocumentPage> {
        let page = page.max(1);
        let limit = limit.max(1);
        let offset = (page - 1) * limit;

        let rows = sqlx::query(
            r#"
            SELECT * FROM knowledge_documents
            WHERE is_active = 1 AND (?1 IS NULL OR category = ?1)
            ORDER BY created_at DESC
            LIMIT ?2 OFFSET ?3
            "#,
        )
        .bind(category)
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool())
        .await
        .map_err(storage_err)?;

        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM knowledge_documents WHERE is_active = 1 AND (?1 IS NULL OR category = ?1)",
        )
        .bind(category)
        .fetch_one(self.pool())
        .await
        .map_err(storage_err)?;

        let documents = rows
            .iter()
            .map(|row| row_to_document(row, false))
            .collect::<Result<Vec<_>>>()?;

        Ok(DocumentPage {
            documents,
            total,
            page,
            total_pages: (total + limit - 1) / limit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::test_db;
    use super::*;

    fn doc(id: &str, category: Option<&str>) -> KnowledgeDocument {
        let now = Utc::now();
        KnowledgeDocument {
            id: id.to_string(),
            title: format!("Doc {}", id),
            content: "Reset your password from the login page.".into(),
            category: category.map(str::to_string),
            filename: None,
            file_type: None,
            file_size: 40,
            is_active: true,
            chunk_count: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn listing_filters_inactive_and_category() {
        let db = test_db().await;
        db.create_document(&doc("a", Some("faq"))).await.unwrap();
        db.create_document(&doc("b", Some("faq"))).await.unwrap();
        db.create_document(&doc("c", Some("billing"))).await.unwrap();
        db.set_document_active("b", false).await.unwrap();

        let all = db.list_documents(1, 10, None).await.unwrap();
        assert_eq!(all.total, 2);
        assert_eq!(all.total_pages, 1);

        let faq = db.list_documents(1, 10, Some("faq")).await.unwrap();
        assert_eq!(faq.total, 1);
        assert_eq!(faq.documents[0].id, "a");
        assert!(faq.documents[0].content.is_empty());
    }

    #[tokio::test]
    async fn chunk_count_and_delete() {
        let db = test_db().await;
        db.create_document(&doc("a", None)).await.unwrap();
        db.set_document_chunk_count("a", 3).await.unwrap();
        assert_eq!(db.get_document("a").await.unwrap().chunk_count, Some(3));

        db.delete_document("a").await.unwrap();
        assert!(matches!(
            db.delete_document("a").await,
            Err(HelpdeskError::NotFound { .. })
        ));
    }
}
