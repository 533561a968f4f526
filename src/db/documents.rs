//! `document` table access
//!
//! Plain queries only; sequencing with payload writes lives in the document store.
use crate::error::{DocError, DocResult};
use sqlx::sqlite::SqliteRow;
use sqlx::{Executor, Row, Sqlite};

/// Columns returned by metadata queries. `local_contents` is left out so
/// listings never pull payloads.
const METADATA_COLUMNS: &str = "id, name, mime_type, backend_id, created_at, updated_at";

/// Document row as stored in the database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRow {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    pub backend_id: String,
    /// Only populated by queries that ask for contents
    pub local_contents: Option<Vec<u8>>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl DocumentRow {
    fn from_row(row: &SqliteRow, with_contents: bool) -> DocResult<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            mime_type: row.try_get("mime_type")?,
            backend_id: row.try_get("backend_id")?,
            local_contents: if with_contents {
                row.try_get("local_contents")?
            } else {
                None
            },
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Values for a fresh row
#[derive(Debug)]
pub struct NewDocument<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub mime_type: &'a str,
    pub backend_id: &'a str,
    pub local_contents: Option<&'a [u8]>,
    pub timestamp: i64,
}

/// What an update does to the inline payload column
#[derive(Debug, Clone, Copy)]
pub enum InlineContents<'a> {
    Keep,
    Set(&'a [u8]),
    Clear,
}

/// Values for an existing row
#[derive(Debug)]
pub struct DocumentUpdate<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub mime_type: &'a str,
    pub backend_id: &'a str,
    pub contents: InlineContents<'a>,
    pub updated_at: i64,
}

/// Check whether a row with this id exists
pub async fn id_exists<'e, E>(executor: E, id: &str) -> DocResult<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM document WHERE id = ?1")
        .bind(id)
        .fetch_one(executor)
        .await?;
    Ok(count > 0)
}

/// Insert a new row
pub async fn insert<'e, E>(executor: E, doc: &NewDocument<'_>) -> DocResult<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO document (id, name, mime_type, backend_id, local_contents, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
        "#,
    )
    .bind(doc.id)
    .bind(doc.name)
    .bind(doc.mime_type)
    .bind(doc.backend_id)
    .bind(doc.local_contents)
    .bind(doc.timestamp)
    .execute(executor)
    .await?;

    Ok(())
}

/// Update an existing row, returning the number of rows touched
pub async fn update<'e, E>(executor: E, update: &DocumentUpdate<'_>) -> DocResult<u64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let query = match update.contents {
        InlineContents::Keep => sqlx::query(
            r#"
            UPDATE document
            SET name = ?1, mime_type = ?2, backend_id = ?3, updated_at = ?4
            WHERE id = ?5
            "#,
        ),
        InlineContents::Set(_) => sqlx::query(
            r#"
            UPDATE document
            SET name = ?1, mime_type = ?2, backend_id = ?3, updated_at = ?4, local_contents = ?6
            WHERE id = ?5
            "#,
        ),
        InlineContents::Clear => sqlx::query(
            r#"
            UPDATE document
            SET name = ?1, mime_type = ?2, backend_id = ?3, updated_at = ?4, local_contents = NULL
            WHERE id = ?5
            "#,
        ),
    };

    let query = query
        .bind(update.name)
        .bind(update.mime_type)
        .bind(update.backend_id)
        .bind(update.updated_at)
        .bind(update.id);
    let query = match update.contents {
        InlineContents::Set(bytes) => query.bind(bytes),
        _ => query,
    };

    let result = query.execute(executor).await?;
    Ok(result.rows_affected())
}

/// Delete a row, returning the number of rows removed
pub async fn delete<'e, E>(executor: E, id: &str) -> DocResult<u64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query("DELETE FROM document WHERE id = ?1")
        .bind(id)
        .execute(executor)
        .await?;
    Ok(result.rows_affected())
}

/// Find a row by id, optionally including the inline payload column
pub async fn find<'e, E>(executor: E, id: &str, with_contents: bool) -> DocResult<Option<DocumentRow>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = if with_contents {
        format!("SELECT {}, local_contents FROM document WHERE id = ?1", METADATA_COLUMNS)
    } else {
        format!("SELECT {} FROM document WHERE id = ?1", METADATA_COLUMNS)
    };

    let row = sqlx::query(&sql).bind(id).fetch_optional(executor).await?;
    row.map(|row| DocumentRow::from_row(&row, with_contents))
        .transpose()
}

/// Load only the inline payload column. `Ok(None)` when the column is NULL.
pub async fn fetch_inline_contents<'e, E>(executor: E, id: &str) -> DocResult<Option<Vec<u8>>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query("SELECT local_contents FROM document WHERE id = ?1")
        .bind(id)
        .fetch_optional(executor)
        .await?
        .ok_or_else(|| DocError::NotFound(format!("Document not found: {}", id)))?;

    Ok(row.try_get("local_contents")?)
}

/// `updated_at` for a row, if it exists
pub async fn updated_at<'e, E>(executor: E, id: &str) -> DocResult<Option<i64>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let value: Option<i64> = sqlx::query_scalar("SELECT updated_at FROM document WHERE id = ?1")
        .bind(id)
        .fetch_optional(executor)
        .await?;
    Ok(value)
}

/// List metadata rows, oldest first, optionally restricted to one backend
pub async fn list<'e, E>(
    executor: E,
    backend_id: Option<&str>,
    limit: i64,
    offset: i64,
) -> DocResult<Vec<DocumentRow>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = match backend_id {
        Some(backend_id) => {
            let sql = format!(
                "SELECT {} FROM document WHERE backend_id = ?1 ORDER BY created_at ASC, id ASC LIMIT ?2 OFFSET ?3",
                METADATA_COLUMNS
            );
            sqlx::query(&sql)
                .bind(backend_id)
                .bind(limit)
                .bind(offset)
                .fetch_all(executor)
                .await?
        }
        None => {
            let sql = format!(
                "SELECT {} FROM document ORDER BY created_at ASC, id ASC LIMIT ?1 OFFSET ?2",
                METADATA_COLUMNS
            );
            sqlx::query(&sql)
                .bind(limit)
                .bind(offset)
                .fetch_all(executor)
                .await?
        }
    };

    rows.iter().map(|row| DocumentRow::from_row(row, false)).collect()
}

/// Number of documents per backend id
pub async fn count_by_backend<'e, E>(executor: E) -> DocResult<Vec<(String, i64)>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query(
        "SELECT backend_id, COUNT(*) AS documents FROM document GROUP BY backend_id ORDER BY backend_id",
    )
    .fetch_all(executor)
    .await?;

    let mut counts = Vec::with_capacity(rows.len());
    for row in rows {
        counts.push((row.try_get("backend_id")?, row.try_get("documents")?));
    }
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_memory_pool, run_migrations};
    use sqlx::SqlitePool;

    async fn test_pool() -> SqlitePool {
        let pool = create_memory_pool().await.unwrap();
        run_migrations(&pool).await.unwrap();
        pool
    }

    fn new_doc<'a>(id: &'a str, backend_id: &'a str, contents: Option<&'a [u8]>) -> NewDocument<'a> {
        NewDocument {
            id,
            name: "report.pdf",
            mime_type: "application/pdf",
            backend_id,
            local_contents: contents,
            timestamp: 1_700_000_000,
        }
    }

    #[tokio::test]
    async fn test_metadata_query_excludes_contents() {
        let pool = test_pool().await;
        insert(&pool, &new_doc("a", "local-sql", Some(b"pdf bytes".as_slice()))).await.unwrap();

        let row = find(&pool, "a", false).await.unwrap().unwrap();
        assert_eq!(row.local_contents, None);
        assert_eq!(row.created_at, row.updated_at);

        let full = find(&pool, "a", true).await.unwrap().unwrap();
        assert_eq!(full.local_contents, Some(b"pdf bytes".to_vec()));
    }

    #[tokio::test]
    async fn test_update_clears_inline_contents() {
        let pool = test_pool().await;
        insert(&pool, &new_doc("a", "local-sql", Some(b"pdf bytes".as_slice()))).await.unwrap();

        let touched = update(
            &pool,
            &DocumentUpdate {
                id: "a",
                name: "report.pdf",
                mime_type: "application/pdf",
                backend_id: "archive",
                contents: InlineContents::Clear,
                updated_at: 1_700_000_100,
            },
        )
        .await
        .unwrap();
        assert_eq!(touched, 1);

        assert_eq!(fetch_inline_contents(&pool, "a").await.unwrap(), None);
        assert_eq!(updated_at(&pool, "a").await.unwrap(), Some(1_700_000_100));
    }

    #[tokio::test]
    async fn test_update_keep_preserves_contents() {
        let pool = test_pool().await;
        insert(&pool, &new_doc("a", "local-sql", Some(b"v1".as_slice()))).await.unwrap();

        update(
            &pool,
            &DocumentUpdate {
                id: "a",
                name: "renamed.pdf",
                mime_type: "application/pdf",
                backend_id: "local-sql",
                contents: InlineContents::Keep,
                updated_at: 1_700_000_100,
            },
        )
        .await
        .unwrap();

        let row = find(&pool, "a", true).await.unwrap().unwrap();
        assert_eq!(row.name, "renamed.pdf");
        assert_eq!(row.local_contents, Some(b"v1".to_vec()));
    }

    #[tokio::test]
    async fn test_fetch_inline_contents_missing_row() {
        let pool = test_pool().await;
        let err = fetch_inline_contents(&pool, "ghost").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_list_and_counts() {
        let pool = test_pool().await;
        insert(&pool, &new_doc("a", "local-sql", Some(b"1".as_slice()))).await.unwrap();
        insert(&pool, &new_doc("b", "archive", None)).await.unwrap();
        insert(&pool, &new_doc("c", "archive", None)).await.unwrap();

        let archived = list(&pool, Some("archive"), 10, 0).await.unwrap();
        assert_eq!(archived.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(), vec!["b", "c"]);

        let page = list(&pool, None, 1, 1).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id, "b");

        let counts = count_by_backend(&pool).await.unwrap();
        assert_eq!(
            counts,
            vec![("archive".to_string(), 2), ("local-sql".to_string(), 1)]
        );

        assert!(id_exists(&pool, "a").await.unwrap());
        assert_eq!(delete(&pool, "a").await.unwrap(), 1);
        assert!(!id_exists(&pool, "a").await.unwrap());
        assert_eq!(delete(&pool, "a").await.unwrap(), 0);
    }
}
