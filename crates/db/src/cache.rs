//! Read cache for chores and templates. UI reads come from here and never
//! touch the network; the sync service replaces the contents wholesale
//! after every confirmed remote write.

use sqlx::{FromRow, SqlitePool};

use crate::DbError;
use crate::models::chore::{ChoreInstance, ChoreTemplate};

#[derive(Debug, FromRow)]
struct PayloadRow {
    payload: String,
}

pub struct ChoreCache;

impl ChoreCache {
    /// Replace the whole cache in one transaction. Not a diff merge:
    /// instances deleted remotely must disappear from the UI.
    pub async fn replace_all(pool: &SqlitePool, chores: &[ChoreInstance]) -> Result<(), DbError> {
        let mut tx = pool.begin().await?;
        sqlx::query("DELETE FROM chore_cache").execute(&mut *tx).await?;
        for chore in chores {
            sqlx::query(
                r#"INSERT INTO chore_cache (id, template_id, cycle_id, status, due_date, assignee_ids, payload)
                   VALUES ($1, $2, $3, $4, $5, $6, $7)"#,
            )
            .bind(chore.id.to_string())
            .bind(chore.template_id.map(|id| id.to_string()))
            .bind(chore.cycle_id.as_deref())
            .bind(chore.status.to_string())
            .bind(chore.due_date.to_string())
            .bind(serde_json::to_string(&chore.assignee_ids)?)
            .bind(serde_json::to_string(chore)?)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn find_all(pool: &SqlitePool) -> Result<Vec<ChoreInstance>, DbError> {
        let rows: Vec<PayloadRow> =
            sqlx::query_as("SELECT payload FROM chore_cache ORDER BY due_date ASC, id ASC")
                .fetch_all(pool)
                .await?;
        rows.into_iter()
            .map(|row| serde_json::from_str(&row.payload).map_err(DbError::from))
            .collect()
    }

    pub async fn find_by_id(pool: &SqlitePool, id: &str) -> Result<Option<ChoreInstance>, DbError> {
        let row: Option<PayloadRow> =
            sqlx::query_as("SELECT payload FROM chore_cache WHERE id = $1")
                .bind(id)
                .fetch_optional(pool)
                .await?;
        row.map(|row| serde_json::from_str(&row.payload).map_err(DbError::from))
            .transpose()
    }

    pub async fn find_by_assignee(
        pool: &SqlitePool,
        member_id: &str,
    ) -> Result<Vec<ChoreInstance>, DbError> {
        let rows: Vec<PayloadRow> = sqlx::query_as(
            r#"SELECT c.payload
               FROM chore_cache c, json_each(c.assignee_ids) a
               WHERE a.value = $1
               ORDER BY c.due_date ASC, c.id ASC"#,
        )
        .bind(member_id)
        .fetch_all(pool)
        .await?;
        rows.into_iter()
            .map(|row| serde_json::from_str(&row.payload).map_err(DbError::from))
            .collect()
    }
}

pub struct TemplateCache;

impl TemplateCache {
    pub async fn replace_all(
        pool: &SqlitePool,
        templates: &[ChoreTemplate],
    ) -> Result<(), DbError> {
        let mut tx = pool.begin().await?;
        sqlx::query("DELETE FROM template_cache").execute(&mut *tx).await?;
        for template in templates {
            sqlx::query("INSERT INTO template_cache (id, payload) VALUES ($1, $2)")
                .bind(template.id.to_string())
                .bind(serde_json::to_string(template)?)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn find_all(pool: &SqlitePool) -> Result<Vec<ChoreTemplate>, DbError> {
        let rows: Vec<PayloadRow> = sqlx::query_as("SELECT payload FROM template_cache ORDER BY id ASC")
            .fetch_all(pool)
            .await?;
        rows.into_iter()
            .map(|row| serde_json::from_str(&row.payload).map_err(DbError::from))
            .collect()
    }

    pub async fn find_by_id(pool: &SqlitePool, id: &str) -> Result<Option<ChoreTemplate>, DbError> {
        let row: Option<PayloadRow> =
            sqlx::query_as("SELECT payload FROM template_cache WHERE id = $1")
                .bind(id)
                .fetch_optional(pool)
                .await?;
        row.map(|row| serde_json::from_str(&row.payload).map_err(DbError::from))
            .transpose()
    }
}
