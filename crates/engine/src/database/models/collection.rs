use chrono::{DateTime, Utc};
use common::structure::{DocumentStructure, Sort};
use sqlx::types::Json;
use sqlx::{Executor, FromRow, Sqlite};
use uuid::Uuid;

use crate::database::types::DUuid;
use crate::database::DatabaseConnection;

/// A collection row: a named home for documents plus the navigation tree
/// that orders them.
///
/// The tree lives in `document_structure` as one JSON value. `NULL` and an
/// empty array both mean "no visible documents yet"; writers always persist
/// the whole value back under the collection's lock.
#[derive(Debug, Clone, FromRow)]
pub struct Collection {
    pub id: DUuid,
    pub name: String,
    pub document_structure: Option<Json<DocumentStructure>>,
    pub sort: Json<Sort>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Collection {
    /// The navigation tree, owned. Absent means empty.
    pub fn structure(&self) -> DocumentStructure {
        self.document_structure
            .as_ref()
            .map(|json| json.0.clone())
            .unwrap_or_default()
    }

    pub fn sort(&self) -> Sort {
        self.sort.0
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Create a new collection with an empty tree.
    pub async fn create(
        conn: &mut DatabaseConnection,
        name: &str,
        sort: Sort,
    ) -> Result<Collection, sqlx::Error> {
        let id = DUuid::new();
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO collections (id, name, document_structure, sort, created_at, updated_at)
            VALUES (?1, ?2, NULL, ?3, ?4, ?5)
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(Json(sort))
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        Self::get(&mut *conn, *id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    /// Get a collection by id, deleted or not.
    pub async fn get(
        executor: impl Executor<'_, Database = Sqlite>,
        id: Uuid,
    ) -> Result<Option<Collection>, sqlx::Error> {
        sqlx::query_as::<_, Collection>(
            r#"
            SELECT id, name, document_structure, sort, created_at, updated_at, deleted_at
            FROM collections
            WHERE id = ?1
            "#,
        )
        .bind(DUuid::from(id))
        .fetch_optional(executor)
        .await
    }

    /// List live collections, oldest first.
    pub async fn list(
        executor: impl Executor<'_, Database = Sqlite>,
    ) -> Result<Vec<Collection>, sqlx::Error> {
        sqlx::query_as::<_, Collection>(
            r#"
            SELECT id, name, document_structure, sort, created_at, updated_at, deleted_at
            FROM collections
            WHERE deleted_at IS NULL
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(executor)
        .await
    }

    /// Persist the whole navigation tree for `id`.
    pub async fn save_structure(
        conn: &mut DatabaseConnection,
        id: Uuid,
        structure: &DocumentStructure,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE collections
            SET document_structure = ?1, updated_at = ?2
            WHERE id = ?3
            "#,
        )
        .bind(Json(structure))
        .bind(Utc::now())
        .bind(DUuid::from(id))
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Soft-delete the collection and drop its tree.
    pub async fn set_deleted(
        conn: &mut DatabaseConnection,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE collections
            SET deleted_at = ?1, document_structure = NULL, updated_at = ?1
            WHERE id = ?2 AND deleted_at IS NULL
            "#,
        )
        .bind(at)
        .bind(DUuid::from(id))
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
