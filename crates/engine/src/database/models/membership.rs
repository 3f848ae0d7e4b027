use chrono::{DateTime, Utc};
use common::grant::{Permission, Principal};
use sqlx::{Executor, FromRow, Sqlite};
use uuid::Uuid;

use crate::database::types::{DPermission, DPrincipalKind, DUuid};
use crate::database::DatabaseConnection;

/// An access grant. Exactly one of `collection_id` / `document_id` is set.
///
/// A row with `source_id = NULL` on a document is a *root* membership: the
/// grant a client actually created. Rows carrying a `source_id` are
/// *sourced*: derived copies placed on the root document's descendants by
/// propagation, rewritten wholesale whenever their root changes and never
/// edited directly. Collection-level grants have no sourced copies at all.
#[derive(Debug, Clone, FromRow)]
pub struct Membership {
    pub id: DUuid,
    pub principal_kind: DPrincipalKind,
    pub principal_id: DUuid,
    pub permission: DPermission,
    pub collection_id: Option<DUuid>,
    pub document_id: Option<DUuid>,
    pub source_id: Option<DUuid>,
    pub created_by_id: DUuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const MEMBERSHIP_COLUMNS: &str = r#"
    id, principal_kind, principal_id, permission, collection_id, document_id,
    source_id, created_by_id, created_at, updated_at
"#;

impl Membership {
    pub fn principal(&self) -> Principal {
        Principal {
            kind: self.principal_kind.into(),
            id: *self.principal_id,
        }
    }

    /// Whether this is a client-created grant on a document.
    pub fn is_root(&self) -> bool {
        self.source_id.is_none() && self.document_id.is_some()
    }

    /// Whether this row was derived from a root grant by propagation.
    pub fn is_sourced(&self) -> bool {
        self.source_id.is_some()
    }

    /// The root membership this row mirrors: itself when it already is one.
    pub fn root_id(&self) -> Uuid {
        self.source_id.map(|id| *id).unwrap_or(*self.id)
    }

    /// Create a collection-level grant. These never cascade.
    pub async fn create_on_collection(
        conn: &mut DatabaseConnection,
        collection_id: Uuid,
        principal: Principal,
        permission: Permission,
        created_by_id: Uuid,
    ) -> Result<Membership, sqlx::Error> {
        let id = DUuid::new();
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO memberships (
                id, principal_kind, principal_id, permission, collection_id,
                created_by_id, created_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(id)
        .bind(DPrincipalKind::from(principal.kind))
        .bind(DUuid::from(principal.id))
        .bind(DPermission::from(permission))
        .bind(DUuid::from(collection_id))
        .bind(DUuid::from(created_by_id))
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        Self::get(&mut *conn, *id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    /// Create a root grant on a document. Cascading it over the document's
    /// visible descendants is the propagation layer's job.
    pub async fn create_on_document(
        conn: &mut DatabaseConnection,
        document_id: Uuid,
        principal: Principal,
        permission: Permission,
        created_by_id: Uuid,
    ) -> Result<Membership, sqlx::Error> {
        let id = DUuid::new();
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO memberships (
                id, principal_kind, principal_id, permission, document_id,
                created_by_id, created_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(id)
        .bind(DPrincipalKind::from(principal.kind))
        .bind(DUuid::from(principal.id))
        .bind(DPermission::from(permission))
        .bind(DUuid::from(document_id))
        .bind(DUuid::from(created_by_id))
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        Self::get(&mut *conn, *id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    /// Place a derived copy of `source` on `document_id`. The copy points
    /// at the ultimate root (a sourced `source` still yields its root) and
    /// keeps the source's principal, permission, author and timestamps;
    /// derived rows deliberately do not get fresh clocks.
    pub async fn create_sourced(
        conn: &mut DatabaseConnection,
        document_id: Uuid,
        source: &Membership,
    ) -> Result<Membership, sqlx::Error> {
        let id = DUuid::new();

        sqlx::query(
            r#"
            INSERT INTO memberships (
                id, principal_kind, principal_id, permission, document_id,
                source_id, created_by_id, created_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(id)
        .bind(source.principal_kind)
        .bind(source.principal_id)
        .bind(source.permission)
        .bind(DUuid::from(document_id))
        .bind(DUuid::from(source.root_id()))
        .bind(source.created_by_id)
        .bind(source.created_at)
        .bind(source.updated_at)
        .execute(&mut *conn)
        .await?;

        Self::get(&mut *conn, *id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    pub async fn get(
        executor: impl Executor<'_, Database = Sqlite>,
        id: Uuid,
    ) -> Result<Option<Membership>, sqlx::Error> {
        let query = format!("SELECT {MEMBERSHIP_COLUMNS} FROM memberships WHERE id = ?1");
        sqlx::query_as::<_, Membership>(&query)
            .bind(DUuid::from(id))
            .fetch_optional(executor)
            .await
    }

    /// Every grant attached to a document, roots and sourced copies alike.
    pub async fn for_document(
        executor: impl Executor<'_, Database = Sqlite>,
        document_id: Uuid,
    ) -> Result<Vec<Membership>, sqlx::Error> {
        let query = format!(
            r#"
            SELECT {MEMBERSHIP_COLUMNS} FROM memberships
            WHERE document_id = ?1
            ORDER BY created_at ASC
            "#
        );
        sqlx::query_as::<_, Membership>(&query)
            .bind(DUuid::from(document_id))
            .fetch_all(executor)
            .await
    }

    /// Grants attached to a document for one principal.
    pub async fn for_document_and_principal(
        executor: impl Executor<'_, Database = Sqlite>,
        document_id: Uuid,
        principal: Principal,
    ) -> Result<Vec<Membership>, sqlx::Error> {
        let query = format!(
            r#"
            SELECT {MEMBERSHIP_COLUMNS} FROM memberships
            WHERE document_id = ?1 AND principal_kind = ?2 AND principal_id = ?3
            ORDER BY created_at ASC
            "#
        );
        sqlx::query_as::<_, Membership>(&query)
            .bind(DUuid::from(document_id))
            .bind(DPrincipalKind::from(principal.kind))
            .bind(DUuid::from(principal.id))
            .fetch_all(executor)
            .await
    }

    /// Grants attached directly to a collection.
    pub async fn for_collection(
        executor: impl Executor<'_, Database = Sqlite>,
        collection_id: Uuid,
    ) -> Result<Vec<Membership>, sqlx::Error> {
        let query = format!(
            r#"
            SELECT {MEMBERSHIP_COLUMNS} FROM memberships
            WHERE collection_id = ?1
            ORDER BY created_at ASC
            "#
        );
        sqlx::query_as::<_, Membership>(&query)
            .bind(DUuid::from(collection_id))
            .fetch_all(executor)
            .await
    }

    pub async fn update_permission(
        conn: &mut DatabaseConnection,
        id: Uuid,
        permission: Permission,
    ) -> Result<Option<Membership>, sqlx::Error> {
        sqlx::query("UPDATE memberships SET permission = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(DPermission::from(permission))
            .bind(Utc::now())
            .bind(DUuid::from(id))
            .execute(&mut *conn)
            .await?;

        Self::get(&mut *conn, id).await
    }

    /// Delete a root grant together with every row derived from it.
    pub async fn delete_with_sourced(
        conn: &mut DatabaseConnection,
        id: Uuid,
    ) -> Result<u64, sqlx::Error> {
        let id = DUuid::from(id);
        let result = sqlx::query("DELETE FROM memberships WHERE id = ?1 OR source_id = ?1")
            .bind(id)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected())
    }

    /// Tear down every sourced copy of a root, leaving the root in place.
    pub async fn delete_sourced_from(
        conn: &mut DatabaseConnection,
        root_id: Uuid,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM memberships WHERE source_id = ?1")
            .bind(DUuid::from(root_id))
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected())
    }

    /// Remove every grant attached to a document, plus any rows elsewhere
    /// that were derived from roots living on it. Used when the document
    /// row itself is destroyed.
    pub async fn delete_for_document(
        conn: &mut DatabaseConnection,
        document_id: Uuid,
    ) -> Result<u64, sqlx::Error> {
        let document_id = DUuid::from(document_id);
        let result = sqlx::query(
            r#"
            DELETE FROM memberships
            WHERE document_id = ?1
               OR source_id IN (SELECT id FROM memberships WHERE document_id = ?1)
            "#,
        )
        .bind(document_id)
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::database::Database;
    use common::grant::PrincipalKind;

    #[tokio::test]
    async fn test_root_and_sourced_shapes() {
        let db = Database::memory().await.unwrap();
        let mut conn = db.acquire().await.unwrap();
        let actor = Uuid::new_v4();
        let doc = Uuid::new_v4();
        let child_doc = Uuid::new_v4();

        let root = Membership::create_on_document(
            &mut conn,
            doc,
            Principal::group(Uuid::new_v4()),
            Permission::ReadWrite,
            actor,
        )
        .await
        .unwrap();
        assert!(root.is_root());
        assert!(!root.is_sourced());
        assert_eq!(root.root_id(), *root.id);
        assert_eq!(PrincipalKind::from(root.principal_kind), PrincipalKind::Group);

        let sourced = Membership::create_sourced(&mut conn, child_doc, &root)
            .await
            .unwrap();
        assert!(sourced.is_sourced());
        assert!(!sourced.is_root());
        assert_eq!(sourced.root_id(), *root.id);
        assert_eq!(sourced.principal(), root.principal());
        assert_eq!(*sourced.permission, *root.permission);
        // derived rows keep the root's clocks
        assert_eq!(sourced.created_at, root.created_at);

        // deriving from a sourced row still points at the ultimate root
        let deeper = Membership::create_sourced(&mut conn, Uuid::new_v4(), &sourced)
            .await
            .unwrap();
        assert_eq!(deeper.root_id(), *root.id);
    }

    #[tokio::test]
    async fn test_delete_with_sourced() {
        let db = Database::memory().await.unwrap();
        let mut conn = db.acquire().await.unwrap();
        let doc = Uuid::new_v4();

        let root = Membership::create_on_document(
            &mut conn,
            doc,
            Principal::user(Uuid::new_v4()),
            Permission::Read,
            Uuid::new_v4(),
        )
        .await
        .unwrap();
        for _ in 0..3 {
            Membership::create_sourced(&mut conn, Uuid::new_v4(), &root)
                .await
                .unwrap();
        }

        let removed = Membership::delete_with_sourced(&mut conn, *root.id)
            .await
            .unwrap();
        assert_eq!(removed, 4);
        assert!(Membership::get(&mut *conn, *root.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_for_document_takes_derived_rows() {
        let db = Database::memory().await.unwrap();
        let mut conn = db.acquire().await.unwrap();
        let doc = Uuid::new_v4();
        let descendant = Uuid::new_v4();

        let root = Membership::create_on_document(
            &mut conn,
            doc,
            Principal::user(Uuid::new_v4()),
            Permission::ReadWrite,
            Uuid::new_v4(),
        )
        .await
        .unwrap();
        let derived = Membership::create_sourced(&mut conn, descendant, &root)
            .await
            .unwrap();

        let removed = Membership::delete_for_document(&mut conn, doc).await.unwrap();
        assert_eq!(removed, 2);
        assert!(Membership::get(&mut *conn, *derived.id).await.unwrap().is_none());
        assert!(Membership::for_document(&mut *conn, descendant)
            .await
            .unwrap()
            .is_empty());
    }
}
