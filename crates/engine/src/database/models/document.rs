use std::collections::HashMap;

use chrono::{DateTime, Utc};
use common::structure::NavigationNode;
use sqlx::{Executor, FromRow, Sqlite};
use uuid::Uuid;

use crate::database::types::DUuid;
use crate::database::DatabaseConnection;

/// A document row. Content lives elsewhere; this subsystem only cares about
/// placement (collection + parent) and the lifecycle fields that decide
/// whether the document appears in its collection's navigation tree.
///
/// A document is *visible* when it is published, not a template, not
/// archived and not deleted. Only visible documents get navigation nodes.
#[derive(Debug, Clone, FromRow)]
pub struct Document {
    pub id: DUuid,
    pub collection_id: DUuid,
    pub parent_document_id: Option<DUuid>,
    pub title: String,
    pub url: String,
    pub template: bool,
    pub published_at: Option<DateTime<Utc>>,
    pub archived_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_by_id: DUuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const DOCUMENT_COLUMNS: &str = r#"
    id, collection_id, parent_document_id, title, url, template,
    published_at, archived_at, deleted_at, created_by_id, created_at, updated_at
"#;

/// Derive the denormalized url for a document from its title and id.
pub(crate) fn document_url(title: &str, id: Uuid) -> String {
    let cleaned: String = title
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    let slug = cleaned.split_whitespace().collect::<Vec<_>>().join("-");
    let slug = if slug.is_empty() { "untitled" } else { &slug };
    let hex = id.simple().to_string();
    format!("/doc/{}-{}", slug, &hex[..8])
}

impl Document {
    /// Whether this document carries a navigation node in its collection's
    /// tree.
    pub fn is_visible(&self) -> bool {
        self.published_at.is_some()
            && !self.template
            && self.archived_at.is_none()
            && self.deleted_at.is_none()
    }

    /// A leaf navigation node for this document.
    pub fn navigation_node(&self) -> NavigationNode {
        NavigationNode::new(*self.id, self.title.as_str(), self.url.as_str())
    }

    /// Create a draft. Drafts have no navigation node until published.
    pub async fn create(
        conn: &mut DatabaseConnection,
        collection_id: Uuid,
        parent_document_id: Option<Uuid>,
        title: &str,
        template: bool,
        created_by_id: Uuid,
    ) -> Result<Document, sqlx::Error> {
        let id = DUuid::new();
        let now = Utc::now();
        let url = document_url(title, *id);

        sqlx::query(
            r#"
            INSERT INTO documents (
                id, collection_id, parent_document_id, title, url, template,
                created_by_id, created_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(id)
        .bind(DUuid::from(collection_id))
        .bind(parent_document_id.map(DUuid::from))
        .bind(title)
        .bind(url)
        .bind(template)
        .bind(DUuid::from(created_by_id))
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        Self::get(&mut *conn, *id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    /// Copy `source` as a fresh row next to it (same collection, same
    /// parent), optionally published now.
    pub async fn create_copy(
        conn: &mut DatabaseConnection,
        source: &Document,
        title: &str,
        published_at: Option<DateTime<Utc>>,
        created_by_id: Uuid,
    ) -> Result<Document, sqlx::Error> {
        let id = DUuid::new();
        let now = Utc::now();
        let url = document_url(title, *id);

        sqlx::query(
            r#"
            INSERT INTO documents (
                id, collection_id, parent_document_id, title, url, template,
                published_at, created_by_id, created_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(id)
        .bind(source.collection_id)
        .bind(source.parent_document_id)
        .bind(title)
        .bind(url)
        .bind(source.template)
        .bind(published_at)
        .bind(DUuid::from(created_by_id))
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        Self::get(&mut *conn, *id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    /// Get a document by id, whatever its lifecycle state.
    pub async fn get(
        executor: impl Executor<'_, Database = Sqlite>,
        id: Uuid,
    ) -> Result<Option<Document>, sqlx::Error> {
        let query = format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = ?1");
        sqlx::query_as::<_, Document>(&query)
            .bind(DUuid::from(id))
            .fetch_optional(executor)
            .await
    }

    /// Direct child documents, excluding deleted rows, oldest first.
    pub async fn find_children(
        executor: impl Executor<'_, Database = Sqlite>,
        parent_document_id: Uuid,
    ) -> Result<Vec<Document>, sqlx::Error> {
        let query = format!(
            r#"
            SELECT {DOCUMENT_COLUMNS} FROM documents
            WHERE parent_document_id = ?1 AND deleted_at IS NULL
            ORDER BY created_at ASC
            "#
        );
        sqlx::query_as::<_, Document>(&query)
            .bind(DUuid::from(parent_document_id))
            .fetch_all(executor)
            .await
    }

    /// Every descendant id, deepest first. Structural: lifecycle state does
    /// not prune this walk.
    pub async fn find_descendant_ids(
        executor: impl Executor<'_, Database = Sqlite>,
        id: Uuid,
    ) -> Result<Vec<Uuid>, sqlx::Error> {
        let rows: Vec<(DUuid,)> = sqlx::query_as(
            r#"
            WITH RECURSIVE descendants(id, depth) AS (
                SELECT id, 1 FROM documents WHERE parent_document_id = ?1
                UNION ALL
                SELECT d.id, descendants.depth + 1
                FROM documents d
                JOIN descendants ON d.parent_document_id = descendants.id
            )
            SELECT id FROM descendants ORDER BY depth DESC
            "#,
        )
        .bind(DUuid::from(id))
        .fetch_all(executor)
        .await?;

        Ok(rows.into_iter().map(|(id,)| *id).collect())
    }

    /// Descendant ids restricted to visible documents, pruned at every
    /// step: an invisible document hides its whole subtree, exactly as the
    /// navigation tree would.
    pub async fn find_visible_descendant_ids(
        executor: impl Executor<'_, Database = Sqlite>,
        id: Uuid,
    ) -> Result<Vec<Uuid>, sqlx::Error> {
        let rows: Vec<(DUuid,)> = sqlx::query_as(
            r#"
            WITH RECURSIVE descendants(id) AS (
                SELECT id FROM documents
                WHERE parent_document_id = ?1
                  AND published_at IS NOT NULL AND template = 0
                  AND archived_at IS NULL AND deleted_at IS NULL
                UNION ALL
                SELECT d.id
                FROM documents d
                JOIN descendants ON d.parent_document_id = descendants.id
                WHERE d.published_at IS NOT NULL AND d.template = 0
                  AND d.archived_at IS NULL AND d.deleted_at IS NULL
            )
            SELECT id FROM descendants
            "#,
        )
        .bind(DUuid::from(id))
        .fetch_all(executor)
        .await?;

        Ok(rows.into_iter().map(|(id,)| *id).collect())
    }

    /// Ancestor ids following `parent_document_id` upward, nearest first.
    pub async fn find_ancestor_ids(
        executor: impl Executor<'_, Database = Sqlite>,
        id: Uuid,
    ) -> Result<Vec<Uuid>, sqlx::Error> {
        let rows: Vec<(DUuid,)> = sqlx::query_as(
            r#"
            WITH RECURSIVE ancestors(id, parent_document_id, depth) AS (
                SELECT id, parent_document_id, 0 FROM documents WHERE id = ?1
                UNION ALL
                SELECT d.id, d.parent_document_id, ancestors.depth + 1
                FROM documents d
                JOIN ancestors ON d.id = ancestors.parent_document_id
            )
            SELECT id FROM ancestors WHERE depth > 0 ORDER BY depth ASC
            "#,
        )
        .bind(DUuid::from(id))
        .fetch_all(executor)
        .await?;

        Ok(rows.into_iter().map(|(id,)| *id).collect())
    }

    /// Build the navigation subtree rooted at `document` from the rows:
    /// the document itself plus every visible descendant reachable through
    /// visible parents. Siblings come out oldest first, one query total.
    pub async fn build_subtree(
        conn: &mut DatabaseConnection,
        document: &Document,
    ) -> Result<NavigationNode, sqlx::Error> {
        let rows: Vec<(DUuid, Option<DUuid>, String, String)> = sqlx::query_as(
            r#"
            WITH RECURSIVE subtree(id, depth) AS (
                SELECT id, 0 FROM documents WHERE id = ?1
                UNION ALL
                SELECT d.id, subtree.depth + 1
                FROM documents d
                JOIN subtree ON d.parent_document_id = subtree.id
                WHERE d.published_at IS NOT NULL AND d.template = 0
                  AND d.archived_at IS NULL AND d.deleted_at IS NULL
            )
            SELECT d.id, d.parent_document_id, d.title, d.url
            FROM documents d
            JOIN subtree ON d.id = subtree.id
            ORDER BY subtree.depth ASC, d.created_at ASC
            "#,
        )
        .bind(document.id)
        .fetch_all(&mut *conn)
        .await?;

        // Group children by parent, keeping query order within each group
        let mut children_of: HashMap<Uuid, Vec<(Uuid, String, String)>> = HashMap::new();
        for (id, parent_id, title, url) in rows {
            if *id == *document.id {
                continue;
            }
            if let Some(parent_id) = parent_id {
                children_of
                    .entry(*parent_id)
                    .or_default()
                    .push((*id, title, url));
            }
        }

        fn attach(
            id: Uuid,
            title: String,
            url: String,
            children_of: &mut HashMap<Uuid, Vec<(Uuid, String, String)>>,
        ) -> NavigationNode {
            let mut node = NavigationNode::new(id, title, url);
            if let Some(children) = children_of.remove(&id) {
                node.children = children
                    .into_iter()
                    .map(|(child_id, title, url)| attach(child_id, title, url, children_of))
                    .collect();
            }
            node
        }

        Ok(attach(
            *document.id,
            document.title.clone(),
            document.url.clone(),
            &mut children_of,
        ))
    }

    /// Mark the document as published.
    pub async fn set_published(
        conn: &mut DatabaseConnection,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE documents SET published_at = ?1, updated_at = ?1 WHERE id = ?2")
            .bind(at)
            .bind(DUuid::from(id))
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    /// Return the document to draft state.
    pub async fn set_unpublished(
        conn: &mut DatabaseConnection,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE documents SET published_at = NULL, updated_at = ?1 WHERE id = ?2")
            .bind(at)
            .bind(DUuid::from(id))
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    /// Re-parent the document.
    pub async fn set_parent(
        conn: &mut DatabaseConnection,
        id: Uuid,
        parent_document_id: Option<Uuid>,
        at: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE documents SET parent_document_id = ?1, updated_at = ?2 WHERE id = ?3",
        )
        .bind(parent_document_id.map(DUuid::from))
        .bind(at)
        .bind(DUuid::from(id))
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Rename the document, refreshing its denormalized url.
    pub async fn set_title(
        conn: &mut DatabaseConnection,
        id: Uuid,
        title: &str,
        at: DateTime<Utc>,
    ) -> Result<String, sqlx::Error> {
        let url = document_url(title, id);
        sqlx::query("UPDATE documents SET title = ?1, url = ?2, updated_at = ?3 WHERE id = ?4")
            .bind(title)
            .bind(&url)
            .bind(at)
            .bind(DUuid::from(id))
            .execute(&mut *conn)
            .await?;
        Ok(url)
    }

    /// Rewrite `collection_id` across the document and its whole subtree,
    /// for cross-collection moves.
    pub async fn set_collection_for_subtree(
        conn: &mut DatabaseConnection,
        id: Uuid,
        collection_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            WITH RECURSIVE subtree(id) AS (
                SELECT ?1
                UNION ALL
                SELECT d.id FROM documents d JOIN subtree ON d.parent_document_id = subtree.id
            )
            UPDATE documents SET collection_id = ?2, updated_at = ?3
            WHERE id IN (SELECT id FROM subtree)
            "#,
        )
        .bind(DUuid::from(id))
        .bind(DUuid::from(collection_id))
        .bind(at)
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected())
    }

    /// Stamp `at` onto the document and every not-yet-archived descendant.
    /// One shared instant marks the whole cascade, so unarchiving later can
    /// tell these rows apart from subtrees archived on their own.
    pub async fn archive_subtree(
        conn: &mut DatabaseConnection,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            WITH RECURSIVE subtree(id) AS (
                SELECT ?1
                UNION ALL
                SELECT d.id FROM documents d
                JOIN subtree ON d.parent_document_id = subtree.id
                WHERE d.deleted_at IS NULL
            )
            UPDATE documents SET archived_at = ?2, updated_at = ?2
            WHERE id IN (SELECT id FROM subtree)
              AND archived_at IS NULL AND deleted_at IS NULL
            "#,
        )
        .bind(DUuid::from(id))
        .bind(at)
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected())
    }

    /// Clear the archive stamp on the document and exactly the descendants
    /// archived by the same cascade. Subtrees archived separately keep
    /// their own stamp and stay archived. No-op when the document is not
    /// archived.
    pub async fn unarchive_subtree(
        conn: &mut DatabaseConnection,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<u64, sqlx::Error> {
        let stamp: Option<(Option<DateTime<Utc>>,)> =
            sqlx::query_as("SELECT archived_at FROM documents WHERE id = ?1")
                .bind(DUuid::from(id))
                .fetch_optional(&mut *conn)
                .await?;
        let Some((Some(stamp),)) = stamp else {
            return Ok(0);
        };

        let result = sqlx::query(
            r#"
            WITH RECURSIVE subtree(id) AS (
                SELECT ?1
                UNION ALL
                SELECT d.id FROM documents d
                JOIN subtree ON d.parent_document_id = subtree.id
                WHERE d.deleted_at IS NULL
            )
            UPDATE documents SET archived_at = NULL, updated_at = ?2
            WHERE id IN (SELECT id FROM subtree) AND archived_at = ?3
            "#,
        )
        .bind(DUuid::from(id))
        .bind(at)
        .bind(stamp)
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected())
    }

    /// Soft-delete every non-archived live document in a collection.
    pub async fn soft_delete_for_collection(
        conn: &mut DatabaseConnection,
        collection_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE documents SET deleted_at = ?1, updated_at = ?1
            WHERE collection_id = ?2 AND archived_at IS NULL AND deleted_at IS NULL
            "#,
        )
        .bind(at)
        .bind(DUuid::from(collection_id))
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected())
    }

    /// Remove the row entirely.
    pub async fn destroy(conn: &mut DatabaseConnection, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM documents WHERE id = ?1")
            .bind(DUuid::from(id))
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Ids of every visible document in a collection, tree membership not
    /// consulted. The consistency audit compares this set against the tree.
    pub async fn find_visible_ids_for_collection(
        executor: impl Executor<'_, Database = Sqlite>,
        collection_id: Uuid,
    ) -> Result<Vec<Uuid>, sqlx::Error> {
        let rows: Vec<(DUuid,)> = sqlx::query_as(
            r#"
            SELECT id FROM documents
            WHERE collection_id = ?1
              AND published_at IS NOT NULL AND template = 0
              AND archived_at IS NULL AND deleted_at IS NULL
            "#,
        )
        .bind(DUuid::from(collection_id))
        .fetch_all(executor)
        .await?;

        Ok(rows.into_iter().map(|(id,)| *id).collect())
    }
}
