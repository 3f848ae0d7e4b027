//! Reconciliation of derived access grants.
//!
//! A root membership on a document implies the same access on every visible
//! descendant of that document. Rather than interpreting that rule at read
//! time, the engine materializes it: one sourced membership row per visible
//! descendant, all pointing back at the root. The functions here keep those
//! materialized rows honest.
//!
//! The model is teardown and recompute. [`recreate_sourced_memberships`]
//! deletes every row derived from a root and re-derives the set from the
//! document hierarchy as it stands now, which makes it safe to call after
//! any structural change without knowing what the change was. The one
//! shortcut is [`propagate_permission_update`], which rewrites the level on
//! derived rows in place when nothing structural moved.
//!
//! Everything here runs on a transaction the caller has already opened,
//! under that caller's collection lock. Nothing commits, retries, or locks
//! internally; an error aborts the whole operation.

use std::collections::HashSet;

use common::grant::Principal;
use uuid::Uuid;

use crate::database::models::{Document, Membership};
use crate::database::DatabaseConnection;

/// Tear down every row derived from `root` and re-derive one per visible
/// descendant of the root's document. Returns how many rows were created.
///
/// Collection-level grants have no derived rows, so a collection-scoped
/// `root` only performs the teardown (a no-op). Likewise when the root's
/// document row no longer exists.
pub async fn recreate_sourced_memberships(
    conn: &mut DatabaseConnection,
    root: &Membership,
) -> Result<u64, sqlx::Error> {
    let removed = Membership::delete_sourced_from(conn, *root.id).await?;

    let Some(document_id) = root.document_id else {
        return Ok(0);
    };
    if Document::get(&mut *conn, *document_id).await?.is_none() {
        return Ok(0);
    }

    let descendants = Document::find_visible_descendant_ids(&mut *conn, *document_id).await?;
    for descendant_id in &descendants {
        Membership::create_sourced(conn, *descendant_id, root).await?;
    }

    tracing::debug!(
        "recreated sourced memberships for root {}: {} removed, {} created",
        *root.id,
        removed,
        descendants.len()
    );
    Ok(descendants.len() as u64)
}

/// Push a root's (already saved) permission level onto every row derived
/// from it. The derived rows take the root's `updated_at` as well; derived
/// rows never carry their own clocks.
pub async fn propagate_permission_update(
    conn: &mut DatabaseConnection,
    root: &Membership,
) -> Result<u64, sqlx::Error> {
    let result =
        sqlx::query("UPDATE memberships SET permission = ?1, updated_at = ?2 WHERE source_id = ?3")
            .bind(root.permission)
            .bind(root.updated_at)
            .bind(root.id)
            .execute(&mut *conn)
            .await?;

    tracing::debug!(
        "propagated permission {} from root {} to {} sourced rows",
        root.permission.as_str(),
        *root.id,
        result.rows_affected()
    );
    Ok(result.rows_affected())
}

/// The root memberships governing a document: its own root rows, plus the
/// roots behind any sourced rows it carries. Deduplicated by root id, in the
/// order the document's rows were created. `principal` narrows the search to
/// one grantee.
pub async fn find_root_memberships_for_document(
    conn: &mut DatabaseConnection,
    document_id: Uuid,
    principal: Option<Principal>,
) -> Result<Vec<Membership>, sqlx::Error> {
    let rows = match principal {
        Some(principal) => {
            Membership::for_document_and_principal(&mut *conn, document_id, principal).await?
        }
        None => Membership::for_document(&mut *conn, document_id).await?,
    };

    let mut seen = HashSet::new();
    let mut roots = Vec::new();
    for row in rows {
        let root_id = row.root_id();
        if !seen.insert(root_id) {
            continue;
        }
        if row.is_root() {
            roots.push(row);
        } else if let Some(root) = Membership::get(&mut *conn, root_id).await? {
            roots.push(root);
        } else {
            tracing::warn!(
                "sourced membership {} references missing root {root_id}",
                *row.id
            );
        }
    }
    Ok(roots)
}

/// Mirror every membership on `source_document_id` onto `target` as sourced
/// rows. Each copy points at the ultimate root, so copies of sourced rows
/// and copies of roots end up indistinguishable. Returns how many rows were
/// created.
pub async fn copy_memberships_for_document(
    conn: &mut DatabaseConnection,
    source_document_id: Uuid,
    target: &Document,
) -> Result<u64, sqlx::Error> {
    let rows = Membership::for_document(&mut *conn, source_document_id).await?;
    let copied = rows.len() as u64;
    for row in rows {
        Membership::create_sourced(conn, *target.id, &row).await?;
    }

    tracing::debug!(
        "copied {copied} memberships from document {source_document_id} to {}",
        *target.id
    );
    Ok(copied)
}
