//! The transactional engine tying trees, documents, and grants together.
//!
//! Every mutating operation follows one discipline: take the owning
//! collection's exclusive lock, open a transaction, read the current state,
//! mutate rows and the in-memory tree, write the whole tree back, commit.
//! Lock before transaction, never the reverse. Membership propagation runs
//! inside the same transaction as the structural change that triggered it,
//! so the tree and the derived grant rows can never diverge on disk.

use std::collections::HashSet;

use chrono::Utc;
use common::grant::{Permission, Principal, PrincipalKind};
use common::structure::{DocumentStructure, NavigationNode, RemovedNode, Sort};
use sqlx::{Sqlite, Transaction};
use url::Url;
use uuid::Uuid;

use crate::config::Config;
use crate::database::models::{Collection, Document, Membership};
use crate::database::{Database, DatabaseConnection, DatabaseSetupError};
use crate::locks::{CollectionGuard, CollectionLocks};
use crate::propagation;

#[derive(Clone)]
pub struct Engine {
    database: Database,
    locks: CollectionLocks,
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("collection not found: {0}")]
    CollectionNotFound(Uuid),
    #[error("collection has been deleted: {0}")]
    CollectionDeleted(Uuid),
    #[error("document not found: {0}")]
    DocumentNotFound(Uuid),
    #[error("membership not found: {0}")]
    MembershipNotFound(Uuid),
    #[error("cannot move document {document} under {target}: target is inside the moved subtree")]
    MoveIntoSelf { document: Uuid, target: Uuid },
    #[error("parent document {parent} is not in collection {collection}")]
    ParentOutsideCollection { parent: Uuid, collection: Uuid },
    #[error("maintainer permission can only be granted to users on collections")]
    MaintainerNotAllowed,
    #[error("membership {0} is sourced; change its root instead")]
    SourcedMembershipImmutable(Uuid),
    #[error(
        "structure for collection {collection_id} is out of sync: missing {missing:?}, unexpected {unexpected:?}"
    )]
    StructureMismatch {
        collection_id: Uuid,
        missing: Vec<Uuid>,
        unexpected: Vec<Uuid>,
    },
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum EngineSetupError {
    #[error("Database path does not exist")]
    DatabasePathDoesNotExist,
    #[error("Invalid database URL")]
    InvalidDatabaseUrl,
    #[error("error setting up the database: {0}")]
    DatabaseSetupError(#[from] DatabaseSetupError),
}

impl Engine {
    pub async fn from_config(config: &Config) -> Result<Self, EngineSetupError> {
        let sqlite_database_url = match config.sqlite_path {
            Some(ref path) => {
                // check that the path exists
                if !path.exists() {
                    return Err(EngineSetupError::DatabasePathDoesNotExist);
                }
                // parse the path into a URL
                Url::parse(&format!("sqlite://{}", path.display()))
                    .map_err(|_| EngineSetupError::InvalidDatabaseUrl)
            }
            // otherwise just set up an in-memory database
            None => Url::parse("sqlite::memory:").map_err(|_| EngineSetupError::InvalidDatabaseUrl),
        }?;
        tracing::info!("Database URL: {:?}", sqlite_database_url);
        let database = Database::connect(&sqlite_database_url).await?;

        Ok(Self::new(database))
    }

    pub fn new(database: Database) -> Self {
        Self {
            database,
            locks: CollectionLocks::new(),
        }
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    // --- collections ---

    pub async fn create_collection(
        &self,
        name: &str,
        sort: Sort,
    ) -> Result<Collection, EngineError> {
        let mut conn = self.database.acquire().await?;
        let collection = Collection::create(&mut conn, name, sort).await?;
        tracing::info!("created collection {} ({})", *collection.id, collection.name);
        Ok(collection)
    }

    /// Soft-delete a collection: drop its tree and soft-delete its live,
    /// non-archived documents. Archived documents keep their stamp so they
    /// stay recoverable. Calling this twice is a no-op.
    pub async fn destroy_collection(&self, id: Uuid) -> Result<(), EngineError> {
        let _guard = self.locks.acquire(id).await;
        let mut tx = self.database.begin().await?;

        Collection::get(&mut *tx, id)
            .await?
            .ok_or(EngineError::CollectionNotFound(id))?;

        let now = Utc::now();
        if Collection::set_deleted(&mut tx, id, now).await? {
            let documents = Document::soft_delete_for_collection(&mut tx, id, now).await?;
            tx.commit().await?;
            tracing::info!("destroyed collection {} ({} documents)", id, documents);
        }
        Ok(())
    }

    // --- document lifecycle ---

    /// Create a draft. Drafts have a row but no navigation node; nothing
    /// else changes until they are published.
    pub async fn create_document(
        &self,
        collection_id: Uuid,
        parent_document_id: Option<Uuid>,
        title: &str,
        template: bool,
        created_by_id: Uuid,
    ) -> Result<Document, EngineError> {
        let mut conn = self.database.acquire().await?;
        require_collection(&mut conn, collection_id).await?;
        if let Some(parent_id) = parent_document_id {
            let parent = require_document(&mut conn, parent_id).await?;
            if *parent.collection_id != collection_id {
                return Err(EngineError::ParentOutsideCollection {
                    parent: parent_id,
                    collection: collection_id,
                });
            }
        }

        let document = Document::create(
            &mut conn,
            collection_id,
            parent_document_id,
            title,
            template,
            created_by_id,
        )
        .await?;
        tracing::info!("created document {} in collection {}", *document.id, collection_id);
        Ok(document)
    }

    /// Make a draft visible: stamp `published_at`, hang its node (with any
    /// already-visible subtree) at index 0 under its parent, and re-derive
    /// sourced memberships for every root found on the document or a strict
    /// ancestor so the newly-visible subtree inherits existing grants.
    ///
    /// Templates get the stamp but never a node. When the parent has no
    /// node yet the tree is quietly left alone; the document shows up once
    /// the parent itself is published.
    pub async fn publish_document(&self, id: Uuid) -> Result<Document, EngineError> {
        let (document, collection, _guard, mut tx) = self.lock_document(id).await?;
        if document.published_at.is_some() {
            return Ok(document);
        }
        let collection_id = *collection.id;

        let now = Utc::now();
        Document::set_published(&mut tx, id, now).await?;
        let document = require_document(&mut tx, id).await?;

        if !document.template {
            let node = Document::build_subtree(&mut tx, &document).await?;
            let mut structure = collection.structure();
            structure.insert(node, document.parent_document_id.map(|p| *p), Some(0));
            Collection::save_structure(&mut tx, collection_id, &structure).await?;
        }

        let mut chain = vec![id];
        chain.extend(Document::find_ancestor_ids(&mut *tx, id).await?);
        let mut seen = HashSet::new();
        for ancestor_id in chain {
            for membership in Membership::for_document(&mut *tx, ancestor_id).await? {
                if membership.is_root() && seen.insert(*membership.id) {
                    propagation::recreate_sourced_memberships(&mut tx, &membership).await?;
                }
            }
        }

        tx.commit().await?;
        tracing::info!("published document {} in collection {}", id, collection_id);
        Ok(document)
    }

    /// Return a document to draft state. Its subtree leaves the tree; its
    /// direct children are promoted to the top level so every still-visible
    /// descendant keeps exactly one node, and every root whose grant
    /// reached a promoted subtree is re-derived so no child keeps a row
    /// from a root it left. Sourced memberships on the document itself
    /// stay where they are, latent until the document is deleted;
    /// unpublishing is meant to be reversible.
    pub async fn unpublish_document(&self, id: Uuid) -> Result<Document, EngineError> {
        let (document, collection, _guard, mut tx) = self.lock_document(id).await?;
        if document.published_at.is_none() {
            return Ok(document);
        }
        let collection_id = *collection.id;

        let now = Utc::now();
        let mut structure = collection.structure();
        structure.remove(id);

        let children = Document::find_children(&mut *tx, id).await?;

        // Roots whose derived rows reach into the child subtrees go stale
        // when those subtrees re-parent; collect them now, re-derive after
        // the promotion.
        let mut affected = Vec::new();
        let mut seen = HashSet::new();
        for child in &children {
            let mut subtree_ids = vec![*child.id];
            subtree_ids.extend(Document::find_descendant_ids(&mut *tx, *child.id).await?);
            for subtree_id in &subtree_ids {
                let roots =
                    propagation::find_root_memberships_for_document(&mut tx, *subtree_id, None)
                        .await?;
                for root in roots {
                    if seen.insert(*root.id) {
                        affected.push(root);
                    }
                }
            }
        }

        for child in &children {
            Document::set_parent(&mut tx, *child.id, None, now).await?;
        }
        Document::set_unpublished(&mut tx, id, now).await?;

        for child in &children {
            if child.is_visible() {
                let node = Document::build_subtree(&mut tx, child).await?;
                structure.insert(node, None, None);
            }
        }
        Collection::save_structure(&mut tx, collection_id, &structure).await?;

        for root in &affected {
            propagation::recreate_sourced_memberships(&mut tx, root).await?;
        }

        let document = require_document(&mut tx, id).await?;
        tx.commit().await?;
        tracing::info!("unpublished document {} in collection {}", id, collection_id);
        Ok(document)
    }

    /// Rename a document and refresh the display fields its node caches.
    pub async fn update_document(&self, id: Uuid, title: &str) -> Result<Document, EngineError> {
        let (document, collection, _guard, mut tx) = self.lock_document(id).await?;

        let now = Utc::now();
        let url = Document::set_title(&mut tx, id, title, now).await?;

        if document.is_visible() {
            let mut structure = collection.structure();
            if structure.update_metadata(id, title, &url) {
                Collection::save_structure(&mut tx, *collection.id, &structure).await?;
            }
        }

        let document = require_document(&mut tx, id).await?;
        tx.commit().await?;
        Ok(document)
    }

    /// Move a document (and its whole subtree) under a new parent, possibly
    /// in a different collection. Both collections are locked, in id order,
    /// for the duration. After the rows and trees move, every root grant
    /// touching the subtree (its own roots, plus the old and new ancestors')
    /// has its sourced rows recomputed.
    pub async fn move_document(
        &self,
        id: Uuid,
        collection_id: Uuid,
        parent_document_id: Option<Uuid>,
        index: Option<usize>,
    ) -> Result<Document, EngineError> {
        let (document, source_collection, _guards, mut tx) = loop {
            let document = Document::get(&*self.database, id)
                .await?
                .ok_or(EngineError::DocumentNotFound(id))?;
            let source_collection_id = *document.collection_id;

            let guards = self
                .locks
                .acquire_pair(source_collection_id, collection_id)
                .await;
            let mut tx = self.database.begin().await?;
            match Document::get(&mut *tx, id).await? {
                Some(document) if *document.collection_id == source_collection_id => {
                    let collection = require_collection(&mut tx, source_collection_id).await?;
                    break (document, collection, guards, tx);
                }
                // relocated while we waited on the lock; resolve again
                Some(_) => continue,
                None => return Err(EngineError::DocumentNotFound(id)),
            }
        };
        let source_collection_id = *source_collection.id;
        let target_collection = if collection_id == source_collection_id {
            source_collection.clone()
        } else {
            require_collection(&mut tx, collection_id).await?
        };

        let descendants = Document::find_descendant_ids(&mut *tx, id).await?;
        if let Some(parent_id) = parent_document_id {
            if parent_id == id || descendants.contains(&parent_id) {
                return Err(EngineError::MoveIntoSelf {
                    document: id,
                    target: parent_id,
                });
            }
            let parent = require_document(&mut tx, parent_id).await?;
            if *parent.collection_id != collection_id {
                return Err(EngineError::ParentOutsideCollection {
                    parent: parent_id,
                    collection: collection_id,
                });
            }
        }

        // Roots needing recomputation afterwards: whatever governs the
        // subtree today (covers roots on it and on old ancestors), plus
        // roots along the destination chain.
        let mut affected = Vec::new();
        let mut seen = HashSet::new();
        let mut subtree_ids = vec![id];
        subtree_ids.extend(descendants.iter().copied());
        for subtree_id in &subtree_ids {
            let roots =
                propagation::find_root_memberships_for_document(&mut tx, *subtree_id, None).await?;
            for root in roots {
                if seen.insert(*root.id) {
                    affected.push(root);
                }
            }
        }
        if let Some(parent_id) = parent_document_id {
            let mut chain = vec![parent_id];
            chain.extend(Document::find_ancestor_ids(&mut *tx, parent_id).await?);
            for ancestor_id in chain {
                for membership in Membership::for_document(&mut *tx, ancestor_id).await? {
                    if membership.is_root() && seen.insert(*membership.id) {
                        affected.push(membership);
                    }
                }
            }
        }

        let now = Utc::now();
        Document::set_parent(&mut tx, id, parent_document_id, now).await?;
        if collection_id != source_collection_id {
            Document::set_collection_for_subtree(&mut tx, id, collection_id, now).await?;
        }

        if collection_id == source_collection_id {
            let mut structure = source_collection.structure();
            let removed = structure.remove(id);
            if document.is_visible() {
                let node = match removed {
                    Some(removed) => removed.node,
                    None => Document::build_subtree(&mut tx, &document).await?,
                };
                structure.insert(node, parent_document_id, index);
            }
            Collection::save_structure(&mut tx, collection_id, &structure).await?;
        } else {
            let mut source_structure = source_collection.structure();
            let removed = source_structure.remove(id);
            Collection::save_structure(&mut tx, source_collection_id, &source_structure).await?;

            let mut target_structure = target_collection.structure();
            if document.is_visible() {
                let node = match removed {
                    Some(removed) => removed.node,
                    None => Document::build_subtree(&mut tx, &document).await?,
                };
                target_structure.insert(node, parent_document_id, index);
            }
            Collection::save_structure(&mut tx, collection_id, &target_structure).await?;
        }

        for root in &affected {
            propagation::recreate_sourced_memberships(&mut tx, root).await?;
        }

        let document = require_document(&mut tx, id).await?;
        tx.commit().await?;
        tracing::info!(
            "moved document {} from collection {} to {}",
            id,
            source_collection_id,
            collection_id
        );
        Ok(document)
    }

    /// Archive a document: one shared instant stamps it and every
    /// not-already-archived descendant, and its node leaves the tree. The
    /// removed node and its former index come back so a caller undoing the
    /// archive can restore the exact slot.
    pub async fn archive_document(
        &self,
        id: Uuid,
    ) -> Result<(Document, Option<RemovedNode>), EngineError> {
        let (document, collection, _guard, mut tx) = self.lock_document(id).await?;
        if document.archived_at.is_some() {
            return Ok((document, None));
        }

        let now = Utc::now();
        let mut structure = collection.structure();
        let removed = structure.remove(id);
        if removed.is_some() {
            Collection::save_structure(&mut tx, *collection.id, &structure).await?;
        }
        Document::archive_subtree(&mut tx, id, now).await?;

        let document = require_document(&mut tx, id).await?;
        tx.commit().await?;
        tracing::info!("archived document {} in collection {}", id, *collection.id);
        Ok((document, removed))
    }

    /// Undo an archive: clear the stamp on the document and exactly the
    /// descendants stamped by the same cascade, rebuild the node subtree
    /// from the now-visible rows, and hang it back under the parent at
    /// `index` when the caller kept it. When the parent's node is gone the
    /// subtree lands at the top level and the row is re-parented to match.
    /// Roots on the document and its ancestors are then re-derived, so
    /// grants recomputed while the subtree was archived catch back up.
    pub async fn unarchive_document(
        &self,
        id: Uuid,
        index: Option<usize>,
    ) -> Result<Document, EngineError> {
        let (document, collection, _guard, mut tx) = self.lock_document(id).await?;
        if document.archived_at.is_none() {
            return Ok(document);
        }

        let now = Utc::now();
        Document::unarchive_subtree(&mut tx, id, now).await?;
        let mut document = require_document(&mut tx, id).await?;

        if document.is_visible() {
            let node = Document::build_subtree(&mut tx, &document).await?;
            let mut structure = collection.structure();
            let parent = document.parent_document_id.map(|p| *p);
            if !structure.insert(node.clone(), parent, index) {
                // the parent's node is gone, so the subtree lands at the
                // top level; the row must agree or restoring the old
                // parent later would graft a second node for this id
                Document::set_parent(&mut tx, id, None, now).await?;
                document = require_document(&mut tx, id).await?;
                structure.insert(node, None, index);
            }
            Collection::save_structure(&mut tx, *collection.id, &structure).await?;
        }

        let mut chain = vec![id];
        chain.extend(Document::find_ancestor_ids(&mut *tx, id).await?);
        let mut seen = HashSet::new();
        for ancestor_id in chain {
            for membership in Membership::for_document(&mut *tx, ancestor_id).await? {
                if membership.is_root() && seen.insert(*membership.id) {
                    propagation::recreate_sourced_memberships(&mut tx, &membership).await?;
                }
            }
        }

        tx.commit().await?;
        tracing::info!("unarchived document {} in collection {}", id, *collection.id);
        Ok(document)
    }

    /// Remove a document for good: the node subtree leaves the tree, then
    /// every descendant row is destroyed innermost-first and the document
    /// itself last. Destroying a row first removes the memberships attached
    /// to it, roots and sourced copies alike.
    pub async fn delete_document(&self, id: Uuid) -> Result<(), EngineError> {
        let (_document, collection, _guard, mut tx) = self.lock_document(id).await?;

        let mut structure = collection.structure();
        if structure.remove(id).is_some() {
            Collection::save_structure(&mut tx, *collection.id, &structure).await?;
        }

        let descendants = Document::find_descendant_ids(&mut *tx, id).await?;
        let mut destroyed = 0u64;
        for &document_id in descendants.iter().chain(std::iter::once(&id)) {
            Membership::delete_for_document(&mut tx, document_id).await?;
            Document::destroy(&mut tx, document_id).await?;
            destroyed += 1;
        }

        tx.commit().await?;
        tracing::info!(
            "deleted document {} and {} descendants from collection {}",
            id,
            destroyed - 1,
            *collection.id
        );
        Ok(())
    }

    /// Copy a document as a fresh sibling: same parent, same collection,
    /// published now when the original is published. The copy's node lands
    /// right after the original's, and every membership on the original is
    /// mirrored onto the copy as a sourced row pointing at its ultimate
    /// root.
    pub async fn duplicate_document(
        &self,
        id: Uuid,
        title: Option<&str>,
        created_by_id: Uuid,
    ) -> Result<Document, EngineError> {
        let (source, collection, _guard, mut tx) = self.lock_document(id).await?;

        let title = title.unwrap_or(source.title.as_str());
        let published_at = source.published_at.is_some().then(Utc::now);
        let copy = Document::create_copy(&mut tx, &source, title, published_at, created_by_id).await?;

        if copy.is_visible() {
            let mut structure = collection.structure();
            let index = structure.sibling_index(id).map(|i| i + 1);
            structure.insert(
                copy.navigation_node(),
                source.parent_document_id.map(|p| *p),
                index,
            );
            Collection::save_structure(&mut tx, *collection.id, &structure).await?;
        }

        propagation::copy_memberships_for_document(&mut tx, id, &copy).await?;

        tx.commit().await?;
        tracing::info!("duplicated document {} as {}", id, *copy.id);
        Ok(copy)
    }

    // --- grants ---

    /// Grant access to a whole collection. Collection grants never cascade
    /// onto documents. Granting again for the same principal updates the
    /// level in place. Maintainer is reserved for users.
    pub async fn create_collection_membership(
        &self,
        collection_id: Uuid,
        principal: Principal,
        permission: Permission,
        created_by_id: Uuid,
    ) -> Result<Membership, EngineError> {
        if permission == Permission::Maintainer && principal.kind != PrincipalKind::User {
            return Err(EngineError::MaintainerNotAllowed);
        }

        let _guard = self.locks.acquire(collection_id).await;
        let mut tx = self.database.begin().await?;
        require_collection(&mut tx, collection_id).await?;

        let existing = Membership::for_collection(&mut *tx, collection_id)
            .await?
            .into_iter()
            .find(|m| m.principal() == principal);
        let membership = match existing {
            Some(existing) if *existing.permission == permission => existing,
            Some(existing) => Membership::update_permission(&mut tx, *existing.id, permission)
                .await?
                .ok_or(EngineError::MembershipNotFound(*existing.id))?,
            None => {
                Membership::create_on_collection(
                    &mut tx,
                    collection_id,
                    principal,
                    permission,
                    created_by_id,
                )
                .await?
            }
        };

        tx.commit().await?;
        tracing::info!(
            "granted {} on collection {} to {}",
            permission,
            collection_id,
            principal
        );
        Ok(membership)
    }

    /// Grant access to a document. The grant cascades immediately: one
    /// sourced row per visible descendant, inside this same transaction.
    /// Granting again for the same principal updates the level and pushes
    /// it to the derived rows. Documents top out at read-write.
    pub async fn create_document_membership(
        &self,
        document_id: Uuid,
        principal: Principal,
        permission: Permission,
        created_by_id: Uuid,
    ) -> Result<Membership, EngineError> {
        if permission == Permission::Maintainer {
            return Err(EngineError::MaintainerNotAllowed);
        }

        let (_document, _collection, _guard, mut tx) = self.lock_document(document_id).await?;

        let existing = Membership::for_document_and_principal(&mut *tx, document_id, principal)
            .await?
            .into_iter()
            .find(|m| m.is_root());
        let membership = match existing {
            Some(existing) if *existing.permission == permission => existing,
            Some(existing) => {
                let updated = Membership::update_permission(&mut tx, *existing.id, permission)
                    .await?
                    .ok_or(EngineError::MembershipNotFound(*existing.id))?;
                propagation::propagate_permission_update(&mut tx, &updated).await?;
                updated
            }
            None => {
                let created = Membership::create_on_document(
                    &mut tx,
                    document_id,
                    principal,
                    permission,
                    created_by_id,
                )
                .await?;
                propagation::recreate_sourced_memberships(&mut tx, &created).await?;
                created
            }
        };

        tx.commit().await?;
        tracing::info!(
            "granted {} on document {} to {}",
            permission,
            document_id,
            principal
        );
        Ok(membership)
    }

    /// Change the level on a root membership. Document grants push the new
    /// level onto their sourced rows in the same transaction. Sourced rows
    /// themselves cannot be edited, only their root.
    pub async fn update_membership_permission(
        &self,
        id: Uuid,
        permission: Permission,
    ) -> Result<Membership, EngineError> {
        let membership = Membership::get(&*self.database, id)
            .await?
            .ok_or(EngineError::MembershipNotFound(id))?;
        if membership.is_sourced() {
            return Err(EngineError::SourcedMembershipImmutable(id));
        }

        if let Some(collection_id) = membership.collection_id {
            if permission == Permission::Maintainer
                && PrincipalKind::from(membership.principal_kind) != PrincipalKind::User
            {
                return Err(EngineError::MaintainerNotAllowed);
            }

            let _guard = self.locks.acquire(*collection_id).await;
            let mut tx = self.database.begin().await?;
            let updated = Membership::update_permission(&mut tx, id, permission)
                .await?
                .ok_or(EngineError::MembershipNotFound(id))?;
            tx.commit().await?;
            return Ok(updated);
        }

        if permission == Permission::Maintainer {
            return Err(EngineError::MaintainerNotAllowed);
        }
        let document_id = membership
            .document_id
            .ok_or(EngineError::MembershipNotFound(id))?;
        let (_document, _collection, _guard, mut tx) = self.lock_document(*document_id).await?;
        let updated = Membership::update_permission(&mut tx, id, permission)
            .await?
            .ok_or(EngineError::MembershipNotFound(id))?;
        propagation::propagate_permission_update(&mut tx, &updated).await?;
        tx.commit().await?;
        Ok(updated)
    }

    /// Revoke a root membership together with every row derived from it,
    /// in one transaction.
    pub async fn delete_membership(&self, id: Uuid) -> Result<(), EngineError> {
        let membership = Membership::get(&*self.database, id)
            .await?
            .ok_or(EngineError::MembershipNotFound(id))?;
        if membership.is_sourced() {
            return Err(EngineError::SourcedMembershipImmutable(id));
        }

        if let Some(collection_id) = membership.collection_id {
            let _guard = self.locks.acquire(*collection_id).await;
            let mut tx = self.database.begin().await?;
            Membership::delete_with_sourced(&mut tx, id).await?;
            tx.commit().await?;
            return Ok(());
        }

        let document_id = membership
            .document_id
            .ok_or(EngineError::MembershipNotFound(id))?;
        let (_document, _collection, _guard, mut tx) = self.lock_document(*document_id).await?;
        Membership::delete_with_sourced(&mut tx, id).await?;
        tx.commit().await?;
        tracing::info!("revoked membership {} and its sourced rows", id);
        Ok(())
    }

    // --- queries (read-only, no lock) ---

    pub async fn collection(&self, id: Uuid) -> Result<Option<Collection>, EngineError> {
        Ok(Collection::get(&*self.database, id).await?)
    }

    pub async fn collections(&self) -> Result<Vec<Collection>, EngineError> {
        Ok(Collection::list(&*self.database).await?)
    }

    pub async fn document(&self, id: Uuid) -> Result<Option<Document>, EngineError> {
        Ok(Document::get(&*self.database, id).await?)
    }

    /// The whole navigation tree for a collection, as stored.
    pub async fn structure(&self, collection_id: Uuid) -> Result<DocumentStructure, EngineError> {
        let collection = Collection::get(&*self.database, collection_id)
            .await?
            .ok_or(EngineError::CollectionNotFound(collection_id))?;
        Ok(collection.structure())
    }

    /// One document's subtree out of the collection tree, with its
    /// immediate children ordered per the collection's sort. `None` when
    /// the document has no node.
    pub async fn document_tree(
        &self,
        collection_id: Uuid,
        document_id: Uuid,
    ) -> Result<Option<NavigationNode>, EngineError> {
        let collection = Collection::get(&*self.database, collection_id)
            .await?
            .ok_or(EngineError::CollectionNotFound(collection_id))?;
        Ok(collection.structure().node(document_id, &collection.sort()))
    }

    /// Ancestor ids of a document inside the tree, top level first. Empty
    /// for a top-level node, `None` when the document has no node.
    pub async fn document_parents(
        &self,
        collection_id: Uuid,
        document_id: Uuid,
    ) -> Result<Option<Vec<Uuid>>, EngineError> {
        let collection = Collection::get(&*self.database, collection_id)
            .await?
            .ok_or(EngineError::CollectionNotFound(collection_id))?;
        Ok(collection.structure().ancestor_ids(document_id))
    }

    pub async fn memberships_for_document(
        &self,
        document_id: Uuid,
    ) -> Result<Vec<Membership>, EngineError> {
        Ok(Membership::for_document(&*self.database, document_id).await?)
    }

    pub async fn memberships_for_collection(
        &self,
        collection_id: Uuid,
    ) -> Result<Vec<Membership>, EngineError> {
        Ok(Membership::for_collection(&*self.database, collection_id).await?)
    }

    /// The authoritative grants affecting a document: roots resolved from
    /// whatever rows sit on it, deduplicated.
    pub async fn find_root_memberships_for_document(
        &self,
        document_id: Uuid,
        principal: Option<Principal>,
    ) -> Result<Vec<Membership>, EngineError> {
        let mut conn = self.database.acquire().await?;
        Ok(propagation::find_root_memberships_for_document(&mut conn, document_id, principal)
            .await?)
    }

    /// Audit one collection: every visible document row must have exactly
    /// one node in the tree. Reports the difference instead of repairing
    /// it; meant for tests and offline verification, not the hot path.
    pub async fn verify_collection(&self, id: Uuid) -> Result<(), EngineError> {
        let collection = Collection::get(&*self.database, id)
            .await?
            .ok_or(EngineError::CollectionNotFound(id))?;

        let row_ids: HashSet<Uuid> =
            Document::find_visible_ids_for_collection(&*self.database, id)
                .await?
                .into_iter()
                .collect();

        // a repeated node id is as much a divergence as a node with no
        // row behind it
        let mut seen = HashSet::new();
        let mut unexpected = Vec::new();
        for node_id in collection.structure().ids() {
            if !row_ids.contains(&node_id) || !seen.insert(node_id) {
                unexpected.push(node_id);
            }
        }
        let missing: Vec<Uuid> = row_ids
            .into_iter()
            .filter(|row_id| !seen.contains(row_id))
            .collect();
        if missing.is_empty() && unexpected.is_empty() {
            return Ok(());
        }
        Err(EngineError::StructureMismatch {
            collection_id: id,
            missing,
            unexpected,
        })
    }

    /// Resolve a document's collection, lock it, and open a transaction.
    /// Re-resolves when a concurrent move relocated the document while we
    /// waited on the lock, so the guard we hold always matches the row we
    /// read.
    async fn lock_document(
        &self,
        id: Uuid,
    ) -> Result<
        (
            Document,
            Collection,
            CollectionGuard,
            Transaction<'static, Sqlite>,
        ),
        EngineError,
    > {
        loop {
            let document = Document::get(&*self.database, id)
                .await?
                .ok_or(EngineError::DocumentNotFound(id))?;
            let collection_id = *document.collection_id;

            let guard = self.locks.acquire(collection_id).await;
            let mut tx = self.database.begin().await?;
            match Document::get(&mut *tx, id).await? {
                Some(document) if *document.collection_id == collection_id => {
                    let collection = require_collection(&mut tx, collection_id).await?;
                    return Ok((document, collection, guard, tx));
                }
                Some(_) => continue,
                None => return Err(EngineError::DocumentNotFound(id)),
            }
        }
    }
}

async fn require_collection(
    conn: &mut DatabaseConnection,
    id: Uuid,
) -> Result<Collection, EngineError> {
    let collection = Collection::get(&mut *conn, id)
        .await?
        .ok_or(EngineError::CollectionNotFound(id))?;
    if collection.is_deleted() {
        return Err(EngineError::CollectionDeleted(id));
    }
    Ok(collection)
}

async fn require_document(conn: &mut DatabaseConnection, id: Uuid) -> Result<Document, EngineError> {
    Document::get(&mut *conn, id)
        .await?
        .ok_or(EngineError::DocumentNotFound(id))
}

#[cfg(test)]
mod test {
    use super::*;

    async fn engine() -> Engine {
        Engine::from_config(&Config::default()).await.unwrap()
    }

    #[tokio::test]
    async fn test_from_config_defaults_to_memory() {
        let engine = engine().await;
        let collection = engine
            .create_collection("notes", Sort::default())
            .await
            .unwrap();
        let fetched = engine.collection(*collection.id).await.unwrap();
        assert!(fetched.is_some());
        assert!(engine.structure(*collection.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_targets_are_typed_errors() {
        let engine = engine().await;
        let missing = Uuid::new_v4();

        assert!(matches!(
            engine.structure(missing).await,
            Err(EngineError::CollectionNotFound(id)) if id == missing
        ));
        assert!(matches!(
            engine.publish_document(missing).await,
            Err(EngineError::DocumentNotFound(id)) if id == missing
        ));
        assert!(matches!(
            engine.delete_membership(missing).await,
            Err(EngineError::MembershipNotFound(id)) if id == missing
        ));
    }

    #[tokio::test]
    async fn test_maintainer_is_users_on_collections_only() {
        let engine = engine().await;
        let actor = Uuid::new_v4();
        let collection = engine
            .create_collection("notes", Sort::default())
            .await
            .unwrap();
        let document = engine
            .create_document(*collection.id, None, "doc", false, actor)
            .await
            .unwrap();

        // documents cap at read-write
        assert!(matches!(
            engine
                .create_document_membership(
                    *document.id,
                    Principal::user(Uuid::new_v4()),
                    Permission::Maintainer,
                    actor,
                )
                .await,
            Err(EngineError::MaintainerNotAllowed)
        ));
        // groups never hold maintainer
        assert!(matches!(
            engine
                .create_collection_membership(
                    *collection.id,
                    Principal::group(Uuid::new_v4()),
                    Permission::Maintainer,
                    actor,
                )
                .await,
            Err(EngineError::MaintainerNotAllowed)
        ));
        // users on collections may
        let membership = engine
            .create_collection_membership(
                *collection.id,
                Principal::user(Uuid::new_v4()),
                Permission::Maintainer,
                actor,
            )
            .await
            .unwrap();
        assert_eq!(*membership.permission, Permission::Maintainer);
    }

    #[tokio::test]
    async fn test_create_document_validates_parent_collection() {
        let engine = engine().await;
        let actor = Uuid::new_v4();
        let first = engine
            .create_collection("first", Sort::default())
            .await
            .unwrap();
        let second = engine
            .create_collection("second", Sort::default())
            .await
            .unwrap();
        let parent = engine
            .create_document(*first.id, None, "parent", false, actor)
            .await
            .unwrap();

        let result = engine
            .create_document(*second.id, Some(*parent.id), "child", false, actor)
            .await;
        assert!(matches!(
            result,
            Err(EngineError::ParentOutsideCollection { parent: p, collection: c })
                if p == *parent.id && c == *second.id
        ));
    }

    #[tokio::test]
    async fn test_destroyed_collection_rejects_document_ops() {
        let engine = engine().await;
        let actor = Uuid::new_v4();
        let collection = engine
            .create_collection("gone", Sort::default())
            .await
            .unwrap();
        let document = engine
            .create_document(*collection.id, None, "doc", false, actor)
            .await
            .unwrap();

        engine.destroy_collection(*collection.id).await.unwrap();
        // second destroy is a no-op
        engine.destroy_collection(*collection.id).await.unwrap();

        assert!(matches!(
            engine.publish_document(*document.id).await,
            Err(EngineError::CollectionDeleted(id)) if id == *collection.id
        ));
        let reloaded = engine.document(*document.id).await.unwrap().unwrap();
        assert!(reloaded.deleted_at.is_some());
    }

    #[tokio::test]
    async fn test_verify_collection_reports_divergence() {
        let engine = engine().await;
        let actor = Uuid::new_v4();
        let collection = engine
            .create_collection("audit", Sort::default())
            .await
            .unwrap();
        let document = engine
            .create_document(*collection.id, None, "doc", false, actor)
            .await
            .unwrap();
        engine.publish_document(*document.id).await.unwrap();
        engine.verify_collection(*collection.id).await.unwrap();

        // wipe the tree behind the engine's back
        let mut conn = engine.database().acquire().await.unwrap();
        Collection::save_structure(&mut conn, *collection.id, &DocumentStructure::new())
            .await
            .unwrap();
        drop(conn);

        let result = engine.verify_collection(*collection.id).await;
        match result {
            Err(EngineError::StructureMismatch {
                collection_id,
                missing,
                unexpected,
            }) => {
                assert_eq!(collection_id, *collection.id);
                assert_eq!(missing, vec![*document.id]);
                assert!(unexpected.is_empty());
            }
            other => panic!("expected structure mismatch, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_verify_collection_flags_duplicate_nodes() {
        let engine = engine().await;
        let actor = Uuid::new_v4();
        let collection = engine
            .create_collection("audit", Sort::default())
            .await
            .unwrap();
        let document = engine
            .create_document(*collection.id, None, "doc", false, actor)
            .await
            .unwrap();
        let document = engine.publish_document(*document.id).await.unwrap();

        // hand-craft a tree carrying the same id twice
        let rogue_id = Uuid::new_v4();
        let rogue = NavigationNode::with_children(
            rogue_id,
            "ghost",
            "/doc/ghost-00000000",
            vec![document.navigation_node()],
        );
        let mut structure = DocumentStructure::new();
        structure.insert(document.navigation_node(), None, None);
        structure.insert(rogue, None, None);

        let mut conn = engine.database().acquire().await.unwrap();
        Collection::save_structure(&mut conn, *collection.id, &structure)
            .await
            .unwrap();
        drop(conn);

        match engine.verify_collection(*collection.id).await {
            Err(EngineError::StructureMismatch {
                missing,
                unexpected,
                ..
            }) => {
                assert!(missing.is_empty());
                assert!(unexpected.contains(&rogue_id));
                assert!(unexpected.contains(&*document.id));
            }
            other => panic!("expected structure mismatch, got {other:?}"),
        }
    }
}
