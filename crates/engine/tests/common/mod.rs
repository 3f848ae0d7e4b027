//! Shared test utilities for engine integration tests
#![allow(dead_code)]

use common::prelude::*;
use engine::config::Config;
use engine::database::models::{Document, Membership};
use engine::lifecycle::Engine;
use uuid::Uuid;

/// Route engine tracing to the test output when RUST_LOG asks for it.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Set up a test environment with an in-memory engine, one collection, and
/// an acting user id.
pub async fn setup_test_env() -> (Engine, Uuid, Uuid) {
    init_tracing();
    let engine = Engine::from_config(&Config::default()).await.unwrap();
    let collection = engine
        .create_collection("test", Sort::default())
        .await
        .unwrap();
    let actor = Uuid::new_v4();
    (engine, *collection.id, actor)
}

/// Create a draft and publish it in one step.
pub async fn publish_new(
    engine: &Engine,
    collection_id: Uuid,
    parent: Option<Uuid>,
    title: &str,
    actor: Uuid,
) -> Document {
    let document = engine
        .create_document(collection_id, parent, title, false, actor)
        .await
        .unwrap();
    engine.publish_document(*document.id).await.unwrap()
}

/// Grant `principal` access to a document and return the root membership.
pub async fn grant(
    engine: &Engine,
    document_id: Uuid,
    principal: Principal,
    permission: Permission,
    actor: Uuid,
) -> Membership {
    engine
        .create_document_membership(document_id, principal, permission, actor)
        .await
        .unwrap()
}

/// All membership rows on a document, split into (roots, sourced).
pub async fn rows_on(engine: &Engine, document_id: Uuid) -> (Vec<Membership>, Vec<Membership>) {
    let rows = engine.memberships_for_document(document_id).await.unwrap();
    rows.into_iter().partition(|m| m.is_root())
}
