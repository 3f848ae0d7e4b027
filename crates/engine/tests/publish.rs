//! Integration tests for publishing and the navigation tree shape

mod common;

use uuid::Uuid;

#[tokio::test]
async fn test_publish_builds_parent_child_shape() {
    let (engine, collection_id, actor) = common::setup_test_env().await;

    // an unpublished collection has no tree at all
    assert!(engine.structure(collection_id).await.unwrap().is_empty());

    let doc1 = common::publish_new(&engine, collection_id, None, "Doc 1", actor).await;
    let structure = engine.structure(collection_id).await.unwrap();
    assert_eq!(structure.ids(), vec![*doc1.id]);
    assert!(structure.nodes()[0].children.is_empty());

    let doc2 = common::publish_new(&engine, collection_id, Some(*doc1.id), "Doc 2", actor).await;
    let structure = engine.structure(collection_id).await.unwrap();
    assert_eq!(structure.nodes().len(), 1);
    assert_eq!(structure.nodes()[0].id, *doc1.id);
    assert_eq!(structure.nodes()[0].children.len(), 1);
    assert_eq!(structure.nodes()[0].children[0].id, *doc2.id);

    // the subtree query reproduces the same relationship
    let tree = engine
        .document_tree(collection_id, *doc1.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(tree.children.len(), 1);
    assert_eq!(tree.children[0].id, *doc2.id);
    assert_eq!(
        engine
            .document_parents(collection_id, *doc2.id)
            .await
            .unwrap(),
        Some(vec![*doc1.id])
    );

    engine.verify_collection(collection_id).await.unwrap();
}

#[tokio::test]
async fn test_new_sibling_lands_at_index_zero() {
    let (engine, collection_id, actor) = common::setup_test_env().await;

    let first = common::publish_new(&engine, collection_id, None, "first", actor).await;
    let second = common::publish_new(&engine, collection_id, None, "second", actor).await;

    let structure = engine.structure(collection_id).await.unwrap();
    assert_eq!(structure.ids(), vec![*second.id, *first.id]);
}

#[tokio::test]
async fn test_publish_is_idempotent() {
    let (engine, collection_id, actor) = common::setup_test_env().await;

    let doc = common::publish_new(&engine, collection_id, None, "doc", actor).await;
    let again = engine.publish_document(*doc.id).await.unwrap();
    assert_eq!(again.published_at, doc.published_at);

    let structure = engine.structure(collection_id).await.unwrap();
    assert_eq!(structure.node_count(), 1);
}

#[tokio::test]
async fn test_drafts_and_templates_stay_out_of_the_tree() {
    let (engine, collection_id, actor) = common::setup_test_env().await;

    // a draft has a row but no node
    let draft = engine
        .create_document(collection_id, None, "draft", false, actor)
        .await
        .unwrap();
    assert!(draft.published_at.is_none());
    assert!(engine.structure(collection_id).await.unwrap().is_empty());

    // a published template gets the stamp but still no node
    let template = engine
        .create_document(collection_id, None, "template", true, actor)
        .await
        .unwrap();
    let template = engine.publish_document(*template.id).await.unwrap();
    assert!(template.published_at.is_some());
    assert!(engine.structure(collection_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_publish_under_draft_parent_waits_for_the_parent() {
    let (engine, collection_id, actor) = common::setup_test_env().await;

    let parent = engine
        .create_document(collection_id, None, "parent", false, actor)
        .await
        .unwrap();
    let child = engine
        .create_document(collection_id, Some(*parent.id), "child", false, actor)
        .await
        .unwrap();

    // the parent has no node, so publishing the child leaves the tree alone
    engine.publish_document(*child.id).await.unwrap();
    assert!(engine.structure(collection_id).await.unwrap().is_empty());

    // publishing the parent surfaces the whole visible subtree
    engine.publish_document(*parent.id).await.unwrap();
    let structure = engine.structure(collection_id).await.unwrap();
    assert_eq!(structure.nodes().len(), 1);
    assert_eq!(structure.nodes()[0].id, *parent.id);
    assert_eq!(structure.nodes()[0].children[0].id, *child.id);

    engine.verify_collection(collection_id).await.unwrap();
}

#[tokio::test]
async fn test_unpublish_promotes_children_to_top_level() {
    let (engine, collection_id, actor) = common::setup_test_env().await;

    let parent = common::publish_new(&engine, collection_id, None, "parent", actor).await;
    let child_a = common::publish_new(&engine, collection_id, Some(*parent.id), "a", actor).await;
    let child_b = common::publish_new(&engine, collection_id, Some(*parent.id), "b", actor).await;
    let grandchild =
        common::publish_new(&engine, collection_id, Some(*child_a.id), "deep", actor).await;

    let parent = engine.unpublish_document(*parent.id).await.unwrap();
    assert!(parent.published_at.is_none());

    let structure = engine.structure(collection_id).await.unwrap();
    assert!(!structure.contains(*parent.id));
    // both children now live at the top level, subtrees intact
    assert!(structure
        .nodes()
        .iter()
        .any(|node| node.id == *child_a.id && node.children[0].id == *grandchild.id));
    assert!(structure.nodes().iter().any(|node| node.id == *child_b.id));

    let child_a = engine.document(*child_a.id).await.unwrap().unwrap();
    assert!(child_a.parent_document_id.is_none());

    engine.verify_collection(collection_id).await.unwrap();
}

#[tokio::test]
async fn test_unpublish_missing_document_errors() {
    let (engine, _collection_id, _actor) = common::setup_test_env().await;
    assert!(engine.unpublish_document(Uuid::new_v4()).await.is_err());
}

#[tokio::test]
async fn test_rename_updates_cached_node_fields() {
    let (engine, collection_id, actor) = common::setup_test_env().await;

    let parent = common::publish_new(&engine, collection_id, None, "parent", actor).await;
    let child = common::publish_new(&engine, collection_id, Some(*parent.id), "child", actor).await;

    let renamed = engine.update_document(*parent.id, "Handbook").await.unwrap();
    assert_eq!(renamed.title, "Handbook");
    assert!(renamed.url.starts_with("/doc/handbook-"));

    let structure = engine.structure(collection_id).await.unwrap();
    let node = structure.find(*parent.id).unwrap();
    assert_eq!(node.title, "Handbook");
    assert_eq!(node.url, renamed.url);
    // children keep their place through a rename
    assert_eq!(node.children[0].id, *child.id);
}
