use serde::{Deserialize, Serialize};
use uuid::Uuid;

/**
 * Navigation nodes
 * ================
 * Nodes are the building blocks of a collection's navigation structure.
 *  Each node stands for one visible document and caches the two display
 *  fields the navigation UI needs (title and url), so rendering a sidebar
 *  never touches the document rows themselves.
 * Children are ordered: a node's `children` vec *is* the manual display
 *  order of the documents nested beneath it.
 */
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationNode {
    pub id: Uuid,
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub children: Vec<NavigationNode>,
}

impl NavigationNode {
    /// Create a leaf node with no children.
    pub fn new(id: Uuid, title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            url: url.into(),
            children: Vec::new(),
        }
    }

    /// Create a node with an existing subtree attached.
    pub fn with_children(
        id: Uuid,
        title: impl Into<String>,
        url: impl Into<String>,
        children: Vec<NavigationNode>,
    ) -> Self {
        Self {
            id,
            title: title.into(),
            url: url.into(),
            children,
        }
    }

    /// Number of nodes in this subtree, counting self.
    pub fn subtree_size(&self) -> usize {
        1 + self
            .children
            .iter()
            .map(NavigationNode::subtree_size)
            .sum::<usize>()
    }

    /// Ids of this subtree in preorder, counting self.
    pub fn subtree_ids(&self) -> Vec<Uuid> {
        let mut ids = Vec::with_capacity(self.subtree_size());
        self.collect_ids(&mut ids);
        ids
    }

    fn collect_ids(&self, ids: &mut Vec<Uuid>) {
        ids.push(self.id);
        for child in &self.children {
            child.collect_ids(ids);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_node_encode_decode() {
        let node = NavigationNode::with_children(
            Uuid::new_v4(),
            "Welcome",
            "/doc/welcome-a1b2c3d4",
            vec![NavigationNode::new(
                Uuid::new_v4(),
                "Nested",
                "/doc/nested-e5f6a7b8",
            )],
        );

        let encoded = serde_json::to_string(&node).unwrap();
        let decoded: NavigationNode = serde_json::from_str(&encoded).unwrap();

        assert_eq!(node, decoded);
    }

    #[test]
    fn test_children_default_when_absent() {
        // Stored blobs may omit the children key entirely for leaves
        let id = Uuid::new_v4();
        let raw = format!(r#"{{"id":"{id}","title":"Leaf","url":"/doc/leaf-00000000"}}"#);
        let node: NavigationNode = serde_json::from_str(&raw).unwrap();

        assert_eq!(node.id, id);
        assert!(node.children.is_empty());
    }

    #[test]
    fn test_subtree_accounting() {
        let inner = NavigationNode::with_children(
            Uuid::new_v4(),
            "B",
            "/doc/b",
            vec![NavigationNode::new(Uuid::new_v4(), "C", "/doc/c")],
        );
        let root = NavigationNode::with_children(Uuid::new_v4(), "A", "/doc/a", vec![inner]);

        assert_eq!(root.subtree_size(), 3);
        let ids = root.subtree_ids();
        assert_eq!(ids.len(), 3);
        assert_eq!(ids[0], root.id);
    }
}
