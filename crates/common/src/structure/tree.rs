use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::node::NavigationNode;
use super::sort::Sort;

/// A node lifted out of the tree, along with the position it held in its
/// parent's child list. The index lets callers restore the node to its
/// original slot later (archive and then unarchive, for example).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovedNode {
    pub node: NavigationNode,
    pub index: usize,
}

/**
 * Document structure
 * ==================
 * The whole navigation tree of one collection, stored as a single JSON
 *  value on the collection row. Every mutation here happens on an owned
 *  copy under the owning collection's lock and is written back whole, so
 *  these operations never see concurrent edits.
 * The operations share three traversal primitives: a read-only walk, a
 *  by-id locate (shared or mutable), and a rebuild that filters matching
 *  nodes out of every level. Everything else is defined in terms of those.
 * Absent ids are not errors at this layer. An insert under a parent that
 *  has no node yet quietly does nothing, removing an id that is not there
 *  returns `None`. The tree also tolerates duplicate ids left behind by
 *  older writers: removal clears all of them in one pass.
 */
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentStructure(Vec<NavigationNode>);

impl DocumentStructure {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn from_nodes(nodes: Vec<NavigationNode>) -> Self {
        Self(nodes)
    }

    /// The top-level nodes in stored (manual) order.
    pub fn nodes(&self) -> &[NavigationNode] {
        &self.0
    }

    pub fn into_nodes(self) -> Vec<NavigationNode> {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Total number of nodes across all levels.
    pub fn node_count(&self) -> usize {
        let mut count = 0;
        self.walk(&mut |_| count += 1);
        count
    }

    /// Visit every node in preorder, parents before children.
    pub fn walk(&self, f: &mut impl FnMut(&NavigationNode)) {
        fn visit(nodes: &[NavigationNode], f: &mut impl FnMut(&NavigationNode)) {
            for node in nodes {
                f(node);
                visit(&node.children, f);
            }
        }
        visit(&self.0, f);
    }

    /// All document ids in the tree, in preorder.
    pub fn ids(&self) -> Vec<Uuid> {
        let mut ids = Vec::new();
        self.walk(&mut |node| ids.push(node.id));
        ids
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.find(id).is_some()
    }

    /// First node with the given id, checking each node before its children.
    pub fn find(&self, id: Uuid) -> Option<&NavigationNode> {
        Self::find_in(&self.0, id)
    }

    fn find_in(nodes: &[NavigationNode], id: Uuid) -> Option<&NavigationNode> {
        for node in nodes {
            if node.id == id {
                return Some(node);
            }
            if let Some(found) = Self::find_in(&node.children, id) {
                return Some(found);
            }
        }
        None
    }

    fn find_in_mut(nodes: &mut [NavigationNode], id: Uuid) -> Option<&mut NavigationNode> {
        for node in nodes {
            if node.id == id {
                return Some(node);
            }
            if let Some(found) = Self::find_in_mut(&mut node.children, id) {
                return Some(found);
            }
        }
        None
    }

    /// Insert `node` under `parent_id` (top level when `None`) at `index`,
    /// defaulting to the end of the sibling list. Out-of-range indexes are
    /// clamped rather than rejected.
    ///
    /// Returns whether the tree changed. Two cases quietly leave it as is:
    /// the id is already present somewhere (re-publishing is idempotent),
    /// or the parent has no node yet (its document is not visible, so the
    /// child has nowhere to hang; callers surface the parent first).
    pub fn insert(
        &mut self,
        node: NavigationNode,
        parent_id: Option<Uuid>,
        index: Option<usize>,
    ) -> bool {
        if self.contains(node.id) {
            return false;
        }

        let siblings = match parent_id {
            None => &mut self.0,
            Some(parent_id) => match Self::find_in_mut(&mut self.0, parent_id) {
                Some(parent) => &mut parent.children,
                None => return false,
            },
        };

        let index = index.unwrap_or(siblings.len()).min(siblings.len());
        siblings.insert(index, node);
        true
    }

    /// Remove every node carrying `id`, rebuilding each level without the
    /// matches. Returns the first removed node together with the index it
    /// held among its siblings, or `None` when the id was not present.
    ///
    /// A removed node takes its whole subtree with it; descendants are part
    /// of the returned node, not reattached.
    pub fn remove(&mut self, id: Uuid) -> Option<RemovedNode> {
        let mut removed = None;
        let nodes = std::mem::take(&mut self.0);
        self.0 = Self::remove_from(nodes, id, &mut removed);
        removed
    }

    fn remove_from(
        nodes: Vec<NavigationNode>,
        id: Uuid,
        removed: &mut Option<RemovedNode>,
    ) -> Vec<NavigationNode> {
        let mut kept = Vec::with_capacity(nodes.len());
        for (index, mut node) in nodes.into_iter().enumerate() {
            if node.id == id {
                if removed.is_none() {
                    *removed = Some(RemovedNode { node, index });
                }
                continue;
            }
            node.children = Self::remove_from(std::mem::take(&mut node.children), id, removed);
            kept.push(node);
        }
        kept
    }

    /// Refresh the cached display fields on every node carrying `id`,
    /// leaving children and position untouched. Returns whether any node
    /// matched.
    pub fn update_metadata(&mut self, id: Uuid, title: &str, url: &str) -> bool {
        fn visit(nodes: &mut [NavigationNode], id: Uuid, title: &str, url: &str) -> bool {
            let mut changed = false;
            for node in nodes {
                if node.id == id {
                    node.title = title.to_string();
                    node.url = url.to_string();
                    changed = true;
                }
                changed |= visit(&mut node.children, id, title, url);
            }
            changed
        }
        visit(&mut self.0, id, title, url)
    }

    /// Clone the subtree rooted at `id`, with only the returned node's
    /// immediate children ordered per `sort`. Deeper levels keep stored
    /// order; callers sort those on their own recursive reads.
    pub fn node(&self, id: Uuid, sort: &Sort) -> Option<NavigationNode> {
        let mut node = self.find(id)?.clone();
        sort.apply(&mut node.children);
        Some(node)
    }

    /// Ids of the ancestors of `id`, from the top level down to its
    /// immediate parent. Empty for a top-level node, `None` when the id is
    /// not in the tree at all.
    pub fn ancestor_ids(&self, id: Uuid) -> Option<Vec<Uuid>> {
        fn search(nodes: &[NavigationNode], id: Uuid, path: &mut Vec<Uuid>) -> bool {
            for node in nodes {
                if node.id == id {
                    return true;
                }
                path.push(node.id);
                if search(&node.children, id, path) {
                    return true;
                }
                path.pop();
            }
            false
        }

        let mut path = Vec::new();
        search(&self.0, id, &mut path).then_some(path)
    }

    /// Position of the node carrying `id` within its sibling list, first
    /// match in preorder. `None` when the id is not in the tree.
    pub fn sibling_index(&self, id: Uuid) -> Option<usize> {
        fn search(nodes: &[NavigationNode], id: Uuid) -> Option<usize> {
            for (index, node) in nodes.iter().enumerate() {
                if node.id == id {
                    return Some(index);
                }
                if let Some(found) = search(&node.children, id) {
                    return Some(found);
                }
            }
            None
        }

        search(&self.0, id)
    }
}
