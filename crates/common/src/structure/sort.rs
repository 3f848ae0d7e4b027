use serde::{Deserialize, Serialize};

use super::node::NavigationNode;

/// The field a collection orders sibling documents by.
///
/// `Index` is manual ordering: the stored structure already *is* the order,
/// so applying it never rearranges anything. `Title` orders alphabetically
/// at read time, case-insensitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortField {
    Title,
    Index,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

/// Read-time sibling ordering for a collection.
///
/// Stored on the collection row as JSON and applied to one level of
/// children at a time. Manual ordering (`Index`) ignores direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sort {
    pub field: SortField,
    pub direction: SortDirection,
}

impl Default for Sort {
    fn default() -> Self {
        Self {
            field: SortField::Index,
            direction: SortDirection::Asc,
        }
    }
}

impl Sort {
    pub fn by_title(direction: SortDirection) -> Self {
        Self {
            field: SortField::Title,
            direction,
        }
    }

    /// Order one level of sibling nodes in place.
    ///
    /// Only the given slice is touched; sorting deeper levels is the
    /// caller's job on its own recursive reads. The sort is stable, so
    /// title ties keep their stored order.
    pub fn apply(&self, nodes: &mut [NavigationNode]) {
        if self.field == SortField::Index {
            return;
        }
        match self.direction {
            SortDirection::Asc => nodes.sort_by_cached_key(|node| node.title.to_lowercase()),
            SortDirection::Desc => {
                nodes.sort_by(|a, b| b.title.to_lowercase().cmp(&a.title.to_lowercase()))
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use uuid::Uuid;

    fn titled(title: &str) -> NavigationNode {
        NavigationNode::new(Uuid::new_v4(), title, format!("/doc/{title}"))
    }

    fn titles(nodes: &[NavigationNode]) -> Vec<&str> {
        nodes.iter().map(|node| node.title.as_str()).collect()
    }

    #[test]
    fn test_index_sort_keeps_stored_order() {
        let mut nodes = vec![titled("zebra"), titled("apple"), titled("mango")];
        Sort::default().apply(&mut nodes);
        assert_eq!(titles(&nodes), vec!["zebra", "apple", "mango"]);
    }

    #[test]
    fn test_title_sort_is_case_insensitive() {
        let mut nodes = vec![titled("banana"), titled("Apple"), titled("cherry")];
        Sort::by_title(SortDirection::Asc).apply(&mut nodes);
        assert_eq!(titles(&nodes), vec!["Apple", "banana", "cherry"]);
    }

    #[test]
    fn test_title_sort_descending() {
        let mut nodes = vec![titled("banana"), titled("Apple"), titled("cherry")];
        Sort::by_title(SortDirection::Desc).apply(&mut nodes);
        assert_eq!(titles(&nodes), vec!["cherry", "banana", "Apple"]);
    }

    #[test]
    fn test_sort_round_trips_through_json() {
        let sort = Sort::by_title(SortDirection::Desc);
        let encoded = serde_json::to_string(&sort).unwrap();
        assert_eq!(encoded, r#"{"field":"title","direction":"desc"}"#);
        let decoded: Sort = serde_json::from_str(&encoded).unwrap();
        assert_eq!(sort, decoded);
    }
}
