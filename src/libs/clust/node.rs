use serde::{Deserialize, Serialize};

/// NodeId is an index into the ClusterTree's node vector.
pub type NodeId = usize;

/// Leaf or merge payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeKind<T> {
    /// One clustered element.
    Leaf { item: T },
    /// A merge of two or more subtrees at the given linkage distance.
    Merge { distance: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterNode<T> {
    /// Index in the arena
    pub id: NodeId,

    /// Parent node ID (None for root)
    pub parent: Option<NodeId>,

    /// Child node IDs, in left-to-right leaf order
    pub children: Vec<NodeId>,

    /// Row of the distance matrix for leaves (>= 0).
    /// Internal nodes carry negative indices, unique within one tree.
    pub index: isize,

    pub kind: NodeKind<T>,
}

impl<T> ClusterNode<T> {
    pub fn leaf(id: NodeId, item: T, index: isize) -> Self {
        Self {
            id,
            parent: None,
            children: Vec::new(),
            index,
            kind: NodeKind::Leaf { item },
        }
    }

    pub fn merge(id: NodeId, distance: f64, index: isize) -> Self {
        Self {
            id,
            parent: None,
            children: Vec::new(),
            index,
            kind: NodeKind::Merge { distance },
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf { .. })
    }

    /// Merge height; 0 for leaves.
    pub fn distance(&self) -> f64 {
        match self.kind {
            NodeKind::Leaf { .. } => 0.0,
            NodeKind::Merge { distance } => distance,
        }
    }

    pub fn item(&self) -> Option<&T> {
        match &self.kind {
            NodeKind::Leaf { item } => Some(item),
            NodeKind::Merge { .. } => None,
        }
    }
}
