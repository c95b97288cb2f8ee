pub mod hclust;
pub mod node;
pub mod order;
pub mod tree;

pub use hclust::{cut_tree, Hclust, Linkage};
pub use node::{ClusterNode, NodeId, NodeKind};
pub use tree::ClusterTree;
