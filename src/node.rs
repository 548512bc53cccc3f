use crate::data_wrappers::SparseRow;
use crate::ClusteringError;
use num_traits::Float;
use std::collections::HashMap;

/// A stable handle to a node inside a `Dendrogram`.
pub type NodeId = usize;

/// One input match in the tree.
#[derive(Debug, Clone, PartialEq)]
pub struct LeafNode<T> {
    pub(crate) index: usize,
    pub(crate) coords: SparseRow<T>,
    pub(crate) parent: Option<NodeId>,
}

impl<T> LeafNode<T> {
    /// The index of the match this leaf stands for.
    pub fn index(&self) -> usize {
        self.index
    }

    /// The match's correlation row.
    pub fn coords(&self) -> &SparseRow<T> {
        &self.coords
    }
}

/// A binary merge of two subtrees.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterNode<T> {
    pub(crate) first: NodeId,
    pub(crate) second: NodeId,
    pub(crate) distance_squared: T,
    pub(crate) first_leaf: NodeId,
    pub(crate) second_leaf: NodeId,
    pub(crate) leaf_count: usize,
    pub(crate) parent: Option<NodeId>,
}

impl<T: Float> ClusterNode<T> {
    pub fn first(&self) -> NodeId {
        self.first
    }

    pub fn second(&self) -> NodeId {
        self.second
    }

    /// The squared distance at which the children merged. Infinite for forced merges of
    /// components that never became neighbours.
    pub fn distance_squared(&self) -> T {
        self.distance_squared
    }

    pub fn is_forced(&self) -> bool {
        self.distance_squared.is_infinite()
    }

    pub fn leaf_count(&self) -> usize {
        self.leaf_count
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node<T> {
    Leaf(LeafNode<T>),
    Cluster(ClusterNode<T>),
}

impl<T> Node<T> {
    fn parent(&self) -> Option<NodeId> {
        match self {
            Node::Leaf(leaf) => leaf.parent,
            Node::Cluster(cluster) => cluster.parent,
        }
    }

    fn set_parent(&mut self, parent: Option<NodeId>) {
        match self {
            Node::Leaf(leaf) => leaf.parent = parent,
            Node::Cluster(cluster) => cluster.parent = parent,
        }
    }
}

/// The cluster tree. Nodes live in an arena and refer to their children and parent by
/// `NodeId`, so subtrees can be swapped in place without invalidating any handle. Nodes that
/// are replaced stay in the arena but are no longer reachable from the roots.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dendrogram<T> {
    nodes: Vec<Node<T>>,
    roots: Vec<NodeId>,
}

impl<T: Float> Dendrogram<T> {
    pub fn new() -> Self {
        Dendrogram {
            nodes: Vec::new(),
            roots: Vec::new(),
        }
    }

    pub fn node(&self, id: NodeId) -> &Node<T> {
        &self.nodes[id]
    }

    /// The leaf behind a handle, if the handle is a leaf.
    pub fn leaf(&self, id: NodeId) -> Option<&LeafNode<T>> {
        match &self.nodes[id] {
            Node::Leaf(leaf) => Some(leaf),
            Node::Cluster(_) => None,
        }
    }

    pub fn cluster(&self, id: NodeId) -> Option<&ClusterNode<T>> {
        match &self.nodes[id] {
            Node::Cluster(cluster) => Some(cluster),
            Node::Leaf(_) => None,
        }
    }

    pub fn is_leaf(&self, id: NodeId) -> bool {
        matches!(self.nodes[id], Node::Leaf(_))
    }

    /// The root nodes, normally just one.
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].parent()
    }

    /// Every node above `id`, nearest first.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(id), move |&node| self.parent(node))
    }

    /// The topmost node of the subtree containing `id`.
    pub fn root_of(&self, id: NodeId) -> NodeId {
        self.ancestors(id).last().unwrap_or(id)
    }

    pub fn leaf_count(&self, id: NodeId) -> usize {
        match &self.nodes[id] {
            Node::Leaf(_) => 1,
            Node::Cluster(cluster) => cluster.leaf_count,
        }
    }

    /// The leftmost leaf of the subtree.
    pub fn first_leaf(&self, id: NodeId) -> NodeId {
        match &self.nodes[id] {
            Node::Leaf(_) => id,
            Node::Cluster(cluster) => cluster.first_leaf,
        }
    }

    /// The rightmost leaf of the subtree.
    pub fn second_leaf(&self, id: NodeId) -> NodeId {
        match &self.nodes[id] {
            Node::Leaf(_) => id,
            Node::Cluster(cluster) => cluster.second_leaf,
        }
    }

    /// The leaves of the subtree, left to right.
    pub fn ordered_leaves(&self, id: NodeId) -> Vec<NodeId> {
        let mut leaves = Vec::with_capacity(self.leaf_count(id));
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            match &self.nodes[current] {
                Node::Leaf(_) => leaves.push(current),
                Node::Cluster(cluster) => {
                    stack.push(cluster.second);
                    stack.push(cluster.first);
                }
            }
        }
        leaves
    }

    /// The match indexes of the subtree's leaves, left to right.
    pub fn ordered_leaf_indexes(&self, id: NodeId) -> Vec<usize> {
        self.ordered_leaves(id)
            .into_iter()
            .filter_map(|leaf| self.leaf(leaf).map(|leaf| leaf.index))
            .collect()
    }

    /// Every leaf reachable from the roots, left to right.
    pub fn all_ordered_leaves(&self) -> Vec<NodeId> {
        self.roots
            .iter()
            .flat_map(|&root| self.ordered_leaves(root))
            .collect()
    }

    pub(crate) fn push_leaf(&mut self, index: usize, coords: SparseRow<T>) -> NodeId {
        self.nodes.push(Node::Leaf(LeafNode {
            index,
            coords,
            parent: None,
        }));
        self.nodes.len() - 1
    }

    /// Merges two parentless subtrees under a new cluster node.
    pub(crate) fn push_cluster(
        &mut self,
        first: NodeId,
        second: NodeId,
        distance_squared: T,
    ) -> NodeId {
        let id = self.nodes.len();
        let cluster = ClusterNode {
            first,
            second,
            distance_squared,
            first_leaf: self.first_leaf(first),
            second_leaf: self.second_leaf(second),
            leaf_count: self.leaf_count(first) + self.leaf_count(second),
            parent: None,
        };
        self.nodes.push(Node::Cluster(cluster));
        self.nodes[first].set_parent(Some(id));
        self.nodes[second].set_parent(Some(id));
        id
    }

    pub(crate) fn set_roots(&mut self, roots: Vec<NodeId>) {
        self.roots = roots;
    }

    /// Puts `new` in the place of `old` under `old`'s parent, or among the roots if `old` has
    /// no parent. `old` is detached. Leaf counts and representative leaves above the swap are
    /// refreshed.
    pub fn replace_node(&mut self, old: NodeId, new: NodeId) -> Result<(), ClusteringError> {
        match self.parent(old) {
            Some(parent) => self.replace_child(parent, old, new),
            None => self.replace_root(old, new),
        }
    }

    /// Replaces the child `old` of `parent` with `new`.
    pub fn replace_child(
        &mut self,
        parent: NodeId,
        old: NodeId,
        new: NodeId,
    ) -> Result<(), ClusteringError> {
        match &mut self.nodes[parent] {
            Node::Cluster(cluster) if cluster.first == old => cluster.first = new,
            Node::Cluster(cluster) if cluster.second == old => cluster.second = new,
            _ => {
                return Err(ClusteringError::InternalInvariant(format!(
                    "node {old} is not a child of node {parent}"
                )))
            }
        }
        self.nodes[old].set_parent(None);
        self.nodes[new].set_parent(Some(parent));
        self.refresh_upwards(parent);
        Ok(())
    }

    /// Replaces the root `old` with `new`.
    pub fn replace_root(&mut self, old: NodeId, new: NodeId) -> Result<(), ClusteringError> {
        let position = self.roots.iter().position(|&root| root == old).ok_or_else(|| {
            ClusteringError::InternalInvariant(format!("node {old} is not a root"))
        })?;
        self.roots[position] = new;
        self.nodes[old].set_parent(None);
        self.nodes[new].set_parent(None);
        Ok(())
    }

    fn refresh_upwards(&mut self, from: NodeId) {
        let mut current = Some(from);
        while let Some(id) = current {
            let (first, second) = match &self.nodes[id] {
                Node::Cluster(cluster) => (cluster.first, cluster.second),
                Node::Leaf(_) => break,
            };
            let first_leaf = self.first_leaf(first);
            let second_leaf = self.second_leaf(second);
            let leaf_count = self.leaf_count(first) + self.leaf_count(second);
            if let Node::Cluster(cluster) = &mut self.nodes[id] {
                cluster.first_leaf = first_leaf;
                cluster.second_leaf = second_leaf;
                cluster.leaf_count = leaf_count;
                current = cluster.parent;
            }
        }
    }

    /// Copies the subtree under `root` of `other` into this tree. Leaves whose match index is
    /// in `existing_leaves` are not copied: the existing leaf takes their place (it is detached
    /// from its old parent first), so match identity is never duplicated.
    ///
    /// # Returns
    /// * The handle of the copied subtree's root in this tree.
    pub fn graft(
        &mut self,
        other: &Dendrogram<T>,
        root: NodeId,
        existing_leaves: &HashMap<usize, NodeId>,
    ) -> NodeId {
        let mut mapped: HashMap<NodeId, NodeId> = HashMap::new();
        let mut stack = vec![(root, false)];
        while let Some((id, children_done)) = stack.pop() {
            match other.node(id) {
                Node::Leaf(leaf) => {
                    let new_id = match existing_leaves.get(&leaf.index) {
                        Some(&existing) => {
                            self.nodes[existing].set_parent(None);
                            existing
                        }
                        None => self.push_leaf(leaf.index, leaf.coords.clone()),
                    };
                    mapped.insert(id, new_id);
                }
                Node::Cluster(cluster) if children_done => {
                    let new_id = self.push_cluster(
                        mapped[&cluster.first],
                        mapped[&cluster.second],
                        cluster.distance_squared,
                    );
                    mapped.insert(id, new_id);
                }
                Node::Cluster(cluster) => {
                    stack.push((id, true));
                    stack.push((cluster.second, false));
                    stack.push((cluster.first, false));
                }
            }
        }
        mapped[&root]
    }
}
