use crate::libs::pvec::Pvec;

/// Stable arena index of a tree node.
pub type NodeId = usize;

/// Child configuration captured when a node's ancestral vector was last
/// computed. A later traversal that sees the same children and branch
/// lengths may reuse the stored vector instead of recomputing the
/// subtree.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewRecord {
    pub child1: NodeId,
    pub child2: NodeId,
    pub z1: f64,
    pub z2: f64,
}

impl ViewRecord {
    /// Children are an unordered pair; the vector combination is
    /// symmetric, so a swapped match is still a match. Lengths compare
    /// exactly, which rollback guarantees bit-identical.
    pub fn matches(&self, c1: NodeId, c2: NodeId, z1: f64, z2: f64) -> bool {
        (self.child1 == c1 && self.child2 == c2 && self.z1 == z1 && self.z2 == z2)
            || (self.child1 == c2 && self.child2 == c1 && self.z1 == z2 && self.z2 == z1)
    }
}

/// A ternary-linked node: up to three neighbor indices with per-slot
/// branch lengths. Tips use one slot, inner nodes all three. The
/// ancestral vector and its view record are caches owned by the node
/// but managed by the insertion engine.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Node {
    neighbors: [Option<NodeId>; 3],
    lengths: [f64; 3],
    tip_name: Option<String>,
    label: Option<String>,
    pub pvec: Option<Pvec>,
    pub view: Option<ViewRecord>,
}

impl Node {
    pub(super) fn new_inner() -> Self {
        Self::default()
    }

    pub(super) fn new_tip(name: &str) -> Self {
        Self {
            tip_name: Some(name.to_string()),
            ..Self::default()
        }
    }

    pub fn is_tip(&self) -> bool {
        self.tip_name.is_some()
    }

    pub fn tip_name(&self) -> Option<&str> {
        self.tip_name.as_deref()
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub(super) fn set_label(&mut self, label: &str) {
        self.label = Some(label.to_string());
    }

    pub fn degree(&self) -> usize {
        self.neighbors.iter().flatten().count()
    }

    /// Occupied neighbor slots in slot order, with branch lengths.
    pub fn neighbors(&self) -> impl Iterator<Item = (NodeId, f64)> + '_ {
        self.neighbors
            .iter()
            .zip(self.lengths.iter())
            .filter_map(|(n, &z)| n.map(|id| (id, z)))
    }

    pub fn neighbor_at(&self, slot: usize) -> Option<NodeId> {
        self.neighbors[slot]
    }

    pub fn length_to(&self, other: NodeId) -> Option<f64> {
        self.slot_of(other).map(|s| self.lengths[s])
    }

    pub(super) fn slot_of(&self, other: NodeId) -> Option<usize> {
        self.neighbors.iter().position(|&n| n == Some(other))
    }

    pub(super) fn free_slot(&self) -> Option<usize> {
        self.neighbors.iter().position(|n| n.is_none())
    }

    pub(super) fn set_slot(&mut self, slot: usize, other: NodeId, z: f64) {
        self.neighbors[slot] = Some(other);
        self.lengths[slot] = z;
    }

    pub(super) fn clear_slot(&mut self, slot: usize) -> f64 {
        self.neighbors[slot] = None;
        std::mem::replace(&mut self.lengths[slot], 0.0)
    }
}
