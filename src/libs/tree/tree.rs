use anyhow::{bail, Result};
use std::ops::{Deref, DerefMut};

use super::node::{Node, NodeId};
use crate::libs::pvec::TipCase;

/// One bottom-up recomputation step: combine the vectors of `child1`
/// and `child2` over their branch lengths into `parent`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RootedBifurcation {
    pub parent: NodeId,
    pub child1: NodeId,
    pub child2: NodeId,
    pub z1: f64,
    pub z2: f64,
    pub tc: TipCase,
}

/// Arena of ternary-linked nodes. The tree owns every node for the
/// whole run; topology edits go through `link`/`unlink`, and the
/// scoped [`splice`](Tree::splice) guard is the only way to make a
/// provisional edit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id]
    }

    pub fn add_inner(&mut self) -> NodeId {
        self.nodes.push(Node::new_inner());
        self.nodes.len() - 1
    }

    pub fn add_tip(&mut self, name: &str) -> NodeId {
        self.nodes.push(Node::new_tip(name));
        self.nodes.len() - 1
    }

    pub fn set_label(&mut self, id: NodeId, label: &str) {
        self.nodes[id].set_label(label);
    }

    /// Connect two nodes with branch length `z`, each taking the
    /// other into its first free slot.
    pub fn link(&mut self, a: NodeId, b: NodeId, z: f64) -> Result<()> {
        let sa = match self.nodes[a].free_slot() {
            Some(s) => s,
            None => bail!("tree: node {} has no free neighbor slot", a),
        };
        let sb = match self.nodes[b].free_slot() {
            Some(s) => s,
            None => bail!("tree: node {} has no free neighbor slot", b),
        };

        self.nodes[a].set_slot(sa, b, z);
        self.nodes[b].set_slot(sb, a, z);
        Ok(())
    }

    /// Remove the edge between two nodes, returning its branch length.
    pub fn unlink(&mut self, a: NodeId, b: NodeId) -> Result<f64> {
        let sa = match self.nodes[a].slot_of(b) {
            Some(s) => s,
            None => bail!("tree: nodes {} and {} are not linked", a, b),
        };
        let sb = match self.nodes[b].slot_of(a) {
            Some(s) => s,
            None => bail!("tree: nodes {} and {} are not linked", a, b),
        };

        let z = self.nodes[a].clear_slot(sa);
        self.nodes[b].clear_slot(sb);
        Ok(z)
    }

    pub fn length_between(&self, a: NodeId, b: NodeId) -> Option<f64> {
        self.nodes[a].length_to(b)
    }

    pub fn tips(&self) -> Vec<NodeId> {
        (0..self.nodes.len())
            .filter(|&i| self.nodes[i].is_tip())
            .collect()
    }

    /// Labelled nodes in ascending numeric label order. Non-numeric
    /// labels sort last; they never occur on reconstruction output.
    pub fn labelled_nodes(&self) -> Vec<NodeId> {
        let mut out: Vec<NodeId> = (0..self.nodes.len())
            .filter(|&i| self.nodes[i].label().is_some())
            .collect();
        out.sort_by_key(|&i| {
            self.nodes[i]
                .label()
                .and_then(|l| l.parse::<usize>().ok())
                .unwrap_or(usize::MAX)
        });
        out
    }

    /// Insert `mid` into the middle of the edge `(a, b)`, splitting
    /// the branch length in half. The returned guard restores the
    /// original edge exactly when dropped, so a scoring pass can never
    /// leave the tree in a spliced state.
    pub fn splice(&mut self, mid: NodeId, a: NodeId, b: NodeId) -> Result<Splice<'_>> {
        let z = self.unlink(a, b)?;
        self.link(a, mid, z * 0.5)?;
        self.link(mid, b, z * 0.5)?;

        Ok(Splice {
            tree: self,
            mid,
            a,
            b,
            z,
        })
    }

    /// Post-order list of the bifurcations between `root` and the
    /// tips. With `incremental` set, subtrees whose stored view record
    /// still matches their current children and branch lengths are
    /// skipped; their cached vectors remain valid because rollback
    /// restores topology bit-identically.
    pub fn traversal_order(&self, root: NodeId, incremental: bool) -> Result<Vec<RootedBifurcation>> {
        let mut out = Vec::new();
        self.descend(root, None, incremental, &mut out)?;
        Ok(out)
    }

    fn descend(
        &self,
        id: NodeId,
        parent: Option<NodeId>,
        incremental: bool,
        out: &mut Vec<RootedBifurcation>,
    ) -> Result<()> {
        let node = &self.nodes[id];
        if node.is_tip() {
            return Ok(());
        }

        let children: Vec<(NodeId, f64)> = node
            .neighbors()
            .filter(|&(n, _)| Some(n) != parent)
            .collect();
        if children.len() != 2 {
            bail!(
                "tree: node {} has {} children, not a bifurcation",
                id,
                children.len()
            );
        }
        let (c1, z1) = children[0];
        let (c2, z2) = children[1];

        if incremental && node.pvec.is_some() {
            if let Some(view) = node.view {
                if view.matches(c1, c2, z1, z2) {
                    return Ok(());
                }
            }
        }

        self.descend(c1, Some(id), incremental, out)?;
        self.descend(c2, Some(id), incremental, out)?;

        let tc = match (self.nodes[c1].is_tip(), self.nodes[c2].is_tip()) {
            (true, true) => TipCase::TipTip,
            (false, false) => TipCase::InnerInner,
            _ => TipCase::TipInner,
        };
        out.push(RootedBifurcation {
            parent: id,
            child1: c1,
            child2: c2,
            z1,
            z2,
            tc,
        });
        Ok(())
    }
}

/// Scope-bound splice handle. Dereferences to the tree so traversal
/// and vector updates run against the spliced topology; dropping the
/// guard rolls the edge back.
#[derive(Debug)]
pub struct Splice<'a> {
    tree: &'a mut Tree,
    mid: NodeId,
    a: NodeId,
    b: NodeId,
    z: f64,
}

impl Splice<'_> {
    pub fn mid(&self) -> NodeId {
        self.mid
    }

    pub fn edge(&self) -> (NodeId, NodeId) {
        (self.a, self.b)
    }
}

impl Deref for Splice<'_> {
    type Target = Tree;

    fn deref(&self) -> &Tree {
        self.tree
    }
}

impl DerefMut for Splice<'_> {
    fn deref_mut(&mut self) -> &mut Tree {
        self.tree
    }
}

impl Drop for Splice<'_> {
    fn drop(&mut self) {
        // cannot fail unless the caller broke the spliced edge itself
        let r1 = self.tree.unlink(self.a, self.mid);
        let r2 = self.tree.unlink(self.mid, self.b);
        let r3 = self.tree.link(self.a, self.b, self.z);
        debug_assert!(r1.is_ok() && r2.is_ok() && r3.is_ok());
    }
}
