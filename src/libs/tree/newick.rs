//! Newick serialization for the unrooted arena tree.
//!
//! The writer renders the tree from a chosen node, listing all of its
//! neighbors as children. The parser accepts rooted trees (as written
//! by the reconstruction tool) and collapses a two-child root into a
//! single edge, so the result is always an unrooted bifurcating tree.

use anyhow::{anyhow, bail, Result};
use std::fmt::Write as _;

use super::node::NodeId;
use super::tree::Tree;

pub fn to_newick(tree: &Tree, root: NodeId) -> String {
    let mut out = String::new();
    out.push('(');
    let mut first = true;
    for (child, z) in tree.node(root).neighbors() {
        if !first {
            out.push(',');
        }
        first = false;
        write_subtree(tree, child, root, z, &mut out);
    }
    out.push_str(");");
    out
}

fn write_subtree(tree: &Tree, id: NodeId, parent: NodeId, z: f64, out: &mut String) {
    let node = tree.node(id);
    if let Some(name) = node.tip_name() {
        out.push_str(name);
    } else {
        out.push('(');
        let mut first = true;
        for (child, cz) in node.neighbors().filter(|&(n, _)| n != parent) {
            if !first {
                out.push(',');
            }
            first = false;
            write_subtree(tree, child, id, cz, out);
        }
        out.push(')');
    }
    let _ = write!(out, ":{}", z);
}

#[derive(Debug, Default)]
struct Ast {
    children: Vec<Ast>,
    name: Option<String>,
    length: Option<f64>,
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn peek(&self) -> Option<u8> {
        self.buf.get(self.pos).copied()
    }

    fn bump(&mut self) {
        self.pos += 1;
    }

    fn skip_ws(&mut self) {
        while self.peek().map_or(false, |c| c.is_ascii_whitespace()) {
            self.bump();
        }
    }

    fn ident(&mut self) -> String {
        let start = self.pos;
        while self
            .peek()
            .map_or(false, |c| !matches!(c, b'(' | b')' | b',' | b':' | b';') && !c.is_ascii_whitespace())
        {
            self.bump();
        }
        String::from_utf8_lossy(&self.buf[start..self.pos]).into_owned()
    }

    fn number(&mut self) -> Result<f64> {
        let text = self.ident();
        text.parse()
            .map_err(|_| anyhow!("newick: invalid branch length {:?} at byte {}", text, self.pos))
    }

    fn clade(&mut self) -> Result<Ast> {
        self.skip_ws();
        let mut node = Ast::default();

        if self.peek() == Some(b'(') {
            self.bump();
            loop {
                node.children.push(self.clade()?);
                self.skip_ws();
                match self.peek() {
                    Some(b',') => self.bump(),
                    Some(b')') => {
                        self.bump();
                        break;
                    }
                    _ => bail!("newick: expected ',' or ')' at byte {}", self.pos),
                }
            }
        }

        self.skip_ws();
        let name = self.ident();
        if !name.is_empty() {
            node.name = Some(name);
        }

        self.skip_ws();
        if self.peek() == Some(b':') {
            self.bump();
            node.length = Some(self.number()?);
        }
        Ok(node)
    }
}

/// Parse a newick string into an arena tree. Returns the tree and a
/// non-tip node to serve as the traversal entry point. Missing branch
/// lengths default to 1.0; inner-node names become labels.
pub fn from_newick(text: &str) -> Result<(Tree, NodeId)> {
    let mut cur = Cursor::new(text.as_bytes());
    let ast = cur.clade()?;
    cur.skip_ws();
    if cur.peek() == Some(b';') {
        cur.bump();
    }
    cur.skip_ws();
    if cur.peek().is_some() {
        bail!("newick: trailing characters at byte {}", cur.pos);
    }

    let mut tree = Tree::new();
    let root = match ast.children.len() {
        0 | 1 => bail!("newick: root must have at least two children"),
        2 => {
            // rooted input: drop the root, joining its children into
            // one edge with the summed branch length
            let z = ast.children[0].length.unwrap_or(1.0) + ast.children[1].length.unwrap_or(1.0);
            let id1 = build(&mut tree, &ast.children[0], None)?;
            let id2 = build(&mut tree, &ast.children[1], Some((id1, z)))?;
            if tree.node(id1).is_tip() {
                id2
            } else {
                id1
            }
        }
        _ => build(&mut tree, &ast, None)?,
    };

    if tree.node(root).is_tip() {
        bail!("newick: tree has no inner node");
    }
    Ok((tree, root))
}

fn build(tree: &mut Tree, ast: &Ast, parent: Option<(NodeId, f64)>) -> Result<NodeId> {
    let id = if ast.children.is_empty() {
        let name = ast
            .name
            .as_deref()
            .ok_or_else(|| anyhow!("newick: unnamed leaf"))?;
        tree.add_tip(name)
    } else {
        let id = tree.add_inner();
        if let Some(label) = &ast.name {
            tree.set_label(id, label);
        }
        id
    };

    // the parent link lands in slot 0 of the fresh node
    if let Some((p, z)) = parent {
        tree.link(p, id, z)?;
    }
    for child in &ast.children {
        build(tree, child, Some((id, child.length.unwrap_or(1.0))))?;
    }
    Ok(id)
}
