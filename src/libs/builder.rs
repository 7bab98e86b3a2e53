//! The incremental tree builder: seeds a quartet from the closest
//! pair, then repeatedly reconstructs ancestral states externally,
//! scores every attachment edge for the next candidate and commits
//! the best one.

use anyhow::{anyhow, bail, Result};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::libs::align;
use crate::libs::dna;
use crate::libs::gap_model::ProbGapModel;
use crate::libs::order::AdditionOrder;
use crate::libs::pvec::{Pvec, PvecPgap};
use crate::libs::raxml::AncestralReconstruction;
use crate::libs::sequences::Sequences;
use crate::libs::tree::{newick, NodeId, Tree, ViewRecord};
use crate::libs::viterbi::{LogOddsViterbi, Step};

const BG_FREQS: [f64; 4] = [0.25; 4];

pub const TREE_FILE: &str = "sa_tree";
pub const ALI_FILE: &str = "sa_ali";

pub struct TreeBuilder<'a> {
    seqs: &'a mut Sequences,
    order: &'a mut AdditionOrder,
    tree: Tree,
    root: NodeId,
    used: Vec<bool>,
    aligned: Vec<Vec<u8>>,
}

impl<'a> TreeBuilder<'a> {
    /// Bootstrap the initial quartet from the planner's seed pair.
    /// Each seed sequence is duplicated under a `_clone` name so the
    /// starting tree is a balanced four-taxon topology; the central
    /// edge carries the `MOAL` placeholder label.
    pub fn new(seqs: &'a mut Sequences, order: &'a mut AdditionOrder) -> Result<Self> {
        let (seqa, seqb) = order.first_pair();

        let name_a = seqs.name_at(seqa).to_string();
        let name_b = seqs.name_at(seqb).to_string();
        let name_a_clone = format!("{}_clone", name_a);
        let name_b_clone = format!("{}_clone", name_b);

        let seqa_clone = seqs.clone_seq(seqa, &name_a_clone);
        let seqb_clone = seqs.clone_seq(seqb, &name_b_clone);

        let (aligned_a, aligned_b) = align::align_freeshift(
            seqs.seq_at(seqa),
            seqs.seq_at(seqb),
            dna::SEED_GAP_OPEN,
            dna::SEED_GAP_EXTEND,
        );

        let mut used = vec![false; seqs.len()];
        used[seqa] = true;
        used[seqa_clone] = true;
        used[seqb] = true;
        used[seqb_clone] = true;

        let mut aligned = vec![Vec::new(); seqs.len()];
        aligned[seqa_clone] = aligned_a.clone();
        aligned[seqa] = aligned_a;
        aligned[seqb_clone] = aligned_b.clone();
        aligned[seqb] = aligned_b;

        let mut tree = Tree::new();
        let x = tree.add_inner();
        let y = tree.add_inner();
        tree.set_label(x, "MOAL");
        tree.link(x, y, 1.0)?;

        let ta = tree.add_tip(&name_a);
        let tac = tree.add_tip(&name_a_clone);
        let tb = tree.add_tip(&name_b);
        let tbc = tree.add_tip(&name_b_clone);
        tree.link(x, ta, 1.0)?;
        tree.link(x, tac, 1.0)?;
        tree.link(y, tb, 1.0)?;
        tree.link(y, tbc, 1.0)?;

        Ok(Self {
            seqs,
            order,
            tree,
            root: x,
            used,
            aligned,
        })
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn tree_and_root(&self) -> (&Tree, NodeId) {
        (&self.tree, self.root)
    }

    pub fn aligned_at(&self, i: usize) -> &[u8] {
        &self.aligned[i]
    }

    pub fn is_used(&self, i: usize) -> bool {
        self.used[i]
    }

    /// Fraction of gap characters over all used aligned rows; founds
    /// the gap model of the next iteration.
    pub fn calc_gap_freq(&self) -> f64 {
        let mut ngaps = 0usize;
        let mut nres = 0usize;

        for (i, row) in self.aligned.iter().enumerate() {
            if !self.used[i] {
                continue;
            }
            nres += row.len();
            ngaps += row.iter().filter(|&&c| dna::is_gap(c)).count();
        }

        ngaps as f64 / nres as f64
    }

    /// Write the current tree and alignment in the formats the
    /// reconstruction tool expects. Returns the two file paths.
    pub fn write_ali_and_tree(&self, workdir: &Path) -> Result<(PathBuf, PathBuf)> {
        let tree_path = workdir.join(TREE_FILE);
        let ali_path = workdir.join(ALI_FILE);

        std::fs::write(&tree_path, format!("{}\n", newick::to_newick(&self.tree, self.root)))?;

        let used: Vec<usize> = (0..self.aligned.len()).filter(|&i| self.used[i]).collect();
        let cols = used
            .first()
            .map(|&i| self.aligned[i].len())
            .ok_or_else(|| anyhow!("no sequences are in use"))?;

        let mut os = std::io::BufWriter::new(std::fs::File::create(&ali_path)?);
        writeln!(os, "{} {}", used.len(), cols)?;
        for i in used {
            os.write_all(self.seqs.name_at(i).as_bytes())?;
            os.write_all(b" ")?;
            os.write_all(&self.aligned[i])?;
            os.write_all(b"\n")?;
        }
        os.flush()?;

        Ok((tree_path, ali_path))
    }

    /// Load every tip's aligned sequence into its probabilistic
    /// ancestral vector. A tip whose name cannot be resolved or that
    /// has no aligned row means tree and sequence set went out of
    /// sync.
    fn init_tip_vectors(&mut self) -> Result<()> {
        for tip in self.tree.tips() {
            let name = self.tree.node(tip).tip_name().unwrap_or_default().to_string();
            let idx = self.seqs.name_to_index(&name)?;
            let row = &self.aligned[idx];
            if row.is_empty() {
                bail!("tip {} has no aligned sequence", name);
            }
            self.tree.node_mut(tip).pvec = Some(Pvec::Pgap(PvecPgap::from_aligned(row)));
        }
        Ok(())
    }

    /// One insertion iteration: reconstruct ancestral states for the
    /// current tree, pick the next candidate, score it against every
    /// labelled attachment edge and commit the best splice. Returns
    /// `false` once the planner is exhausted.
    pub fn insertion_step(
        &mut self,
        recon: &dyn AncestralReconstruction,
        workdir: &Path,
    ) -> Result<bool> {
        let (tree_path, ali_path) = self.write_ali_and_tree(workdir)?;
        let rec = recon.reconstruct(&tree_path, &ali_path, workdir)?;

        self.tree = rec.tree;
        self.root = rec.root;
        self.init_tip_vectors()?;

        let gap_freq = self.calc_gap_freq();
        eprintln!("gap rate: {:.4}", gap_freq);
        let model = ProbGapModel::new(gap_freq)?;

        let cand = match self.order.find_next_candidate() {
            Some(c) => c,
            None => return Ok(false),
        };
        let cand_name = self.seqs.name_at(cand).to_string();
        let cand_mapped = self.seqs.mapped_at(cand).to_vec();

        let labelled = self.tree.labelled_nodes();
        if labelled.is_empty() {
            bail!("reconstruction returned a tree without labelled nodes");
        }
        eprintln!("candidate {}: {} attachment points", cand_name, labelled.len());

        let vroot = self.tree.add_inner();
        let mut best: Option<(f64, (NodeId, NodeId), usize)> = None;
        let mut incremental = false;

        for np in labelled {
            let label: usize = self
                .tree
                .node(np)
                .label()
                .unwrap_or_default()
                .parse()
                .map_err(|_| anyhow!("non-numeric node label on node {}", np))?;
            let anc_state = rec
                .anc_states
                .get(label)
                .filter(|m| !m.is_empty())
                .ok_or_else(|| anyhow!("no ancestral state matrix for label {}", label))?;

            let back = self
                .tree
                .node(np)
                .neighbor_at(0)
                .ok_or_else(|| anyhow!("labelled node {} is disconnected", np))?;

            let mut guard = self.tree.splice(vroot, np, back)?;
            let anc_gap = refresh_vectors(&mut guard, vroot, incremental, &model)?;
            incremental = true;

            let mut lov = LogOddsViterbi::new(anc_state, &anc_gap, BG_FREQS)?;
            let score = lov.align(&cand_mapped);
            eprintln!("  label {}: {:.3}", label, score);

            if best.map_or(true, |(s, _, _)| score > s) {
                best = Some((score, (np, back), label));
            }
        }

        let (best_score, best_edge, best_label) =
            best.ok_or_else(|| anyhow!("no attachment point could be scored"))?;
        eprintln!("best score: {:.3}", best_score);

        // re-splice the winning edge for the traceback; the cached
        // vectors along it are still valid
        let row = {
            let mut guard = self.tree.splice(vroot, best_edge.0, best_edge.1)?;
            let anc_gap = refresh_vectors(&mut guard, vroot, true, &model)?;
            let anc_state = &rec.anc_states[best_label];
            let lov = LogOddsViterbi::new(anc_state, &anc_gap, BG_FREQS)?;
            let (_, steps) = lov.align_traceback(&cand_mapped);

            let mut row = vec![dna::GAP_CHAR; anc_state.len()];
            for step in steps {
                if let Step::Match { query, column } = step {
                    row[column] = self.seqs.seq_at(cand)[query];
                }
            }
            row
        };

        // commit: the scoring root becomes the permanent inner node in
        // the middle of the best edge, candidate tip hanging off it
        let z = self.tree.unlink(best_edge.0, best_edge.1)?;
        self.tree.link(best_edge.0, vroot, z * 0.5)?;
        self.tree.link(vroot, best_edge.1, z * 0.5)?;
        let tip = self.tree.add_tip(&cand_name);
        self.tree.link(vroot, tip, 1.0)?;

        self.used[cand] = true;
        self.aligned[cand] = row;

        Ok(true)
    }
}

/// Recompute the ancestral vectors between the spliced virtual root
/// and the tips, then return the virtual root's normalized gap
/// profile.
fn refresh_vectors(
    tree: &mut Tree,
    vroot: NodeId,
    incremental: bool,
    model: &ProbGapModel,
) -> Result<Vec<[f64; 2]>> {
    let order = tree.traversal_order(vroot, incremental)?;

    for bif in order {
        let pv = {
            let c1 = tree
                .node(bif.child1)
                .pvec
                .as_ref()
                .ok_or_else(|| anyhow!("node {} has no ancestral vector", bif.child1))?;
            let c2 = tree
                .node(bif.child2)
                .pvec
                .as_ref()
                .ok_or_else(|| anyhow!("node {} has no ancestral vector", bif.child2))?;
            Pvec::newview(c1, c2, bif.z1, bif.z2, bif.tc, Some(model))?
        };

        let parent = tree.node_mut(bif.parent);
        parent.pvec = Some(pv);
        parent.view = Some(ViewRecord {
            child1: bif.child1,
            child2: bif.child2,
            z1: bif.z1,
            z2: bif.z2,
        });
    }

    match &tree.node(vroot).pvec {
        Some(Pvec::Pgap(p)) => Ok(p.anc_gap_probs(model)),
        _ => bail!("virtual root has no probabilistic ancestral vector"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::libs::order;
    use crate::libs::raxml::Reconstruction;
    use std::io::Cursor;

    // shared scaffolding for reconstruction stand-ins: parse the tree
    // the builder wrote, number the inner nodes in arena order and
    // read the column count off the alignment header
    fn parse_and_label(tree_file: &Path, ali_file: &Path) -> Result<(Tree, NodeId, usize, usize)> {
        let text = std::fs::read_to_string(tree_file)?;
        let (mut tree, root) = newick::from_newick(&text)?;

        let inners: Vec<NodeId> = (0..tree.len()).filter(|&i| !tree.node(i).is_tip()).collect();
        for (k, &id) in inners.iter().enumerate() {
            tree.set_label(id, &k.to_string());
        }

        let header = std::fs::read_to_string(ali_file)?;
        let cols: usize = header
            .lines()
            .next()
            .and_then(|l| l.split_whitespace().nth(1))
            .and_then(|c| c.parse().ok())
            .ok_or_else(|| anyhow!("bad alignment header"))?;

        Ok((tree, root, inners.len(), cols))
    }

    // stand-in for the external tool returning flat probability
    // matrices, so every attachment edge scores the same
    struct UniformRecon;

    impl AncestralReconstruction for UniformRecon {
        fn reconstruct(
            &self,
            tree_file: &Path,
            ali_file: &Path,
            _workdir: &Path,
        ) -> Result<Reconstruction> {
            let (tree, root, n_inners, cols) = parse_and_label(tree_file, ali_file)?;
            let anc_states = vec![vec![[0.25; 4]; cols]; n_inners];
            Ok(Reconstruction {
                tree,
                root,
                anc_states,
            })
        }
    }

    // stand-in whose matrix for one label strongly predicts `target`
    // while every other label stays flat
    struct SkewedRecon {
        favored: usize,
        target: Vec<u8>,
    }

    impl AncestralReconstruction for SkewedRecon {
        fn reconstruct(
            &self,
            tree_file: &Path,
            ali_file: &Path,
            _workdir: &Path,
        ) -> Result<Reconstruction> {
            let (tree, root, n_inners, cols) = parse_and_label(tree_file, ali_file)?;
            let mut anc_states = vec![vec![[0.25; 4]; cols]; n_inners];
            for (col, probs) in anc_states[self.favored].iter_mut().enumerate() {
                if let Some(&s) = self.target.get(col) {
                    *probs = [0.01; 4];
                    probs[s as usize] = 0.97;
                }
            }
            Ok(Reconstruction {
                tree,
                root,
                anc_states,
            })
        }
    }

    fn fixture() -> (Sequences, Vec<Vec<i32>>) {
        // a and b are closest, e is near a, c and d form their own pair
        let fa = "\
>a\nACGTACGTACGT\n\
>b\nACGTACGAACGT\n\
>c\nTTTTGGGGCCCC\n\
>d\nTTTTGGAACCCC\n\
>e\nACGTACGTAAGA\n";
        let seqs = Sequences::from_fasta(Cursor::new(fa)).unwrap();
        let scores = order::all_pairs_scores(seqs.mapped_seqs(), 2).unwrap();
        (seqs, scores)
    }

    #[test]
    fn test_quartet_bootstrap() {
        let (mut seqs, scores) = fixture();
        let mut order = AdditionOrder::new(&scores).unwrap();
        let (sa, sb) = order.first_pair();
        assert_eq!((sa.min(sb), sa.max(sb)), (0, 1));

        let builder = TreeBuilder::new(&mut seqs, &mut order).unwrap();
        let (tree, root) = builder.tree_and_root();

        assert_eq!(tree.tips().len(), 4);
        assert_eq!(tree.node(root).label(), Some("MOAL"));
        // both seed rows and their clones are aligned and used
        for i in [0usize, 1] {
            assert!(builder.is_used(i));
            assert!(!builder.aligned_at(i).is_empty());
        }
        assert_eq!(builder.aligned_at(0).len(), builder.aligned_at(1).len());
    }

    #[test]
    fn test_gap_freq_counts_used_rows_only() {
        let (mut seqs, scores) = fixture();
        let mut order = AdditionOrder::new(&scores).unwrap();
        let builder = TreeBuilder::new(&mut seqs, &mut order).unwrap();

        // seed sequences are equal length, the freeshift alignment
        // introduces no gaps
        assert_eq!(builder.calc_gap_freq(), 0.0);
    }

    #[test]
    fn test_write_ali_and_tree_formats() {
        let (mut seqs, scores) = fixture();
        let mut order = AdditionOrder::new(&scores).unwrap();
        let builder = TreeBuilder::new(&mut seqs, &mut order).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let (tree_path, ali_path) = builder.write_ali_and_tree(dir.path()).unwrap();

        let tree_text = std::fs::read_to_string(tree_path).unwrap();
        assert!(tree_text.trim_end().ends_with(';'));

        let ali_text = std::fs::read_to_string(ali_path).unwrap();
        let mut lines = ali_text.lines();
        assert_eq!(lines.next().unwrap(), format!("4 {}", builder.aligned_at(0).len()));
        assert_eq!(lines.count(), 4);
    }

    #[test]
    fn test_insertion_steps_until_exhaustion() {
        let (mut seqs, scores) = fixture();
        let mut order = AdditionOrder::new(&scores).unwrap();
        let mut builder = TreeBuilder::new(&mut seqs, &mut order).unwrap();
        let dir = tempfile::tempdir().unwrap();

        let mut inserted = 0;
        while builder.insertion_step(&UniformRecon, dir.path()).unwrap() {
            inserted += 1;
            assert_eq!(builder.tree().tips().len(), 4 + inserted);
        }

        // three candidates beyond the seed pair
        assert_eq!(inserted, 3);
        for i in 0..5 {
            assert!(builder.is_used(i));
            assert!(!builder.aligned_at(i).is_empty());
        }

        // the final tree still contains every original sequence name,
        // and every arena node is wired in (the per-step scoring root
        // is recycled as the committed inner node, never orphaned)
        let (tree, _) = builder.tree_and_root();
        for i in 0..tree.len() {
            assert!(tree.node(i).degree() > 0);
        }
        let mut names: Vec<String> = tree
            .tips()
            .iter()
            .filter_map(|&t| tree.node(t).tip_name().map(str::to_string))
            .filter(|n| !n.ends_with("_clone"))
            .collect();
        names.sort();
        assert_eq!(names, vec!["a", "b", "c", "d", "e"]);
    }

    #[test]
    fn test_commits_the_max_scoring_attachment() {
        let (mut seqs, scores) = fixture();

        // learn which candidates the planner will emit: the first one
        // goes in under a flat reconstruction, the second is the one
        // whose attachment we steer
        let mut scout = AdditionOrder::new(&scores).unwrap();
        scout.find_next_candidate().unwrap();
        let second = scout.find_next_candidate().unwrap();
        let target = seqs.mapped_at(second).to_vec();
        let cand_name = seqs.name_at(second).to_string();

        let mut order = AdditionOrder::new(&scores).unwrap();
        let mut builder = TreeBuilder::new(&mut seqs, &mut order).unwrap();
        let dir = tempfile::tempdir().unwrap();

        assert!(builder.insertion_step(&UniformRecon, dir.path()).unwrap());

        // five tips leave three labelled nodes; favor the deepest one,
        // whose attachment edge no other label shares
        let skewed = SkewedRecon { favored: 2, target };
        assert!(builder.insertion_step(&skewed, dir.path()).unwrap());

        let (tree, _) = builder.tree_and_root();
        let favored = (0..tree.len())
            .find(|&i| tree.node(i).label() == Some("2"))
            .unwrap();
        let tip = tree
            .tips()
            .iter()
            .copied()
            .find(|&t| tree.node(t).tip_name() == Some(cand_name.as_str()))
            .unwrap();
        let inner = tree.node(tip).neighbor_at(0).unwrap();
        assert!(tree.node(inner).neighbors().any(|(n, _)| n == favored));
    }
}
