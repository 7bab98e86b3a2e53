//! External ancestral-state reconstruction via a RAxML file round
//! trip: write tree + alignment, run the tool, read back a labelled
//! tree and one probability matrix per internal-node label.

use anyhow::{anyhow, bail, Context, Result};
use std::collections::BTreeMap;
use std::io::BufRead;
use std::path::{Path, PathBuf};

use crate::libs::tree::newick;
use crate::libs::tree::{NodeId, Tree};

const RUN_NAME: &str = "sapling";

/// Result of one reconstruction round trip. `anc_states` is indexed by
/// the numeric node label; labels are opaque keys, so entries for
/// labels the tool did not emit stay empty.
#[derive(Debug)]
pub struct Reconstruction {
    pub tree: Tree,
    pub root: NodeId,
    pub anc_states: Vec<Vec<[f64; 4]>>,
}

/// The protocol boundary to the external tool. The engine only sees
/// two input files going out and a [`Reconstruction`] coming back;
/// tests substitute their own implementation.
pub trait AncestralReconstruction {
    fn reconstruct(&self, tree_file: &Path, ali_file: &Path, workdir: &Path)
        -> Result<Reconstruction>;
}

/// Invokes `raxmlHPC -f A` as a synchronous batch process. This call
/// dominates the latency of every insertion iteration.
#[derive(Debug)]
pub struct RaxmlProcess {
    exe: PathBuf,
}

impl RaxmlProcess {
    pub fn locate() -> Result<Self> {
        let exe = which::which("raxmlHPC")
            .map_err(|_| anyhow!("raxmlHPC not found in PATH. Please install RAxML first."))?;
        Ok(Self { exe })
    }

    pub fn with_exe<P: Into<PathBuf>>(exe: P) -> Self {
        Self { exe: exe.into() }
    }

    fn output_file(workdir: &Path, kind: &str) -> PathBuf {
        workdir.join(format!("RAxML_{}.{}", kind, RUN_NAME))
    }

    /// RAxML refuses to start when output files of a previous run with
    /// the same name exist.
    fn clean_run_files(workdir: &Path) -> Result<()> {
        for entry in std::fs::read_dir(workdir)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with("RAxML_") && name.ends_with(&format!(".{}", RUN_NAME)) {
                std::fs::remove_file(entry.path())?;
            }
        }
        Ok(())
    }
}

impl AncestralReconstruction for RaxmlProcess {
    fn reconstruct(
        &self,
        tree_file: &Path,
        ali_file: &Path,
        workdir: &Path,
    ) -> Result<Reconstruction> {
        Self::clean_run_files(workdir)?;

        let workdir_abs = workdir
            .canonicalize()
            .with_context(|| format!("invalid work directory {}", workdir.display()))?;

        let mut cmd = std::process::Command::new(&self.exe);
        cmd.arg("-f")
            .arg("A")
            .arg("-t")
            .arg(tree_file)
            .arg("-s")
            .arg(ali_file)
            .arg("-m")
            .arg("GTRGAMMA")
            .arg("-n")
            .arg(RUN_NAME)
            .arg("-w")
            .arg(&workdir_abs)
            .stdout(std::process::Stdio::null());

        let status = cmd
            .status()
            .with_context(|| format!("failed to execute {}", self.exe.display()))?;
        if !status.success() {
            bail!("raxmlHPC exited with {}", status);
        }

        let tree_text = std::fs::read_to_string(Self::output_file(workdir, "nodeLabelledRootedTree"))
            .context("reconstruction produced no labelled tree")?;
        let (tree, root) = newick::from_newick(&tree_text)?;

        let probs = std::fs::File::open(Self::output_file(
            workdir,
            "marginalAncestralProbabilities",
        ))
        .context("reconstruction produced no ancestral probabilities")?;
        let anc_states = parse_marginal_probs(std::io::BufReader::new(probs))?;

        Ok(Reconstruction {
            tree,
            root,
            anc_states,
        })
    }
}

/// Parse per-label ancestral probability matrices. Each line carries a
/// node label and the four nucleotide probabilities of one alignment
/// column; consecutive lines with the same label form that label's
/// matrix.
pub fn parse_marginal_probs(reader: impl BufRead) -> Result<Vec<Vec<[f64; 4]>>> {
    let mut by_label: BTreeMap<usize, Vec<[f64; 4]>> = BTreeMap::new();

    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let mut fields = line.split_whitespace();
        let label: usize = fields
            .next()
            .unwrap()
            .parse()
            .with_context(|| format!("invalid node label in: {}", line))?;

        let mut col = [0.0f64; 4];
        for slot in col.iter_mut() {
            *slot = fields
                .next()
                .ok_or_else(|| anyhow!("expected four probabilities in: {}", line))?
                .parse()
                .with_context(|| format!("invalid probability in: {}", line))?;
        }

        by_label.entry(label).or_default().push(col);
    }

    if by_label.is_empty() {
        bail!("ancestral probability file contains no data");
    }

    // dense vector indexed directly by label
    let max_label = *by_label.keys().last().unwrap();
    let mut out = vec![Vec::new(); max_label + 1];
    for (label, cols) in by_label {
        out[label] = cols;
    }
    Ok(out)
}
