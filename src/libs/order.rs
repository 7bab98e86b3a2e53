//! Pairwise distance matrix and the greedy addition-order planner.

use anyhow::{bail, Context, Result};
use itertools::Itertools;
use rayon::prelude::*;
use std::io::{BufRead, Write};

use crate::libs::align;
use crate::libs::dna;

/// All-pairs raw alignment scores over the mapped sequences.
///
/// Pairs are independent, so they run on a fixed-size rayon pool; each
/// worker keeps its own result and placement is by (i, j) index. The
/// matrix is filled symmetrically from the upper triangle plus the
/// diagonal.
pub fn all_pairs_scores(mapped: &[Vec<u8>], threads: usize) -> Result<Vec<Vec<i32>>> {
    let n = mapped.len();
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .context("could not build alignment thread pool")?;

    let pairs: Vec<(usize, usize)> = (0..n)
        .flat_map(|i| (i..n).map(move |j| (i, j)))
        .collect();

    let scored: Vec<((usize, usize), i32)> = pool.install(|| {
        pairs
            .par_iter()
            .map(|&(i, j)| {
                let s = align::freeshift_score(
                    &mapped[i],
                    &mapped[j],
                    dna::DIST_GAP_OPEN,
                    dna::DIST_GAP_EXTEND,
                );
                ((i, j), s)
            })
            .collect()
    });

    let mut out = vec![vec![0; n]; n];
    for ((i, j), s) in scored {
        out[i][j] = s;
        out[j][i] = s;
    }

    Ok(out)
}

/// Persist a score matrix as tab-separated integers.
pub fn write_scores(writer: &mut dyn Write, scores: &[Vec<i32>]) -> Result<()> {
    for row in scores {
        let line = row.iter().map(|s| s.to_string()).join("\t");
        writeln!(writer, "{}", line)?;
    }
    Ok(())
}

/// Load a score matrix written by [`write_scores`].
pub fn read_scores(reader: impl BufRead) -> Result<Vec<Vec<i32>>> {
    let mut out = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let row: Vec<i32> = line
            .split_whitespace()
            .map(|f| f.parse().context("invalid score matrix entry"))
            .collect::<Result<_>>()?;
        out.push(row);
    }
    for row in &out {
        if row.len() != out.len() {
            bail!("score matrix is not square");
        }
    }
    Ok(out)
}

/// Greedy addition-order planner over normalized pairwise distances.
///
/// Construction normalizes the raw scores into [0, 1] dissimilarities
/// and marks the globally closest pair as used (the tree seed). Each
/// `find_next_candidate` call picks the unused sequence with minimal
/// accumulated distance to the used set, maintained incrementally.
#[derive(Debug)]
pub struct AdditionOrder {
    pw_dist: Vec<Vec<f32>>,
    dist_acc: Vec<f32>,
    used: Vec<bool>,
    first_pair: (usize, usize),
}

impl AdditionOrder {
    pub fn new(scores: &[Vec<i32>]) -> Result<Self> {
        let n = scores.len();
        if n < 2 {
            bail!("addition order: need at least two sequences, got {}", n);
        }

        let min = *scores.iter().flatten().min().unwrap();
        let max = *scores.iter().flatten().max().unwrap();
        if min == max {
            bail!("addition order: degenerate score matrix (all scores equal)");
        }
        let span = (max - min) as f32;

        let mut pw_dist = vec![vec![0.0f32; n]; n];
        let mut lowest = f32::MAX;
        let mut first_pair = (0, 0);

        for i in 0..n {
            for j in 0..n {
                let norm = (scores[i][j] - min) as f32 / span;
                let dist = 1.0 - norm;
                pw_dist[i][j] = dist;

                if i != j && dist < lowest {
                    lowest = dist;
                    first_pair = (i, j);
                }
            }
        }

        let mut used = vec![false; n];
        used[first_pair.0] = true;
        used[first_pair.1] = true;

        Ok(Self {
            pw_dist,
            dist_acc: Vec::new(),
            used,
            first_pair,
        })
    }

    /// The globally closest pair, the seed of tree construction.
    pub fn first_pair(&self) -> (usize, usize) {
        self.first_pair
    }

    pub fn len(&self) -> usize {
        self.pw_dist.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pw_dist.is_empty()
    }

    /// Pick the unused sequence with minimal accumulated distance to
    /// the used set, mark it used and fold its distance row into the
    /// accumulator. Returns `None` once every sequence is used.
    pub fn find_next_candidate(&mut self) -> Option<usize> {
        // lazily build the accumulator from the currently used rows
        if self.dist_acc.is_empty() {
            let n = self.pw_dist.len();
            let mut acc = vec![0.0f32; n];
            for (i, _) in self.used.iter().enumerate().filter(|(_, &u)| u) {
                for (a, d) in acc.iter_mut().zip(&self.pw_dist[i]) {
                    *a += d;
                }
            }
            self.dist_acc = acc;
        }

        let mut min_dist = f32::MAX;
        let mut min_element = None;
        for (i, &acc) in self.dist_acc.iter().enumerate() {
            if !self.used[i] && acc < min_dist {
                min_dist = acc;
                min_element = Some(i);
            }
        }

        if let Some(i) = min_element {
            let row = self.pw_dist[i].clone();
            for (a, d) in self.dist_acc.iter_mut().zip(&row) {
                *a += d;
            }
            self.used[i] = true;
        }

        min_element
    }

    #[cfg(test)]
    fn accumulated(&self) -> &[f32] {
        &self.dist_acc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    // A and B (indices 0, 1) score highest against each other, i.e.
    // they are the closest pair after normalization.
    fn scores4() -> Vec<Vec<i32>> {
        vec![
            vec![12, 10, 2, 1],
            vec![10, 12, 3, 2],
            vec![2, 3, 12, 6],
            vec![1, 2, 6, 12],
        ]
    }

    #[test]
    fn test_seed_pair_is_closest() {
        let order = AdditionOrder::new(&scores4()).unwrap();
        let (a, b) = order.first_pair();
        assert_eq!((a.min(b), a.max(b)), (0, 1));
    }

    #[test]
    fn test_normalization_bounds() {
        let order = AdditionOrder::new(&scores4()).unwrap();
        for row in &order.pw_dist {
            for &d in row {
                assert!((0.0..=1.0).contains(&d));
            }
        }
        // the best score normalizes to distance 0
        assert_relative_eq!(order.pw_dist[0][0], 0.0);
        // the worst score normalizes to distance 1
        assert_relative_eq!(order.pw_dist[0][3], 1.0);
    }

    #[test]
    fn test_candidates_until_exhaustion() {
        let mut order = AdditionOrder::new(&scores4()).unwrap();
        let c1 = order.find_next_candidate().unwrap();
        let c2 = order.find_next_candidate().unwrap();
        assert_ne!(c1, c2);
        assert!(c1 == 2 || c1 == 3);
        assert_eq!(order.find_next_candidate(), None);
        assert_eq!(order.find_next_candidate(), None);
    }

    #[test]
    fn test_unique_minimum_is_stable() {
        // index 2 is clearly closer to the seed pair than index 3
        let mut order = AdditionOrder::new(&scores4()).unwrap();
        assert_eq!(order.find_next_candidate(), Some(2));
    }

    #[test]
    fn test_accumulator_matches_recomputation() {
        let scores = scores4();
        let mut order = AdditionOrder::new(&scores).unwrap();

        while order.find_next_candidate().is_some() {
            // recompute the column sum over used rows from scratch
            let n = order.len();
            let mut expected = vec![0.0f32; n];
            for i in 0..n {
                if order.used[i] {
                    for j in 0..n {
                        expected[j] += order.pw_dist[i][j];
                    }
                }
            }
            for (got, want) in order.accumulated().iter().zip(&expected) {
                assert_relative_eq!(got, want, epsilon = 1e-5);
            }
        }
    }

    #[test]
    fn test_too_small_matrix_fails() {
        assert!(AdditionOrder::new(&[]).is_err());
        assert!(AdditionOrder::new(&[vec![0]]).is_err());
    }

    #[test]
    fn test_score_roundtrip() {
        let scores = scores4();
        let mut buf = Vec::new();
        write_scores(&mut buf, &scores).unwrap();
        let back = read_scores(&buf[..]).unwrap();
        assert_eq!(scores, back);
    }

    #[test]
    fn test_all_pairs_scores_symmetric() {
        let mapped = vec![
            vec![0u8, 1, 2, 3],
            vec![0u8, 1, 2, 3],
            vec![3u8, 3, 3, 3],
        ];
        let m = all_pairs_scores(&mapped, 2).unwrap();
        assert_eq!(m.len(), 3);
        for i in 0..3 {
            for j in 0..3 {
                assert_eq!(m[i][j], m[j][i]);
            }
        }
        // identical sequences reach the full match score
        assert_eq!(m[0][1], 4 * dna::MATCH_SCORE);
    }
}
