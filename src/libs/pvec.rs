//! Ancestral state vectors and the newview propagation operator.
//!
//! Two representations exist: the discrete parsimony vector with
//! continuous-gap aux flags ([`PvecCgap`]) and the probabilistic-gap
//! vector ([`PvecPgap`]). One run uses exactly one of them; [`Pvec`]
//! is the tagged dispatch over the two.

use anyhow::{anyhow, bail, Result};

use crate::libs::dna::{self, AUX_CGAP, AUX_OPEN};
use crate::libs::gap_model::ProbGapModel;

/// Classification of a newview call by the leaf status of its children.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TipCase {
    TipTip,
    TipInner,
    InnerInner,
}

/// Fitch-style combination: intersect, or union when the intersection
/// is empty (ambiguity propagates upward).
#[inline]
fn combine_states(s1: u32, s2: u32) -> u32 {
    let ps = s1 & s2;
    if ps == 0 {
        s1 | s2
    } else {
        ps
    }
}

/// Parsimony ancestral vector: per-column state bitmask plus the
/// continuous-gap aux flags.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PvecCgap {
    states: Vec<u32>,
    aux: Vec<u32>,
}

impl PvecCgap {
    pub fn from_aligned(seq: &[u8]) -> Self {
        Self {
            states: seq.iter().map(|&c| dna::parsimony_state(c)).collect(),
            aux: seq.iter().map(|&c| dna::aux_state(c)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn states(&self) -> &[u32] {
        &self.states
    }

    pub fn aux(&self) -> &[u32] {
        &self.aux
    }

    pub fn newview(c1: &Self, c2: &Self, tc: TipCase) -> Result<Self> {
        if c1.len() != c2.len() {
            bail!(
                "newview: child vectors differ in length ({} vs {}); \
                 inconsistent incremental recomputation",
                c1.len(),
                c2.len()
            );
        }

        let mut states = Vec::with_capacity(c1.len());
        let mut aux = Vec::with_capacity(c1.len());

        for i in 0..c1.len() {
            states.push(combine_states(c1.states[i], c2.states[i]));

            let a1 = c1.aux[i];
            let a2 = c2.aux[i];
            let cgap1 = (a1 & AUX_CGAP) != 0;
            let cgap2 = (a2 & AUX_CGAP) != 0;

            // TIP_TIP and TIP_INNER share one rule; INNER_INNER
            // compares against the strict AUX_CGAP sentinel so that a
            // gap opened below does not read as continuous here.
            let a = match tc {
                TipCase::TipTip | TipCase::TipInner => {
                    if cgap1 && cgap2 {
                        AUX_CGAP
                    } else if cgap1 != cgap2 {
                        AUX_CGAP | AUX_OPEN
                    } else {
                        0
                    }
                }
                TipCase::InnerInner => {
                    if a1 == AUX_CGAP && a2 == AUX_CGAP {
                        AUX_CGAP
                    } else if a1 == AUX_CGAP || a2 == AUX_CGAP {
                        AUX_CGAP | AUX_OPEN
                    } else {
                        0
                    }
                }
            };
            aux.push(a);
        }

        Ok(Self { states, aux })
    }
}

/// Probabilistic-gap ancestral vector: the parsimony states carried
/// alongside a per-column (P(non-gap), P(gap)) pair.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PvecPgap {
    states: Vec<u32>,
    gap_prob: Vec<[f64; 2]>,
}

impl PvecPgap {
    /// Leaf initialization: gap columns get (0, 1), residue columns
    /// (1, 0), so the pair sums to 1.
    pub fn from_aligned(seq: &[u8]) -> Self {
        let states: Vec<u32> = seq.iter().map(|&c| dna::parsimony_state(c)).collect();
        let gap_prob = states
            .iter()
            .map(|&s| if s == 0xF { [0.0, 1.0] } else { [1.0, 0.0] })
            .collect();

        Self { states, gap_prob }
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn states(&self) -> &[u32] {
        &self.states
    }

    pub fn gap_prob(&self) -> &[[f64; 2]] {
        &self.gap_prob
    }

    /// Propagate both children through the transition matrices of
    /// their branch lengths, then combine by elementwise product. The
    /// parsimony states use the same intersect-or-union rule as the
    /// discrete variant, independent of the gap math.
    pub fn newview(
        c1: &Self,
        c2: &Self,
        z1: f64,
        z2: f64,
        model: &ProbGapModel,
    ) -> Result<Self> {
        if c1.len() != c2.len() {
            bail!(
                "newview: child vectors differ in length ({} vs {}); \
                 inconsistent incremental recomputation",
                c1.len(),
                c2.len()
            );
        }

        let p1 = model.transition_matrix(z1);
        let p2 = model.transition_matrix(z2);

        let mut states = Vec::with_capacity(c1.len());
        let mut gap_prob = Vec::with_capacity(c1.len());

        for i in 0..c1.len() {
            states.push(combine_states(c1.states[i], c2.states[i]));

            let [g1n, g1g] = c1.gap_prob[i];
            let [g2n, g2g] = c2.gap_prob[i];

            let t1 = [
                p1[(0, 0)] * g1n + p1[(0, 1)] * g1g,
                p1[(1, 0)] * g1n + p1[(1, 1)] * g1g,
            ];
            let t2 = [
                p2[(0, 0)] * g2n + p2[(0, 1)] * g2g,
                p2[(1, 0)] * g2n + p2[(1, 1)] * g2g,
            ];

            gap_prob.push([t1[0] * t2[0], t1[1] * t2[1]]);
        }

        Ok(Self { states, gap_prob })
    }

    /// Per-column ancestral gap profile: the unnormalized pair weighted
    /// by the stationary distribution and renormalized to sum to 1.
    /// This is the profile the insertion aligner consumes.
    pub fn anc_gap_probs(&self, model: &ProbGapModel) -> Vec<[f64; 2]> {
        let g = model.gap_freq();

        self.gap_prob
            .iter()
            .map(|&[pn, pg]| {
                let v1 = pn * (1.0 - g);
                let v2 = pg * g;
                let sum = v1 + v2;
                if sum > 0.0 {
                    [v1 / sum, v2 / sum]
                } else {
                    // both entries vanish only when both branch lengths
                    // are zero and the children disagree
                    [0.5, 0.5]
                }
            })
            .collect()
    }
}

/// The per-node ancestral vector, one variant per run.
#[derive(Debug, Clone, PartialEq)]
pub enum Pvec {
    Cgap(PvecCgap),
    Pgap(PvecPgap),
}

impl Pvec {
    pub fn len(&self) -> usize {
        match self {
            Pvec::Cgap(v) => v.len(),
            Pvec::Pgap(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Combine two child vectors into the parent vector. The gap model
    /// is required for the probabilistic variant; requesting a
    /// probabilistic newview without one is fatal.
    pub fn newview(
        c1: &Pvec,
        c2: &Pvec,
        z1: f64,
        z2: f64,
        tc: TipCase,
        model: Option<&ProbGapModel>,
    ) -> Result<Pvec> {
        match (c1, c2) {
            (Pvec::Cgap(a), Pvec::Cgap(b)) => Ok(Pvec::Cgap(PvecCgap::newview(a, b, tc)?)),
            (Pvec::Pgap(a), Pvec::Pgap(b)) => {
                let model = model.ok_or_else(|| {
                    anyhow!("newview: probabilistic variant requested without an active gap model")
                })?;
                Ok(Pvec::Pgap(PvecPgap::newview(a, b, z1, z2, model)?))
            }
            _ => bail!("newview: mixed ancestral-vector representations"),
        }
    }
}
