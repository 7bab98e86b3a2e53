//! Log-odds affine-gap Viterbi aligner scoring a candidate sequence
//! against an ancestral state/gap profile.
//!
//! Three states per cell: Match, Delete (gap in the candidate) and
//! Insert (gap in the profile), evaluated in the max semiring over
//! log-odds scores. Base row and column are 0, so end gaps are free.
//! The final score is read from the bottom-right Match cell only;
//! paths ending in a gap state are not considered, which slightly
//! penalizes alignments that end in a gap.

use anyhow::{bail, Result};

/// Log-odds of a model probability against a background frequency,
/// floored at -100 so vanishing probabilities never poison the DP
/// with infinities.
pub fn log_odds(p: f64, bg: f64) -> f32 {
    (p / bg).ln().max(-100.0) as f32
}

/// One traceback step of the best path, in alignment order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Candidate residue `query` aligned to profile column `column`.
    Match { query: usize, column: usize },
    /// Profile column `column` has no candidate residue.
    Delete { column: usize },
    /// Candidate residue `query` falls between profile columns.
    Insert { query: usize },
}

/// Scoring engine for one (profile, background) pair, reusable across
/// candidate queries. Log-odds for all four states are precomputed per
/// column; the rolling match/delete/insert rows are scratch space.
#[derive(Debug)]
pub struct LogOddsViterbi {
    state_lo: Vec<[f32; 4]>,
    gap_ln: Vec<[f32; 2]>,
    m: Vec<f32>,
    d: Vec<f32>,
    i: Vec<f32>,
}

impl LogOddsViterbi {
    /// `anc_state` holds per-column nucleotide probabilities,
    /// `anc_gap` per-column (P(non-gap), P(gap)) pairs, both of the
    /// same length as the current alignment.
    pub fn new(anc_state: &[[f64; 4]], anc_gap: &[[f64; 2]], bg: [f64; 4]) -> Result<Self> {
        if anc_state.len() != anc_gap.len() {
            bail!(
                "viterbi: state profile ({}) and gap profile ({}) differ in length",
                anc_state.len(),
                anc_gap.len()
            );
        }

        let state_lo = anc_state
            .iter()
            .map(|col| {
                [
                    log_odds(col[0], bg[0]),
                    log_odds(col[1], bg[1]),
                    log_odds(col[2], bg[2]),
                    log_odds(col[3], bg[3]),
                ]
            })
            .collect();
        let gap_ln = anc_gap
            .iter()
            .map(|col| [col[0].ln() as f32, col[1].ln() as f32])
            .collect();

        let len = anc_state.len() + 1;
        Ok(Self {
            state_lo,
            gap_ln,
            m: vec![0.0; len],
            d: vec![0.0; len],
            i: vec![0.0; len],
        })
    }

    pub fn profile_len(&self) -> usize {
        self.state_lo.len()
    }

    fn max3(a: f32, b: f32, c: f32) -> f32 {
        a.max(b.max(c))
    }

    /// Score `query` (mapped state indices) against the profile.
    /// Rolling single-row update; column 0 is never touched, keeping
    /// leading candidate residues free.
    pub fn align(&mut self, query: &[u8]) -> f64 {
        let cols = self.profile_len();
        self.m.iter_mut().for_each(|v| *v = 0.0);
        self.d.iter_mut().for_each(|v| *v = 0.0);
        self.i.iter_mut().for_each(|v| *v = 0.0);

        for &b in query {
            let mut diag_m = self.m[0];
            let mut diag_d = self.d[0];
            let mut diag_i = self.i[0];

            for j in 1..=cols {
                let lo = self.state_lo[j - 1][b as usize];
                let [ln_ngap, ln_gap] = self.gap_ln[j - 1];

                let m_new = Self::max3(diag_m + ln_ngap, diag_d + ln_gap, diag_i) + lo;
                diag_m = self.m[j];
                self.m[j] = m_new;

                // diag_m now holds the previous row's cell straight
                // above, which is what the insert state consumes
                let i_new = diag_m.max(self.i[j]);
                diag_i = self.i[j];
                self.i[j] = i_new;

                let d_new = self.m[j - 1].max(self.d[j - 1]);
                diag_d = self.d[j];
                self.d[j] = d_new;
            }
        }

        f64::from(*self.m.last().unwrap_or(&0.0))
    }

    /// Score plus the best path, recovered from full DP matrices. Used
    /// once per insertion step, on the winning attachment only.
    pub fn align_traceback(&self, query: &[u8]) -> (f64, Vec<Step>) {
        let rows = query.len() + 1;
        let cols = self.profile_len() + 1;

        let mut m = vec![vec![0.0f32; cols]; rows];
        let mut d = vec![vec![0.0f32; cols]; rows];
        let mut i_ = vec![vec![0.0f32; cols]; rows];

        for qi in 1..rows {
            let b = query[qi - 1] as usize;
            for j in 1..cols {
                let lo = self.state_lo[j - 1][b];
                let [ln_ngap, ln_gap] = self.gap_ln[j - 1];

                m[qi][j] = Self::max3(
                    m[qi - 1][j - 1] + ln_ngap,
                    d[qi - 1][j - 1] + ln_gap,
                    i_[qi - 1][j - 1],
                ) + lo;
                i_[qi][j] = m[qi - 1][j].max(i_[qi - 1][j]);
                d[qi][j] = m[qi][j - 1].max(d[qi][j - 1]);
            }
        }

        let score = f64::from(m[rows - 1][cols - 1]);

        // walk back from the bottom-right match cell, mirroring the
        // forward tie preference (match, then delete, then insert)
        #[derive(Clone, Copy, PartialEq)]
        enum St {
            M,
            D,
            I,
        }

        let mut steps = Vec::new();
        let mut qi = rows - 1;
        let mut j = cols - 1;
        let mut st = St::M;

        while qi > 0 && j > 0 {
            match st {
                St::M => {
                    steps.push(Step::Match {
                        query: qi - 1,
                        column: j - 1,
                    });
                    let [ln_ngap, ln_gap] = self.gap_ln[j - 1];
                    let via_m = m[qi - 1][j - 1] + ln_ngap;
                    let via_d = d[qi - 1][j - 1] + ln_gap;
                    let via_i = i_[qi - 1][j - 1];
                    st = if via_m >= via_d && via_m >= via_i {
                        St::M
                    } else if via_d >= via_i {
                        St::D
                    } else {
                        St::I
                    };
                    qi -= 1;
                    j -= 1;
                }
                St::D => {
                    steps.push(Step::Delete { column: j - 1 });
                    st = if m[qi][j - 1] >= d[qi][j - 1] {
                        St::M
                    } else {
                        St::D
                    };
                    j -= 1;
                }
                St::I => {
                    steps.push(Step::Insert { query: qi - 1 });
                    st = if m[qi - 1][j] >= i_[qi - 1][j] {
                        St::M
                    } else {
                        St::I
                    };
                    qi -= 1;
                }
            }
        }

        steps.reverse();
        (score, steps)
    }
}
