//! Pairwise alignment primitives consumed as black boxes: freeshift
//! (semi-global, free end gaps) scoring and gapped-pair construction.

use bio::alignment::pairwise::{Aligner, Scoring};
use bio::alignment::AlignmentOperation;

use crate::libs::dna;

fn nt_score(a: u8, b: u8) -> i32 {
    if a == b {
        dna::MATCH_SCORE
    } else {
        dna::MISMATCH_SCORE
    }
}

/// Freeshift alignment score of two mapped sequences.
pub fn freeshift_score(a: &[u8], b: &[u8], gap_open: i32, gap_extend: i32) -> i32 {
    let scoring = Scoring::new(gap_open, gap_extend, nt_score as fn(u8, u8) -> i32)
        .xclip(0)
        .yclip(0);
    let mut aligner = Aligner::with_scoring(scoring);

    aligner.custom(a, b).score
}

/// Freeshift-align two raw sequences and return the gapped pair.
/// Leading/trailing clips are rendered as gap columns, so both output
/// rows have equal length.
pub fn align_freeshift(a: &[u8], b: &[u8], gap_open: i32, gap_extend: i32) -> (Vec<u8>, Vec<u8>) {
    let scoring = Scoring::new(gap_open, gap_extend, nt_score as fn(u8, u8) -> i32)
        .xclip(0)
        .yclip(0);
    let mut aligner = Aligner::with_scoring(scoring);
    let aln = aligner.custom(a, b);

    let mut out_a = Vec::with_capacity(a.len() + b.len());
    let mut out_b = Vec::with_capacity(a.len() + b.len());
    let mut i = 0;
    let mut j = 0;

    for op in &aln.operations {
        match op {
            AlignmentOperation::Match | AlignmentOperation::Subst => {
                out_a.push(a[i]);
                out_b.push(b[j]);
                i += 1;
                j += 1;
            }
            AlignmentOperation::Del => {
                // gap in a
                out_a.push(dna::GAP_CHAR);
                out_b.push(b[j]);
                j += 1;
            }
            AlignmentOperation::Ins => {
                // gap in b
                out_a.push(a[i]);
                out_b.push(dna::GAP_CHAR);
                i += 1;
            }
            AlignmentOperation::Xclip(n) => {
                for _ in 0..*n {
                    out_a.push(a[i]);
                    out_b.push(dna::GAP_CHAR);
                    i += 1;
                }
            }
            AlignmentOperation::Yclip(n) => {
                for _ in 0..*n {
                    out_a.push(dna::GAP_CHAR);
                    out_b.push(b[j]);
                    j += 1;
                }
            }
        }
    }

    debug_assert_eq!(out_a.len(), out_b.len());
    (out_a, out_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_identical() {
        let (a, b) = align_freeshift(b"ACGT", b"ACGT", -5, -3);
        assert_eq!(a, b"ACGT");
        assert_eq!(b, b"ACGT");
    }

    #[test]
    fn test_align_shifted() {
        // b is a suffix of a; free end gaps keep the score positive
        let (a, b) = align_freeshift(b"AACGT", b"CGT", -5, -3);
        assert_eq!(a.len(), b.len());
        assert_eq!(a, b"AACGT");
        assert_eq!(&b[2..], b"CGT");
        assert_eq!(&b[..2], b"--");
    }

    #[test]
    fn test_freeshift_score_no_end_penalty() {
        // perfect overlap scores match * len, clips are free
        let s = freeshift_score(&[0, 1, 2, 3], &[0, 1, 2, 3], -5, -2);
        assert_eq!(s, 4 * dna::MATCH_SCORE);

        let shifted = freeshift_score(&[3, 0, 1, 2, 3], &[0, 1, 2, 3], -5, -2);
        assert_eq!(shifted, 4 * dna::MATCH_SCORE);
    }
}
