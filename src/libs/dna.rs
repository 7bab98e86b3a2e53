//! The DNA scoring alphabet and the parsimony state mappings.

/// Scoring alphabet: mapped sequences hold indices into this order.
pub const STATES: &[u8; 4] = b"ACGT";

/// Match/mismatch scores of the pairwise scoring alphabet.
pub const MATCH_SCORE: i32 = 3;
pub const MISMATCH_SCORE: i32 = 0;

/// Affine gap penalties for the all-pairs distance scoring.
pub const DIST_GAP_OPEN: i32 = -5;
pub const DIST_GAP_EXTEND: i32 = -2;

/// Affine gap penalties for the quartet freeshift alignment.
pub const SEED_GAP_OPEN: i32 = -5;
pub const SEED_GAP_EXTEND: i32 = -3;

/// Aux flag: the column sits inside a gap run ("continuous gap").
pub const AUX_CGAP: u32 = 0x1;
/// Aux flag: a gap opened at this node (discontinuity between children).
pub const AUX_OPEN: u32 = 0x2;

pub const GAP_CHAR: u8 = b'-';

/// Index of a residue in the scoring alphabet, `None` for anything the
/// alphabet does not recognize (dropped during normalization).
pub fn state_index(c: u8) -> Option<u8> {
    match c.to_ascii_uppercase() {
        b'A' => Some(0),
        b'C' => Some(1),
        b'G' => Some(2),
        b'T' => Some(3),
        _ => None,
    }
}

/// Parsimony bitmask for an aligned residue. Gaps and unknown residues
/// map to the full state set.
pub fn parsimony_state(c: u8) -> u32 {
    match c.to_ascii_uppercase() {
        b'A' => 0x1,
        b'C' => 0x2,
        b'G' => 0x4,
        b'T' => 0x8,
        _ => 0xF,
    }
}

pub fn is_gap(c: u8) -> bool {
    c == GAP_CHAR
}

/// Initial aux flags for an aligned residue at a tip.
pub fn aux_state(c: u8) -> u32 {
    if is_gap(c) {
        AUX_CGAP
    } else {
        0
    }
}
