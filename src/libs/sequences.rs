//! The named sequence set: raw and mapped sequences plus a name lookup.

use anyhow::{anyhow, Result};
use std::io::BufRead;

use crate::libs::dna;

/// Owns the input sequences in two parallel forms: the normalized raw
/// residues and the scoring-alphabet state indices ("mapped"). A sorted
/// flat vector serves as the name lookup; bulk insertion goes through
/// `clone_seq`, which keeps the vector sorted.
#[derive(Debug, Default)]
pub struct Sequences {
    seqs: Vec<Vec<u8>>,
    mapped: Vec<Vec<u8>>,
    names: Vec<String>,
    name_to_index: Vec<(String, usize)>,
}

impl Sequences {
    /// Read FASTA records, normalize the residue strings (uppercase,
    /// drop anything outside the scoring alphabet) and pre-map them to
    /// state indices. Raw and mapped rows have equal lengths because
    /// both are filtered by the same alphabet.
    pub fn from_fasta(reader: impl BufRead) -> Result<Self> {
        let rdr = bio::io::fasta::Reader::new(reader);

        let mut seqs = Vec::new();
        let mut mapped = Vec::new();
        let mut names = Vec::new();

        for rec in rdr.records() {
            let rec = rec?;
            let (raw, states) = normalize(rec.seq());
            names.push(rec.id().to_string());
            seqs.push(raw);
            mapped.push(states);
        }

        let mut name_to_index: Vec<(String, usize)> = names
            .iter()
            .enumerate()
            .map(|(i, n)| (n.clone(), i))
            .collect();
        name_to_index.sort();

        Ok(Self {
            seqs,
            mapped,
            names,
            name_to_index,
        })
    }

    pub fn len(&self) -> usize {
        self.seqs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seqs.is_empty()
    }

    pub fn seq_at(&self, i: usize) -> &[u8] {
        &self.seqs[i]
    }

    pub fn mapped_at(&self, i: usize) -> &[u8] {
        &self.mapped[i]
    }

    pub fn mapped_seqs(&self) -> &[Vec<u8>] {
        &self.mapped
    }

    pub fn name_at(&self, i: usize) -> &str {
        &self.names[i]
    }

    /// Resolve a name to its index. An unresolved name is a fatal
    /// condition: it means tree tips and the sequence set went out of
    /// sync.
    pub fn name_to_index(&self, name: &str) -> Result<usize> {
        self.name_to_index
            .binary_search_by(|(n, _)| n.as_str().cmp(name))
            .map(|pos| self.name_to_index[pos].1)
            .map_err(|_| anyhow!("sequence name not found: {}", name))
    }

    /// Duplicate sequence `i` under a new name. Returns the index of
    /// the clone; the name lookup stays sorted and queryable.
    pub fn clone_seq(&mut self, i: usize, name: &str) -> usize {
        let seq = self.seqs[i].clone();
        let mapped = self.mapped[i].clone();

        self.seqs.push(seq);
        self.mapped.push(mapped);
        self.names.push(name.to_string());

        let idx = self.seqs.len() - 1;
        let entry = (name.to_string(), idx);
        let pos = self
            .name_to_index
            .binary_search(&entry)
            .unwrap_or_else(|p| p);
        self.name_to_index.insert(pos, entry);

        idx
    }
}

fn normalize(seq: &[u8]) -> (Vec<u8>, Vec<u8>) {
    let mut raw = Vec::with_capacity(seq.len());
    let mut states = Vec::with_capacity(seq.len());

    for &c in seq {
        if let Some(s) = dna::state_index(c) {
            raw.push(c.to_ascii_uppercase());
            states.push(s);
        }
    }

    (raw, states)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn fixture() -> Sequences {
        let fa = ">s1\nacgt\n>s2\nAC-GTN\n>s3\nTTTT\n";
        Sequences::from_fasta(Cursor::new(fa)).unwrap()
    }

    #[test]
    fn test_normalization_drops_invalid() {
        let seqs = fixture();
        assert_eq!(seqs.len(), 3);
        assert_eq!(seqs.seq_at(0), b"ACGT");
        // gap and N are not part of the scoring alphabet
        assert_eq!(seqs.seq_at(1), b"ACGT");
        assert_eq!(seqs.mapped_at(1), &[0, 1, 2, 3]);
        assert_eq!(seqs.seq_at(1).len(), seqs.mapped_at(1).len());
    }

    #[test]
    fn test_name_lookup() {
        let seqs = fixture();
        assert_eq!(seqs.name_to_index("s2").unwrap(), 1);
        assert!(seqs.name_to_index("nope").is_err());
    }

    #[test]
    fn test_clone_seq_keeps_lookup_sorted() {
        let mut seqs = fixture();
        let idx = seqs.clone_seq(0, "s1_clone");
        assert_eq!(idx, 3);
        assert_eq!(seqs.seq_at(idx), seqs.seq_at(0));
        assert_eq!(seqs.name_to_index("s1_clone").unwrap(), 3);
        // existing entries still resolve
        assert_eq!(seqs.name_to_index("s3").unwrap(), 2);
    }
}
