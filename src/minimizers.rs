use crate::error::{Error, Result};
use rustc_hash::FxHashSet;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use xxhash_rust::xxh3;

pub const DEFAULT_KMER_LENGTH: u32 = 15;
pub const DEFAULT_WINDOW_SIZE: u32 = 1;

/// Strand of a canonical k-mer: which of the k-mer and its reverse
/// complement won the canonical hash comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Strand {
    Forward,
    Reverse,
}

impl Strand {
    pub fn flip(self) -> Strand {
        match self {
            Strand::Forward => Strand::Reverse,
            Strand::Reverse => Strand::Forward,
        }
    }

    pub fn is_forward(self) -> bool {
        self == Strand::Forward
    }
}

// On the wire a strand is a single byte.
impl Serialize for Strand {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_u8(match self {
            Strand::Forward => 0,
            Strand::Reverse => 1,
        })
    }
}

impl<'de> Deserialize<'de> for Strand {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        match u8::deserialize(deserializer)? {
            0 => Ok(Strand::Forward),
            1 => Ok(Strand::Reverse),
            other => Err(D::Error::custom(format!("invalid strand byte {}", other))),
        }
    }
}

/// A (w,k)-minimizer extracted from a read or a PRG's linearized sequence:
/// canonical fingerprint, half-open position `[start, end)` and the strand
/// the fingerprint came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Minimizer {
    pub start: u32,
    pub end: u32,
    pub hash: u64,
    pub strand: Strand,
}

/// Canonicalise IUPAC ambiguous nucleotides to ACGT
#[inline]
fn canonicalise_nucleotide(nucleotide: u8) -> u8 {
    match nucleotide {
        b'A' | b'a' => b'A',
        b'C' | b'c' => b'C',
        b'G' | b'g' => b'G',
        b'T' | b't' => b'T',
        b'R' | b'r' => b'G',
        b'Y' | b'y' => b'C',
        b'S' | b's' => b'G',
        b'W' | b'w' => b'A',
        b'K' | b'k' => b'G',
        b'M' | b'm' => b'C',
        b'B' | b'b' => b'C',
        b'D' | b'd' => b'G',
        b'H' | b'h' => b'C',
        b'V' | b'v' => b'G',
        b'N' | b'n' => b'C',
        _ => b'C',
    }
}

/// Canonicalise a sequence
pub fn canonicalise_sequence(seq: &[u8]) -> Vec<u8> {
    seq.iter()
        .map(|&nucleotide| canonicalise_nucleotide(nucleotide))
        .collect()
}

#[inline]
fn complement(base: u8) -> u8 {
    match base {
        b'A' => b'T',
        b'C' => b'G',
        b'G' => b'C',
        _ => b'A',
    }
}

pub fn reverse_complement(seq: &[u8]) -> Vec<u8> {
    seq.iter().rev().map(|&b| complement(b)).collect()
}

/// Canonical fingerprint of a k-mer: the smaller of the forward and
/// reverse-complement xxh3 hashes. The forward strand wins ties.
pub fn canonical_kmer_hash(kmer: &[u8]) -> (u64, Strand) {
    let forward = xxh3::xxh3_64(kmer);
    let reverse = xxh3::xxh3_64(&reverse_complement(kmer));
    if forward <= reverse {
        (forward, Strand::Forward)
    } else {
        (reverse, Strand::Reverse)
    }
}

/// Extract the canonical (w,k)-minimizers of a sequence: in every window of
/// `w` consecutive k-mers, each k-mer achieving the minimal canonical hash is
/// a minimizer. The result is deduplicated on (hash, start) and ordered by
/// position.
pub fn minimizer_sketch(seq: &[u8], w: u32, k: u32) -> Result<Vec<Minimizer>> {
    let needed = (k + w - 1) as usize;
    if seq.len() < needed {
        return Err(Error::SequenceTooShort {
            length: seq.len(),
            k,
            w,
        });
    }

    let canonical = canonicalise_sequence(seq);
    let k = k as usize;
    let w = w as usize;
    let num_kmers = canonical.len() - k + 1;

    let hashes: Vec<(u64, Strand)> = (0..num_kmers)
        .map(|i| canonical_kmer_hash(&canonical[i..i + k]))
        .collect();

    let mut seen: FxHashSet<(u64, u32)> = FxHashSet::default();
    let mut minimizers = Vec::new();
    for window in 0..=(num_kmers - w) {
        let min_hash = hashes[window..window + w]
            .iter()
            .map(|&(h, _)| h)
            .min()
            .unwrap();
        for offset in 0..w {
            let (hash, strand) = hashes[window + offset];
            if hash != min_hash {
                continue;
            }
            let start = (window + offset) as u32;
            if seen.insert((hash, start)) {
                minimizers.push(Minimizer {
                    start,
                    end: start + k as u32,
                    hash,
                    strand,
                });
            }
        }
    }
    minimizers.sort();
    Ok(minimizers)
}

/// Count of A/T bases in a slice; carried on k-mer graph nodes as a
/// downstream tie-breaker.
pub fn at_content(seq: &[u8]) -> u32 {
    seq.iter()
        .filter(|&&b| matches!(b, b'A' | b'a' | b'T' | b't'))
        .count() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonicalise_nucleotide() {
        assert_eq!(canonicalise_nucleotide(b'A'), b'A');
        assert_eq!(canonicalise_nucleotide(b'c'), b'C');
        assert_eq!(canonicalise_nucleotide(b'N'), b'C');
        assert_eq!(canonicalise_nucleotide(b'W'), b'A');
    }

    #[test]
    fn test_reverse_complement() {
        assert_eq!(reverse_complement(b"AACGT"), b"ACGTT");
        assert_eq!(reverse_complement(b"ACG"), b"CGT");
    }

    #[test]
    fn test_canonical_hash_strand_symmetry() {
        let (h_fwd, s_fwd) = canonical_kmer_hash(b"ACGTA");
        let (h_rev, s_rev) = canonical_kmer_hash(&reverse_complement(b"ACGTA"));
        assert_eq!(h_fwd, h_rev);
        assert_eq!(s_fwd, s_rev.flip());
    }

    #[test]
    fn test_palindromic_kmer_is_forward() {
        // ACGT is its own reverse complement, so the forward strand wins.
        let (_, strand) = canonical_kmer_hash(b"ACGT");
        assert_eq!(strand, Strand::Forward);
    }

    #[test]
    fn test_sequence_too_short() {
        assert!(matches!(
            minimizer_sketch(b"ACGT", 2, 5),
            Err(Error::SequenceTooShort { length: 4, k: 5, w: 2 })
        ));
        assert!(matches!(
            minimizer_sketch(b"", 1, 3),
            Err(Error::SequenceTooShort { .. })
        ));
        // k + w - 1 exactly
        assert!(minimizer_sketch(b"ACGTA", 3, 3).is_ok());
    }

    #[test]
    fn test_w1_yields_every_kmer() {
        let seq = b"ACGTACGTACG";
        let minimizers = minimizer_sketch(seq, 1, 5).unwrap();
        let starts: Vec<u32> = minimizers.iter().map(|m| m.start).collect();
        assert_eq!(starts, (0..=(seq.len() as u32 - 5)).collect::<Vec<_>>());
    }

    // Reference scan for w=2, k=3 over AACGTGC: per window of two successive
    // k-mers pick every position achieving the canonical minimum.
    #[test]
    fn test_sketch_matches_reference_scan() {
        let seq = b"AACGTGC";
        let (w, k) = (2usize, 3usize);
        let kmers: Vec<&[u8]> = (0..=seq.len() - k).map(|i| &seq[i..i + k]).collect();
        let hashes: Vec<(u64, Strand)> =
            kmers.iter().map(|kmer| canonical_kmer_hash(kmer)).collect();

        let mut expected = std::collections::BTreeSet::new();
        for window in 0..=kmers.len() - w {
            let min = hashes[window..window + w].iter().map(|h| h.0).min().unwrap();
            for offset in 0..w {
                let (h, strand) = hashes[window + offset];
                if h == min {
                    expected.insert(((window + offset) as u32, h, strand));
                }
            }
        }

        let got: std::collections::BTreeSet<(u32, u64, Strand)> = minimizer_sketch(seq, 2, 3)
            .unwrap()
            .into_iter()
            .map(|m| (m.start, m.hash, m.strand))
            .collect();
        assert_eq!(got, expected);

        // ACG at position 1 and CGT at position 2 are reverse complements;
        // their shared canonical hash makes both minimizers of window 1.
        let starts: FxHashSet<u32> = got.iter().map(|&(s, _, _)| s).collect();
        assert!(starts.contains(&1) && starts.contains(&2));
        // Every minimizer is one of the five 3-mers of the sequence.
        assert!(starts.iter().all(|&s| s <= 4));
    }

    #[test]
    fn test_sketch_is_strand_symmetric() {
        let seq = b"AACGTGCTTAGGCTA";
        let (w, k) = (3u32, 5u32);
        let fwd = minimizer_sketch(seq, w, k).unwrap();
        let rev = minimizer_sketch(&reverse_complement(seq), w, k).unwrap();

        let len = seq.len() as u32;
        let mirrored: FxHashSet<(u64, u32, Strand)> = rev
            .iter()
            .map(|m| (m.hash, len - m.end, m.strand.flip()))
            .collect();
        let forward: FxHashSet<(u64, u32, Strand)> =
            fwd.iter().map(|m| (m.hash, m.start, m.strand)).collect();
        assert_eq!(forward, mirrored);
    }

    #[test]
    fn test_at_content() {
        assert_eq!(at_content(b"ACGT"), 2);
        assert_eq!(at_content(b"GGCC"), 0);
        assert_eq!(at_content(b"aTta"), 4);
    }
}
