use crate::index::Index;
use crate::minimizers::Minimizer;
use crate::path::PrgPath;
use std::cmp::Ordering;

/// Join of a read minimizer and one of its PRG occurrences.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MinimizerHit {
    pub read_id: u32,
    pub prg_id: u32,
    pub read_start: u32,
    pub prg_path: PrgPath,
    pub knode_id: u32,
    /// Whether the read and PRG minimizers came from the same strand.
    pub strand_agreement: bool,
}

impl MinimizerHit {
    /// Offset between read and PRG coordinates; constant along an exact
    /// co-linear match.
    pub fn diagonal(&self) -> i64 {
        i64::from(self.read_start) - i64::from(self.prg_path.start())
    }

    fn sort_key(&self) -> (u32, bool, u32, &PrgPath, u32, u32) {
        (
            self.prg_id,
            self.strand_agreement,
            self.read_start,
            &self.prg_path,
            self.knode_id,
            self.read_id,
        )
    }
}

impl PartialOrd for MinimizerHit {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MinimizerHit {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

/// A diagonal-consistent run of hits between one read and one PRG.
pub type Cluster = Vec<MinimizerHit>;

/// Look up every minimizer of a read in the index, producing unsorted hits.
pub fn hits_for_read(read_id: u32, minimizers: &[Minimizer], index: &Index) -> Vec<MinimizerHit> {
    let mut hits = Vec::new();
    for minimizer in minimizers {
        for record in index.get(minimizer.hash) {
            hits.push(MinimizerHit {
                read_id,
                prg_id: record.prg_id,
                read_start: minimizer.start,
                prg_path: record.path.clone(),
                knode_id: record.knode_id,
                strand_agreement: minimizer.strand == record.strand,
            });
        }
    }
    hits
}

/// Group hits into per-(PRG, strand-agreement) clusters: the sorted hit list
/// is cut wherever the PRG or strand agreement changes or the diagonal jumps
/// by more than `max_diff` relative to the previous hit. Only clusters of at
/// least `cluster_thresh` hits survive.
pub fn cluster_hits(
    mut hits: Vec<MinimizerHit>,
    max_diff: u32,
    cluster_thresh: usize,
) -> Vec<Cluster> {
    hits.sort();
    hits.dedup();

    let mut clusters = Vec::new();
    let mut open: Cluster = Vec::new();
    for hit in hits {
        let breaks = match open.last() {
            None => false,
            Some(prev) => {
                prev.prg_id != hit.prg_id
                    || prev.strand_agreement != hit.strand_agreement
                    || (hit.diagonal() - prev.diagonal()).unsigned_abs() > u64::from(max_diff)
            }
        };
        if breaks {
            if open.len() >= cluster_thresh {
                clusters.push(std::mem::take(&mut open));
            } else {
                open.clear();
            }
        }
        open.push(hit);
    }
    if open.len() >= cluster_thresh {
        clusters.push(open);
    }
    clusters
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::MiniRecord;
    use crate::minimizers::{minimizer_sketch, Strand};

    fn hit(prg_id: u32, read_start: u32, prg_start: u32, agreement: bool) -> MinimizerHit {
        MinimizerHit {
            read_id: 0,
            prg_id,
            read_start,
            prg_path: PrgPath::single(prg_start, 3),
            knode_id: prg_start + 1,
            strand_agreement: agreement,
        }
    }

    #[test]
    fn test_hits_join_read_minimizers_with_index() {
        let seq = b"AACGTGCTT";
        let minimizers = minimizer_sketch(seq, 1, 5).unwrap();

        let mut index = Index::new();
        // Register the first read minimizer as a PRG occurrence on each strand.
        let m = minimizers[0];
        for (knode_id, strand) in [(1, m.strand), (2, m.strand.flip())] {
            index.add(
                m.hash,
                MiniRecord {
                    prg_id: 9,
                    knode_id,
                    strand,
                    path: PrgPath::single(20, 5),
                },
            );
        }

        let hits = hits_for_read(4, &minimizers, &index);
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|h| h.read_id == 4 && h.prg_id == 9));
        assert!(hits.iter().any(|h| h.strand_agreement));
        assert!(hits.iter().any(|h| !h.strand_agreement));
    }

    #[test]
    fn test_hits_order_by_prg_strand_position() {
        let mut hits = vec![
            hit(2, 0, 0, true),
            hit(1, 5, 5, true),
            hit(1, 0, 0, true),
            hit(1, 0, 0, false),
        ];
        hits.sort();
        let keys: Vec<(u32, bool, u32)> = hits
            .iter()
            .map(|h| (h.prg_id, h.strand_agreement, h.read_start))
            .collect();
        assert_eq!(
            keys,
            vec![(1, false, 0), (1, true, 0), (1, true, 5), (2, true, 0)]
        );
    }

    #[test]
    fn test_duplicate_hits_collapse() {
        let hits = vec![hit(1, 0, 0, true), hit(1, 0, 0, true), hit(1, 2, 2, true)];
        let clusters = cluster_hits(hits, 5, 1);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].len(), 2);
    }

    #[test]
    fn test_cluster_breaks_on_diagonal_jump() {
        let hits = vec![
            hit(1, 0, 0, true),
            hit(1, 2, 2, true),
            hit(1, 4, 4, true),
            // Diagonal jumps from 0 to 50.
            hit(1, 60, 10, true),
            hit(1, 62, 12, true),
        ];
        let clusters = cluster_hits(hits, 5, 2);
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].len(), 3);
        assert_eq!(clusters[1].len(), 2);
    }

    #[test]
    fn test_cluster_breaks_on_prg_and_strand_change() {
        let hits = vec![
            hit(1, 0, 0, true),
            hit(1, 2, 2, true),
            hit(1, 0, 0, false),
            hit(1, 2, 2, false),
            hit(2, 0, 0, true),
            hit(2, 2, 2, true),
        ];
        let clusters = cluster_hits(hits, 5, 2);
        assert_eq!(clusters.len(), 3);
        for cluster in &clusters {
            let first = &cluster[0];
            assert!(cluster
                .iter()
                .all(|h| h.prg_id == first.prg_id
                    && h.strand_agreement == first.strand_agreement));
        }
    }

    #[test]
    fn test_cluster_threshold_filters_small_runs() {
        let hits = vec![
            hit(1, 0, 0, true),
            hit(1, 2, 2, true),
            // Lone hit on another PRG.
            hit(2, 0, 0, true),
        ];
        let clusters = cluster_hits(hits, 5, 2);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0][0].prg_id, 1);

        assert!(cluster_hits(vec![hit(1, 0, 0, true)], 5, 2).is_empty());
    }

    #[test]
    fn test_diagonal_drift_within_max_diff_stays_clustered() {
        // Successive diagonals 0, 3, 6: each step is within max_diff=3 of the
        // previous hit even though the total drift is larger.
        let hits = vec![hit(1, 0, 0, true), hit(1, 5, 2, true), hit(1, 10, 4, true)];
        let clusters = cluster_hits(hits, 3, 1);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].len(), 3);
    }
}
