use crate::coverage::{KmerGraphWithCoverage, Model};
use crate::error::{Error, Result};
use crate::kmer_graph::{KmerGraph, KmerNode};
use crate::minimizers::{minimizer_sketch, Strand};
use crate::path::PrgPath;
use crate::prg::SequenceSource;
use rand::Rng;
use rustc_hash::{FxHashMap, FxHashSet};

const TOLERANCE: f64 = 1e-6;
const MAX_EXTRACT_STEPS: usize = 1_000_000;

impl<'a> KmerGraphWithCoverage<'a> {
    /// Follow `next` pointers from `start` until the terminus, guarding
    /// against cycles.
    fn extract_path_from(&self, start: u32, next: &[u32], terminus: u32) -> Result<Vec<u32>> {
        let mut path = Vec::new();
        let mut node = start;
        while node < terminus {
            path.push(node);
            node = next[node as usize];
            if path.len() > MAX_EXTRACT_STEPS {
                return Err(Error::Infinite(MAX_EXTRACT_STEPS));
            }
        }
        Ok(path)
    }

    /// Find the path through the k-mer graph maximizing the mean per-node
    /// log-likelihood, averaging over at most `max_num_kmers_to_average`
    /// nodes of suffix. Returns the path without its sentinels plus its mean
    /// log-likelihood, or an empty path with the lowest score when the
    /// sample has no coverage at all.
    pub fn find_max_path(
        &self,
        model: Model,
        max_num_kmers_to_average: u32,
        sample_id: u32,
    ) -> Result<(Vec<u32>, f64)> {
        self.kmer_prg.check(0)?;
        if self.coverage_is_zero(sample_id) {
            return Ok((Vec::new(), f64::MIN));
        }

        let num_nodes = self.kmer_prg.len();
        let terminus = (num_nodes - 1) as u32;
        let mut sum_log_probs = vec![0.0f64; num_nodes];
        let mut suffix_len = vec![0u32; num_nodes];
        let mut next = vec![terminus; num_nodes];

        // Reverse topological scan; insertion order is topological with the
        // source first and the sink last.
        for j in (0..num_nodes - 1).rev() {
            let current = &self.kmer_prg.nodes[j];
            let current_id = current.id as usize;
            let mut max_mean = f64::MIN;
            let mut max_length: u32 = 0;

            for &succ in &current.out_nodes {
                let succ_id = succ as usize;
                let succ_mean = if suffix_len[succ_id] > 0 {
                    sum_log_probs[succ_id] / f64::from(suffix_len[succ_id])
                } else {
                    f64::NEG_INFINITY
                };

                let is_terminus_and_most_likely =
                    succ == terminus && self.thresh > max_mean + TOLERANCE;
                let avg_log_likelihood_is_most_likely = succ_mean > max_mean + TOLERANCE;
                let avg_log_likelihood_is_close = max_mean - succ_mean <= TOLERANCE;
                let is_longer_path = suffix_len[succ_id] > max_length;

                if is_terminus_and_most_likely
                    || avg_log_likelihood_is_most_likely
                    || (avg_log_likelihood_is_close && is_longer_path)
                {
                    sum_log_probs[current_id] =
                        self.get_prob(model, current.id, sample_id)? + sum_log_probs[succ_id];
                    suffix_len[current_id] = 1 + suffix_len[succ_id];
                    next[current_id] = succ;

                    if suffix_len[current_id] > max_num_kmers_to_average {
                        // Drop the node max_num_kmers_to_average steps back
                        // along the chosen suffix.
                        let mut tail = next[current_id];
                        for _ in 1..max_num_kmers_to_average {
                            tail = next[tail as usize];
                        }
                        sum_log_probs[current_id] -= self.get_prob(model, tail, sample_id)?;
                        suffix_len[current_id] -= 1;
                        debug_assert_eq!(suffix_len[current_id], max_num_kmers_to_average);
                    }

                    if succ != terminus {
                        max_mean = sum_log_probs[succ_id] / f64::from(suffix_len[succ_id]);
                        max_length = suffix_len[succ_id];
                    } else {
                        max_mean = self.thresh;
                    }
                }
            }
        }

        if suffix_len[0] == 0 {
            return Err(Error::NoPath);
        }
        let path = self.extract_path_from(next[0], &next, terminus)?;
        let prob = self.prob_path(&path, sample_id, model)?;
        Ok((path, prob))
    }

    /// Variant of [`find_max_path`] that settles every ≥2-way branch by
    /// mapping the gene's reads against the candidate suffix sequences
    /// instead of comparing likelihood means. The final score still comes
    /// from the probability model.
    pub fn find_max_path_disambiguated(
        &self,
        model: Model,
        sample_id: u32,
        sequences: &dyn SequenceSource,
        locus_reads: &[Vec<u8>],
    ) -> Result<(Vec<u32>, f64)> {
        self.kmer_prg.check(0)?;
        if self.coverage_is_zero(sample_id) {
            return Ok((Vec::new(), f64::MIN));
        }

        let num_nodes = self.kmer_prg.len();
        let terminus = (num_nodes - 1) as u32;
        let mut next = vec![terminus; num_nodes];

        for j in (0..num_nodes - 1).rev() {
            let current = &self.kmer_prg.nodes[j];
            let chosen = match current.out_nodes.len() {
                0 => None,
                1 => Some(current.out_nodes[0]),
                _ => Some(self.choose_outnode_by_read_mapping(
                    current,
                    &next,
                    terminus,
                    sequences,
                    locus_reads,
                    sample_id,
                )?),
            };
            if let Some(succ) = chosen {
                next[current.id as usize] = succ;
            }
        }

        let path = self.extract_path_from(next[0], &next, terminus)?;
        let prob = self.prob_path(&path, sample_id, model)?;
        Ok((path, prob))
    }

    fn choose_outnode_by_read_mapping(
        &self,
        current: &KmerNode,
        next: &[u32],
        terminus: u32,
        sequences: &dyn SequenceSource,
        locus_reads: &[Vec<u8>],
        sample_id: u32,
    ) -> Result<u32> {
        let mut candidates: Vec<u32> = current.out_nodes.clone();
        candidates.sort_unstable();

        // Translate each candidate's current best suffix into nucleotides.
        let mut candidate_seqs: Vec<(u32, Vec<u8>)> = Vec::with_capacity(candidates.len());
        for &candidate in &candidates {
            let suffix = self.extract_path_from(candidate, next, terminus)?;
            let union = PrgPath::union(
                suffix
                    .iter()
                    .map(|&id| &self.kmer_prg.nodes[id as usize].path),
            );
            let seq = sequences.string_along_path(&union)?;
            if !seq.is_empty() {
                candidate_seqs.push((candidate, seq.into_bytes()));
            }
        }

        // Count primary alignments per candidate with an in-memory minimizer
        // index over the candidate sequences.
        let k = self.kmer_prg.k.max(1);
        let mut mapped_counts: FxHashMap<u32, u32> = FxHashMap::default();
        let candidate_sketches: Vec<(u32, FxHashSet<u64>)> = candidate_seqs
            .iter()
            .filter_map(|(candidate, seq)| {
                let hashes: FxHashSet<u64> = minimizer_sketch(seq, 1, k)
                    .ok()?
                    .into_iter()
                    .map(|m| m.hash)
                    .collect();
                Some((*candidate, hashes))
            })
            .collect();
        for read in locus_reads {
            let Ok(read_minimizers) = minimizer_sketch(read, 1, k) else {
                continue;
            };
            let read_hashes: FxHashSet<u64> =
                read_minimizers.into_iter().map(|m| m.hash).collect();
            let mut primary: Option<(usize, u32)> = None;
            for (candidate, hashes) in &candidate_sketches {
                let shared = read_hashes.intersection(hashes).count();
                // Strictly-greater keeps the lowest candidate id on ties.
                if shared > 0 && primary.is_none_or(|(best, _)| shared > best) {
                    primary = Some((shared, *candidate));
                }
            }
            if let Some((_, candidate)) = primary {
                *mapped_counts.entry(candidate).or_default() += 1;
            }
        }

        let mut best: Option<(u32, u32)> = None; // (count, candidate)
        for &candidate in &candidates {
            if let Some(&count) = mapped_counts.get(&candidate) {
                if best.is_none_or(|(best_count, _)| count > best_count) {
                    best = Some((count, candidate));
                }
            }
        }
        if let Some((_, candidate)) = best {
            return Ok(candidate);
        }

        // Nothing mapped: prefer the sink, then the best covered candidate.
        if candidates.contains(&terminus) {
            return Ok(terminus);
        }
        let mut best_candidate = candidates[0];
        let mut best_coverage: i64 = -1;
        for &candidate in &candidates {
            let coverage = i64::from(
                self.get_covg(candidate, Strand::Forward, sample_id)
                    + self.get_covg(candidate, Strand::Reverse, sample_id),
            );
            if coverage > best_coverage {
                best_coverage = coverage;
                best_candidate = candidate;
            }
        }
        Ok(best_candidate)
    }
}

impl KmerGraph {
    /// Uniform-successor random walks from source to sink; the sink is left
    /// off the returned node lists. The RNG is injected so callers can make
    /// the walks reproducible.
    pub fn random_paths<R: Rng>(&self, num_paths: usize, rng: &mut R) -> Vec<Vec<u32>> {
        let mut paths = Vec::new();
        if self.is_empty() {
            return paths;
        }
        let sink = self.sink_id();
        for _ in 0..num_paths {
            let mut path = Vec::new();
            let mut node = self.source_id();
            loop {
                let successors = &self.nodes[node as usize].out_nodes;
                if successors.is_empty() {
                    break;
                }
                node = successors[rng.random_range(0..successors.len())];
                if node == sink {
                    break;
                }
                path.push(node);
            }
            paths.push(path);
        }
        paths
    }
}
