use crate::coverage::KmerGraphWithCoverage;
use crate::error::{Error, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Coverage histogram bins: counts of kmers with total coverage 0..1000.
pub const COVG_HIST_BINS: usize = 1000;
/// Log-probability histogram bins; bin `j` covers `[j - offset, j + 1 - offset)`
/// where the offset equals the bin count.
pub const PROB_HIST_BINS: usize = 200;

fn argmax(dist: &[u32], lo: usize, hi: usize) -> usize {
    let mut best = lo;
    for i in lo..hi.min(dist.len()) {
        if dist[i] > dist[best] {
            best = i;
        }
    }
    best
}

fn argmin(dist: &[u32], lo: usize, hi: usize) -> usize {
    let mut best = lo;
    for i in lo..hi.min(dist.len()) {
        if dist[i] < dist[best] {
            best = i;
        }
    }
    best
}

/// Position of the second peak of a kmer coverage histogram: the error peak
/// near zero is skipped by requiring three increases before believing the
/// distribution has turned upward again. Returns 0 when no second peak is
/// found.
pub fn find_mean_covg(kmer_covg_dist: &[u32]) -> u32 {
    let mut first_peak = true;
    let mut noise_buffer = 0;
    let mut max_covg = 0usize;

    for i in 1..kmer_covg_dist.len() {
        if kmer_covg_dist[i] <= kmer_covg_dist[i - 1] {
            continue;
        } else if first_peak && noise_buffer < 3 {
            noise_buffer += 1;
        } else if first_peak {
            first_peak = false;
            max_covg = i;
        } else if kmer_covg_dist[i] > kmer_covg_dist[max_covg] {
            max_covg = i;
        }
    }

    if first_peak {
        eprintln!("Did not find 2 distinct coverage peaks - use default error rate");
        return 0;
    }
    max_covg as u32
}

/// Position (in log-probability units) of the minimum between the two peaks
/// of a kmer log-probability histogram. `bin_offset` maps bin indices back to
/// log probabilities: bin `j` holds probabilities in `[j - bin_offset, j + 1 - bin_offset)`.
pub fn find_prob_thresh(kmer_prob_dist: &[u32], bin_offset: i32) -> i32 {
    if kmer_prob_dist.is_empty() {
        return 0;
    }
    let len = kmer_prob_dist.len();

    let locate_peaks = |edge_margin: usize| -> (usize, usize) {
        let mut first_peak = 0usize;
        let mut second_peak = len - 1;
        while (first_peak == 0 || second_peak == len - 1) && first_peak != second_peak {
            let peak = argmax(kmer_prob_dist, first_peak + 1, second_peak);
            let progressed = if peak + edge_margin > len {
                let moved = peak != second_peak;
                second_peak = peak;
                moved
            } else {
                let moved = peak != first_peak;
                first_peak = peak;
                moved
            };
            if !progressed {
                break;
            }
        }
        (first_peak, second_peak)
    };

    let (mut first_peak, mut second_peak) = locate_peaks(15);
    if first_peak == second_peak {
        (first_peak, second_peak) = locate_peaks(6);
        if first_peak == second_peak {
            // Single-peaked: choose the minimal non-zero bin past the peak.
            let mut peak = argmax(kmer_prob_dist, 0, len);
            for i in peak..len {
                if kmer_prob_dist[i] > 0
                    && (kmer_prob_dist[i] < kmer_prob_dist[peak] || kmer_prob_dist[peak] == 0)
                {
                    peak = i;
                }
            }
            eprintln!("Found a single probability peak; chose a minimal non-zero threshold");
            return peak as i32 - bin_offset;
        }
    }

    let minimum = argmin(kmer_prob_dist, first_peak, second_peak);
    minimum as i32 - bin_offset
}

fn write_histogram(
    path: &Path,
    rows: impl Iterator<Item = (i64, u32)>,
) -> Result<()> {
    let file = File::create(path).map_err(|e| Error::io(path, e))?;
    let mut writer = BufWriter::new(file);
    for (bin, count) in rows {
        writeln!(writer, "{}\t{}", bin, count).map_err(|e| Error::io(path, e))?;
    }
    Ok(())
}

/// Estimate the per-base error rate and the true-kmer probability threshold
/// from the coverage of every gene hit by the sample, writing the two
/// histogram side files along the way. Sets the binomial parameter and the
/// threshold on every graph and returns the (possibly updated) error rate.
pub fn estimate_parameters(
    kgcs: &mut [KmerGraphWithCoverage<'_>],
    prefix: &Path,
    k: u32,
    mut e_rate: f64,
    sample_id: u32,
) -> Result<f64> {
    let num_hit_genes = kgcs.iter().filter(|kgc| kgc.num_reads > 0).count();
    if num_hit_genes == 0 {
        return Ok(e_rate);
    }

    // Coverage histogram over all non-sentinel kmers of the genes hit by
    // this sample.
    let mut kmer_covg_dist = vec![0u32; COVG_HIST_BINS];
    let mut num_reads: u64 = 0;
    for kgc in kgcs.iter().filter(|kgc| kgc.num_reads > 0) {
        num_reads += u64::from(kgc.num_reads);
        for node in &kgc.kmer_prg.nodes {
            if kgc.kmer_prg.is_sentinel(node.id) {
                continue;
            }
            let covg = kgc.get_covg(node.id, crate::minimizers::Strand::Forward, sample_id)
                + kgc.get_covg(node.id, crate::minimizers::Strand::Reverse, sample_id);
            if (covg as usize) < COVG_HIST_BINS {
                kmer_covg_dist[covg as usize] += 1;
            }
        }
    }
    let num_reads = (num_reads / num_hit_genes as u64) as u32;

    let covgs_path = PathBuf::from(format!("{}.kmer_covgs.txt", prefix.display()));
    eprintln!(
        "Writing kmer coverage distribution to {}",
        covgs_path.display()
    );
    write_histogram(
        &covgs_path,
        kmer_covg_dist
            .iter()
            .enumerate()
            .map(|(j, &c)| (j as i64, c)),
    )?;

    // Update the error rate when the depth allows it.
    if num_reads > 30 {
        let mean_covg = find_mean_covg(&kmer_covg_dist);
        if mean_covg > 0 {
            let updated = -(f64::from(mean_covg) / f64::from(num_reads)).ln() / f64::from(k);
            eprintln!("Estimated error rate updated from {} to {}", e_rate, updated);
            e_rate = updated;
        }
    } else {
        eprintln!("Insufficient coverage to update error rate");
    }

    // Log-probability histogram under the binomial model.
    let bin_offset = PROB_HIST_BINS as i32;
    let mut kmer_prob_dist = vec![0u32; PROB_HIST_BINS];
    for kgc in kgcs.iter_mut() {
        if kgc.num_reads == 0 {
            continue;
        }
        kgc.set_binomial_parameter_p(e_rate)?;
        for node_id in 1..kgc.kmer_prg.sink_id() {
            let prob = kgc.bin_prob(node_id, sample_id)?;
            let bin = (prob + f64::from(bin_offset)).floor();
            if (0.0..PROB_HIST_BINS as f64).contains(&bin) {
                kmer_prob_dist[bin as usize] += 1;
            }
        }
    }

    let probs_path = PathBuf::from(format!("{}.kmer_probs.txt", prefix.display()));
    eprintln!(
        "Writing kmer probability distribution to {}",
        probs_path.display()
    );
    write_histogram(
        &probs_path,
        kmer_prob_dist
            .iter()
            .enumerate()
            .map(|(j, &c)| (j as i64 - i64::from(bin_offset), c)),
    )?;

    // Threshold for believing a kmer: the dip between peaks, or the most
    // negative populated bin when the histogram is too thin.
    let first_nonzero = kmer_prob_dist
        .iter()
        .position(|&c| c > 0)
        .unwrap_or(PROB_HIST_BINS - 1);
    let populated: u32 = kmer_prob_dist[(first_nonzero + 1).min(PROB_HIST_BINS)..]
        .iter()
        .sum();
    let thresh = if populated > 1000 {
        let thresh = find_prob_thresh(&kmer_prob_dist, bin_offset);
        eprintln!("Estimated threshold for true kmers is {}", thresh);
        thresh
    } else {
        let thresh = first_nonzero as i32 + 1 - bin_offset;
        eprintln!(
            "Not enough non-zero coverage kmers to estimate a threshold; using the naive threshold {}",
            thresh
        );
        thresh
    };
    for kgc in kgcs.iter_mut() {
        kgc.thresh = f64::from(thresh);
    }

    Ok(e_rate)
}
