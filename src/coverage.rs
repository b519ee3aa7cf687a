use crate::error::{Error, Result};
use crate::kmer_graph::{read_gfa, write_gfa, GfaCoverage, KmerGraph};
use crate::minimizers::Strand;
use crate::prg::SequenceSource;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::str::FromStr;

/// Noise model for per-node coverage probabilities. The legacy string names
/// (`bin`, `nbin`, `lin`) are only parsed at the CLI boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Model {
    Bin,
    NBin,
    Lin,
}

impl FromStr for Model {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "bin" => Ok(Model::Bin),
            "nbin" => Ok(Model::NBin),
            "lin" => Ok(Model::Lin),
            other => Err(Error::InvalidModel(other.to_string())),
        }
    }
}

impl std::fmt::Display for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Model::Bin => "bin",
            Model::NBin => "nbin",
            Model::Lin => "lin",
        })
    }
}

/// Coverage and probability bookkeeping over a borrowed k-mer graph. Owns
/// per-node per-sample strand-split counters; never the topology.
pub struct KmerGraphWithCoverage<'a> {
    pub kmer_prg: &'a KmerGraph,
    /// `node_coverages[node][sample] = (forward, reverse)`.
    node_coverages: Vec<Vec<(u16, u16)>>,
    pub num_reads: u32,
    pub exp_depth_covg: u32,
    binomial_parameter_p: f64,
    negative_binomial_parameter_p: f64,
    negative_binomial_parameter_r: f64,
    /// Mean log-likelihood below which a path is not believed; used by the
    /// sink rule of the max-path solver.
    pub thresh: f64,
}

impl<'a> KmerGraphWithCoverage<'a> {
    pub fn new(kmer_prg: &'a KmerGraph, num_samples: usize) -> Self {
        KmerGraphWithCoverage {
            kmer_prg,
            node_coverages: vec![vec![(0, 0); num_samples]; kmer_prg.len()],
            num_reads: 0,
            exp_depth_covg: 1,
            binomial_parameter_p: 1.0,
            negative_binomial_parameter_p: 0.015,
            negative_binomial_parameter_r: 2.0,
            thresh: -25.0,
        }
    }

    pub fn num_samples(&self) -> usize {
        self.node_coverages.first().map_or(0, Vec::len)
    }

    pub fn set_exp_depth_covg(&mut self, exp_depth_covg: u32) -> Result<()> {
        if exp_depth_covg == 0 {
            return Err(Error::InvariantViolation(
                "exp_depth_covg must be > 0".to_string(),
            ));
        }
        self.exp_depth_covg = exp_depth_covg;
        Ok(())
    }

    /// Derive the binomial success probability from the per-base error rate:
    /// `p = 1 / exp(e_rate * k)`.
    pub fn set_binomial_parameter_p(&mut self, e_rate: f64) -> Result<()> {
        if self.kmer_prg.k == 0 || e_rate <= 0.0 || e_rate >= 1.0 {
            return Err(Error::InvariantViolation(format!(
                "cannot set binomial p with k = {} and e_rate = {}",
                self.kmer_prg.k, e_rate
            )));
        }
        self.binomial_parameter_p = 1.0 / (e_rate * f64::from(self.kmer_prg.k)).exp();
        Ok(())
    }

    /// Fold another sample's negative binomial estimate into the parameters;
    /// they accumulate additively.
    pub fn set_negative_binomial_parameters(&mut self, p_add: f64, r_add: f64) -> Result<()> {
        if p_add == 0.0 && r_add == 0.0 {
            return Ok(());
        }
        let previously_valid = self.negative_binomial_parameter_p > 0.0
            && self.negative_binomial_parameter_p < 1.0
            && self.negative_binomial_parameter_r > 0.0;
        if !previously_valid {
            return Err(Error::UnsetParameter("negative_binomial_parameters"));
        }
        self.negative_binomial_parameter_p += p_add;
        self.negative_binomial_parameter_r += r_add;
        Ok(())
    }

    fn sample_slot(&self, node_id: u32, sample_id: u32) -> Option<(u16, u16)> {
        self.node_coverages
            .get(node_id as usize)
            .and_then(|samples| samples.get(sample_id as usize))
            .copied()
    }

    /// Add one read observation on a strand, saturating at the 16-bit
    /// maximum.
    pub fn increment_covg(&mut self, node_id: u32, strand: Strand, sample_id: u32) -> Result<()> {
        let slot = self
            .node_coverages
            .get_mut(node_id as usize)
            .and_then(|samples| samples.get_mut(sample_id as usize))
            .ok_or(Error::SampleOutOfRange(sample_id))?;
        let counter = match strand {
            Strand::Forward => &mut slot.0,
            Strand::Reverse => &mut slot.1,
        };
        *counter = counter.saturating_add(1);
        Ok(())
    }

    pub fn set_covg(
        &mut self,
        node_id: u32,
        value: u16,
        strand: Strand,
        sample_id: u32,
    ) -> Result<()> {
        let slot = self
            .node_coverages
            .get_mut(node_id as usize)
            .and_then(|samples| samples.get_mut(sample_id as usize))
            .ok_or(Error::SampleOutOfRange(sample_id))?;
        match strand {
            Strand::Forward => slot.0 = value,
            Strand::Reverse => slot.1 = value,
        }
        Ok(())
    }

    /// Coverage for one strand; 0 when the sample slot is absent.
    pub fn get_covg(&self, node_id: u32, strand: Strand, sample_id: u32) -> u32 {
        match (self.sample_slot(node_id, sample_id), strand) {
            (Some((forward, _)), Strand::Forward) => u32::from(forward),
            (Some((_, reverse)), Strand::Reverse) => u32::from(reverse),
            (None, _) => 0,
        }
    }

    fn total_covg(&self, node_id: u32, sample_id: u32) -> u32 {
        self.get_covg(node_id, Strand::Forward, sample_id)
            + self.get_covg(node_id, Strand::Reverse, sample_id)
    }

    /// True iff every non-sentinel node has zero coverage on both strands.
    pub fn coverage_is_zero(&self, sample_id: u32) -> bool {
        self.kmer_prg
            .nodes
            .iter()
            .filter(|node| !self.kmer_prg.is_sentinel(node.id))
            .all(|node| self.total_covg(node.id, sample_id) == 0)
    }

    /// Negative binomial log-probability of the node's summed coverage,
    /// floored to keep additions finite.
    pub fn nbin_prob(&self, node_id: u32, sample_id: u32) -> f64 {
        let s = f64::from(self.total_covg(node_id, sample_id));
        let log_prob = nb_ln_pdf(
            self.negative_binomial_parameter_r,
            self.negative_binomial_parameter_p,
            s,
        );
        log_prob.max(f64::MIN / 1000.0)
    }

    /// Linear log-probability `ln(covg / num_reads)`.
    pub fn lin_prob(&self, node_id: u32, sample_id: u32) -> Result<f64> {
        if self.num_reads == 0 {
            return Err(Error::UnsetParameter("num_reads"));
        }
        let s = f64::from(self.total_covg(node_id, sample_id));
        Ok((s / f64::from(self.num_reads)).ln())
    }

    pub fn bin_prob(&self, node_id: u32, sample_id: u32) -> Result<f64> {
        if self.num_reads == 0 {
            return Err(Error::UnsetParameter("num_reads"));
        }
        self.bin_prob_with_num(node_id, self.num_reads, sample_id)
    }

    /// Binomial log-probability of observing this node's strand-split
    /// coverage among `num` reads. Sentinels are neutral (0); coverage above
    /// `num` falls back to the success terms alone.
    pub fn bin_prob_with_num(&self, node_id: u32, num: u32, sample_id: u32) -> Result<f64> {
        if self.binomial_parameter_p == 1.0 {
            return Err(Error::UnsetParameter("binomial_parameter_p"));
        }
        if node_id as usize >= self.kmer_prg.len() {
            return Err(Error::InvariantViolation(format!(
                "bin_prob of nonexistent node {node_id}"
            )));
        }
        if self.kmer_prg.is_sentinel(node_id) {
            return Ok(0.0);
        }

        let forward = f64::from(self.get_covg(node_id, Strand::Forward, sample_id));
        let reverse = f64::from(self.get_covg(node_id, Strand::Reverse, sample_id));
        let s = forward + reverse;
        let n = f64::from(num);
        let p = self.binomial_parameter_p;

        let prob = if s > n {
            ln_multinomial2(s, forward, reverse) + s * (p / 2.0).ln()
        } else {
            ln_multinomial2(n, forward, reverse)
                + s * (p / 2.0).ln()
                + (n - s) * (1.0 - p).ln()
        };
        Ok(prob)
    }

    /// Dispatch on the chosen model.
    pub fn get_prob(&self, model: Model, node_id: u32, sample_id: u32) -> Result<f64> {
        match model {
            Model::NBin => Ok(self.nbin_prob(node_id, sample_id)),
            Model::Bin => {
                if self.binomial_parameter_p >= 1.0 {
                    return Err(Error::UnsetParameter("binomial_parameter_p"));
                }
                self.bin_prob(node_id, sample_id)
            }
            Model::Lin => self.lin_prob(node_id, sample_id),
        }
    }

    /// Mean log-likelihood per non-sentinel k-mer along a path.
    pub fn prob_path(&self, path: &[u32], sample_id: u32, model: Model) -> Result<f64> {
        if path.is_empty() {
            return Ok(0.0);
        }
        let mut sum = 0.0;
        for &node_id in path {
            sum += self.get_prob(model, node_id, sample_id)?;
        }
        let mut len = path.len();
        if self.kmer_prg.nodes[path[0] as usize].path.is_empty() {
            len -= 1;
        }
        if self.kmer_prg.nodes[path[path.len() - 1] as usize].path.is_empty() {
            len -= 1;
        }
        Ok(sum / len.max(1) as f64)
    }

    /// Save as GFA with split strand coverage and AT content, labelling
    /// segments with nucleotide sequences when a source is supplied, else
    /// with PRG paths.
    pub fn save(
        &self,
        filepath: &Path,
        sample_id: u32,
        sequences: Option<&dyn SequenceSource>,
    ) -> Result<()> {
        let file = File::create(filepath).map_err(|e| Error::io(filepath, e))?;
        let mut writer = BufWriter::new(file);
        let mut failed_translation = None;
        write_gfa(
            self.kmer_prg,
            &mut writer,
            |node| match sequences {
                Some(source) => match source.string_along_path(&node.path) {
                    Ok(seq) if !seq.is_empty() => seq,
                    Ok(_) => node.path.to_string(),
                    Err(e) => {
                        failed_translation.get_or_insert(e);
                        node.path.to_string()
                    }
                },
                None => node.path.to_string(),
            },
            |node| GfaCoverage::Split {
                forward: self.get_covg(node.id, Strand::Forward, sample_id),
                reverse: self.get_covg(node.id, Strand::Reverse, sample_id),
                num_at: Some(node.num_at),
            },
        )
        .map_err(|e| Error::io(filepath, e))?;
        match failed_translation {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Install per-node coverage (sample `sample_id`) loaded from disk.
    pub fn apply_coverage(&mut self, coverages: &[(u16, u16)], sample_id: u32) -> Result<()> {
        for (node_id, &(forward, reverse)) in coverages.iter().enumerate() {
            self.set_covg(node_id as u32, forward, Strand::Forward, sample_id)?;
            self.set_covg(node_id as u32, reverse, Strand::Reverse, sample_id)?;
        }
        Ok(())
    }
}

/// Load a coverage-augmented GFA: the rebuilt graph plus per-node
/// `(forward, reverse)` counts. Legacy combined-coverage files land entirely
/// on the forward strand.
pub fn load_with_coverage(filepath: &Path) -> Result<(KmerGraph, Vec<(u16, u16)>)> {
    let parsed = read_gfa(filepath)?;
    let mut graph = parsed.graph;
    let mut coverages = Vec::with_capacity(graph.len());
    for (node, coverage) in graph.nodes.iter_mut().zip(parsed.coverages.iter()) {
        let (forward, reverse) = match *coverage {
            GfaCoverage::Combined(c) => (c.min(u32::from(u16::MAX)) as u16, 0),
            GfaCoverage::Split {
                forward,
                reverse,
                num_at,
            } => {
                if let Some(at) = num_at {
                    node.num_at = at;
                }
                (
                    forward.min(u32::from(u16::MAX)) as u16,
                    reverse.min(u32::from(u16::MAX)) as u16,
                )
            }
        };
        node.covg = u32::from(forward) + u32::from(reverse);
        coverages.push((forward, reverse));
    }
    Ok((graph, coverages))
}

// Lanczos approximation (g = 7, 9 terms).
fn ln_gamma(x: f64) -> f64 {
    const COEFFS: [f64; 9] = [
        0.999_999_999_999_809_93,
        676.520_368_121_885_1,
        -1_259.139_216_722_402_8,
        771.323_428_777_653_13,
        -176.615_029_162_140_59,
        12.507_343_278_686_905,
        -0.138_571_095_265_720_12,
        9.984_369_578_019_571_6e-6,
        1.505_632_735_149_311_6e-7,
    ];
    if x < 0.5 {
        // Reflection formula.
        return std::f64::consts::PI.ln()
            - (std::f64::consts::PI * x).sin().abs().ln()
            - ln_gamma(1.0 - x);
    }
    let x = x - 1.0;
    let mut acc = COEFFS[0];
    for (i, &coeff) in COEFFS.iter().enumerate().skip(1) {
        acc += coeff / (x + i as f64);
    }
    let t = x + 7.5;
    0.5 * (2.0 * std::f64::consts::PI).ln() + (x + 0.5) * t.ln() - t + acc.ln()
}

/// Log multinomial coefficient `ln(n! / (k1! k2! (n-k1-k2)!))`.
fn ln_multinomial2(n: f64, k1: f64, k2: f64) -> f64 {
    ln_gamma(n + 1.0) - ln_gamma(k1 + 1.0) - ln_gamma(k2 + 1.0) - ln_gamma(n - k1 - k2 + 1.0)
}

/// Log PDF of the negative binomial with `r` failures and success
/// probability `p`, evaluated at `k` successes.
fn nb_ln_pdf(r: f64, p: f64, k: f64) -> f64 {
    ln_gamma(r + k) - ln_gamma(r) - ln_gamma(k + 1.0) + r * p.ln() + k * (1.0 - p).ln()
}
