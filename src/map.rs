use crate::cluster::{cluster_hits, hits_for_read, Cluster};
use crate::coverage::{KmerGraphWithCoverage, Model};
use crate::error::Error;
use crate::estimate::estimate_parameters;
use crate::index::Index;
use crate::minimizers::{minimizer_sketch, Strand};
use crate::pangraph::{orientation, PanGraph};
use crate::path::PrgPath;
use crate::prg::{load_gene_prgs, SequenceSource};
use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use needletail::parse_fastx_file;
use rustc_hash::FxHashSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::time::Instant;

const SPINNER_UPDATE_INTERVAL: u64 = 4096;

/// Configuration for `panmap map`.
pub struct MapConfig {
    pub prgs_path: PathBuf,
    pub reads_path: PathBuf,
    pub out_prefix: PathBuf,
    pub window_size: u32,
    pub kmer_length: u32,
    pub max_diff: u32,
    pub cluster_thresh: usize,
    pub error_rate: f64,
    pub model: Model,
    pub max_kmers_to_average: u32,
    pub disambiguate: bool,
}

impl MapConfig {
    pub fn execute(&self) -> Result<()> {
        run_map(self)
    }
}

/// The gene hits of one read, ordered along the read.
fn genes_along_read(clusters: &[Cluster]) -> Vec<(u32, bool)> {
    let mut ordered: Vec<&Cluster> = clusters.iter().collect();
    ordered.sort_by_key(|cluster| cluster[0].read_start);
    ordered
        .iter()
        .map(|cluster| (cluster[0].prg_id, cluster[0].strand_agreement))
        .collect()
}

/// Map reads against a PRG library: build the index in memory, cluster read
/// minimizer hits, accumulate per-gene coverage and the sample pan-graph,
/// then infer and report the maximum-likelihood path of every gene hit.
pub fn run_map(config: &MapConfig) -> Result<()> {
    let start_time = Instant::now();
    let version: String = env!("CARGO_PKG_VERSION").to_string();
    eprintln!(
        "Panmap v{}; mode: map; model: {}; options: w={}, k={}, max_diff={}, cluster_thresh={}",
        version,
        config.model,
        config.window_size,
        config.kmer_length,
        config.max_diff,
        config.cluster_thresh
    );

    // Index the PRG library.
    let mut prgs = load_gene_prgs(&config.prgs_path).context("Failed to load PRG file")?;
    let mut index = Index::new();
    eprintln!(
        "Building index from {} PRG(s) (k={}, w={})",
        prgs.len(),
        config.kmer_length,
        config.window_size
    );
    for prg in &mut prgs {
        match prg.minimizer_sketch(&mut index, config.window_size, config.kmer_length) {
            Ok(_) => {}
            Err(Error::SequenceTooShort { .. }) => {
                eprintln!("  {} skipped: too short to sketch", prg.name);
            }
            Err(e) => return Err(e.into()),
        }
    }

    // Coverage graphs borrow the now-frozen PRGs.
    let prgs = prgs;
    let sample_id = 0;
    let mut kgcs: Vec<KmerGraphWithCoverage> = prgs
        .iter()
        .map(|prg| KmerGraphWithCoverage::new(&prg.kmer_prg, 1))
        .collect();
    let mut gene_read_counts = vec![0u32; prgs.len()];
    let mut gene_reads: Vec<Vec<Vec<u8>>> = vec![Vec::new(); prgs.len()];
    let mut pangraph = PanGraph::new();

    // Progress bar setup
    let spinner = ProgressBar::with_draw_target(None, ProgressDrawTarget::stderr());
    spinner.set_style(
        ProgressStyle::default_spinner()
            .tick_strings(&[".  ", ".. ", "...", " ..", "  .", "   "])
            .template("{msg}{spinner} ")?,
    );
    spinner.set_message("Mapping reads");

    let mut reader =
        parse_fastx_file(&config.reads_path).context("Failed to open reads file")?;
    let mut total_reads: u64 = 0;
    let mut mapped_reads: u64 = 0;
    let mut total_bp: u64 = 0;
    while let Some(record) = reader.next() {
        let record = record.context("Error reading reads file")?;
        let seq = record.seq();
        let read_id = total_reads as u32;
        total_reads += 1;
        total_bp += seq.len() as u64;
        if total_reads % SPINNER_UPDATE_INTERVAL == 0 {
            spinner.set_message(format!("Mapped {} reads", total_reads));
        }

        let minimizers = match minimizer_sketch(&seq, config.window_size, config.kmer_length) {
            Ok(minimizers) => minimizers,
            Err(Error::SequenceTooShort { .. }) => continue,
            Err(e) => return Err(e.into()),
        };
        let hits = hits_for_read(read_id, &minimizers, &index);
        let clusters = cluster_hits(hits, config.max_diff, config.cluster_thresh);
        if clusters.is_empty() {
            continue;
        }
        mapped_reads += 1;

        // Pan-graph: genes in read order, adjacencies between neighbours.
        let genes = genes_along_read(&clusters);
        for &(prg_id, _) in &genes {
            pangraph.add_node(prg_id, &prgs[prg_id as usize].name);
        }
        for pair in genes.windows(2) {
            let (from, from_forward) = pair[0];
            let (to, to_forward) = pair[1];
            pangraph.add_edge(from, to, orientation(from_forward, to_forward));
        }

        // Coverage: one increment per hit, on the strand the read agrees
        // with.
        let mut genes_seen: FxHashSet<u32> = FxHashSet::default();
        for cluster in &clusters {
            for hit in cluster {
                let strand = if hit.strand_agreement {
                    Strand::Forward
                } else {
                    Strand::Reverse
                };
                kgcs[hit.prg_id as usize].increment_covg(hit.knode_id, strand, sample_id)?;
            }
            genes_seen.insert(cluster[0].prg_id);
        }
        for &prg_id in &genes_seen {
            gene_read_counts[prg_id as usize] += 1;
            if config.disambiguate {
                gene_reads[prg_id as usize].push(seq.to_vec());
            }
        }
    }
    spinner.finish_and_clear();

    for (kgc, &count) in kgcs.iter_mut().zip(&gene_read_counts) {
        kgc.num_reads = count;
    }
    let genes_hit = gene_read_counts.iter().filter(|&&c| c > 0).count();
    eprintln!(
        "Mapped {}/{} reads ({}bp) onto {} gene(s)",
        mapped_reads, total_reads, total_bp, genes_hit
    );

    if let Some(parent) = config.out_prefix.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).context("Failed to create output directory")?;
        }
    }

    // Error rate, probability threshold and the two histogram side files.
    let e_rate = estimate_parameters(
        &mut kgcs,
        &config.out_prefix,
        config.kmer_length,
        config.error_rate,
        sample_id,
    )?;

    // Per-gene consensus paths.
    let graphs_dir = PathBuf::from(format!("{}_kmer_graphs", config.out_prefix.display()));
    std::fs::create_dir_all(&graphs_dir).context("Failed to create kmer graph directory")?;
    let consensus_path = PathBuf::from(format!("{}.consensus.fa", config.out_prefix.display()));
    let consensus_file =
        File::create(&consensus_path).context("Failed to create consensus file")?;
    let mut consensus = BufWriter::new(consensus_file);

    for (prg, kgc) in prgs.iter().zip(&kgcs) {
        if kgc.num_reads == 0 {
            continue;
        }
        let found = if config.disambiguate {
            kgc.find_max_path_disambiguated(
                config.model,
                sample_id,
                prg,
                &gene_reads[prg.id as usize],
            )
        } else {
            kgc.find_max_path(config.model, config.max_kmers_to_average, sample_id)
        };
        let (max_path, log_prob) = match found {
            Ok(result) => result,
            Err(Error::NoPath) => {
                eprintln!("  {}: no consensus path through the kmer graph", prg.name);
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        if max_path.is_empty() {
            eprintln!("  {}: no kmer coverage; skipping", prg.name);
            continue;
        }

        let covering = PrgPath::union(
            max_path
                .iter()
                .map(|&id| &prg.kmer_prg.nodes[id as usize].path),
        );
        let sequence = prg.string_along_path(&covering)?;
        writeln!(
            consensus,
            ">{} log_prob={:.4} reads={}\n{}",
            prg.name, log_prob, kgc.num_reads, sequence
        )
        .context("Failed to write consensus sequence")?;
        eprintln!(
            "  {}: {} kmers, mean log-likelihood {:.4} (e_rate {:.4})",
            prg.name,
            max_path.len(),
            log_prob,
            e_rate
        );

        let gfa_path = graphs_dir.join(format!(
            "{}.k{}.w{}.gfa",
            prg.name, config.kmer_length, config.window_size
        ));
        kgc.save(&gfa_path, sample_id, None)
            .with_context(|| format!("Failed to save coverage graph for {}", prg.name))?;
    }
    drop(consensus);

    let pangraph_path = PathBuf::from(format!("{}_pangraph.gfa", config.out_prefix.display()));
    pangraph
        .write_gfa(&pangraph_path)
        .context("Failed to write pangraph")?;
    eprintln!(
        "Wrote pangraph of {} gene(s) to {}",
        pangraph.len(),
        pangraph_path.display()
    );

    let total_time = start_time.elapsed();
    eprintln!("Completed in {:.2?}", total_time);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const GENE_A: &str = "ACGTTAGCCATGGTCAGGATCCTAGTTACGCGATAAGCTGGTTCACTGCAATTGCAGGT";
    const GENE_B: &str = "TGCCGGAAGTCCTATATCGGACTTAACGGCCTTAATGCACGGTCGGAACAGGTCTTTGA";

    fn write_inputs(dir: &std::path::Path) -> (PathBuf, PathBuf) {
        let prgs = dir.join("prgs.fa");
        std::fs::write(&prgs, format!(">geneA\n{}\n>geneB\n{}\n", GENE_A, GENE_B)).unwrap();

        // Three reads from the middle of gene A.
        let reads = dir.join("reads.fa");
        let fragment = &GENE_A[5..45];
        std::fs::write(
            &reads,
            format!(">r0\n{0}\n>r1\n{0}\n>r2\n{0}\n", fragment),
        )
        .unwrap();
        (prgs, reads)
    }

    fn config(prgs: PathBuf, reads: PathBuf, prefix: PathBuf, disambiguate: bool) -> MapConfig {
        MapConfig {
            prgs_path: prgs,
            reads_path: reads,
            out_prefix: prefix,
            window_size: 1,
            kmer_length: 15,
            max_diff: 500,
            cluster_thresh: 2,
            error_rate: 0.11,
            model: Model::Bin,
            max_kmers_to_average: 100,
            disambiguate,
        }
    }

    #[test]
    fn test_run_map_end_to_end() {
        let dir = tempdir().unwrap();
        let (prgs, reads) = write_inputs(dir.path());
        let prefix = dir.path().join("sample1");

        run_map(&config(prgs, reads, prefix.clone(), false)).unwrap();

        let pangraph =
            std::fs::read_to_string(format!("{}_pangraph.gfa", prefix.display())).unwrap();
        assert!(pangraph.contains("S\tgeneA\t*\tRC:i:3"));
        assert!(!pangraph.contains("geneB"));

        let consensus =
            std::fs::read_to_string(format!("{}.consensus.fa", prefix.display())).unwrap();
        assert!(consensus.starts_with(">geneA"));
        // The consensus covers the mapped fragment of gene A.
        let seq_line = consensus.lines().nth(1).unwrap();
        assert!(GENE_A.contains(seq_line));
        assert!(seq_line.contains(&GENE_A[10..40]));

        assert!(prefix.with_extension("kmer_covgs.txt").exists());
        assert!(prefix.with_extension("kmer_probs.txt").exists());
        let covg_gfa = format!("{}_kmer_graphs/geneA.k15.w1.gfa", prefix.display());
        let covg = std::fs::read_to_string(covg_gfa).unwrap();
        assert!(covg.contains("FC:i:"));
    }

    #[test]
    fn test_run_map_with_disambiguation() {
        let dir = tempdir().unwrap();
        let (prgs, reads) = write_inputs(dir.path());
        let prefix = dir.path().join("sample2");

        run_map(&config(prgs, reads, prefix.clone(), true)).unwrap();
        let consensus =
            std::fs::read_to_string(format!("{}.consensus.fa", prefix.display())).unwrap();
        assert!(consensus.starts_with(">geneA"));
    }

    #[test]
    fn test_run_map_missing_reads_file_fails() {
        let dir = tempdir().unwrap();
        let (prgs, _) = write_inputs(dir.path());
        let missing = dir.path().join("no_reads.fa");
        let prefix = dir.path().join("sample3");
        assert!(run_map(&config(prgs, missing, prefix, false)).is_err());
    }

    #[test]
    fn test_genes_along_read_orders_clusters() {
        use crate::cluster::MinimizerHit;
        let hit = |prg_id: u32, read_start: u32, agreement: bool| MinimizerHit {
            read_id: 0,
            prg_id,
            read_start,
            prg_path: PrgPath::single(read_start, 3),
            knode_id: 1,
            strand_agreement: agreement,
        };
        let clusters = vec![
            vec![hit(7, 30, false), hit(7, 35, false)],
            vec![hit(2, 0, true), hit(2, 5, true)],
        ];
        assert_eq!(genes_along_read(&clusters), vec![(2, true), (7, false)]);
    }
}
