use clap::error::ErrorKind;
use clap::{Parser, Subcommand};
use panmap::{
    IndexConfig, MapConfig, Model, DEFAULT_KMER_LENGTH, DEFAULT_WINDOW_SIZE,
};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a minimizer index and per-gene kmer graphs from a PRG fasta
    Index {
        /// Path to the PRG fasta file (supports .gz compression)
        prgs: PathBuf,

        /// Minimizer window length
        #[arg(short = 'w', default_value_t = DEFAULT_WINDOW_SIZE)]
        window_size: u32,

        /// K-mer length
        #[arg(short = 'k', default_value_t = DEFAULT_KMER_LENGTH)]
        kmer_length: u32,
    },
    /// Map reads to the PRG library and call per-gene consensus paths
    Map {
        /// Path to the PRG fasta file
        prgs: PathBuf,

        /// Path to the reads fasta/fastq file
        reads: PathBuf,

        /// Output prefix for the pangraph, consensus and histogram files
        prefix: PathBuf,

        /// Minimizer window length
        #[arg(short = 'w', default_value_t = DEFAULT_WINDOW_SIZE)]
        window_size: u32,

        /// K-mer length
        #[arg(short = 'k', default_value_t = DEFAULT_KMER_LENGTH)]
        kmer_length: u32,

        /// Maximum diagonal drift between successive hits of a cluster
        #[arg(long = "max-diff", default_value_t = 500)]
        max_diff: u32,

        /// Minimum number of hits per cluster
        #[arg(long = "cluster-thresh", default_value_t = 4)]
        cluster_thresh: usize,

        /// Expected per-base sequencing error rate
        #[arg(short = 'e', long = "error-rate", default_value_t = 0.11)]
        error_rate: f64,

        /// Coverage noise model (bin, nbin or lin)
        #[arg(long = "model", default_value = "bin")]
        model: String,

        /// Number of kmers over which path log-likelihoods are averaged
        #[arg(long = "max-kmers-averaged", default_value_t = 100)]
        max_kmers_to_average: u32,

        /// Settle graph branches by remapping reads instead of by likelihood
        #[arg(long = "disambiguate", default_value_t = false)]
        disambiguate: bool,
    },
}

fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Index {
            prgs,
            window_size,
            kmer_length,
        } => {
            let config = IndexConfig {
                input: prgs,
                window_size,
                kmer_length,
            };
            panmap::build_index(&config)
        }
        Commands::Map {
            prgs,
            reads,
            prefix,
            window_size,
            kmer_length,
            max_diff,
            cluster_thresh,
            error_rate,
            model,
            max_kmers_to_average,
            disambiguate,
        } => {
            let model: Model = model.parse()?;
            let config = MapConfig {
                prgs_path: prgs,
                reads_path: reads,
                out_prefix: prefix,
                window_size,
                kmer_length,
                max_diff,
                cluster_thresh,
                error_rate,
                model,
                max_kmers_to_average,
                disambiguate,
            };
            config.execute()
        }
    }
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            let _ = e.print();
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            let _ = e.print();
            return ExitCode::from(1);
        }
    };

    if let Err(err) = run(cli) {
        eprintln!("Error: {:#}", err);
        return ExitCode::from(2);
    }
    ExitCode::SUCCESS
}
