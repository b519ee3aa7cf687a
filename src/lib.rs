//! # Panmap
//!
//! A minimizer-based pan-genome read mapper.
//!
//! Panmap aligns sequencing reads against a library of gene reference
//! graphs, reporting which genes a sample contains in which order, and the
//! most likely nucleotide path through each gene's k-mer graph with
//! probabilistic support.
//!

pub mod cluster;
pub mod coverage;
pub mod error;
pub mod estimate;
pub mod index;
pub mod interval;
pub mod kmer_graph;
pub mod map;
pub mod max_path;
pub mod minimizers;
pub mod pangraph;
pub mod path;
pub mod prg;

// Re-export the main functionality
pub use cluster::{cluster_hits, hits_for_read, Cluster, MinimizerHit};
pub use coverage::{load_with_coverage, KmerGraphWithCoverage, Model};
pub use error::{Error, Result};
pub use index::{build as build_index, Index, IndexConfig, MiniRecord};
pub use interval::Interval;
pub use kmer_graph::{KmerGraph, KmerNode};
pub use map::{run_map, MapConfig};
pub use minimizers::{
    minimizer_sketch, Minimizer, Strand, DEFAULT_KMER_LENGTH, DEFAULT_WINDOW_SIZE,
};
pub use pangraph::PanGraph;
pub use path::PrgPath;
pub use prg::{load_gene_prgs, GenePrg, SequenceSource};
