use crate::error::{Error, Result};
use crate::index::{Index, MiniRecord};
use crate::kmer_graph::KmerGraph;
use crate::minimizers::{at_content, minimizer_sketch};
use crate::path::PrgPath;
use needletail::parse_fastx_file;
use std::path::Path;

/// Anything that can translate a PRG path back into nucleotides. The k-mer
/// graph and the disambiguating path solver only ever see this interface.
pub trait SequenceSource {
    fn string_along_path(&self, path: &PrgPath) -> Result<String>;
}

/// One gene of the PRG library, held as its linearized sequence plus the
/// k-mer graph projected from it.
pub struct GenePrg {
    pub id: u32,
    pub name: String,
    pub seq: Vec<u8>,
    pub kmer_prg: KmerGraph,
}

impl GenePrg {
    pub fn new(id: u32, name: impl Into<String>, seq: Vec<u8>) -> Self {
        GenePrg {
            id,
            name: name.into(),
            seq,
            kmer_prg: KmerGraph::new(),
        }
    }

    /// Sketch the gene with (w,k)-minimizers: rebuild the k-mer graph
    /// (sentinel source and sink bracketing one node per minimizer k-mer, in
    /// position order) and add one index record per minimizer. Returns the
    /// number of minimizer k-mers.
    pub fn minimizer_sketch(&mut self, index: &mut Index, w: u32, k: u32) -> Result<usize> {
        let minimizers = minimizer_sketch(&self.seq, w, k)?;

        self.kmer_prg.clear();
        self.kmer_prg.k = k;
        let source = self.kmer_prg.add_node(PrgPath::single(0, 0));

        let mut prev = source;
        for minimizer in &minimizers {
            let path = PrgPath::single(minimizer.start, k);
            let node_id = self.kmer_prg.add_node(path.clone());
            let kmer = &self.seq[minimizer.start as usize..minimizer.end as usize];
            self.kmer_prg.nodes[node_id as usize].num_at = at_content(kmer);
            self.kmer_prg.add_edge(prev, node_id)?;
            index.add(
                minimizer.hash,
                MiniRecord {
                    prg_id: self.id,
                    knode_id: node_id,
                    strand: minimizer.strand,
                    path,
                },
            );
            prev = node_id;
        }

        let sink = self.kmer_prg.add_node(PrgPath::single(self.seq.len() as u32, 0));
        self.kmer_prg.add_edge(prev, sink)?;

        let num_minikmers = self.kmer_prg.len() - 2;
        self.kmer_prg.check(num_minikmers)?;
        Ok(num_minikmers)
    }
}

impl SequenceSource for GenePrg {
    fn string_along_path(&self, path: &PrgPath) -> Result<String> {
        let mut sequence = String::with_capacity(path.length() as usize);
        for interval in path.intervals() {
            let (start, end) = (interval.start as usize, interval.end as usize);
            if end > self.seq.len() {
                return Err(Error::InvariantViolation(format!(
                    "path interval {interval} exceeds the {}bp sequence of {}",
                    self.seq.len(),
                    self.name
                )));
            }
            let slice = std::str::from_utf8(&self.seq[start..end]).map_err(|_| {
                Error::InvariantViolation(format!("non-UTF8 sequence in {}", self.name))
            })?;
            sequence.push_str(slice);
        }
        Ok(sequence)
    }
}

/// Read a PRG library FASTA; one gene per record, ids in file order.
pub fn load_gene_prgs(path: &Path) -> Result<Vec<GenePrg>> {
    let mut reader = parse_fastx_file(path).map_err(|e| {
        Error::io(
            path,
            std::io::Error::new(std::io::ErrorKind::Other, e.to_string()),
        )
    })?;

    let mut prgs = Vec::new();
    while let Some(record) = reader.next() {
        let record = record.map_err(|e| Error::parse(prgs.len() + 1, e.to_string()))?;
        let name = std::str::from_utf8(record.id())
            .map_err(|_| Error::parse(prgs.len() + 1, "non-UTF8 record id"))?
            .split_whitespace()
            .next()
            .unwrap_or("unnamed")
            .to_string();
        prgs.push(GenePrg::new(
            prgs.len() as u32,
            name,
            record.seq().into_owned(),
        ));
    }
    Ok(prgs)
}
