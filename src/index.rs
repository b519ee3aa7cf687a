use crate::error::{Error, Result};
use crate::minimizers::Strand;
use crate::path::PrgPath;
use crate::prg::GenePrg;
use bincode::serde::{decode_from_std_read, encode_into_std_write};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::time::Instant;

const INDEX_MAGIC: [u8; 4] = *b"PIDX";

/// One PRG-side occurrence of a minimizer: which k-mer node of which PRG
/// produced it, and on which strand.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MiniRecord {
    pub prg_id: u32,
    pub knode_id: u32,
    pub strand: Strand,
    pub path: PrgPath,
}

/// Serializable header for the index file
#[derive(Serialize, Deserialize, Debug)]
struct IndexFileHeader {
    magic: [u8; 4],
    window_size: u32,
    kmer_length: u32,
    num_keys: u64,
}

impl IndexFileHeader {
    fn new(window_size: u32, kmer_length: u32, num_keys: u64) -> Self {
        IndexFileHeader {
            magic: INDEX_MAGIC,
            window_size,
            kmer_length,
            num_keys,
        }
    }

    /// Validate the header against the parameters the caller asked for.
    fn validate(&self, window_size: u32, kmer_length: u32) -> Result<()> {
        if self.magic != INDEX_MAGIC {
            return Err(Error::parse(0, "not a panmap index file (bad magic)"));
        }
        if self.window_size != window_size || self.kmer_length != kmer_length {
            return Err(Error::parse(
                0,
                format!(
                    "index was built with (w={}, k={}) but (w={}, k={}) was requested",
                    self.window_size, self.kmer_length, window_size, kmer_length
                ),
            ));
        }
        Ok(())
    }
}

/// Mapping from minimizer hash to the set of PRG occurrences across the
/// whole PRG library. Read-only once built.
#[derive(Debug, Default)]
pub struct Index {
    minhash: FxHashMap<u64, Vec<MiniRecord>>,
}

impl Index {
    pub fn new() -> Self {
        Index::default()
    }

    /// Hint the expected number of distinct minimizer hashes.
    pub fn reserve(&mut self, n: usize) {
        self.minhash.reserve(n);
    }

    /// Insert a record at `hash`; inserting the same record twice is a no-op.
    pub fn add(&mut self, hash: u64, record: MiniRecord) {
        let records = self.minhash.entry(hash).or_default();
        if !records.contains(&record) {
            records.push(record);
        }
    }

    /// All occurrences of `hash`; empty when the hash is unknown.
    pub fn get(&self, hash: u64) -> &[MiniRecord] {
        self.minhash.get(&hash).map_or(&[], Vec::as_slice)
    }

    /// Number of distinct minimizer hashes.
    pub fn len(&self) -> usize {
        self.minhash.len()
    }

    pub fn is_empty(&self) -> bool {
        self.minhash.is_empty()
    }

    /// Index file path for a PRG file and sketch parameters.
    pub fn file_path(prg_path: &Path, window_size: u32, kmer_length: u32) -> PathBuf {
        let mut name = prg_path.as_os_str().to_os_string();
        name.push(format!(".w{}.k{}.idx", window_size, kmer_length));
        PathBuf::from(name)
    }

    /// Persist next to the PRG file. Keys are written in sorted order so the
    /// same index always produces the same bytes.
    pub fn save(&self, prg_path: &Path, window_size: u32, kmer_length: u32) -> Result<()> {
        let out_path = Index::file_path(prg_path, window_size, kmer_length);
        let file = File::create(&out_path).map_err(|e| Error::io(&out_path, e))?;
        let mut writer = BufWriter::new(file);
        let config = bincode::config::standard().with_fixed_int_encoding();
        let io_err = |e: bincode::error::EncodeError| {
            Error::io(
                &out_path,
                std::io::Error::new(std::io::ErrorKind::Other, e.to_string()),
            )
        };

        let header = IndexFileHeader::new(window_size, kmer_length, self.minhash.len() as u64);
        encode_into_std_write(&header, &mut writer, config).map_err(io_err)?;

        let mut hashes: Vec<u64> = self.minhash.keys().copied().collect();
        hashes.sort_unstable();
        for hash in hashes {
            let records = &self.minhash[&hash];
            encode_into_std_write(hash, &mut writer, config).map_err(io_err)?;
            encode_into_std_write(records.len() as u32, &mut writer, config).map_err(io_err)?;
            for record in records {
                encode_into_std_write(record, &mut writer, config).map_err(io_err)?;
            }
        }
        Ok(())
    }

    /// Reload an index saved by [`Index::save`], rejecting files whose
    /// sketch parameters do not match the request.
    pub fn load(prg_path: &Path, window_size: u32, kmer_length: u32) -> Result<Index> {
        let in_path = Index::file_path(prg_path, window_size, kmer_length);
        let file = File::open(&in_path).map_err(|e| Error::io(&in_path, e))?;
        let mut reader = BufReader::with_capacity(1 << 20, file);
        let config = bincode::config::standard().with_fixed_int_encoding();
        let parse_err =
            |e: bincode::error::DecodeError| Error::parse(0, format!("corrupt index: {e}"));

        let header: IndexFileHeader =
            decode_from_std_read(&mut reader, config).map_err(parse_err)?;
        header.validate(window_size, kmer_length)?;

        let mut index = Index::new();
        index.reserve(header.num_keys as usize);
        for _ in 0..header.num_keys {
            let hash: u64 = decode_from_std_read(&mut reader, config).map_err(parse_err)?;
            let count: u32 = decode_from_std_read(&mut reader, config).map_err(parse_err)?;
            let mut records = Vec::with_capacity(count as usize);
            for _ in 0..count {
                let record: MiniRecord =
                    decode_from_std_read(&mut reader, config).map_err(parse_err)?;
                records.push(record);
            }
            index.minhash.insert(hash, records);
        }
        Ok(index)
    }
}

/// Configuration for `panmap index`.
pub struct IndexConfig {
    pub input: PathBuf,
    pub window_size: u32,
    pub kmer_length: u32,
}

/// Build the minimizer index for a PRG library: sketch every gene, write its
/// k-mer graph GFA under `kmer_prgs/`, and save the index next to the input.
pub fn build(config: &IndexConfig) -> anyhow::Result<()> {
    use anyhow::Context;

    let start_time = Instant::now();
    let version: String = env!("CARGO_PKG_VERSION").to_string();
    eprintln!(
        "Panmap v{}; mode: index; input: {}",
        version,
        config.input.display()
    );

    let mut prgs = crate::prg::load_gene_prgs(&config.input).context("Failed to load PRG file")?;

    let mut index = Index::new();
    let total_bp: usize = prgs.iter().map(|prg| prg.seq.len()).sum();
    index.reserve(total_bp);

    let gfa_dir = Path::new("kmer_prgs");
    std::fs::create_dir_all(gfa_dir).context("Failed to create kmer_prgs directory")?;

    eprintln!(
        "Building index (k={}, w={})",
        config.kmer_length, config.window_size
    );
    for prg in &mut prgs {
        match prg.minimizer_sketch(&mut index, config.window_size, config.kmer_length) {
            Ok(num_minikmers) => {
                eprintln!(
                    "  {} ({}bp, {} minimizer kmers), total keys: {}",
                    prg.name,
                    prg.seq.len(),
                    num_minikmers,
                    index.len()
                );
            }
            Err(Error::SequenceTooShort { length, .. }) => {
                eprintln!(
                    "  {} skipped: {}bp is too short for (w={}, k={})",
                    prg.name, length, config.window_size, config.kmer_length
                );
                continue;
            }
            Err(e) => return Err(e.into()),
        }
        let gfa_path = gfa_dir.join(format!(
            "{}.k{}.w{}.gfa",
            prg.name, config.kmer_length, config.window_size
        ));
        prg.kmer_prg
            .save(&gfa_path)
            .with_context(|| format!("Failed to save kmer graph for {}", prg.name))?;
    }

    eprintln!(
        "Indexed {} minimizers from {} PRG(s) ({}bp)",
        index.len(),
        prgs.len(),
        total_bp
    );

    index
        .save(&config.input, config.window_size, config.kmer_length)
        .context("Failed to save index")?;

    let total_time = start_time.elapsed();
    eprintln!("Completed in {:.2?}", total_time);

    Ok(())
}
