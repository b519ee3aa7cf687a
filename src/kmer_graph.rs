use crate::error::{Error, Result};
use crate::path::PrgPath;
use rustc_hash::FxHashMap;
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// One k-mer of a PRG: the PRG path it covers plus adjacency, stored as
/// indices into the owning graph's node arena.
#[derive(Debug, Clone)]
pub struct KmerNode {
    pub id: u32,
    pub path: PrgPath,
    pub in_nodes: Vec<u32>,
    pub out_nodes: Vec<u32>,
    /// Combined coverage used by the bare graph GFA form.
    pub covg: u32,
    /// AT content of the k-mer, a tie-breaker for downstream callers.
    pub num_at: u32,
}

impl KmerNode {
    fn new(id: u32, path: PrgPath) -> Self {
        KmerNode {
            id,
            path,
            in_nodes: Vec::new(),
            out_nodes: Vec::new(),
            covg: 0,
            num_at: 0,
        }
    }
}

/// Directed acyclic k-mer graph of one PRG. Node 0 and node N-1 are the
/// sentinel source and sink with empty paths; insertion order is
/// topological.
#[derive(Debug, Clone, Default)]
pub struct KmerGraph {
    pub nodes: Vec<KmerNode>,
    /// K-mer length the graph was built with; 0 until known.
    pub k: u32,
    path_to_id: FxHashMap<PrgPath, u32>,
}

impl KmerGraph {
    pub fn new() -> Self {
        KmerGraph::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn source_id(&self) -> u32 {
        0
    }

    pub fn sink_id(&self) -> u32 {
        self.nodes.len().saturating_sub(1) as u32
    }

    pub fn is_sentinel(&self, id: u32) -> bool {
        id == self.source_id() || id == self.sink_id()
    }

    pub fn find_node(&self, path: &PrgPath) -> Option<u32> {
        self.path_to_id.get(path).copied()
    }

    /// Insert a node for `path` unless one exists; returns the node's id
    /// either way.
    pub fn add_node(&mut self, path: PrgPath) -> u32 {
        if let Some(&id) = self.path_to_id.get(&path) {
            return id;
        }
        let id = self.nodes.len() as u32;
        self.path_to_id.insert(path.clone(), id);
        self.nodes.push(KmerNode::new(id, path));
        id
    }

    /// Add the edge `from -> to`; repeated additions are no-ops.
    pub fn add_edge(&mut self, from: u32, to: u32) -> Result<()> {
        let n = self.nodes.len() as u32;
        if from >= n || to >= n {
            return Err(Error::InvariantViolation(format!(
                "edge ({from}, {to}) references a node outside the graph of {n} nodes"
            )));
        }
        if !self.nodes[from as usize].out_nodes.contains(&to) {
            self.nodes[from as usize].out_nodes.push(to);
            self.nodes[to as usize].in_nodes.push(from);
        }
        Ok(())
    }

    /// Path-indexed edge insertion; both paths must already name nodes.
    pub fn add_edge_by_path(&mut self, from: &PrgPath, to: &PrgPath) -> Result<()> {
        let from_id = self.find_node(from).ok_or_else(|| {
            Error::InvariantViolation(format!("no node with path {from} to draw edge from"))
        })?;
        let to_id = self.find_node(to).ok_or_else(|| {
            Error::InvariantViolation(format!("no node with path {to} to draw edge to"))
        })?;
        self.add_edge(from_id, to_id)
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.path_to_id.clear();
        self.k = 0;
    }

    /// Node ordering used by path inference: nodes partitioned into bubble
    /// levels (`starts seen - ends seen` while walking insertion order) and
    /// emitted deepest level first, so sentinels and other level-0 nodes come
    /// out last.
    pub fn topo_order(&self) -> Vec<u32> {
        let mut levels: Vec<Vec<u32>> = Vec::new();
        let mut num_bubble_starts: i32 = 0;
        let mut num_bubble_ends: i32 = 0;

        for node in &self.nodes {
            if node.in_nodes.len() > 1 {
                num_bubble_ends += 1;
            }
            let level = (num_bubble_starts - num_bubble_ends).max(0) as usize;
            if level >= levels.len() {
                levels.resize_with(level + 1, Vec::new);
            }
            levels[level].push(node.id);
            if node.out_nodes.len() > 1 {
                num_bubble_starts += 1;
            }
        }

        let mut order = Vec::with_capacity(self.nodes.len());
        for level in levels.iter().rev() {
            order.extend_from_slice(level);
        }
        order
    }

    /// Verify the graph invariants after construction: one node per
    /// minimizer k-mer plus the two sentinels, no leaves besides the
    /// sentinels, reciprocal adjacency, and edges respecting insertion
    /// (topological) order.
    pub fn check(&self, num_minikmers: usize) -> Result<()> {
        if num_minikmers > 0 && self.nodes.len() != num_minikmers + 2 {
            return Err(Error::InvariantViolation(format!(
                "graph has {} nodes but expected {} minimizer kmers plus 2 sentinels",
                self.nodes.len(),
                num_minikmers
            )));
        }
        if !self.nodes.is_empty() {
            let empties = self.nodes.iter().filter(|n| n.path.is_empty()).count();
            if empties != 2 || !self.nodes[0].path.is_empty()
                || !self.nodes[self.nodes.len() - 1].path.is_empty()
            {
                return Err(Error::InvariantViolation(format!(
                    "expected exactly the first and last node to carry empty sentinel paths, \
                     found {empties} empty paths"
                )));
            }
        }

        for node in &self.nodes {
            if node.in_nodes.is_empty() && node.id != self.source_id() {
                return Err(Error::InvariantViolation(format!(
                    "node {} has no in-edges but is not the source",
                    node.id
                )));
            }
            if node.out_nodes.is_empty() && node.id != self.sink_id() {
                return Err(Error::InvariantViolation(format!(
                    "node {} has no out-edges but is not the sink",
                    node.id
                )));
            }
            for &succ in &node.out_nodes {
                if succ <= node.id {
                    return Err(Error::InvariantViolation(format!(
                        "edge ({}, {}) goes against the topological order",
                        node.id, succ
                    )));
                }
                if !self.nodes[succ as usize].in_nodes.contains(&node.id) {
                    return Err(Error::InvariantViolation(format!(
                        "edge ({}, {}) is missing its reciprocal in-edge",
                        node.id, succ
                    )));
                }
            }
        }
        Ok(())
    }

    /// Save in the legacy combined-coverage GFA form.
    pub fn save(&self, filepath: &Path) -> Result<()> {
        let file = File::create(filepath).map_err(|e| Error::io(filepath, e))?;
        let mut writer = BufWriter::new(file);
        write_gfa(self, &mut writer, |node| node.path.to_string(), |node| {
            GfaCoverage::Combined(node.covg)
        })
        .map_err(|e| Error::io(filepath, e))
    }

    /// Load a graph saved by [`KmerGraph::save`] or the coverage-augmented
    /// writer; combined and split coverage go to `covg`.
    pub fn load(filepath: &Path) -> Result<KmerGraph> {
        let ParsedGfa {
            mut graph,
            coverages,
        } = read_gfa(filepath)?;
        for (node, covg) in graph.nodes.iter_mut().zip(&coverages) {
            node.covg = match *covg {
                GfaCoverage::Combined(c) => c,
                GfaCoverage::Split { forward, reverse, .. } => forward + reverse,
            };
        }
        Ok(graph)
    }

    fn out_paths(&self, node: &KmerNode) -> BTreeSet<&PrgPath> {
        node.out_nodes
            .iter()
            .map(|&i| &self.nodes[i as usize].path)
            .collect()
    }
}

// Equality is unordered: same node set keyed by path, same edge set.
impl PartialEq for KmerGraph {
    fn eq(&self, other: &Self) -> bool {
        if self.nodes.len() != other.nodes.len() {
            return false;
        }
        for node in &self.nodes {
            let Some(&other_id) = other.path_to_id.get(&node.path) else {
                return false;
            };
            let other_node = &other.nodes[other_id as usize];
            if self.out_paths(node) != other.out_paths(other_node) {
                return false;
            }
        }
        true
    }
}

impl Eq for KmerGraph {}

/// Per-segment coverage annotation in a GFA file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GfaCoverage {
    /// Legacy form: `RC:i:<covg>`.
    Combined(u32),
    /// Split form: `FC:i:<fwd>\tRC:i:<rev>` plus optional AT content.
    Split {
        forward: u32,
        reverse: u32,
        num_at: Option<u32>,
    },
}

pub(crate) struct ParsedGfa {
    pub graph: KmerGraph,
    /// Indexed by final node id.
    pub coverages: Vec<GfaCoverage>,
}

/// Shared GFA writer: the caller chooses the segment field (path or
/// nucleotide sequence) and the coverage annotation per node.
pub(crate) fn write_gfa<W: Write>(
    graph: &KmerGraph,
    writer: &mut W,
    mut segment_field: impl FnMut(&KmerNode) -> String,
    mut coverage: impl FnMut(&KmerNode) -> GfaCoverage,
) -> std::io::Result<()> {
    writeln!(writer, "H\tVN:Z:1.0\tbn:Z:--linear --singlearr")?;
    for node in &graph.nodes {
        match coverage(node) {
            GfaCoverage::Combined(covg) => {
                writeln!(writer, "S\t{}\t{}\tRC:i:{}", node.id, segment_field(node), covg)?;
            }
            GfaCoverage::Split {
                forward,
                reverse,
                num_at,
            } => {
                write!(
                    writer,
                    "S\t{}\t{}\tFC:i:{}\tRC:i:{}",
                    node.id,
                    segment_field(node),
                    forward,
                    reverse
                )?;
                if let Some(at) = num_at {
                    write!(writer, "\t{}", at)?;
                }
                writeln!(writer)?;
            }
        }
        for &succ in &node.out_nodes {
            writeln!(writer, "L\t{}\t+\t{}\t+\t0M", node.id, succ)?;
        }
    }
    Ok(())
}

struct Segment {
    id: u32,
    path: PrgPath,
    coverage: GfaCoverage,
}

fn parse_tag(field: &str, tag: &str, line_no: usize) -> Result<u32> {
    field
        .strip_prefix(tag)
        .ok_or_else(|| Error::parse(line_no, format!("expected {tag} tag, got {field:?}")))?
        .parse()
        .map_err(|e| Error::parse(line_no, format!("bad {tag} value in {field:?}: {e}")))
}

fn parse_segment(fields: &[&str], line_no: usize) -> Result<Segment> {
    if fields.len() < 4 {
        return Err(Error::parse(line_no, "S line has fewer than 4 fields"));
    }
    let id: u32 = fields[1]
        .parse()
        .map_err(|e| Error::parse(line_no, format!("bad segment id {:?}: {e}", fields[1])))?;

    if !fields[2].starts_with(|c: char| c.is_ascii_digit()) {
        return Err(Error::GfaBadPath(fields[2].to_string()));
    }
    let path: PrgPath = fields[2]
        .parse()
        .map_err(|e| Error::parse(line_no, format!("bad segment path: {e}")))?;

    let coverage = if fields[3].starts_with("FC:i:") {
        if fields.len() < 5 {
            return Err(Error::parse(line_no, "split-coverage S line is missing RC:i:"));
        }
        let forward = parse_tag(fields[3], "FC:i:", line_no)?;
        let reverse = parse_tag(fields[4], "RC:i:", line_no)?;
        let num_at = match fields.get(5) {
            Some(f) => Some(f.parse().map_err(|e| {
                Error::parse(line_no, format!("bad AT-content field {f:?}: {e}"))
            })?),
            None => None,
        };
        GfaCoverage::Split {
            forward,
            reverse,
            num_at,
        }
    } else {
        GfaCoverage::Combined(parse_tag(fields[3], "RC:i:", line_no)?)
    };

    Ok(Segment { id, path, coverage })
}

/// Parse a k-mer graph GFA: segments first (ascending or descending ids),
/// then an edge-reservation sweep, then edge ingest.
pub(crate) fn read_gfa(filepath: &Path) -> Result<ParsedGfa> {
    let file = File::open(filepath).map_err(|e| Error::io(filepath, e))?;
    let mut lines = Vec::new();
    for line in BufReader::new(file).lines() {
        lines.push(line.map_err(|e| Error::io(filepath, e))?);
    }

    // Segment ingest pass.
    let mut segments: Vec<Segment> = Vec::new();
    for (idx, line) in lines.iter().enumerate() {
        if line.starts_with('S') {
            let fields: Vec<&str> = line.split('\t').collect();
            segments.push(parse_segment(&fields, idx + 1)?);
        }
    }

    // Ids may run 0..n or n..0; a descending file parses id 0 last.
    if segments.last().is_some_and(|s| s.id == 0) {
        segments.reverse();
    }
    let mut graph = KmerGraph::new();
    let mut coverages = Vec::with_capacity(segments.len());
    for (rank, segment) in segments.into_iter().enumerate() {
        if segment.id as usize != rank {
            return Err(Error::parse(
                0,
                format!(
                    "segment ids are not consecutive: id {} at position {rank}",
                    segment.id
                ),
            ));
        }
        if graph.k == 0 && segment.path.length() > 0 {
            graph.k = segment.path.length();
        }
        let added = graph.add_node(segment.path);
        if added != segment.id {
            return Err(Error::parse(
                0,
                format!("duplicate segment path for id {}", segment.id),
            ));
        }
        coverages.push(segment.coverage);
    }

    // Edge reservation pass, separate from ingest.
    let mut in_counts = vec![0usize; graph.len()];
    let mut out_counts = vec![0usize; graph.len()];
    let mut edges: Vec<(u32, u32)> = Vec::new();
    for (idx, line) in lines.iter().enumerate() {
        if !line.starts_with('L') {
            continue;
        }
        let line_no = idx + 1;
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 5 {
            return Err(Error::parse(line_no, "L line has fewer than 5 fields"));
        }
        let first: u32 = fields[1]
            .parse()
            .map_err(|e| Error::parse(line_no, format!("bad link endpoint: {e}")))?;
        let second: u32 = fields[3]
            .parse()
            .map_err(|e| Error::parse(line_no, format!("bad link endpoint: {e}")))?;
        let (from, to) = if fields[2] == fields[4] {
            (first, second)
        } else {
            (second, first)
        };
        if from as usize >= graph.len() || to as usize >= graph.len() {
            return Err(Error::parse(
                line_no,
                format!("link ({from}, {to}) references an unknown segment"),
            ));
        }
        out_counts[from as usize] += 1;
        in_counts[to as usize] += 1;
        edges.push((from, to));
    }
    for node in &mut graph.nodes {
        node.out_nodes.reserve(out_counts[node.id as usize]);
        node.in_nodes.reserve(in_counts[node.id as usize]);
    }

    for (from, to) in edges {
        graph.add_edge(from, to)?;
    }

    Ok(ParsedGfa { graph, coverages })
}
