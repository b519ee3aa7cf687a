use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// One gene of the sample pan-graph, with the number of reads supporting it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanNode {
    pub prg_id: u32,
    pub name: String,
    pub covg: u32,
}

/// Orientation of an adjacency between two genes on a read, two bits: bit 0
/// set when the first gene is forward, bit 1 when the second is.
pub fn orientation(from_forward: bool, to_forward: bool) -> u8 {
    u8::from(from_forward) + 2 * u8::from(to_forward)
}

/// The orientation of the same adjacency read in the other direction.
pub fn rev_orient(orientation: u8) -> u8 {
    match orientation {
        0 => 3,
        3 => 0,
        other => other,
    }
}

/// Gene adjacency observed on reads; an edge and its reverse-complement
/// traversal are the same edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanEdge {
    pub from: u32,
    pub to: u32,
    pub orientation: u8,
    pub covg: u32,
}

impl PanEdge {
    fn matches(&self, from: u32, to: u32, orientation: u8) -> bool {
        (self.from == from && self.to == to && self.orientation == orientation)
            || (self.from == to && self.to == from && self.orientation == rev_orient(orientation))
    }
}

/// Per-sample graph of which genes were hit and in what order along reads.
#[derive(Debug, Default)]
pub struct PanGraph {
    nodes: BTreeMap<u32, PanNode>,
    edges: Vec<PanEdge>,
}

impl PanGraph {
    pub fn new() -> Self {
        PanGraph::default()
    }

    /// Record one read's support for a gene.
    pub fn add_node(&mut self, prg_id: u32, name: &str) {
        self.nodes
            .entry(prg_id)
            .or_insert_with(|| PanNode {
                prg_id,
                name: name.to_string(),
                covg: 0,
            })
            .covg += 1;
    }

    /// Record one read's support for an adjacency between two genes.
    pub fn add_edge(&mut self, from: u32, to: u32, orientation: u8) {
        debug_assert!(orientation < 4);
        match self
            .edges
            .iter_mut()
            .find(|e| e.matches(from, to, orientation))
        {
            Some(edge) => edge.covg += 1,
            None => self.edges.push(PanEdge {
                from,
                to,
                orientation,
                covg: 1,
            }),
        }
    }

    pub fn node(&self, prg_id: u32) -> Option<&PanNode> {
        self.nodes.get(&prg_id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &PanNode> {
        self.nodes.values()
    }

    pub fn edges(&self) -> &[PanEdge] {
        &self.edges
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// GFA of genes and their read-supported adjacencies, nodes in id order.
    pub fn write_gfa(&self, filepath: &Path) -> Result<()> {
        let file = File::create(filepath).map_err(|e| Error::io(filepath, e))?;
        let mut writer = BufWriter::new(file);
        let io_err = |e: std::io::Error| Error::io(filepath, e);

        writeln!(writer, "H\tVN:Z:1.0").map_err(io_err)?;
        for node in self.nodes.values() {
            writeln!(writer, "S\t{}\t*\tRC:i:{}", node.name, node.covg).map_err(io_err)?;
        }
        for edge in &self.edges {
            let from_name = self.nodes.get(&edge.from).map_or("?", |n| n.name.as_str());
            let to_name = self.nodes.get(&edge.to).map_or("?", |n| n.name.as_str());
            writeln!(
                writer,
                "L\t{}\t{}\t{}\t{}\t0M\tRC:i:{}",
                from_name,
                if edge.orientation & 1 != 0 { '+' } else { '-' },
                to_name,
                if edge.orientation & 2 != 0 { '+' } else { '-' },
                edge.covg
            )
            .map_err(io_err)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_coverage_accumulates() {
        let mut pg = PanGraph::new();
        pg.add_node(4, "geneA");
        pg.add_node(4, "geneA");
        pg.add_node(7, "geneB");
        assert_eq!(pg.len(), 2);
        assert_eq!(pg.node(4).unwrap().covg, 2);
        assert_eq!(pg.node(7).unwrap().covg, 1);
    }

    #[test]
    fn test_orientation_encoding() {
        assert_eq!(orientation(true, true), 3);
        assert_eq!(orientation(false, false), 0);
        assert_eq!(orientation(true, false), 1);
        assert_eq!(orientation(false, true), 2);
        assert_eq!(rev_orient(3), 0);
        assert_eq!(rev_orient(0), 3);
        assert_eq!(rev_orient(1), 1);
        assert_eq!(rev_orient(2), 2);
    }

    #[test]
    fn test_reverse_traversal_is_the_same_edge() {
        let mut pg = PanGraph::new();
        pg.add_node(1, "geneA");
        pg.add_node(2, "geneB");
        // A+ -> B+ seen forwards, then B- -> A- seen on the other strand.
        pg.add_edge(1, 2, orientation(true, true));
        pg.add_edge(2, 1, orientation(false, false));
        assert_eq!(pg.edges().len(), 1);
        assert_eq!(pg.edges()[0].covg, 2);

        // A different orientation is a different edge.
        pg.add_edge(1, 2, orientation(true, false));
        assert_eq!(pg.edges().len(), 2);
    }

    #[test]
    fn test_write_gfa() {
        let dir = tempfile::tempdir().unwrap();
        let gfa_path = dir.path().join("pangraph.gfa");

        let mut pg = PanGraph::new();
        pg.add_node(2, "geneB");
        pg.add_node(1, "geneA");
        pg.add_node(1, "geneA");
        pg.add_edge(1, 2, orientation(true, false));
        pg.write_gfa(&gfa_path).unwrap();

        let gfa = std::fs::read_to_string(&gfa_path).unwrap();
        let lines: Vec<&str> = gfa.lines().collect();
        assert_eq!(lines[0], "H\tVN:Z:1.0");
        // Nodes in id order regardless of insertion order.
        assert_eq!(lines[1], "S\tgeneA\t*\tRC:i:2");
        assert_eq!(lines[2], "S\tgeneB\t*\tRC:i:1");
        assert_eq!(lines[3], "L\tgeneA\t+\tgeneB\t-\t0M\tRC:i:1");
    }
}
