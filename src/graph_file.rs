use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::{block::BlockId, procedure::Procedure, spanning_tree::SpanningTree};

/// The IR-side name of a block. Blocks inserted by critical-edge splitting
/// are named so the normaliser can tell them apart downstream.
pub fn block_name(proc: &Procedure, block: BlockId) -> String {
    if proc.block(block).is_split() {
        format!("crit{}", block.0)
    } else {
        format!("bb{}", block.0)
    }
}

/// Normalise a block name for the graph file: keep the digits only, with
/// `"0"` standing in for a digit-less name, and a leading `-` when the
/// name marks a split critical edge.
pub fn removebb(name: &str) -> String {
    let digits: String = name.chars().filter(|c| c.is_ascii_digit()).collect();
    let digits = if digits.is_empty() {
        "0".to_string()
    } else {
        digits
    };

    if name.contains("crit") {
        format!("-{}", digits)
    } else {
        digits
    }
}

pub fn graph_path(dir: &Path, function: &str) -> PathBuf {
    dir.join(format!("{}.graph", function))
}

pub fn info_path(dir: &Path) -> PathBuf {
    dir.join("info.prof")
}

/// Persist one function's `(blocks, edges, tree, chords)` for the
/// propagator:
///
/// ```text
/// <nBlocks> <blockName>*
/// <nEdges>
/// \t<idx> <originName> <destName>      (one line per edge)
/// <nTreeEdges> <treeIdx>*
/// <nChords> <chordIdx>*
/// ```
pub fn write_graph(dir: &Path, proc: &Procedure, st: &SpanningTree) -> std::io::Result<()> {
    let file = File::create(graph_path(dir, proc.name()))?;
    let mut out = BufWriter::new(file);

    write!(out, "{}", proc.num_blocks())?;
    for index in 0..proc.num_blocks() {
        write!(out, " {}", removebb(&block_name(proc, BlockId(index))))?;
    }
    writeln!(out)?;

    writeln!(out, "{}", st.edges.len())?;
    for edge in &st.edges {
        writeln!(
            out,
            "\t{} {} {}",
            edge.index(),
            removebb(&block_name(proc, edge.origin())),
            removebb(&block_name(proc, edge.dest()))
        )?;
    }

    write!(out, "{}", st.tree.len())?;
    for edge in &st.tree {
        write!(out, " {}", edge.index())?;
    }
    writeln!(out)?;

    write!(out, "{}", st.chords.len())?;
    for edge in &st.chords {
        write!(out, " {}", edge.index())?;
    }
    writeln!(out)?;

    out.flush()
}

/// Write the profile metadata file: one `<function> <chordCount>` line per
/// instrumented function, in module order. The propagator uses the counts
/// to chunk the profile stream.
pub fn write_info(dir: &Path, entries: &[(String, usize)]) -> std::io::Result<()> {
    let file = File::create(info_path(dir))?;
    let mut out = BufWriter::new(file);

    for (function, size) in entries {
        writeln!(out, "{} {}", function, size)?;
    }

    out.flush()
}

#[derive(Debug, Error)]
pub enum GraphFileError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("malformed graph file: {0}")]
    Parse(String),
}

/// A function graph as the propagator sees it: names only, adjacency by
/// edge index.
#[derive(Debug, Default)]
pub struct GraphFile {
    pub vertices: Vec<String>,
    pub edges: Vec<(String, String)>,
    pub tree: BTreeSet<usize>,
    pub chords: BTreeSet<usize>,
    /// incoming[v] holds the indices of the edges towards v.
    pub incoming: BTreeMap<String, BTreeSet<usize>>,
    /// outgoing[v] holds the indices of the edges from v.
    pub outgoing: BTreeMap<String, BTreeSet<usize>>,
}

pub fn read_graph(path: &Path) -> Result<GraphFile, GraphFileError> {
    let text = std::fs::read_to_string(path)?;
    parse_graph(&text)
}

struct Tokens<'a> {
    iter: std::str::SplitWhitespace<'a>,
}

impl<'a> Tokens<'a> {
    fn next(&mut self, what: &str) -> Result<&'a str, GraphFileError> {
        self.iter
            .next()
            .ok_or_else(|| GraphFileError::Parse(format!("missing {}", what)))
    }

    fn number(&mut self, what: &str) -> Result<usize, GraphFileError> {
        let token = self.next(what)?;
        token
            .parse()
            .map_err(|_| GraphFileError::Parse(format!("bad {}: {:?}", what, token)))
    }
}

fn parse_graph(text: &str) -> Result<GraphFile, GraphFileError> {
    let mut tokens = Tokens {
        iter: text.split_whitespace(),
    };

    let mut graph = GraphFile::default();

    let vertex_count = tokens.number("vertex count")?;
    for _ in 0..vertex_count {
        let name = tokens.next("vertex name")?.to_string();
        graph.incoming.entry(name.clone()).or_default();
        graph.outgoing.entry(name.clone()).or_default();
        graph.vertices.push(name);
    }

    let edge_count = tokens.number("edge count")?;
    graph
        .edges
        .resize(edge_count, (String::new(), String::new()));
    for _ in 0..edge_count {
        let index = tokens.number("edge index")?;
        if index >= edge_count {
            return Err(GraphFileError::Parse(format!(
                "edge index {} out of range",
                index
            )));
        }
        let origin = tokens.next("edge origin")?.to_string();
        let dest = tokens.next("edge dest")?.to_string();
        graph
            .outgoing
            .get_mut(&origin)
            .ok_or_else(|| GraphFileError::Parse(format!("unknown vertex {:?}", origin)))?
            .insert(index);
        graph
            .incoming
            .get_mut(&dest)
            .ok_or_else(|| GraphFileError::Parse(format!("unknown vertex {:?}", dest)))?
            .insert(index);
        graph.edges[index] = (origin, dest);
    }

    let tree_count = tokens.number("tree count")?;
    for _ in 0..tree_count {
        graph.tree.insert(tokens.number("tree edge index")?);
    }

    let chord_count = tokens.number("chord count")?;
    for _ in 0..chord_count {
        graph.chords.insert(tokens.number("chord edge index")?);
    }

    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removebb_keeps_digits() {
        assert_eq!(removebb("bb12"), "12");
        assert_eq!(removebb("entry"), "0");
        assert_eq!(removebb("crit7"), "-7");
        assert_eq!(removebb(""), "0");
    }

    #[test]
    fn parses_the_serialised_shape() {
        let text = "4 0 1 2 3\n\
                    5\n\
                    \t0 0 1\n\
                    \t1 1 2\n\
                    \t2 2 3\n\
                    \t3 1 3\n\
                    \t4 3 0\n\
                    3 0 1 2\n\
                    2 3 4\n";

        let graph = parse_graph(text).unwrap();
        assert_eq!(graph.vertices.len(), 4);
        assert_eq!(graph.edges[3], ("1".to_string(), "3".to_string()));
        assert!(graph.tree.contains(&1));
        assert!(graph.chords.contains(&4));
        assert_eq!(graph.outgoing["1"], BTreeSet::from([1, 3]));
        assert_eq!(graph.incoming["3"], BTreeSet::from([2, 3]));
    }

    #[test]
    fn short_file_is_a_parse_error() {
        assert!(matches!(
            parse_graph("2 0 1\n1\n"),
            Err(GraphFileError::Parse(_))
        ));
    }
}
