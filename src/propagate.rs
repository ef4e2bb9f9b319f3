use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use log::{debug, error, warn};
use thiserror::Error;

use crate::graph_file::{self, GraphFile};

#[derive(Debug, Error)]
pub enum PropagateError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("malformed file {0}: {1}")]
    Malformed(PathBuf, String),
}

#[derive(Debug, Clone, Default)]
pub struct PropagateOptions {
    /// When set, write `<fn><ext>.edges` and `<fn><ext>.bb` next to the
    /// graph files instead of printing to stdout.
    pub output_extension: Option<String>,
    /// Keep one result per invocation instead of summing them.
    pub separate: bool,
}

/// One function's slice of the profile: the chord records of each
/// invocation, joined back to the graph by edge index.
struct FunctionProfile {
    name: String,
    size: usize,
    invocations: Vec<Vec<(usize, i64)>>,
}

/// Drive the whole offline stage: read `info.prof` and the profile stream,
/// then per function load the graph, fill in the chord weights, propagate,
/// and emit edge and block frequencies.
pub fn run(
    info_path: &Path,
    prof_path: &Path,
    options: &PropagateOptions,
) -> Result<(), PropagateError> {
    let functions = read_info(info_path)?;
    let records = read_profile(prof_path)?;
    let mut profiles = chunk_records(&functions, records);

    let dir = info_path.parent().unwrap_or_else(|| Path::new("."));

    for profile in profiles.iter_mut() {
        let graph_path = graph_file::graph_path(dir, &profile.name);
        let graph = match graph_file::read_graph(&graph_path) {
            Ok(graph) => graph,
            Err(err) => {
                // A function can drop out (dead code, renamed) without
                // sinking everyone else's profile.
                error!("skipping {}: {}", profile.name, err);
                continue;
            }
        };

        debug!("computed the graph of {}", profile.name);

        // An uninstrumented single-chord function still has a unique
        // flow-consistent profile; pin its one chord to a single pass.
        if profile.invocations.is_empty() && graph.chords.len() == 1 {
            let chord = *graph.chords.iter().next().unwrap();
            profile.invocations.push(vec![(chord, 1)]);
        }

        let weight_sets = build_weights(&graph, profile, options);

        for mut weights in weight_sets {
            propagate_weights(&graph, &mut weights);

            match &options.output_extension {
                Some(extension) => {
                    let stem = format!("{}{}", profile.name, extension);
                    if let Err(err) = write_outputs(dir, &stem, &graph, &weights) {
                        // Spill to stdout rather than lose the run.
                        warn!("cannot write results for {}: {}", stem, err);
                        print_edges(&graph, &weights);
                    }
                }
                None => {
                    println!("Printing the weights of '{}'...", profile.name);
                    print_edges(&graph, &weights);
                }
            }
        }
    }

    Ok(())
}

/// Initialise one weight vector per requested result set: every chord gets
/// its recorded count, everything else starts at zero.
fn build_weights(
    graph: &GraphFile,
    profile: &FunctionProfile,
    options: &PropagateOptions,
) -> Vec<Vec<i64>> {
    let blank = vec![0i64; graph.edges.len()];

    if options.separate {
        profile
            .invocations
            .iter()
            .map(|records| {
                let mut weights = blank.clone();
                for &(index, count) in records {
                    if index < weights.len() {
                        weights[index] = count;
                    }
                }
                weights
            })
            .collect()
    } else {
        let mut weights = blank;
        for records in &profile.invocations {
            for &(index, count) in records {
                if index < weights.len() {
                    weights[index] += count;
                }
            }
        }
        vec![weights]
    }
}

/// Fix every spanning-tree edge's weight from the chord weights, walking
/// the tree depth-first from the entry vertex. A tree edge is resolved
/// once its whole subtree is: at that point the edge's weight is the only
/// unknown in its vertex's flow balance, so Kirchhoff conservation pins it
/// to |in - out|.
pub fn propagate_weights(graph: &GraphFile, weights: &mut [i64]) {
    enum Phase {
        Enter,
        Leave,
    }

    let mut visited = vec![false; graph.edges.len()];
    let mut stack: Vec<(&str, Option<usize>, Phase)> = vec![("0", None, Phase::Enter)];

    while let Some((vertex, parent_edge, phase)) = stack.pop() {
        match phase {
            Phase::Enter => {
                stack.push((vertex, parent_edge, Phase::Leave));

                let incoming = graph.incoming.get(vertex);
                let outgoing = graph.outgoing.get(vertex);

                for &edge in incoming.into_iter().flatten() {
                    if Some(edge) != parent_edge && graph.tree.contains(&edge) && !visited[edge] {
                        visited[edge] = true;
                        stack.push((graph.edges[edge].0.as_str(), Some(edge), Phase::Enter));
                    }
                }
                for &edge in outgoing.into_iter().flatten() {
                    if Some(edge) != parent_edge && graph.tree.contains(&edge) && !visited[edge] {
                        visited[edge] = true;
                        stack.push((graph.edges[edge].1.as_str(), Some(edge), Phase::Enter));
                    }
                }
            }

            Phase::Leave => {
                let Some(parent_edge) = parent_edge else { continue };

                let mut in_sum = 0i64;
                for &edge in graph.incoming.get(vertex).into_iter().flatten() {
                    in_sum += weights[edge];
                }
                let mut out_sum = 0i64;
                for &edge in graph.outgoing.get(vertex).into_iter().flatten() {
                    out_sum += weights[edge];
                }

                weights[parent_edge] = (in_sum - out_sum).abs();
            }
        }
    }
}

fn print_edges(graph: &GraphFile, weights: &[i64]) {
    for (i, (origin, dest)) in graph.edges.iter().enumerate() {
        println!("{} -> {} : {}", origin, dest, weights[i]);
    }
    println!();
}

fn write_outputs(
    dir: &Path,
    stem: &str,
    graph: &GraphFile,
    weights: &[i64],
) -> std::io::Result<()> {
    let mut edges_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join(format!("{}.edges", stem)))?;

    for (i, (origin, dest)) in graph.edges.iter().enumerate() {
        writeln!(edges_file, "{} -> {} : {}", origin, dest, weights[i])?;
    }
    writeln!(edges_file)?;

    let mut bb_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join(format!("{}.bb", stem)))?;

    let mut frequency: BTreeMap<&str, i64> = BTreeMap::new();
    for (i, (_, dest)) in graph.edges.iter().enumerate() {
        *frequency.entry(dest).or_default() += weights[i];
    }

    for (block, freq) in frequency {
        writeln!(bb_file, "{} : {}", block, freq)?;
    }
    writeln!(bb_file)?;

    Ok(())
}

fn read_info(path: &Path) -> Result<Vec<(String, usize)>, PropagateError> {
    let text = std::fs::read_to_string(path)?;
    let mut functions = Vec::new();
    let mut tokens = text.split_whitespace();

    while let Some(name) = tokens.next() {
        let size = tokens
            .next()
            .and_then(|token| token.parse().ok())
            .ok_or_else(|| {
                PropagateError::Malformed(path.to_path_buf(), format!("bad entry for {}", name))
            })?;
        functions.push((name.to_string(), size));
    }

    Ok(functions)
}

fn read_profile(path: &Path) -> Result<Vec<(usize, i64)>, PropagateError> {
    // A run that instrumented nothing (or never reached a dump hook)
    // leaves no profile behind; that is an empty profile, not a fatal one.
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            warn!("no profile at {}", path.display());
            String::new()
        }
        Err(err) => return Err(err.into()),
    };
    let mut records = Vec::new();
    let mut tokens = text.split_whitespace();

    while let Some(index) = tokens.next() {
        let index: usize = index.parse().map_err(|_| {
            PropagateError::Malformed(path.to_path_buf(), format!("bad index {:?}", index))
        })?;
        let count: i64 = tokens
            .next()
            .and_then(|token| token.parse().ok())
            .ok_or_else(|| {
                PropagateError::Malformed(path.to_path_buf(), "truncated record".to_string())
            })?;
        records.push((index, count));
    }

    Ok(records)
}

/// Slice the profile stream into per-invocation chunks, handing them out
/// round-robin in `info.prof` order: the order the dump hooks append in
/// when the run executes the functions in a regular pattern. Records that
/// do not fill a whole round are reported and dropped.
fn chunk_records(
    functions: &[(String, usize)],
    records: Vec<(usize, i64)>,
) -> Vec<FunctionProfile> {
    let mut profiles: Vec<FunctionProfile> = functions
        .iter()
        .map(|(name, size)| FunctionProfile {
            name: name.clone(),
            size: *size,
            invocations: Vec::new(),
        })
        .collect();

    let mut remaining = records.as_slice();

    'rounds: loop {
        let mut progressed = false;

        for profile in profiles.iter_mut() {
            if profile.size == 0 {
                continue;
            }
            if remaining.len() < profile.size {
                break 'rounds;
            }

            let (chunk, rest) = remaining.split_at(profile.size);
            profile.invocations.push(chunk.to_vec());
            remaining = rest;
            progressed = true;
        }

        if !progressed {
            break;
        }
    }

    if !remaining.is_empty() {
        warn!("{} profile records left over", remaining.len());
    }

    profiles
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn diamond_graph() -> GraphFile {
        // 0 -> {1, 2} -> 3 -> 0(synthetic); the tree spans through 0->1,
        // 0->2 and 1->3, leaving 2->3 and the synthetic edge as chords.
        let mut graph = GraphFile::default();
        for name in ["0", "1", "2", "3"] {
            graph.vertices.push(name.to_string());
            graph.incoming.entry(name.to_string()).or_default();
            graph.outgoing.entry(name.to_string()).or_default();
        }
        let edges = [("0", "1"), ("0", "2"), ("1", "3"), ("2", "3"), ("3", "0")];
        for (i, (origin, dest)) in edges.iter().enumerate() {
            graph.edges.push((origin.to_string(), dest.to_string()));
            graph.outgoing.get_mut(*origin).unwrap().insert(i);
            graph.incoming.get_mut(*dest).unwrap().insert(i);
        }
        graph.tree = BTreeSet::from([0, 1, 2]);
        graph.chords = BTreeSet::from([3, 4]);
        graph
    }

    #[test]
    fn conservation_fixes_the_tree_edges() {
        let graph = diamond_graph();
        let mut weights = vec![0i64; 5];
        weights[4] = 2; // two invocations, both down the left arm

        propagate_weights(&graph, &mut weights);

        assert_eq!(weights, vec![2, 0, 2, 0, 2]);

        // Every vertex balances.
        for vertex in &graph.vertices {
            let in_sum: i64 = graph.incoming[vertex].iter().map(|&e| weights[e]).sum();
            let out_sum: i64 = graph.outgoing[vertex].iter().map(|&e| weights[e]).sum();
            assert_eq!(in_sum, out_sum);
        }
    }

    #[test]
    fn round_robin_chunking() {
        let functions = vec![("f".to_string(), 2), ("g".to_string(), 1)];
        let records = vec![(0, 5), (1, 6), (0, 7), (0, 8), (1, 9), (0, 10)];

        let profiles = chunk_records(&functions, records);
        assert_eq!(profiles[0].invocations, vec![
            vec![(0, 5), (1, 6)],
            vec![(0, 8), (1, 9)],
        ]);
        assert_eq!(profiles[1].invocations, vec![vec![(0, 7)], vec![(0, 10)]]);
    }
}
