use log::debug;

use crate::{
    block::BlockId,
    edge::Edge,
    loop_reweight::reweight_loops,
    opcode::Opcode,
    procedure::Procedure,
    union_find::UnionFind,
    ProfileVariant,
};

/// The block acting as the function's exit: the origin of the synthetic
/// back edge. A block ending in a return is preferred; failing that, one
/// ending in unreachable. A function with neither has no well-defined exit
/// and cannot be profiled.
pub fn find_exit_block(proc: &Procedure) -> Option<BlockId> {
    let mut unreachable = None;

    for index in 0..proc.blocks.len() {
        let block = BlockId(index);
        match proc.terminator(block).map(|value| value.opcode()) {
            Some(Opcode::Return) => return Some(block),
            Some(Opcode::Unreachable) if unreachable.is_none() => unreachable = Some(block),
            _ => {}
        }
    }

    unreachable
}

/// Enumerate the function's edges in block order, one per `(block,
/// successor)` pair, then close the graph with the synthetic exit-to-entry
/// edge at weight zero. Returns None when the function has no exit.
pub fn generate_edges(proc: &Procedure) -> Option<Vec<Edge>> {
    let exit = find_exit_block(proc)?;

    let mut edges = Vec::new();
    let mut index = 0u32;

    for block_index in 0..proc.blocks.len() {
        let block = BlockId(block_index);
        for &succ in proc.block(block).successor_list() {
            edges.push(Edge::new(block, succ, index, 1));
            index += 1;
        }
    }

    edges.push(Edge::new(exit, proc.cfg_root(), index, 0));

    Some(edges)
}

/// Scale edge weights by loop depth so the expected-hotter edges win a
/// place in the spanning tree and stay uninstrumented. The synthetic edge
/// keeps its zero weight.
pub fn reweight_by_loop_depth(proc: &Procedure, edges: &mut [Edge]) {
    let natural_loops = proc.natural_loops();

    for edge in edges.iter_mut() {
        if edge.weight() == 0 {
            continue;
        }

        let depth = natural_loops
            .loop_depth(edge.origin())
            .min(natural_loops.loop_depth(edge.dest()))
            .min(12);

        edge.set_weight(10u64.pow(depth as u32));
    }
}

/// The `(tree, chords)` split of a function's edges. The chords are the
/// minimal instrumentation set; every tree edge's count is recoverable
/// from the chords by flow conservation.
pub struct SpanningTree {
    pub edges: Vec<Edge>,
    pub tree: Vec<Edge>,
    pub chords: Vec<Edge>,
}

impl SpanningTree {
    /// Kruskal over the edges in descending `(weight, index)` order: an
    /// edge joining two components goes to the tree, an edge closing a
    /// cycle becomes a chord. With ties broken by index the result is
    /// deterministic, and a maximum-weight spanning tree overall.
    pub fn build(proc: &Procedure, edges: Vec<Edge>) -> Self {
        let mut uf = UnionFind::new();
        for index in 0..proc.blocks.len() {
            uf.init(BlockId(index));
        }

        let mut sorted: Vec<Edge> = edges.clone();
        sorted.sort_by(|a, b| b.cmp(a));

        let mut tree = Vec::new();
        let mut chords = Vec::new();

        for edge in sorted {
            if uf.connected(edge.origin(), edge.dest()) {
                chords.push(edge);
            } else {
                uf.merge(edge.origin(), edge.dest());
                tree.push(edge);
            }
        }

        tree.sort();
        chords.sort();

        if tree.len() + 1 != proc.blocks.len() {
            debug!(
                "{}: spanning tree covers {} of {} blocks",
                proc.name(),
                tree.len() + 1,
                proc.blocks.len()
            );
        }

        Self { edges, tree, chords }
    }

    /// The naive variant: a plain DFS tree from the entry, ignoring
    /// weights. First edge to reach a block joins the tree, everything
    /// else is a chord.
    pub fn build_dfs(proc: &Procedure, edges: Vec<Edge>) -> Self {
        let mut in_tree = vec![false; edges.len()];
        let mut seen = vec![false; proc.blocks.len()];
        let mut stack = vec![proc.cfg_root()];
        seen[proc.cfg_root().0] = true;

        while let Some(block) = stack.pop() {
            for &succ in proc.block(block).successor_list() {
                if seen[succ.0] {
                    continue;
                }
                seen[succ.0] = true;

                let edge_index = edges
                    .iter()
                    .position(|edge| {
                        edge.origin() == block && edge.dest() == succ && !in_tree[edge.index() as usize]
                    })
                    .expect("successor edge must have been enumerated");
                in_tree[edges[edge_index].index() as usize] = true;

                stack.push(succ);
            }
        }

        let mut tree = Vec::new();
        let mut chords = Vec::new();
        for edge in edges.iter() {
            if in_tree[edge.index() as usize] {
                tree.push(edge.clone());
            } else {
                chords.push(edge.clone());
            }
        }

        tree.sort();
        chords.sort();

        Self { edges, tree, chords }
    }

    /// Run the placement analysis for one function under the given
    /// variant. None when the function has no exit block.
    pub fn analyze(proc: &Procedure, variant: ProfileVariant) -> Option<Self> {
        let mut edges = generate_edges(proc)?;

        match variant {
            ProfileVariant::Ball => return Some(Self::build_dfs(proc, edges)),
            ProfileVariant::Ks => {
                reweight_by_loop_depth(proc, &mut edges);
            }
            ProfileVariant::Nisse => {
                reweight_by_loop_depth(proc, &mut edges);
                reweight_loops(proc, &mut edges);
            }
        }

        Some(Self::build(proc, edges))
    }

    /// Human-readable dump of the analysis, in the shape the print variant
    /// of the pass has always used.
    pub fn dump(&self, name: &str) -> String {
        let mut out = String::new();
        out.push_str(&format!("\n{}\n\tEdges:\n", name));
        for edge in &self.edges {
            out.push_str(&format!("\t\t{}\n", edge));
        }
        out.push_str("\tSpanning Tree:\n");
        for edge in &self.tree {
            out.push_str(&format!("\t\t{}\n", edge));
        }
        out.push_str("\tReverse:\n");
        for edge in &self.chords {
            out.push_str(&format!("\t\t{}\n", edge));
        }
        out
    }
}
