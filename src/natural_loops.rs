use indexmap::IndexMap;

use crate::{
    block::BlockId,
    dominators::{Dominators, Graph},
    procedure::Procedure,
    utils::index_set::IndexSet,
};

const NO_LOOP: usize = usize::MAX;

#[derive(Debug)]
pub struct NaturalLoop {
    header: BlockId,
    body: Vec<BlockId>,
    parent: usize,
    index: usize,
}

impl NaturalLoop {
    pub fn header(&self) -> BlockId {
        self.header
    }

    pub fn body(&self) -> &[BlockId] {
        &self.body
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn contains(&self, block: BlockId) -> bool {
        self.body.contains(&block)
    }

    /// The loop's pre-header: the unique predecessor of the header outside
    /// the body. None when the header can be entered from more than one
    /// place, in which case the loop is not well formed for our purposes.
    pub fn pre_header(&self, proc: &Procedure) -> Option<BlockId> {
        let mut incoming = None;
        for &pred in proc.block(self.header).predecessor_list() {
            if self.contains(pred) {
                continue;
            }
            if incoming.replace(pred).is_some() {
                return None;
            }
        }
        incoming
    }

    /// The loop's latch: the unique in-body predecessor of the header, the
    /// origin of the back edge. None when several back edges exist.
    pub fn back_block(&self, proc: &Procedure) -> Option<BlockId> {
        let mut latch = None;
        for &pred in proc.block(self.header).predecessor_list() {
            if !self.contains(pred) {
                continue;
            }
            if latch.replace(pred).is_some() {
                return None;
            }
        }
        latch
    }

    /// Blocks outside the body with at least one predecessor inside it: the
    /// places control lands when the loop is done.
    pub fn exit_blocks(&self, proc: &Procedure) -> Vec<BlockId> {
        let mut exits = vec![];
        for &block in self.body.iter() {
            for &succ in proc.block(block).successor_list() {
                if !self.contains(succ) && !exits.contains(&succ) {
                    exits.push(succ);
                }
            }
        }
        exits.sort();
        exits
    }
}

/// The loop forest of a procedure. A block whose predecessor it dominates
/// heads a loop; the loop's body is everything that can reach one of those
/// back edges without first passing the header.
#[derive(Debug)]
pub struct NaturalLoops {
    loops: Vec<NaturalLoop>,
    /// Per block, the index of the smallest loop containing it.
    inner_most: Vec<usize>,
}

impl NaturalLoops {
    pub fn new(proc: &Procedure, dominators: &Dominators<Procedure>) -> Self {
        // A back edge is an edge whose destination dominates its origin.
        // Group the origins per header; a header with several back edges
        // still makes one loop.
        let mut latches_by_header: IndexMap<BlockId, Vec<BlockId>> = IndexMap::new();
        for block_index in 0..proc.num_nodes() {
            let header = BlockId(block_index);
            for &pred in proc.predecessors(header).iter() {
                if dominators.dominates(proc, header, pred) {
                    latches_by_header.entry(header).or_default().push(pred);
                }
            }
        }

        // Flood backwards from the latches. The header seeds the seen set,
        // so the walk never escapes through it.
        let mut loops = Vec::with_capacity(latches_by_header.len());
        for (header, latches) in latches_by_header {
            let mut seen = IndexSet::new();
            seen.insert(header);

            let mut body = vec![header];
            let mut worklist = latches;
            while let Some(block) = worklist.pop() {
                if !seen.insert(block) {
                    continue;
                }
                body.push(block);
                for &pred in proc.block(block).predecessor_list() {
                    worklist.push(pred);
                }
            }

            loops.push(NaturalLoop {
                header,
                body,
                parent: NO_LOOP,
                index: loops.len(),
            });
        }

        // A block's innermost loop is the smallest body it sits in; bodies
        // of nested loops strictly contain each other, so size decides.
        let mut inner_most = vec![NO_LOOP; proc.num_nodes()];
        for (index, loop_) in loops.iter().enumerate() {
            for &block in &loop_.body {
                let current = inner_most[block.0];
                if current == NO_LOOP || loop_.body.len() < loops[current].body.len() {
                    inner_most[block.0] = index;
                }
            }
        }

        // A loop's parent is the smallest other loop wrapped around its
        // header.
        let parents: Vec<usize> = loops
            .iter()
            .enumerate()
            .map(|(index, loop_)| {
                let mut parent = NO_LOOP;
                for (other_index, other) in loops.iter().enumerate() {
                    if other_index == index || !other.contains(loop_.header) {
                        continue;
                    }
                    if parent == NO_LOOP || other.body.len() < loops[parent].body.len() {
                        parent = other_index;
                    }
                }
                parent
            })
            .collect();
        for (loop_, parent) in loops.iter_mut().zip(parents) {
            loop_.parent = parent;
        }

        Self { loops, inner_most }
    }

    pub fn num_loops(&self) -> usize {
        self.loops.len()
    }

    pub fn loop_(&self, index: usize) -> &NaturalLoop {
        &self.loops[index]
    }

    pub fn inner_most_loop_of(&self, block: BlockId) -> Option<&NaturalLoop> {
        match self.inner_most.get(block.0) {
            Some(&index) if index != NO_LOOP => Some(&self.loops[index]),
            _ => None,
        }
    }

    /// How many loop bodies the block sits in.
    pub fn loop_depth(&self, block: BlockId) -> usize {
        let mut depth = 0;
        let mut current = match self.inner_most.get(block.0) {
            Some(&index) => index,
            None => NO_LOOP,
        };

        while current != NO_LOOP {
            depth += 1;
            current = self.loops[current].parent;
        }

        depth
    }

    /// Loop indices in forest preorder: every outer loop before the loops
    /// nested inside it.
    pub fn loops_in_preorder(&self) -> Vec<usize> {
        let mut children: Vec<Vec<usize>> = vec![vec![]; self.loops.len()];
        let mut roots = vec![];

        for (index, loop_) in self.loops.iter().enumerate() {
            if loop_.parent == NO_LOOP {
                roots.push(index);
            } else {
                children[loop_.parent].push(index);
            }
        }

        let mut order = Vec::with_capacity(self.loops.len());
        let mut stack: Vec<usize> = roots.into_iter().rev().collect();

        while let Some(index) = stack.pop() {
            order.push(index);
            for &child in children[index].iter().rev() {
                stack.push(child);
            }
        }

        order
    }
}
