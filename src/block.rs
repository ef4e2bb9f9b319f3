use std::ops::{Deref, DerefMut};

use crate::{
    dominators::{GraphNodeWorklist, GraphVisitOrder, PostOrderGraphNodeWorklist},
    opcode::Opcode,
    procedure::Procedure,
    sparse_collection::SparseElement,
    typ::Type,
    utils::index_set::KeyIndex,
    value::ValueId,
};

pub struct BasicBlock {
    pub(crate) index: usize,
    pub(crate) values: Vec<ValueId>,
    pub(crate) predecessor_list: Vec<BlockId>,
    pub(crate) successor_list: Vec<BlockId>,
    /// Set for blocks created by critical-edge splitting; the graph file
    /// names such blocks so the propagator can tell them apart.
    pub(crate) split: bool,
}

impl BasicBlock {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            values: Vec::new(),
            predecessor_list: Vec::new(),
            successor_list: Vec::new(),
            split: false,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn is_split(&self) -> bool {
        self.split
    }

    pub fn append(&mut self, value: ValueId) {
        self.values.push(value);
    }

    pub fn append_successor(&mut self, block: BlockId) {
        self.successor_list.push(block);
    }

    pub fn set_successors(&mut self, target: BlockId) {
        self.successor_list.clear();
        self.successor_list.push(target);
    }

    pub fn set_successors2(&mut self, target1: BlockId, target2: BlockId) {
        self.successor_list.clear();
        self.successor_list.push(target1);
        self.successor_list.push(target2);
    }

    pub fn replace_successor(&mut self, from: BlockId, to: BlockId) -> bool {
        let mut result = false;

        for successor in &mut self.successor_list {
            if *successor == from {
                *successor = to;
                result = true;
            }
        }

        result
    }

    pub fn predecessor_list(&self) -> &Vec<BlockId> {
        &self.predecessor_list
    }

    pub fn predecessor_list_mut(&mut self) -> &mut Vec<BlockId> {
        &mut self.predecessor_list
    }

    pub fn successor_list(&self) -> &Vec<BlockId> {
        &self.successor_list
    }

    pub fn successor_list_mut(&mut self) -> &mut Vec<BlockId> {
        &mut self.successor_list
    }

    pub fn add_predecessor(&mut self, predecessor: BlockId) -> bool {
        if self.predecessor_list.contains(&predecessor) {
            false
        } else {
            self.predecessor_list.push(predecessor);
            true
        }
    }

    pub fn remove_predecessor(&mut self, predecessor: BlockId) -> bool {
        let ix = self.predecessor_list.iter().position(|x| *x == predecessor);
        if let Some(ix) = ix {
            self.predecessor_list.remove(ix);
            true
        } else {
            false
        }
    }

    pub fn replace_predecessor(&mut self, from: BlockId, to: BlockId) -> bool {
        let mut changed = false;

        changed |= self.remove_predecessor(from);
        changed |= self.add_predecessor(to);

        changed
    }

    /// The successor of a block that ends in an unconditional jump, if that
    /// is the block's only way out.
    pub fn unique_successor(&self) -> Option<BlockId> {
        if self.successor_list.len() == 1 {
            Some(self.successor_list[0])
        } else {
            None
        }
    }

    pub(crate) fn fmt<W: std::fmt::Write>(&self, f: &mut W, proc: &Procedure) -> std::fmt::Result {
        writeln!(f, "BB{}:", self.index)?;
        if !self.predecessor_list.is_empty() {
            write!(f, "  Predecessors: ")?;
            for (i, pred) in self.predecessor_list.iter().enumerate() {
                write!(f, "BB{}", pred.0)?;

                if i < self.predecessor_list.len() - 1 {
                    write!(f, ", ")?;
                }
            }

            writeln!(f)?;
        }

        for value in &self.values {
            write!(f, "    ")?;
            let val = proc.value(*value);
            val.fmt(f, proc)?;
            writeln!(f)?;
        }

        if !self.successor_list.is_empty() {
            write!(f, "  Successors: ")?;

            for (i, succ) in self.successor_list.iter().enumerate() {
                write!(f, "BB{}", succ.0)?;

                if i < self.successor_list.len() - 1 {
                    write!(f, ", ")?;
                }
            }

            writeln!(f)?;
        }

        Ok(())
    }
}

pub fn blocks_in_pre_order(block: BlockId, proc: &Procedure) -> Vec<BlockId> {
    let mut result = vec![];

    let mut worklist = GraphNodeWorklist::new();

    worklist.push(block);

    while let Some(block) = worklist.pop() {
        result.push(block);

        for successor in proc.block(block).successor_list() {
            worklist.push(*successor);
        }
    }

    result
}

pub fn blocks_in_post_order(block: BlockId, proc: &Procedure) -> Vec<BlockId> {
    let mut result = vec![];

    let mut worklist = PostOrderGraphNodeWorklist::new();

    worklist.push(block, GraphVisitOrder::Pre);

    while let Some((block, order)) = worklist.pop() {
        match order {
            GraphVisitOrder::Pre => {
                worklist.push_post(block);
                for successor in proc.block(block).successor_list() {
                    worklist.push(*successor, GraphVisitOrder::Pre);
                }
            }

            GraphVisitOrder::Post => {
                result.push(block);
            }
        }
    }

    result
}

impl Deref for BasicBlock {
    type Target = Vec<ValueId>;

    fn deref(&self) -> &Self::Target {
        &self.values
    }
}

impl DerefMut for BasicBlock {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.values
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub usize);

impl KeyIndex for BlockId {
    fn index(&self) -> usize {
        self.0
    }
}

impl Default for BlockId {
    fn default() -> Self {
        Self(usize::MAX)
    }
}

impl Into<usize> for BlockId {
    fn into(self) -> usize {
        self.0
    }
}

impl From<usize> for BlockId {
    fn from(x: usize) -> Self {
        BlockId(x)
    }
}

impl SparseElement for BasicBlock {
    type Id = BlockId;

    fn id(&self) -> Self::Id {
        BlockId(self.index)
    }

    fn set_id(&mut self, id: Self::Id) {
        self.index = id.0;
    }
}

pub fn clear_predecessors(blocks: &mut Vec<BasicBlock>) {
    for block in blocks {
        block.predecessor_list.clear();
    }
}

pub fn recompute_predecessors(blocks: &mut Vec<BasicBlock>) {
    clear_predecessors(blocks);
    update_predecessors_after(BlockId(0), blocks)
}

pub fn update_predecessors_after(root: BlockId, blocks: &mut Vec<BasicBlock>) {
    let mut worklist = Vec::with_capacity(16);

    worklist.push(root);

    while let Some(block) = worklist.pop() {
        for succ in blocks[block.0].successor_list.clone().iter().copied() {
            if blocks[succ.0].add_predecessor(block) {
                worklist.push(succ);
            }
        }
    }
}

/// Convenience layer for building test programs and instrumentation stubs
/// one block at a time.
pub struct BasicBlockBuilder<'a> {
    pub proc: &'a mut Procedure,
    pub block: BlockId,
}

impl<'a> BasicBlockBuilder<'a> {
    pub fn new(proc: &'a mut Procedure, block: BlockId) -> Self {
        BasicBlockBuilder { proc, block }
    }

    pub fn append(&mut self, value: ValueId) -> ValueId {
        self.proc.add_to_block(self.block, value);
        value
    }

    pub fn const32(&mut self, value: i32) -> ValueId {
        let value = self.proc.add_int_constant(Type::Int32, value as i64);
        self.append(value)
    }

    pub fn const64(&mut self, value: i64) -> ValueId {
        let value = self.proc.add_int_constant(Type::Int64, value);
        self.append(value)
    }

    pub fn argument(&mut self, typ: Type, position: usize) -> ValueId {
        let value = self.proc.add_argument(typ, position);
        self.append(value)
    }

    pub fn binary(&mut self, opcode: Opcode, lhs: ValueId, rhs: ValueId) -> ValueId {
        let value = self.proc.add_binary(opcode, lhs, rhs);
        self.append(value)
    }

    pub fn phi(&mut self, typ: Type) -> ValueId {
        let value = self.proc.add_phi(typ);
        self.append(value)
    }

    pub fn call(&mut self, typ: Type, callee: crate::module::ProcedureId, args: &[ValueId]) -> ValueId {
        let value = self.proc.add_call(typ, callee, args);
        self.append(value)
    }

    pub fn jump(&mut self, to: BlockId) {
        self.proc.block_mut(self.block).successor_list.clear();
        let value = self.proc.add_jump();
        self.proc.add_to_block(self.block, value);
        self.proc.block_mut(self.block).set_successors(to);
        self.proc.block_mut(to).add_predecessor(self.block);
    }

    pub fn branch(&mut self, condition: ValueId, taken: BlockId, not_taken: BlockId) {
        self.proc.block_mut(self.block).successor_list.clear();
        let value = self.proc.add_branch(condition);
        self.proc.add_to_block(self.block, value);
        self.proc
            .block_mut(self.block)
            .set_successors2(taken, not_taken);
        self.proc.block_mut(taken).add_predecessor(self.block);
        self.proc.block_mut(not_taken).add_predecessor(self.block);
    }

    pub fn return_(&mut self, value: Option<ValueId>) {
        let value = self.proc.add_return(value);
        self.proc.add_to_block(self.block, value);
    }

    pub fn unreachable(&mut self) {
        let value = self.proc.add_unreachable();
        self.proc.add_to_block(self.block, value);
    }
}
