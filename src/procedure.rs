use once_cell::unsync::OnceCell;

use crate::{
    block::{recompute_predecessors, BasicBlock, BlockId},
    dominators::{Dominators, Graph},
    module::{GlobalId, ProcedureId},
    natural_loops::NaturalLoops,
    opcode::Opcode,
    runtime::RuntimeHook,
    sparse_collection::SparseCollection,
    typ::Type,
    value::{NumChildren, Value, ValueData, ValueId},
};

/// A procedure-local byte array, the home of the KS/Ball counter and index
/// arrays. Slots are materialised per invocation, like an alloca.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackSlot {
    pub byte_size: usize,
    pub index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StackSlotId(pub usize);

pub struct Procedure {
    pub(crate) name: String,
    pub(crate) blocks: Vec<BasicBlock>,
    pub(crate) values: SparseCollection<Value>,
    pub(crate) stack_slots: Vec<StackSlot>,
    pub(crate) dominators: OnceCell<Dominators<Procedure>>,
    pub(crate) natural_loops: OnceCell<NaturalLoops>,
}

impl Graph for Procedure {
    type Node = BlockId;

    fn node_index(&self, node: Self::Node) -> usize {
        node.0
    }

    fn node(&self, index: usize) -> Option<Self::Node> {
        Some(BlockId(index))
    }

    fn num_nodes(&self) -> usize {
        self.blocks.len()
    }

    fn root(&self) -> Self::Node {
        BlockId(0)
    }

    fn predecessors(&self, block: Self::Node) -> std::borrow::Cow<[Self::Node]> {
        std::borrow::Cow::Borrowed(self.blocks[block.0].predecessor_list())
    }

    fn successors(&self, block: Self::Node) -> std::borrow::Cow<[Self::Node]> {
        std::borrow::Cow::Borrowed(self.blocks[block.0].successor_list())
    }
}

impl Procedure {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            blocks: Vec::new(),
            values: SparseCollection::new(),
            stack_slots: Vec::new(),
            dominators: OnceCell::new(),
            natural_loops: OnceCell::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.0]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut BasicBlock {
        &mut self.blocks[id.0]
    }

    pub fn num_values(&self) -> usize {
        self.values.size()
    }

    pub fn value(&self, id: ValueId) -> &Value {
        self.values
            .at(id)
            .unwrap_or_else(|| panic!("{:?} not found", id))
    }

    pub fn value_mut(&mut self, id: ValueId) -> &mut Value {
        self.values.at_mut(id).unwrap()
    }

    pub fn add(&mut self, value: Value) -> ValueId {
        self.values.add(value)
    }

    pub fn cfg_root(&self) -> BlockId {
        BlockId(0)
    }

    pub fn successors(&self, id: BlockId) -> &Vec<BlockId> {
        self.blocks[id.0].successor_list()
    }

    pub fn predecessors(&self, id: BlockId) -> &Vec<BlockId> {
        self.blocks[id.0].predecessor_list()
    }

    pub fn dominators(&self) -> &Dominators<Self> {
        self.dominators.get_or_init(|| Dominators::new(self))
    }

    pub fn natural_loops(&self) -> &NaturalLoops {
        self.natural_loops
            .get_or_init(|| NaturalLoops::new(self, self.dominators()))
    }

    pub fn invalidate_cfg(&mut self) {
        self.dominators.take();
        self.natural_loops.take();
    }

    pub fn add_block(&mut self) -> BlockId {
        let block = BasicBlock::new(self.blocks.len());

        self.blocks.push(block);

        BlockId(self.blocks.len() - 1)
    }

    pub fn add_stack_slot(&mut self, byte_size: usize) -> StackSlotId {
        let slot = StackSlot {
            byte_size,
            index: self.stack_slots.len(),
        };

        self.stack_slots.push(slot);

        StackSlotId(self.stack_slots.len() - 1)
    }

    pub fn stack_slot(&self, id: StackSlotId) -> &StackSlot {
        &self.stack_slots[id.0]
    }

    pub fn stack_slots(&self) -> &[StackSlot] {
        &self.stack_slots
    }

    pub fn add_int_constant(&mut self, typ: Type, value: i64) -> ValueId {
        match typ {
            Type::Int32 => self.add(Value::make_const32(value as i32)),
            Type::Int64 => self.add(Value::make_const64(value)),
            Type::Void => panic!("Invalid type for constant"),
        }
    }

    pub fn add_argument(&mut self, typ: Type, position: usize) -> ValueId {
        self.add(Value::new(
            Opcode::Argument,
            typ,
            NumChildren::Zero,
            &[],
            ValueData::Argument(position),
        ))
    }

    pub fn add_binary(&mut self, opcode: Opcode, lhs: ValueId, rhs: ValueId) -> ValueId {
        assert!(
            opcode.is_binary(),
            "Opcode is not a binary operation: {:?}",
            opcode
        );
        let typ = if opcode.is_compare() {
            Type::Int32
        } else {
            self.value(lhs).typ()
        };

        self.add(Value::new(
            opcode,
            typ,
            NumChildren::Two,
            &[lhs, rhs],
            ValueData::None,
        ))
    }

    pub fn add_phi(&mut self, typ: Type) -> ValueId {
        self.add(Value::new(
            Opcode::Phi,
            typ,
            NumChildren::VarArgs,
            &[],
            ValueData::Phi(Vec::new()),
        ))
    }

    pub fn phi_add_incoming(&mut self, phi: ValueId, pred: BlockId, value: ValueId) {
        let phi = self.value_mut(phi);
        match &mut phi.data {
            ValueData::Phi(incoming) => {
                incoming.push(pred);
                phi.children.push(value);
            }
            _ => panic!("not a phi"),
        }
    }

    pub fn add_sext32(&mut self, value: ValueId) -> ValueId {
        self.add(Value::new(
            Opcode::SExt32,
            Type::Int64,
            NumChildren::One,
            &[value],
            ValueData::None,
        ))
    }

    pub fn add_trunc(&mut self, value: ValueId) -> ValueId {
        self.add(Value::new(
            Opcode::Trunc,
            Type::Int32,
            NumChildren::One,
            &[value],
            ValueData::None,
        ))
    }

    pub fn add_slot_base(&mut self, slot: StackSlotId) -> ValueId {
        self.add(Value::new(
            Opcode::SlotBase,
            Type::Int64,
            NumChildren::Zero,
            &[],
            ValueData::Slot(slot),
        ))
    }

    pub fn add_global_base(&mut self, global: GlobalId) -> ValueId {
        self.add(Value::new(
            Opcode::GlobalBase,
            Type::Int64,
            NumChildren::Zero,
            &[],
            ValueData::Global(global),
        ))
    }

    pub fn add_load(&mut self, typ: Type, base: ValueId, offset: i32) -> ValueId {
        assert!(typ.is_int(), "Can only load integers: {}", typ);
        self.add(Value::new(
            Opcode::Load,
            typ,
            NumChildren::One,
            &[base],
            ValueData::Memory { offset },
        ))
    }

    pub fn add_store(&mut self, value: ValueId, base: ValueId, offset: i32) -> ValueId {
        self.add(Value::new(
            Opcode::Store,
            Type::Void,
            NumChildren::Two,
            &[value, base],
            ValueData::Memory { offset },
        ))
    }

    pub fn add_mem_zero(&mut self, slot: StackSlotId) -> ValueId {
        self.add(Value::new(
            Opcode::MemZero,
            Type::Void,
            NumChildren::Zero,
            &[],
            ValueData::Slot(slot),
        ))
    }

    pub fn add_call(&mut self, typ: Type, callee: ProcedureId, args: &[ValueId]) -> ValueId {
        self.add(Value::new(
            Opcode::Call,
            typ,
            NumChildren::VarArgs,
            args,
            ValueData::Call(callee),
        ))
    }

    pub fn add_ccall(&mut self, hook: RuntimeHook, args: &[ValueId]) -> ValueId {
        self.add(Value::new(
            Opcode::CCall,
            Type::Void,
            NumChildren::VarArgs,
            args,
            ValueData::Runtime(hook),
        ))
    }

    pub fn add_jump(&mut self) -> ValueId {
        self.add(Value::new(
            Opcode::Jump,
            Type::Void,
            NumChildren::Zero,
            &[],
            ValueData::None,
        ))
    }

    pub fn add_branch(&mut self, condition: ValueId) -> ValueId {
        self.add(Value::new(
            Opcode::Branch,
            Type::Void,
            NumChildren::One,
            &[condition],
            ValueData::None,
        ))
    }

    pub fn add_return(&mut self, value: Option<ValueId>) -> ValueId {
        let children: &[ValueId] = match &value {
            Some(value) => std::slice::from_ref(value),
            None => &[],
        };
        self.add(Value::new(
            Opcode::Return,
            Type::Void,
            if value.is_some() {
                NumChildren::One
            } else {
                NumChildren::Zero
            },
            children,
            ValueData::None,
        ))
    }

    pub fn add_unreachable(&mut self) -> ValueId {
        self.add(Value::new(
            Opcode::Unreachable,
            Type::Void,
            NumChildren::Zero,
            &[],
            ValueData::None,
        ))
    }

    pub fn add_to_block(&mut self, block: BlockId, value: ValueId) {
        self.value_mut(value).owner = Some(block);
        self.blocks[block.0].push(value);
    }

    /// The terminator of a block, if the block has one.
    pub fn terminator(&self, block: BlockId) -> Option<&Value> {
        let last = *self.block(block).values.last()?;
        let value = self.value(last);
        value.opcode().is_terminator().then_some(value)
    }

    /// Index of the block's terminator in its value list, the usual
    /// insertion point for "at the end of the block" code.
    pub fn terminator_index(&self, block: BlockId) -> usize {
        let block = self.block(block);
        debug_assert!(!block.values.is_empty());
        block.values.len() - 1
    }

    /// Index of the first value past the block's phis, the "first insertion
    /// point" for code placed at the start of a block.
    pub fn first_insertion_index(&self, block: BlockId) -> usize {
        let block = self.block(block);
        block
            .values
            .iter()
            .position(|&value| self.value(value).opcode() != Opcode::Phi)
            .unwrap_or(block.values.len())
    }

    pub fn reset_value_owners(&mut self) {
        for block_index in 0..self.blocks.len() {
            for value_index in 0..self.blocks[block_index].values.len() {
                let value = self.blocks[block_index].values[value_index];
                self.values.at_mut(value).unwrap().owner = Some(BlockId(block_index));
            }
        }
    }

    pub fn reset_reachability(&mut self) {
        recompute_predecessors(&mut self.blocks);
        self.reset_value_owners();
    }

    pub fn display_(&self) -> ProcedureDisplay<'_> {
        ProcedureDisplay { procedure: self }
    }
}

pub struct ProcedureDisplay<'a> {
    procedure: &'a Procedure,
}

impl std::fmt::Display for ProcedureDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Procedure {} {{", self.procedure.name)?;

        for block in self.procedure.blocks.iter() {
            block.fmt(f, self.procedure)?;
        }

        writeln!(f, "}}")?;
        Ok(())
    }
}
