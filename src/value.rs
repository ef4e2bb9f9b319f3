use tinyvec::TinyVec;

use crate::{
    block::BlockId,
    module::{GlobalId, ProcedureId},
    opcode::Opcode,
    procedure::{Procedure, StackSlotId},
    runtime::RuntimeHook,
    sparse_collection::SparseElement,
    typ::Type,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum NumChildren {
    Zero = 0,
    One,
    Two,
    VarArgs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ValueId(pub usize);

impl Into<usize> for ValueId {
    fn into(self) -> usize {
        self.0
    }
}

impl From<usize> for ValueId {
    fn from(id: usize) -> Self {
        Self(id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueData {
    None,
    Const32(i32),
    Const64(i64),
    Argument(usize),
    /// Incoming blocks of a phi, parallel to the children list.
    Phi(Vec<BlockId>),
    /// Static byte offset of a Load/Store from its base child.
    Memory { offset: i32 },
    Slot(StackSlotId),
    Global(GlobalId),
    Call(ProcedureId),
    Runtime(RuntimeHook),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Value {
    pub(crate) index: usize,
    pub(crate) opcode: Opcode,
    pub(crate) typ: Type,
    pub(crate) num_children: NumChildren,
    pub(crate) data: ValueData,
    pub(crate) owner: Option<BlockId>,
    pub(crate) children: TinyVec<[ValueId; 3]>,
}

impl SparseElement for Value {
    type Id = ValueId;

    fn id(&self) -> Self::Id {
        ValueId(self.index)
    }

    fn set_id(&mut self, id: Self::Id) {
        self.index = id.0;
    }
}

impl Value {
    pub(crate) fn build_adjacency_list(
        num_children: NumChildren,
        args: &[ValueId],
    ) -> TinyVec<[ValueId; 3]> {
        match num_children {
            NumChildren::VarArgs => args.iter().copied().collect(),
            _ => {
                assert!(args.len() == num_children as usize);

                let mut children = TinyVec::new();
                for arg in args {
                    children.push(*arg);
                }

                children
            }
        }
    }

    pub fn new(
        opcode: Opcode,
        typ: Type,
        num_children: NumChildren,
        args: &[ValueId],
        data: ValueData,
    ) -> Self {
        Self {
            index: usize::MAX,
            opcode,
            typ,
            num_children,
            data,
            owner: None,
            children: Self::build_adjacency_list(num_children, args),
        }
    }

    pub fn make_const32(value: i32) -> Self {
        Self::new(
            Opcode::Const32,
            Type::Int32,
            NumChildren::Zero,
            &[],
            ValueData::Const32(value),
        )
    }

    pub fn make_const64(value: i64) -> Self {
        Self::new(
            Opcode::Const64,
            Type::Int64,
            NumChildren::Zero,
            &[],
            ValueData::Const64(value),
        )
    }

    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    pub fn typ(&self) -> Type {
        self.typ
    }

    pub fn owner(&self) -> Option<BlockId> {
        self.owner
    }

    pub fn children(&self) -> &[ValueId] {
        &self.children
    }

    pub fn is_constant(&self) -> bool {
        matches!(self.opcode, Opcode::Const32 | Opcode::Const64)
    }

    /// The constant payload widened to i64, for either constant width.
    pub fn as_int(&self) -> Option<i64> {
        match self.data {
            ValueData::Const32(x) => Some(x as i64),
            ValueData::Const64(x) => Some(x),
            _ => None,
        }
    }

    pub fn memory_offset(&self) -> i32 {
        match self.data {
            ValueData::Memory { offset } => offset,
            _ => panic!("not a memory value"),
        }
    }

    pub fn phi_incoming(&self) -> &[BlockId] {
        match &self.data {
            ValueData::Phi(incoming) => incoming,
            _ => panic!("not a phi"),
        }
    }

    /// The child of a phi flowing in from `pred`, if `pred` is an incoming block.
    pub fn phi_operand_for(&self, pred: BlockId) -> Option<ValueId> {
        match &self.data {
            ValueData::Phi(incoming) => incoming
                .iter()
                .position(|&block| block == pred)
                .map(|i| self.children[i]),
            _ => None,
        }
    }

    pub(crate) fn fmt<W: std::fmt::Write>(&self, f: &mut W, _proc: &Procedure) -> std::fmt::Result {
        write!(f, "{} @{} = {:?}(", self.typ, self.index, self.opcode)?;

        for (i, child) in self.children.iter().enumerate() {
            if i != 0 {
                write!(f, ", ")?;
            }
            write!(f, "@{}", child.0)?;
        }

        match &self.data {
            ValueData::None => {}
            ValueData::Const32(x) => write!(f, "{}", x)?,
            ValueData::Const64(x) => write!(f, "{}", x)?,
            ValueData::Argument(i) => write!(f, "arg{}", i)?,
            ValueData::Phi(incoming) => {
                for (i, block) in incoming.iter().enumerate() {
                    if i != 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "<-BB{}", block.0)?;
                }
            }
            ValueData::Memory { offset } => write!(f, "; offset = {}", offset)?,
            ValueData::Slot(slot) => write!(f, "slot{}", slot.0)?,
            ValueData::Global(global) => write!(f, "global{}", global.0)?,
            ValueData::Call(proc) => write!(f, "proc{}", proc.0)?,
            ValueData::Runtime(hook) => write!(f, "{:?}", hook)?,
        }

        write!(f, ")")
    }
}
