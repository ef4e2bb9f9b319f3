use std::path::PathBuf;

use thiserror::Error;

use crate::{
    block::BlockId,
    chill_div,
    module::{Module, ProcedureId},
    opcode::Opcode,
    procedure::Procedure,
    runtime::{ProfileSink, RuntimeHook},
    typ::Type,
    value::{ValueData, ValueId},
};

#[derive(Debug, Error)]
pub enum InterpError {
    #[error("procedure {0:?} not found")]
    UnknownProcedure(String),
    #[error("{0}: executed unreachable")]
    Unreachable(String),
    #[error("{0}: BB{1} fell off the end without a terminator")]
    MissingTerminator(String, usize),
    #[error("{0}: phi @{1} has no operand for the incoming edge")]
    BadPhi(String, usize),
    #[error("{0}: memory access through a value that is not a slot or global base")]
    BadAddress(String),
    #[error("{0}: memory access out of bounds")]
    OutOfBounds(String),
}

/// Direct executor for a module's IR: SSA values become registers, counter
/// slots and globals become byte arrays, and the dump opcodes call through
/// to the profile sink. This stands in for actually running an
/// instrumented binary.
pub struct Interp<'a> {
    module: &'a Module,
    globals: Vec<Vec<u8>>,
    sink: ProfileSink,
}

impl<'a> Interp<'a> {
    /// Set up a run: global arrays come up zeroed, and profile files under
    /// `profile_dir` will be truncated on first touch.
    pub fn new(module: &'a Module, profile_dir: impl Into<PathBuf>) -> Self {
        Self {
            module,
            globals: module
                .globals()
                .iter()
                .map(|global| vec![0u8; global.byte_size])
                .collect(),
            sink: ProfileSink::new(profile_dir),
        }
    }

    pub fn run(&mut self, function: &str, args: &[i64]) -> Result<Option<i64>, InterpError> {
        let id = self
            .module
            .procedure_by_name(function)
            .ok_or_else(|| InterpError::UnknownProcedure(function.to_string()))?;
        self.run_procedure(id, args)
    }

    pub fn run_procedure(
        &mut self,
        id: ProcedureId,
        args: &[i64],
    ) -> Result<Option<i64>, InterpError> {
        let module = self.module;
        let proc = module.procedure(id);

        let mut regs = vec![0i64; proc.num_values()];
        let mut slots: Vec<Vec<u8>> = proc
            .stack_slots()
            .iter()
            .map(|slot| vec![0u8; slot.byte_size])
            .collect();

        let mut block = proc.cfg_root();
        let mut prev: Option<BlockId> = None;

        loop {
            // Phis first, and as a parallel assignment: every operand is
            // read against the previous block before any phi is written.
            if let Some(pred) = prev {
                let mut updates = Vec::new();
                for &value_id in proc.block(block).iter() {
                    let value = proc.value(value_id);
                    if value.opcode() != Opcode::Phi {
                        break;
                    }
                    let operand = value
                        .phi_operand_for(pred)
                        .ok_or_else(|| InterpError::BadPhi(proc.name().to_string(), value_id.0))?;
                    updates.push((value_id, regs[operand.0]));
                }
                for (value_id, x) in updates {
                    regs[value_id.0] = x;
                }
            }

            let mut next_block = None;

            for &value_id in proc.block(block).iter() {
                let value = proc.value(value_id);
                let children = value.children();

                match value.opcode() {
                    Opcode::Nop | Opcode::Phi | Opcode::SlotBase | Opcode::GlobalBase => {}

                    Opcode::Const32 | Opcode::Const64 => {
                        regs[value_id.0] = value.as_int().unwrap();
                    }

                    Opcode::Argument => {
                        let position = match value.data {
                            ValueData::Argument(position) => position,
                            _ => unreachable!(),
                        };
                        regs[value_id.0] = args.get(position).copied().unwrap_or(0);
                    }

                    Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Div => {
                        let lhs = regs[children[0].0];
                        let rhs = regs[children[1].0];
                        let wide = match value.opcode() {
                            Opcode::Add => lhs.wrapping_add(rhs),
                            Opcode::Sub => lhs.wrapping_sub(rhs),
                            Opcode::Mul => lhs.wrapping_mul(rhs),
                            Opcode::Div => chill_div(lhs, rhs),
                            _ => unreachable!(),
                        };
                        regs[value_id.0] = match value.typ() {
                            Type::Int32 => (wide as i32) as i64,
                            _ => wide,
                        };
                    }

                    Opcode::Equal
                    | Opcode::NotEqual
                    | Opcode::LessThan
                    | Opcode::LessEqual
                    | Opcode::GreaterThan
                    | Opcode::GreaterEqual => {
                        let lhs = regs[children[0].0];
                        let rhs = regs[children[1].0];
                        let result = match value.opcode() {
                            Opcode::Equal => lhs == rhs,
                            Opcode::NotEqual => lhs != rhs,
                            Opcode::LessThan => lhs < rhs,
                            Opcode::LessEqual => lhs <= rhs,
                            Opcode::GreaterThan => lhs > rhs,
                            Opcode::GreaterEqual => lhs >= rhs,
                            _ => unreachable!(),
                        };
                        regs[value_id.0] = result as i64;
                    }

                    Opcode::SExt32 | Opcode::Trunc => {
                        regs[value_id.0] = (regs[children[0].0] as i32) as i64;
                    }

                    Opcode::Load => {
                        let offset = value.memory_offset() as usize;
                        let bytes =
                            self.memory(proc, &slots, children[0])?;
                        regs[value_id.0] = read_int(bytes, offset, value.typ())
                            .ok_or_else(|| InterpError::OutOfBounds(proc.name().to_string()))?;
                    }

                    Opcode::Store => {
                        let offset = value.memory_offset() as usize;
                        let stored = regs[children[0].0];
                        let width = proc.value(children[0]).typ();
                        let bytes =
                            self.memory_mut(proc, &mut slots, children[1])?;
                        write_int(bytes, offset, width, stored)
                            .ok_or_else(|| InterpError::OutOfBounds(proc.name().to_string()))?;
                    }

                    Opcode::MemZero => {
                        let slot = match value.data {
                            ValueData::Slot(slot) => slot,
                            _ => return Err(InterpError::BadAddress(proc.name().to_string())),
                        };
                        slots[slot.0].fill(0);
                    }

                    Opcode::Call => {
                        let callee = match value.data {
                            ValueData::Call(callee) => callee,
                            _ => unreachable!(),
                        };
                        let call_args: Vec<i64> =
                            children.iter().map(|child| regs[child.0]).collect();
                        let result = self.run_procedure(callee, &call_args)?;
                        regs[value_id.0] = result.unwrap_or(0);
                    }

                    Opcode::CCall => {
                        self.dump(proc, &slots, value_id)?;
                    }

                    Opcode::Jump => {
                        next_block = Some(proc.block(block).successor_list()[0]);
                    }

                    Opcode::Branch => {
                        let condition = regs[children[0].0];
                        let successors = proc.block(block).successor_list();
                        next_block = Some(if condition != 0 {
                            successors[0]
                        } else {
                            successors[1]
                        });
                    }

                    Opcode::Return => {
                        return Ok(children.first().map(|child| regs[child.0]));
                    }

                    Opcode::Unreachable => {
                        return Err(InterpError::Unreachable(proc.name().to_string()));
                    }
                }
            }

            match next_block {
                Some(next) => {
                    prev = Some(block);
                    block = next;
                }
                None => {
                    return Err(InterpError::MissingTerminator(
                        proc.name().to_string(),
                        block.0,
                    ))
                }
            }
        }
    }

    fn memory<'m>(
        &'m self,
        proc: &Procedure,
        slots: &'m [Vec<u8>],
        base: ValueId,
    ) -> Result<&'m [u8], InterpError> {
        match proc.value(base).data {
            ValueData::Slot(slot) => Ok(&slots[slot.0]),
            ValueData::Global(global) => Ok(&self.globals[global.0]),
            _ => Err(InterpError::BadAddress(proc.name().to_string())),
        }
    }

    fn memory_mut<'m>(
        &'m mut self,
        proc: &Procedure,
        slots: &'m mut [Vec<u8>],
        base: ValueId,
    ) -> Result<&'m mut [u8], InterpError> {
        match proc.value(base).data {
            ValueData::Slot(slot) => Ok(&mut slots[slot.0]),
            ValueData::Global(global) => Ok(&mut self.globals[global.0]),
            _ => Err(InterpError::BadAddress(proc.name().to_string())),
        }
    }

    /// Execute a dump call: decode the arrays out of counter memory and
    /// hand them to the run-time sink.
    fn dump(
        &mut self,
        proc: &Procedure,
        slots: &[Vec<u8>],
        value_id: ValueId,
    ) -> Result<(), InterpError> {
        let value = proc.value(value_id);
        let hook = match value.data {
            ValueData::Runtime(hook) => hook,
            _ => unreachable!(),
        };
        let children = value.children();

        let size = proc
            .value(children[2])
            .as_int()
            .unwrap_or(0)
            .max(0) as usize;

        let index_bytes = self.memory(proc, slots, children[1])?;
        let indexes: Vec<i32> = (0..size)
            .map(|i| read_int(index_bytes, 4 * i, Type::Int32).map(|x| x as i32))
            .collect::<Option<_>>()
            .ok_or_else(|| InterpError::OutOfBounds(proc.name().to_string()))?;

        match hook {
            RuntimeHook::PrintData => {
                let counter_bytes = self.memory(proc, slots, children[0])?;
                let counters: Vec<i32> = (0..size)
                    .map(|i| read_int(counter_bytes, 4 * i, Type::Int32).map(|x| x as i32))
                    .collect::<Option<_>>()
                    .ok_or_else(|| InterpError::OutOfBounds(proc.name().to_string()))?;
                self.sink.print_data(proc.name(), &counters, &indexes);
            }
            RuntimeHook::NissePrintData => {
                let counter_bytes = self.memory(proc, slots, children[0])?;
                let counters: Vec<i64> = (0..size)
                    .map(|i| read_int(counter_bytes, 8 * i, Type::Int64))
                    .collect::<Option<_>>()
                    .ok_or_else(|| InterpError::OutOfBounds(proc.name().to_string()))?;
                self.sink.nisse_print_data(&counters, &indexes);
            }
        }

        Ok(())
    }
}

fn read_int(bytes: &[u8], offset: usize, typ: Type) -> Option<i64> {
    match typ {
        Type::Int32 => {
            let chunk = bytes.get(offset..offset + 4)?;
            Some(i32::from_le_bytes(chunk.try_into().unwrap()) as i64)
        }
        Type::Int64 => {
            let chunk = bytes.get(offset..offset + 8)?;
            Some(i64::from_le_bytes(chunk.try_into().unwrap()))
        }
        Type::Void => None,
    }
}

fn write_int(bytes: &mut [u8], offset: usize, typ: Type, value: i64) -> Option<()> {
    match typ {
        Type::Int32 => {
            let chunk = bytes.get_mut(offset..offset + 4)?;
            chunk.copy_from_slice(&(value as i32).to_le_bytes());
            Some(())
        }
        Type::Int64 => {
            let chunk = bytes.get_mut(offset..offset + 8)?;
            chunk.copy_from_slice(&value.to_le_bytes());
            Some(())
        }
        Type::Void => None,
    }
}
