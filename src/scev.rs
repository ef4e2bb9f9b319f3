use crate::{
    natural_loops::NaturalLoop,
    opcode::Opcode,
    procedure::Procedure,
    value::ValueId,
};

/// A header phi whose value evolves as `{init, +, step}` per trip around
/// the loop: the scalar-evolution facts the reweighter consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AffineRecurrence {
    pub init: ValueId,
    pub step: i64,
}

/// One add/sub chain from a phi's back-edge operand down to the phi itself,
/// with the net constant step and the blocks the operations live in.
#[derive(Debug, Clone)]
pub struct StepChain {
    pub step: i64,
    pub op_blocks: Vec<crate::block::BlockId>,
}

/// Walk the use-def chain from `from` back to `phi`, accepting only
/// add/sub of a constant, all inside the loop body. Anything else in the
/// chain (another phi, a call, a load) means the value does not evolve in
/// a way we can put a number on, and the walk gives up.
pub fn step_chain(
    proc: &Procedure,
    loop_: &NaturalLoop,
    phi: ValueId,
    from: ValueId,
) -> Option<StepChain> {
    let mut current = from;
    let mut step = 0i64;
    let mut op_blocks = Vec::new();
    // The chain cannot revisit a value in SSA, but a bound keeps a broken
    // graph from hanging us.
    let mut fuel = 128;

    while current != phi {
        fuel -= 1;
        if fuel == 0 {
            return None;
        }

        let value = proc.value(current);
        let owner = value.owner()?;
        if !loop_.contains(owner) {
            return None;
        }

        match value.opcode() {
            Opcode::Add => {
                let (next, constant) =
                    split_constant(proc, value.children()[0], value.children()[1])?;
                step = step.checked_add(constant)?;
                op_blocks.push(owner);
                current = next;
            }
            Opcode::Sub => {
                let constant = proc.value(value.children()[1]).as_int()?;
                step = step.checked_sub(constant)?;
                op_blocks.push(owner);
                current = value.children()[0];
            }
            _ => return None,
        }
    }

    Some(StepChain { step, op_blocks })
}

fn split_constant(proc: &Procedure, a: ValueId, b: ValueId) -> Option<(ValueId, i64)> {
    if let Some(constant) = proc.value(b).as_int() {
        return Some((a, constant));
    }
    if let Some(constant) = proc.value(a).as_int() {
        return Some((b, constant));
    }
    None
}

/// Recognise `phi` as an induction variable of the loop: its pre-header
/// operand is the initial value and its back-edge operand adds a non-zero
/// compile-time constant each trip.
pub fn affine_recurrence(
    proc: &Procedure,
    loop_: &NaturalLoop,
    phi: ValueId,
) -> Option<(AffineRecurrence, StepChain)> {
    let pre_header = loop_.pre_header(proc)?;
    let latch = loop_.back_block(proc)?;

    let phi_value = proc.value(phi);
    let init = phi_value.phi_operand_for(pre_header)?;
    let next = phi_value.phi_operand_for(latch)?;

    let chain = step_chain(proc, loop_, phi, next)?;
    if chain.step == 0 {
        return None;
    }

    Some((AffineRecurrence {
        init,
        step: chain.step,
    }, chain))
}
