use crate::{block::BlockId, procedure::Procedure, value::ValueId};

struct Insertion {
    index: usize,
    value: ValueId,
}

/// Batches up value insertions into one block, then splices them in with a
/// single `execute` call. Insertion indices name positions in the block's
/// value list as it was before any insertion; values inserted at the same
/// index land in the order they were added.
pub struct InsertionSet {
    insertions: Vec<Insertion>,
}

impl InsertionSet {
    pub fn new() -> Self {
        Self {
            insertions: Vec::new(),
        }
    }

    pub fn insert_value(&mut self, index: usize, value: ValueId) -> ValueId {
        self.insertions.push(Insertion { index, value });
        value
    }

    /// Rebuild the block's value list in one merge pass: walk the original
    /// values and flush every queued insertion whose index has come due
    /// just before the value it points at.
    pub fn execute(&mut self, proc: &mut Procedure, block: BlockId) {
        if self.insertions.is_empty() {
            return;
        }

        for insertion in &self.insertions {
            proc.value_mut(insertion.value).owner = Some(block);
        }
        // Stable sort keeps same-index insertions in push order.
        self.insertions.sort_by_key(|insertion| insertion.index);

        let values = &mut proc.block_mut(block).values;
        let mut spliced = Vec::with_capacity(values.len() + self.insertions.len());
        let mut queued = self.insertions.drain(..).peekable();

        for (index, &value) in values.iter().enumerate() {
            while queued
                .peek()
                .is_some_and(|insertion| insertion.index <= index)
            {
                spliced.push(queued.next().unwrap().value);
            }
            spliced.push(value);
        }
        // Anything aimed past the last value goes at the end.
        spliced.extend(queued.map(|insertion| insertion.value));

        *values = spliced;
    }
}
