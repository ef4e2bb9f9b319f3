use std::collections::HashMap;
use std::path::Path;

use log::{debug, warn};
use thiserror::Error;

use crate::{
    block::BlockId,
    break_critical_edges::break_critical_edges,
    graph_file,
    insertion_set::InsertionSet,
    module::{GlobalId, Module, ProcedureId},
    opcode::Opcode,
    procedure::Procedure,
    runtime::RuntimeHook,
    spanning_tree::SpanningTree,
    typ::Type,
    value::ValueId,
    Options, ProfileVariant,
};

#[derive(Debug, Error)]
pub enum InstrumentError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Run one of the profiling transforms over the module: split critical
/// edges, place the counters, rewrite each function, and persist the
/// `.graph` files plus `info.prof` into `out_dir`.
///
/// Failures local to one function (no exit block, nothing worth
/// instrumenting) are logged and skipped; the pass as a whole still
/// succeeds. Only filesystem trouble is reported to the caller.
pub fn run_pass(
    module: &mut Module,
    variant: ProfileVariant,
    options: &Options,
    out_dir: &Path,
) -> Result<(), InstrumentError> {
    match variant {
        ProfileVariant::Nisse => run_module_pass(module, options, out_dir),
        ProfileVariant::Ks | ProfileVariant::Ball => {
            run_function_passes(module, variant, options, out_dir)
        }
    }
}

/// KS and Ball rewrite one function at a time; the counter arrays live in
/// the function's own frame and every return dumps them.
fn run_function_passes(
    module: &mut Module,
    variant: ProfileVariant,
    options: &Options,
    out_dir: &Path,
) -> Result<(), InstrumentError> {
    let mut info_entries = Vec::new();

    for index in 0..module.num_procedures() {
        let proc = module.procedure_mut(ProcedureId(index));

        break_critical_edges(proc);

        let Some(st) = SpanningTree::analyze(proc, variant) else {
            warn!("{}: no exit block, not instrumenting", proc.name());
            continue;
        };
        debug!("{}", st.dump(proc.name()));

        graph_file::write_graph(out_dir, proc, &st)?;

        if st.chords.len() == 1 {
            // The lone chord is recoverable from the graph alone; there is
            // nothing worth paying counters for.
            debug!("{}: single chord, skipping instrumentation", proc.name());
            info_entries.push((proc.name().to_string(), 0));
            continue;
        }

        instrument_function_local(proc, &st, options);
        debug!("instrumented:\n{}", proc.display_());
        info_entries.push((proc.name().to_string(), st.chords.len()));
    }

    graph_file::write_info(out_dir, &info_entries)?;
    Ok(())
}

/// The Nisse transform is a module pass: a first sweep sizes the two
/// module-global arrays off every function's chord count, then each
/// function is rewritten against its own offset into them.
fn run_module_pass(
    module: &mut Module,
    options: &Options,
    out_dir: &Path,
) -> Result<(), InstrumentError> {
    let mut analyses: Vec<Option<SpanningTree>> = Vec::new();

    for index in 0..module.num_procedures() {
        let proc = module.procedure_mut(ProcedureId(index));
        break_critical_edges(proc);

        let st = SpanningTree::analyze(proc, ProfileVariant::Nisse);
        match &st {
            Some(st) => debug!("{}", st.dump(proc.name())),
            None => warn!("{}: no exit block, not instrumenting", proc.name()),
        }
        analyses.push(st);
    }

    let instrumented = |st: &SpanningTree| st.chords.len() != 1;

    let total: usize = analyses
        .iter()
        .flatten()
        .filter(|st| instrumented(st))
        .map(|st| st.chords.len())
        .sum();

    let counters = module.add_global("__edgeprof_counters", 8 * total);
    let indexes = module.add_global("__edgeprof_indexes", 4 * total);

    let mut info_entries = Vec::new();
    let mut offset = 0usize;

    for index in 0..module.num_procedures() {
        let Some(st) = &analyses[index] else { continue };
        let proc = module.procedure_mut(ProcedureId(index));

        graph_file::write_graph(out_dir, proc, st)?;

        if !instrumented(st) {
            debug!("{}: single chord, skipping instrumentation", proc.name());
            info_entries.push((proc.name().to_string(), 0));
            continue;
        }

        instrument_module_global(proc, st, offset, counters, indexes);
        debug!("instrumented:\n{}", proc.display_());
        info_entries.push((proc.name().to_string(), st.chords.len()));
        offset += st.chords.len();
    }

    // The dump is wired into main alone: one call per return, covering the
    // whole module's arrays.
    if !options.disable_print {
        if let Some(main) = module.procedure_by_name("main") {
            insert_nisse_exit_hook(module.procedure_mut(main), counters, indexes, total);
        } else {
            warn!("module {} has no main, profile will not be dumped", module.name());
        }
    }

    graph_file::write_info(out_dir, &info_entries)?;
    Ok(())
}

/// Per-block batches of pending insertions. Everything lands in one
/// `execute` per block so earlier insertions cannot shift the indices
/// later ones were computed against.
struct PendingInsertions {
    sets: HashMap<BlockId, InsertionSet>,
}

impl PendingInsertions {
    fn new() -> Self {
        Self {
            sets: HashMap::new(),
        }
    }

    fn at(&mut self, block: BlockId) -> &mut InsertionSet {
        self.sets.entry(block).or_insert_with(InsertionSet::new)
    }

    fn execute(&mut self, proc: &mut Procedure) {
        for (block, set) in self.sets.iter_mut() {
            set.execute(proc, *block);
        }
        self.sets.clear();
    }
}

fn instrument_function_local(proc: &mut Procedure, st: &SpanningTree, options: &Options) {
    let n = st.chords.len();
    let entry = proc.cfg_root();
    let mut pending = PendingInsertions::new();

    // Entry hook: a zeroed counter array and the chord index table, both in
    // this invocation's frame.
    let counter_slot = proc.add_stack_slot(4 * n);
    let index_slot = proc.add_stack_slot(4 * n);

    let counters_base = proc.add_slot_base(counter_slot);
    let zero_fill = proc.add_mem_zero(counter_slot);
    let indexes_base = proc.add_slot_base(index_slot);

    pending.at(entry).insert_value(0, counters_base);
    pending.at(entry).insert_value(0, zero_fill);
    pending.at(entry).insert_value(0, indexes_base);

    for (k, chord) in st.chords.iter().enumerate() {
        let index_const = proc.add_int_constant(Type::Int32, chord.index() as i64);
        let store = proc.add_store(index_const, indexes_base, (4 * k) as i32);
        pending.at(entry).insert_value(0, index_const);
        pending.at(entry).insert_value(0, store);
    }

    // One simple increment per chord. (The function passes never see SESE
    // marks; those belong to the Nisse analysis.)
    for (k, chord) in st.chords.iter().enumerate() {
        let (block, at) = chord.insertion_point(proc);
        emit_increment(
            proc,
            pending.at(block),
            at,
            counters_base,
            (4 * k) as i32,
            Type::Int32,
            1,
        );
    }

    // Exit hook: dump the arrays at every return.
    if !options.disable_print {
        for block_index in 0..proc.num_blocks() {
            let block = BlockId(block_index);
            if proc.terminator(block).map(|value| value.opcode()) != Some(Opcode::Return) {
                continue;
            }

            let at = proc.terminator_index(block);
            let size = proc.add_int_constant(Type::Int32, n as i64);
            let call =
                proc.add_ccall(RuntimeHook::PrintData, &[counters_base, indexes_base, size]);
            pending.at(block).insert_value(at, size);
            pending.at(block).insert_value(at, call);
        }
    }

    pending.execute(proc);
}

fn instrument_module_global(
    proc: &mut Procedure,
    st: &SpanningTree,
    offset: usize,
    counters: GlobalId,
    indexes: GlobalId,
) {
    let entry = proc.cfg_root();
    let mut pending = PendingInsertions::new();

    // Entry hook: refresh this function's slice of the module-wide index
    // table. The globals start the run zeroed, and rewriting the indices on
    // every invocation is idempotent, so the layout holds no matter which
    // function runs first.
    let counters_base = proc.add_global_base(counters);
    let indexes_base = proc.add_global_base(indexes);
    pending.at(entry).insert_value(0, counters_base);
    pending.at(entry).insert_value(0, indexes_base);

    for (k, chord) in st.chords.iter().enumerate() {
        let index_const = proc.add_int_constant(Type::Int32, chord.index() as i64);
        let store = proc.add_store(index_const, indexes_base, (4 * (offset + k)) as i32);
        pending.at(entry).insert_value(0, index_const);
        pending.at(entry).insert_value(0, store);
    }

    for (k, chord) in st.chords.iter().enumerate() {
        let counter_offset = (8 * (offset + k)) as i32;

        if let Some(info) = chord.sese() {
            // Range increment: add (iv - iv0) / step at every loop exit,
            // recovering the whole trip count in one update.
            for &exit in &info.exit_blocks {
                let at = proc.first_insertion_index(exit);
                emit_range_increment(
                    proc,
                    pending.at(exit),
                    at,
                    counters_base,
                    counter_offset,
                    info.induction_var,
                    info.init_value,
                    info.step,
                );
            }
        } else {
            let (block, at) = chord.insertion_point(proc);
            emit_increment(
                proc,
                pending.at(block),
                at,
                counters_base,
                counter_offset,
                Type::Int64,
                1,
            );
        }
    }

    pending.execute(proc);
}

fn insert_nisse_exit_hook(proc: &mut Procedure, counters: GlobalId, indexes: GlobalId, total: usize) {
    let mut pending = PendingInsertions::new();

    let counters_base = proc.add_global_base(counters);
    let indexes_base = proc.add_global_base(indexes);
    pending
        .at(proc.cfg_root())
        .insert_value(0, counters_base);
    pending
        .at(proc.cfg_root())
        .insert_value(0, indexes_base);

    for block_index in 0..proc.num_blocks() {
        let block = BlockId(block_index);
        if proc.terminator(block).map(|value| value.opcode()) != Some(Opcode::Return) {
            continue;
        }

        let at = proc.terminator_index(block);
        let size = proc.add_int_constant(Type::Int32, total as i64);
        let call = proc.add_ccall(
            RuntimeHook::NissePrintData,
            &[counters_base, indexes_base, size],
        );
        pending.at(block).insert_value(at, size);
        pending.at(block).insert_value(at, call);
    }

    pending.execute(proc);
}

/// counters[offset] += amount, in the given counter width.
fn emit_increment(
    proc: &mut Procedure,
    set: &mut InsertionSet,
    at: usize,
    base: ValueId,
    offset: i32,
    width: Type,
    amount: i64,
) {
    let load = proc.add_load(width, base, offset);
    let constant = proc.add_int_constant(width, amount);
    let add = proc.add_binary(Opcode::Add, load, constant);
    let store = proc.add_store(add, base, offset);

    set.insert_value(at, load);
    set.insert_value(at, constant);
    set.insert_value(at, add);
    set.insert_value(at, store);
}

/// counters[offset] += (iv - iv0) / step, with the unit steps special-cased
/// so the common loops never pay for a division.
fn emit_range_increment(
    proc: &mut Procedure,
    set: &mut InsertionSet,
    at: usize,
    base: ValueId,
    offset: i32,
    induction_var: ValueId,
    init_value: ValueId,
    step: i64,
) {
    let widen = |proc: &mut Procedure, set: &mut InsertionSet, value: ValueId| -> ValueId {
        if proc.value(value).typ() == Type::Int32 {
            let wide = proc.add_sext32(value);
            set.insert_value(at, wide);
            wide
        } else {
            value
        }
    };

    let iv = widen(proc, set, induction_var);
    let iv0 = widen(proc, set, init_value);

    let delta = match step {
        1 => {
            let sub = proc.add_binary(Opcode::Sub, iv, iv0);
            set.insert_value(at, sub);
            sub
        }
        -1 => {
            let sub = proc.add_binary(Opcode::Sub, iv0, iv);
            set.insert_value(at, sub);
            sub
        }
        _ => {
            let sub = proc.add_binary(Opcode::Sub, iv, iv0);
            let step_const = proc.add_int_constant(Type::Int64, step);
            let div = proc.add_binary(Opcode::Div, sub, step_const);
            set.insert_value(at, sub);
            set.insert_value(at, step_const);
            set.insert_value(at, div);
            div
        }
    };

    let load = proc.add_load(Type::Int64, base, offset);
    let add = proc.add_binary(Opcode::Add, load, delta);
    let store = proc.add_store(add, base, offset);

    set.insert_value(at, load);
    set.insert_value(at, add);
    set.insert_value(at, store);
}
